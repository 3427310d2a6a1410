use std::io;

use crate::chunk::ChunkId;

/// Logs `$err` at `$level`, or returns it when `$level` reaches the fail level
/// configured on `$state`.
#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum DsdError {
    #[error("Unrecognized container format (magic {0})")]
    UnrecognizedFormat(ChunkId),

    #[error("Not a {0} container")]
    NotThisFormat(&'static str),

    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    #[error("Stream truncated while reading {0}")]
    TruncatedStream(&'static str),

    #[error("Corrupt compressed audio at frame {frame}: {reason}")]
    FrameStreamCorruption { frame: u64, reason: String },

    #[error("DST decoding error in frame {frame}: {source}")]
    DecodeFrame {
        frame: u64,
        #[source]
        source: FrameError,
    },

    #[error("No {format} channel layout for {channels} channels")]
    UnsupportedLayout {
        format: &'static str,
        channels: u16,
    },

    #[error("Writer already closed")]
    WriterFinished,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DsdError {
    /// Maps `UnexpectedEof` onto [`DsdError::TruncatedStream`], keeping other I/O errors.
    pub fn from_io(err: io::Error, what: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DsdError::TruncatedStream(what)
        } else {
            DsdError::Io(err)
        }
    }

    /// True for errors a caller may report as "not a DSD file" rather than a failure.
    pub fn is_unrecognized(&self) -> bool {
        matches!(
            self,
            DsdError::UnrecognizedFormat(_) | DsdError::NotThisFormat(_)
        )
    }
}

/// Failure of a single compressed frame. The frame is replaced by silence.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is empty")]
    Empty,

    #[error("frame is DST coded and no DST codec is available")]
    Coded,

    #[error("malformed frame header {0:#04X}")]
    BadHeader(u8),

    #[error("frame carries {actual} sample bytes, expected {expected}")]
    Length { expected: usize, actual: usize },

    #[error("codec panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Codec(String),
}

pub type Result<T, E = DsdError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    struct State {
        fail_level: log::Level,
    }

    fn report(state: &State, level: log::Level) -> Result<u32> {
        log_or_err!(
            state,
            level,
            DsdError::DecodeFrame {
                frame: 3,
                source: FrameError::Coded,
            }
        );
        Ok(1)
    }

    #[test]
    fn warnings_only_fail_in_strict_mode() {
        let lenient = State {
            fail_level: log::Level::Error,
        };
        let strict = State {
            fail_level: log::Level::Warn,
        };

        assert_eq!(report(&lenient, log::Level::Warn).unwrap(), 1);
        assert!(matches!(
            report(&strict, log::Level::Warn),
            Err(DsdError::DecodeFrame { frame: 3, .. })
        ));
        assert!(report(&lenient, log::Level::Error).is_err());
    }

    #[test]
    fn eof_becomes_truncated_stream() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "short");
        assert!(matches!(
            DsdError::from_io(eof, "chunk header"),
            DsdError::TruncatedStream("chunk header")
        ));

        let other = io::Error::other("disk");
        assert!(matches!(DsdError::from_io(other, "x"), DsdError::Io(_)));
    }
}

//! Format-independent reader/writer surface and the format dispatcher.

use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crate::chunk::ChunkId;
use crate::dff::reader::DffReader;
use crate::dff::writer::DffWriter;
use crate::dsf::reader::DsfReader;
use crate::dsf::writer::DsfWriter;
use crate::dst::{FrameCodec, PlainFrameCodec};
use crate::utils::errors::{DsdError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Dsdiff,
    Dsf,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 2] = [ContainerFormat::Dsdiff, ContainerFormat::Dsf];

    /// First four bytes of a file in this format.
    pub fn magic(self) -> ChunkId {
        match self {
            ContainerFormat::Dsdiff => crate::dff::FRM8,
            ContainerFormat::Dsf => crate::dsf::DSD,
        }
    }

    pub fn from_magic(magic: ChunkId) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.magic() == magic)
    }

    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Dsdiff => "dff",
            ContainerFormat::Dsf => "dsf",
        }
    }

    /// Guesses the format from a `.dff` or `.dsf` extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }

    pub fn name(self) -> &'static str {
        match self {
            ContainerFormat::Dsdiff => "DSDIFF",
            ContainerFormat::Dsf => "DSF",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stream properties known once a reader is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub format: ContainerFormat,
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Decoded audio payload length in bytes, byte-interleaved.
    pub data_length: u64,
    pub compressed: bool,
    /// Bytes per decoded DST frame, for compressed streams.
    pub frame_size: Option<usize>,
}

impl StreamInfo {
    /// One-bit samples per channel.
    pub fn sample_count(&self) -> u64 {
        if self.channel_count == 0 {
            return 0;
        }
        self.data_length * 8 / self.channel_count as u64
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f64 / self.sample_rate as f64
    }
}

/// Reading side of the conversion.
///
/// Audio comes first. After it is exhausted, [`next_chunk`](DsdReader::next_chunk)
/// advances to each following chunk in turn, whose payload [`read`](DsdReader::read)
/// then yields. `None` from `next_chunk` is the terminal state.
pub trait DsdReader {
    fn info(&self) -> &StreamInfo;

    /// Reads payload of the current chunk, returning 0 at its end.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn next_chunk(&mut self) -> Result<Option<ChunkId>>;

    fn close(&mut self) -> Result<()>;
}

/// Writing side of the conversion. Starts in the audio chunk.
pub trait DsdWriter {
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Ends the current chunk and starts `id`. Returns `false` if this format
    /// has no place for such a chunk, in which case its payload must be dropped.
    fn next_chunk(&mut self, id: ChunkId) -> Result<bool>;

    /// Finalizes all size fields. Further writes fail.
    fn close(&mut self) -> Result<()>;

    /// Total bytes in the output so far.
    fn bytes_written(&self) -> u64;
}

/// Options that affect how compressed audio is decoded.
#[derive(Clone)]
pub struct ReaderOptions {
    pub codec: Arc<dyn FrameCodec>,
    pub decoder_threads: usize,
    /// Frame-level problems at or above this severity abort the read.
    pub fail_level: log::Level,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            codec: Arc::new(PlainFrameCodec),
            decoder_threads: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            fail_level: log::Level::Error,
        }
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("decoder_threads", &self.decoder_threads)
            .field("fail_level", &self.fail_level)
            .finish_non_exhaustive()
    }
}

/// Sniffs the container format from the first four bytes and opens a reader.
pub fn open_reader<'a, R>(
    mut stream: R,
    options: &ReaderOptions,
) -> Result<Box<dyn DsdReader + 'a>>
where
    R: Read + Seek + 'a,
{
    let mut magic = [0u8; 4];
    stream
        .read_exact(&mut magic)
        .map_err(|e| DsdError::from_io(e, "container magic"))?;
    stream.seek(SeekFrom::Start(0))?;

    let magic = ChunkId(magic);
    match ContainerFormat::from_magic(magic) {
        Some(ContainerFormat::Dsdiff) => Ok(Box::new(DffReader::open(stream, options)?)),
        Some(ContainerFormat::Dsf) => Ok(Box::new(DsfReader::open(stream)?)),
        None => Err(DsdError::UnrecognizedFormat(magic)),
    }
}

/// Opens a writer for `format`, positioned in the audio chunk.
pub fn open_writer<'a, W>(
    stream: W,
    format: ContainerFormat,
    sample_rate: u32,
    channel_count: u16,
) -> Result<Box<dyn DsdWriter + 'a>>
where
    W: Write + Seek + 'a,
{
    Ok(match format {
        ContainerFormat::Dsdiff => Box::new(DffWriter::new(stream, sample_rate, channel_count)?),
        ContainerFormat::Dsf => Box::new(DsfWriter::new(stream, sample_rate, channel_count)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn format_lookup() {
        assert_eq!(
            ContainerFormat::from_magic(ChunkId(*b"FRM8")),
            Some(ContainerFormat::Dsdiff)
        );
        assert_eq!(
            ContainerFormat::from_path(Path::new("album/track.DSF")),
            Some(ContainerFormat::Dsf)
        );
        assert_eq!(ContainerFormat::from_path(Path::new("track.wav")), None);
        assert_eq!(ContainerFormat::from_path(Path::new("track")), None);
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let err = open_reader(Cursor::new(b"RIFF....WAVE".to_vec()), &ReaderOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DsdError::UnrecognizedFormat(m) if m == ChunkId(*b"RIFF")));
        assert!(err.is_unrecognized());
    }

    #[test]
    fn short_file_is_truncated() {
        let err = open_reader(Cursor::new(b"FR".to_vec()), &ReaderOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DsdError::TruncatedStream(_)));
    }

    #[test]
    fn duration_from_payload() {
        let info = StreamInfo {
            format: ContainerFormat::Dsdiff,
            sample_rate: 2_822_400,
            channel_count: 2,
            data_length: 2_822_400 / 8 * 2 * 3,
            compressed: false,
            frame_size: None,
        };
        assert_eq!(info.sample_count(), 2_822_400 * 3);
        assert_eq!(info.duration_secs(), 3.0);
    }
}

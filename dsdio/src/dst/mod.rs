//! Compressed (DST) audio inside DSDIFF.
//!
//! A `DST ` chunk holds a sequence of `DSTF` frame records, each decoding to
//! exactly one frame of byte-interleaved DSD. Decoding runs on a pool of
//! worker threads ([`FrameDecoder`]); [`DstBridge`] turns the frame stream
//! back into a plain byte stream for the reader.
//!
//! The actual DST entropy decoder is pluggable through [`FrameCodec`]. The
//! built-in [`PlainFrameCodec`] handles frames stored uncoded and reports
//! coded frames as errors, which turn into silence.

use crate::utils::errors::FrameError;

pub mod bridge;
pub mod decoder;
pub mod plain;

pub use bridge::DstBridge;
pub use decoder::FrameDecoder;
pub use plain::PlainFrameCodec;

/// Idle DSD pattern, written in place of frames that fail to decode.
pub const DSD_SILENCE: u8 = 0x69;

/// Decodes one DST frame record into `out`, which is exactly one frame long.
pub trait FrameCodec: Send + Sync {
    fn decode(&self, frame: &[u8], out: &mut [u8]) -> Result<(), FrameError>;
}

/// Receives decoded frames from a [`FrameDecoder`] in submission order.
pub trait DecodeSink: Send + Sync {
    /// Called once per submitted frame, with silence if decoding failed.
    fn frame_decoded(&self, frame: u64, data: &[u8]);

    /// Called before `frame_decoded` for a frame that failed to decode.
    fn frame_error(&self, frame: u64, error: FrameError);
}

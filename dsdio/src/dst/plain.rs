use std::io::Cursor;

use bitstream_io::{BigEndian, BitRead, BitReader};

use crate::dst::FrameCodec;
use crate::utils::errors::FrameError;

/// Codec for frames stored without DST coding.
///
/// The first byte of every frame is a header: one `DSTCoded` bit, one
/// reserved bit and six stuffing bits that must be zero. An uncoded frame
/// then carries the interleaved DSD bytes verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainFrameCodec;

impl FrameCodec for PlainFrameCodec {
    fn decode(&self, frame: &[u8], out: &mut [u8]) -> Result<(), FrameError> {
        let header = *frame.first().ok_or(FrameError::Empty)?;
        let mut bits = BitReader::<_, BigEndian>::new(Cursor::new(&frame[..1]));

        let coded = bits.read_bit().map_err(|_| FrameError::Empty)?;
        if coded {
            return Err(FrameError::Coded);
        }
        let _reserved = bits.read_bit().map_err(|_| FrameError::Empty)?;
        let stuffing: u8 = bits
            .read_unsigned_var(6)
            .map_err(|_| FrameError::BadHeader(header))?;
        if stuffing != 0 {
            return Err(FrameError::BadHeader(header));
        }

        let samples = &frame[1..];
        if samples.len() < out.len() {
            return Err(FrameError::Length {
                expected: out.len(),
                actual: samples.len(),
            });
        }
        out.copy_from_slice(&samples[..out.len()]);
        Ok(())
    }
}

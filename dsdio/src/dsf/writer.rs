use std::io::{BufWriter, Seek, Write};

use crate::chunk::{CHUNK_HEADER_SIZE, ChunkCursor, ChunkId, ChunkLayout};
use crate::container::DsdWriter;
use crate::dff::ID3;
use crate::dsf::{
    BLOCK_SIZE, ChannelType, DATA, DATA_CHUNK_OFFSET, DsfChunk, FORMAT_ID_RAW, FORMAT_VERSION,
    FileHeader, Format, METADATA_OFFSET_OFFSET, SAMPLE_COUNT_OFFSET, TOTAL_SIZE_OFFSET,
};
use crate::utils::bits::BlockGrouper;
use crate::utils::errors::{DsdError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Audio,
    Tag,
    /// A chunk this format cannot hold; its payload is refused.
    Rejected,
    Finished,
}

/// DSF writer taking byte-interleaved MSB-first DSD.
///
/// Audio is regrouped into 4096-byte LSB-first channel blocks, the last group
/// zero-padded. The only chunk accepted after the audio is an `ID3 ` tag.
///
/// DSF stores the tag position as an absolute file offset, so `writer` must
/// start at offset 0.
pub struct DsfWriter<W: Write + Seek> {
    cursor: Option<ChunkCursor<BufWriter<W>>>,
    grouper: BlockGrouper,
    channel_count: u16,
    audio_bytes: u64,
    metadata_offset: u64,
    bytes_written: u64,
    stage: Stage,
}

impl<W: Write + Seek> DsfWriter<W> {
    pub fn new(writer: W, sample_rate: u32, channel_count: u16) -> Result<Self> {
        let channel_type = ChannelType::for_channels(channel_count)?;
        let mut cursor = ChunkCursor::new(BufWriter::new(writer), ChunkLayout::DSF);

        let mut preamble = FileHeader {
            total_size: 0,
            metadata_offset: 0,
        }
        .to_chunk_bytes();
        preamble.extend(
            Format {
                version: FORMAT_VERSION,
                format_id: FORMAT_ID_RAW,
                channel_type,
                channel_count: channel_count as u32,
                sample_rate,
                bits_per_sample: 1,
                sample_count: 0,
                block_size: BLOCK_SIZE,
                reserved: 0,
            }
            .to_chunk_bytes(),
        );
        debug_assert_eq!(preamble.len() as u64, DATA_CHUNK_OFFSET);
        cursor.write_all(&preamble)?;
        cursor.write_header(DATA, CHUNK_HEADER_SIZE)?;

        Ok(Self {
            cursor: Some(cursor),
            grouper: BlockGrouper::new(channel_count as usize, BLOCK_SIZE as usize, true),
            channel_count,
            audio_bytes: 0,
            metadata_offset: 0,
            bytes_written: DATA_CHUNK_OFFSET + CHUNK_HEADER_SIZE,
            stage: Stage::Audio,
        })
    }

    fn cursor(&mut self) -> Result<&mut ChunkCursor<BufWriter<W>>> {
        match self.cursor.as_mut() {
            Some(cursor) if self.stage != Stage::Finished => Ok(cursor),
            _ => Err(DsdError::WriterFinished),
        }
    }

    fn write_audio(&mut self, buf: &[u8]) -> Result<()> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(DsdError::WriterFinished);
        };
        let mut written = 0u64;
        self.grouper.push(buf, |group| {
            written += group.len() as u64;
            cursor.write_all(group)
        })?;
        self.audio_bytes += buf.len() as u64;
        self.bytes_written += written;
        Ok(())
    }

    fn end_audio(&mut self) -> Result<()> {
        if let Some(group) = self.grouper.finish() {
            self.cursor()?.write_all(&group)?;
            self.bytes_written += group.len() as u64;
        }

        let data_size = self.bytes_written - DATA_CHUNK_OFFSET;
        let sample_count = self.audio_bytes * 8 / self.channel_count as u64;
        let cursor = self.cursor()?;
        cursor.patch_u64(DATA_CHUNK_OFFSET + 4, data_size)?;
        cursor.patch_u64(SAMPLE_COUNT_OFFSET, sample_count)?;
        log::debug!("DSF audio: {data_size} byte data chunk, {sample_count} samples per channel");
        Ok(())
    }

    /// Pads the last block group and patches every size field. Idempotent.
    pub fn finish(&mut self) -> Result<()> {
        if self.stage == Stage::Finished || self.cursor.is_none() {
            return Ok(());
        }
        if self.stage == Stage::Audio {
            self.end_audio()?;
        }
        let (total, metadata) = (self.bytes_written, self.metadata_offset);
        let cursor = self.cursor()?;
        cursor.patch_u64(TOTAL_SIZE_OFFSET, total)?;
        cursor.patch_u64(METADATA_OFFSET_OFFSET, metadata)?;
        cursor.flush()?;
        self.stage = Stage::Finished;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        let cursor = self.cursor.take().ok_or(DsdError::WriterFinished)?;
        cursor
            .into_inner()
            .into_inner()
            .map_err(|e| DsdError::Io(e.into_error()))
    }
}

impl<W: Write + Seek> DsdWriter for DsfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        match self.stage {
            Stage::Audio => self.write_audio(buf),
            Stage::Tag => {
                self.cursor()?.write_all(buf)?;
                self.bytes_written += buf.len() as u64;
                Ok(())
            }
            Stage::Rejected => Err(DsdError::InvalidContainer(
                "DSF output has no place for the current chunk".into(),
            )),
            Stage::Finished => Err(DsdError::WriterFinished),
        }
    }

    fn next_chunk(&mut self, id: ChunkId) -> Result<bool> {
        match self.stage {
            Stage::Finished => return Err(DsdError::WriterFinished),
            Stage::Audio => self.end_audio()?,
            Stage::Tag | Stage::Rejected => {}
        }

        if id == ID3 && self.metadata_offset == 0 {
            self.metadata_offset = self.bytes_written;
            self.stage = Stage::Tag;
            Ok(true)
        } else {
            log::debug!("DSF output cannot hold chunk {id}, dropping it");
            self.stage = Stage::Rejected;
            Ok(false)
        }
    }

    fn close(&mut self) -> Result<()> {
        self.finish()
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<W: Write + Seek> Drop for DsfWriter<W> {
    fn drop(&mut self) {
        if self.stage != Stage::Finished && self.cursor.is_some() {
            if let Err(e) = self.finish() {
                log::error!("Failed to finalize DSF output: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn le_u64(bytes: &[u8], at: u64) -> u64 {
        let at = at as usize;
        u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
    }

    #[test]
    fn pads_last_block_group_and_patches_sizes() -> Result<()> {
        let mut writer = DsfWriter::new(Cursor::new(Vec::new()), 2_822_400, 2)?;
        writer.write(&[0x01, 0x80, 0x02, 0x40])?;
        writer.close()?;
        let bytes = writer.into_inner()?.into_inner();

        let data = DATA_CHUNK_OFFSET as usize;
        assert_eq!(bytes.len(), data + 12 + 2 * 4096);
        assert_eq!(le_u64(&bytes, TOTAL_SIZE_OFFSET), bytes.len() as u64);
        assert_eq!(le_u64(&bytes, METADATA_OFFSET_OFFSET), 0);
        assert_eq!(le_u64(&bytes, SAMPLE_COUNT_OFFSET), 16);
        assert_eq!(&bytes[data..data + 4], b"data");
        assert_eq!(le_u64(&bytes, DATA_CHUNK_OFFSET + 4), 12 + 2 * 4096);

        let left = &bytes[data + 12..data + 12 + 4096];
        let right = &bytes[data + 12 + 4096..];
        assert_eq!(&left[..2], &[0x80, 0x40]);
        assert_eq!(&right[..2], &[0x01, 0x02]);
        assert!(left[2..].iter().chain(&right[2..]).all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn keeps_tag_and_refuses_other_chunks() -> Result<()> {
        let mut writer = DsfWriter::new(Cursor::new(Vec::new()), 2_822_400, 1)?;
        writer.write(&[0xFF; 3])?;
        assert!(!writer.next_chunk(ChunkId(*b"DIIN"))?);
        assert!(writer.write(&[1]).is_err());
        assert!(writer.next_chunk(ID3)?);
        writer.write(b"ID3")?;
        writer.write(b"\x04\x00")?;
        assert!(!writer.next_chunk(ID3)?);
        writer.close()?;
        assert!(matches!(writer.write(&[0]), Err(DsdError::WriterFinished)));
        let bytes = writer.into_inner()?.into_inner();

        let metadata = le_u64(&bytes, METADATA_OFFSET_OFFSET);
        assert_eq!(metadata, DATA_CHUNK_OFFSET + 12 + 4096);
        assert_eq!(&bytes[metadata as usize..], b"ID3\x04\x00");
        assert_eq!(le_u64(&bytes, TOTAL_SIZE_OFFSET), bytes.len() as u64);
        Ok(())
    }

    #[test]
    fn unsupported_channel_count() {
        assert!(matches!(
            DsfWriter::new(Cursor::new(Vec::new()), 2_822_400, 7),
            Err(DsdError::UnsupportedLayout { channels: 7, .. })
        ));
    }
}

use std::io::{Read, Seek};

use crate::chunk::{ChunkCursor, ChunkId, ChunkLayout};
use crate::container::{ContainerFormat, DsdReader, StreamInfo};
use crate::dff::ID3;
use crate::dsf::{BLOCK_SIZE, ChannelType, DATA, DSD, FMT, FORMAT_ID_RAW};
use crate::utils::bits::interleave_block_group;
use crate::utils::errors::{DsdError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Audio,
    Tag,
    Finished,
    Closed,
}

/// DSF reader yielding byte-interleaved MSB-first DSD.
///
/// The only chunk following the audio is the ID3 tag the header points at,
/// delivered as an `ID3 ` chunk.
pub struct DsfReader<R: Read + Seek> {
    cursor: ChunkCursor<R>,
    info: StreamInfo,
    channel_type: Option<ChannelType>,
    block_size: usize,
    lsb_first: bool,
    /// Interleaved audio bytes not yet returned.
    audio_remaining: u64,
    /// Stored block bytes left in the data chunk.
    stored_remaining: u64,
    group: Vec<u8>,
    staged: Vec<u8>,
    staged_pos: usize,
    metadata_offset: u64,
    tag_remaining: u64,
    stage: Stage,
}

impl<R: Read + Seek> DsfReader<R> {
    pub fn open(stream: R) -> Result<Self> {
        let mut cursor = ChunkCursor::new(stream, ChunkLayout::DSF);
        let layout = cursor.layout();

        let header = cursor.read_header()?;
        if header.id != DSD || layout.body_len(&header) < 16 {
            return Err(DsdError::NotThisFormat("DSF"));
        }
        let _total_size = cursor.read_u64("DSF header")?;
        let metadata_offset = cursor.read_u64("DSF header")?;
        cursor.skip(layout.body_len(&header) - 16)?;

        let fmt = cursor.read_header()?;
        if fmt.id != FMT || layout.body_len(&fmt) < 40 {
            return Err(DsdError::InvalidContainer(format!(
                "expected a 52 byte fmt chunk, found {} ({} bytes)",
                fmt.id, fmt.declared_size
            )));
        }
        let version = cursor.read_u32("fmt chunk")?;
        let format_id = cursor.read_u32("fmt chunk")?;
        let channel_type = cursor.read_u32("fmt chunk")?;
        let channel_count = cursor.read_u32("fmt chunk")?;
        let sample_rate = cursor.read_u32("fmt chunk")?;
        let bits_per_sample = cursor.read_u32("fmt chunk")?;
        let sample_count = cursor.read_u64("fmt chunk")?;
        let block_size = cursor.read_u32("fmt chunk")?;
        let _reserved = cursor.read_u32("fmt chunk")?;
        cursor.skip(layout.body_len(&fmt) - 40)?;

        log::debug!("DSF format version {version}, channel type {channel_type}");
        if format_id != FORMAT_ID_RAW {
            return Err(DsdError::InvalidContainer(format!(
                "unsupported DSF format id {format_id}"
            )));
        }
        let lsb_first = match bits_per_sample {
            1 => true,
            8 => false,
            other => {
                return Err(DsdError::InvalidContainer(format!(
                    "unsupported bits per sample {other}"
                )));
            }
        };
        let channel_count = u16::try_from(channel_count)
            .ok()
            .filter(|&c| c > 0)
            .ok_or_else(|| {
                DsdError::InvalidContainer(format!("unusable channel count {channel_count}"))
            })?;
        if block_size == 0 || block_size > BLOCK_SIZE || sample_rate == 0 {
            return Err(DsdError::InvalidContainer(format!(
                "unusable block size {block_size} or sample rate {sample_rate}"
            )));
        }
        let channel_type = ChannelType::from_raw(channel_type);
        if channel_type.map(ChannelType::channel_count) != Some(channel_count) {
            log::warn!("DSF channel type does not match {channel_count} channels");
        }

        let data = loop {
            let header = cursor.read_header()?;
            if header.id == DATA {
                break header;
            }
            log::debug!("Skipping DSF chunk {}", header.id);
            cursor.skip(layout.body_len(&header))?;
        };

        let audio_bytes = sample_count
            .div_ceil(8)
            .saturating_mul(channel_count as u64);
        let stored = layout.body_len(&data);
        if audio_bytes > stored {
            log::warn!("DSF sample count exceeds the data chunk, clamping to {stored} bytes");
        }

        let info = StreamInfo {
            format: ContainerFormat::Dsf,
            sample_rate,
            channel_count,
            data_length: audio_bytes.min(stored),
            compressed: false,
            frame_size: None,
        };
        log::debug!(
            "DSF: {} Hz, {} channels, {} audio bytes",
            info.sample_rate,
            info.channel_count,
            info.data_length
        );

        Ok(Self {
            cursor,
            audio_remaining: info.data_length,
            info,
            channel_type,
            block_size: block_size as usize,
            lsb_first,
            stored_remaining: stored,
            group: Vec::new(),
            staged: Vec::new(),
            staged_pos: 0,
            metadata_offset,
            tag_remaining: 0,
            stage: Stage::Audio,
        })
    }

    pub fn channel_type(&self) -> Option<ChannelType> {
        self.channel_type
    }

    fn refill(&mut self) -> Result<()> {
        let group_len = self.block_size * self.info.channel_count as usize;
        if self.stored_remaining < group_len as u64 {
            return Err(DsdError::TruncatedStream("DSF block group"));
        }
        self.group.resize(group_len, 0);
        self.cursor.read_exact(&mut self.group, "DSF block group")?;
        self.stored_remaining -= group_len as u64;

        self.staged.clear();
        self.staged_pos = 0;
        interleave_block_group(
            &self.group,
            self.info.channel_count as usize,
            self.block_size,
            self.lsb_first,
            &mut self.staged,
        );
        Ok(())
    }

    fn read_audio(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.audio_remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        if self.staged_pos == self.staged.len() {
            self.refill()?;
        }
        let available = (self.staged.len() - self.staged_pos) as u64;
        let n = (buf.len() as u64).min(available).min(self.audio_remaining) as usize;
        buf[..n].copy_from_slice(&self.staged[self.staged_pos..self.staged_pos + n]);
        self.staged_pos += n;
        self.audio_remaining -= n as u64;
        Ok(n)
    }

    fn read_tag(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = (buf.len() as u64).min(self.tag_remaining) as usize;
        if n == 0 {
            return Ok(0);
        }
        let n = self.cursor.fill(&mut buf[..n])?;
        if n == 0 {
            return Err(DsdError::TruncatedStream("DSF metadata"));
        }
        self.tag_remaining -= n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> DsdReader for DsfReader<R> {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stage {
            Stage::Audio => self.read_audio(buf),
            Stage::Tag => self.read_tag(buf),
            Stage::Finished | Stage::Closed => Ok(0),
        }
    }

    fn next_chunk(&mut self) -> Result<Option<ChunkId>> {
        if self.stage != Stage::Audio || self.metadata_offset == 0 {
            if self.stage != Stage::Closed {
                self.stage = Stage::Finished;
            }
            return Ok(None);
        }

        let end = self.cursor.seek_to_end()?;
        if self.metadata_offset >= end {
            log::warn!(
                "DSF metadata offset {} is past the end of the file",
                self.metadata_offset
            );
            self.stage = Stage::Finished;
            return Ok(None);
        }
        self.cursor.seek_to(self.metadata_offset)?;
        self.tag_remaining = end - self.metadata_offset;
        self.stage = Stage::Tag;
        Ok(Some(ID3))
    }

    fn close(&mut self) -> Result<()> {
        self.stage = Stage::Closed;
        self.staged = Vec::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::DsdWriter;
    use crate::dsf::writer::DsfWriter;
    use std::io::Cursor;

    fn written(channels: u16, audio: &[u8], tag: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut writer = DsfWriter::new(Cursor::new(Vec::new()), 2_822_400, channels)?;
        writer.write(audio)?;
        if let Some(tag) = tag {
            assert!(writer.next_chunk(ID3)?);
            writer.write(tag)?;
        }
        Ok(writer.into_inner()?.into_inner())
    }

    fn read_to_end(reader: &mut impl DsdReader) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1000];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn restores_interleaved_audio_across_block_groups() -> Result<()> {
        let audio: Vec<u8> = (0..3 * 4096 + 30).map(|i| (i * 7 % 251) as u8).collect();
        let bytes = written(3, &audio, None)?;
        let mut reader = DsfReader::open(Cursor::new(bytes))?;

        assert_eq!(reader.info().channel_count, 3);
        assert_eq!(reader.info().data_length, audio.len() as u64);
        assert_eq!(reader.channel_type(), Some(ChannelType::ThreeChannels));
        assert_eq!(read_to_end(&mut reader)?, audio);
        assert_eq!(reader.next_chunk()?, None);
        Ok(())
    }

    #[test]
    fn tag_is_the_only_trailing_chunk() -> Result<()> {
        let bytes = written(2, &[0x55; 10], Some(b"ID3\x03\x00tagdata"))?;
        let mut reader = DsfReader::open(Cursor::new(bytes))?;

        assert_eq!(read_to_end(&mut reader)?, vec![0x55; 10]);
        assert_eq!(reader.next_chunk()?, Some(ID3));
        assert_eq!(read_to_end(&mut reader)?, b"ID3\x03\x00tagdata".to_vec());
        assert_eq!(reader.next_chunk()?, None);
        assert_eq!(reader.next_chunk()?, None);
        Ok(())
    }

    #[test]
    fn rejects_foreign_headers() {
        assert!(matches!(
            DsfReader::open(Cursor::new(b"FRM8\0\0\0\0\0\0\0\x1c".to_vec())),
            Err(DsdError::NotThisFormat(_))
        ));
    }

    #[test]
    fn rejects_oversized_block_size() -> Result<()> {
        // fmt body starts at 40; block size follows the sample count
        const BLOCK_SIZE_AT: usize = 72;
        for block_size in [8192u32, u32::MAX] {
            let mut bytes = written(2, &[0x11; 100], None)?;
            assert_eq!(&bytes[BLOCK_SIZE_AT..BLOCK_SIZE_AT + 4], &4096u32.to_le_bytes());
            bytes[BLOCK_SIZE_AT..BLOCK_SIZE_AT + 4].copy_from_slice(&block_size.to_le_bytes());
            // claim a data chunk far larger than the file
            let data = crate::dsf::DATA_CHUNK_OFFSET as usize + 4;
            bytes[data..data + 8].copy_from_slice(&(u64::MAX / 2).to_le_bytes());
            assert!(matches!(
                DsfReader::open(Cursor::new(bytes)),
                Err(DsdError::InvalidContainer(_))
            ));
        }
        Ok(())
    }

    #[test]
    fn truncated_data_chunk() -> Result<()> {
        let mut bytes = written(2, &[0x11; 100], None)?;
        bytes.truncate(bytes.len() - 10);
        let mut reader = DsfReader::open(Cursor::new(bytes))?;
        assert!(matches!(
            read_to_end(&mut reader),
            Err(DsdError::TruncatedStream(_))
        ));
        Ok(())
    }
}

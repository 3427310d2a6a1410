use std::io::{Read, Seek};

use crate::chunk::{ChunkCursor, ChunkHeader, ChunkId, ChunkLayout};
use crate::container::{ContainerFormat, DsdReader, ReaderOptions, StreamInfo};
use crate::dff::property::PropertyBlock;
use crate::dff::{DSD, DST, DSTI, FRM8, FRTE, FVER, ID3, PROP, SND};
use crate::dst::DstBridge;
use crate::utils::errors::{DsdError, Result};

/// Upper bound on the `PROP` chunk, which is read into memory.
const MAX_PROPERTY_CHUNK: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Inside the `DSD ` or `DST ` chunk.
    Audio,
    /// Inside a chunk following the audio.
    Trailer,
    /// Replaying the `ID3 ` chunk that was stored inside `PROP`.
    RelocatedTag,
    /// All chunks delivered.
    Finished,
    Closed,
}

struct AudioStart {
    header: ChunkHeader,
    data_length: u64,
    next_chunk: u64,
    dst: Option<DstBridge>,
}

/// Streaming reader for DSDIFF files.
///
/// Only the audio chunk is located up front; trailing chunks are visited one
/// at a time through [`next_chunk`](DsdReader::next_chunk). An `ID3 ` chunk
/// found inside the property chunk is delivered after every physical chunk.
pub struct DffReader<R: Read + Seek> {
    cursor: ChunkCursor<R>,
    info: StreamInfo,
    properties: PropertyBlock,
    current: ChunkHeader,
    consumed: u64,
    /// Offset of the chunk after the current one; 0 once there is none.
    next_chunk: u64,
    stage: Stage,
    relocated_tag: Option<Vec<u8>>,
    dst: Option<DstBridge>,
}

impl<R: Read + Seek> DffReader<R> {
    pub fn open(stream: R, options: &ReaderOptions) -> Result<Self> {
        let mut cursor = ChunkCursor::new(stream, ChunkLayout::DSDIFF);

        validate_header(&mut cursor)?;
        skip_version(&mut cursor)?;
        let mut properties = scan_for_properties(&mut cursor)?;

        let sample_rate = properties.sample_rate.ok_or_else(|| {
            DsdError::InvalidContainer("sound property chunk has no sample rate".into())
        })?;
        let channel_count = properties.channel_count.ok_or_else(|| {
            DsdError::InvalidContainer("sound property chunk has no channel count".into())
        })?;
        if sample_rate == 0 || channel_count == 0 {
            return Err(DsdError::InvalidContainer(format!(
                "unusable stream parameters: {sample_rate} Hz, {channel_count} channels"
            )));
        }

        let audio = locate_audio(&mut cursor, sample_rate, channel_count, options)?;
        let info = StreamInfo {
            format: ContainerFormat::Dsdiff,
            sample_rate,
            channel_count,
            data_length: audio.data_length,
            compressed: audio.dst.is_some(),
            frame_size: audio.dst.as_ref().map(DstBridge::frame_size),
        };

        log::debug!(
            "DSDIFF: {} Hz, {} channels, {} audio bytes{}",
            info.sample_rate,
            info.channel_count,
            info.data_length,
            if info.compressed { " (DST)" } else { "" }
        );

        Ok(Self {
            cursor,
            info,
            relocated_tag: properties.relocated_tag.take(),
            properties,
            current: audio.header,
            consumed: 0,
            next_chunk: audio.next_chunk,
            stage: Stage::Audio,
            dst: audio.dst,
        })
    }

    /// Property chunk contents, without the relocated tag.
    pub fn properties(&self) -> &PropertyBlock {
        &self.properties
    }

    /// Id of the chunk whose payload `read` currently yields.
    pub fn current_chunk(&self) -> Option<ChunkId> {
        match self.stage {
            Stage::Finished | Stage::Closed => None,
            _ => Some(self.current.id),
        }
    }

    pub fn into_inner(self) -> R {
        self.cursor.into_inner()
    }

    fn read_physical(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.current.declared_size.saturating_sub(self.consumed);
        let amount = (buf.len() as u64).min(remaining) as usize;
        if amount == 0 {
            return Ok(0);
        }
        let n = self.cursor.fill(&mut buf[..amount])?;
        if n == 0 {
            return Err(DsdError::TruncatedStream("chunk payload"));
        }
        self.consumed += n as u64;
        Ok(n)
    }

    fn read_relocated(&mut self, buf: &mut [u8]) -> usize {
        let Some(tag) = self.relocated_tag.as_deref() else {
            return 0;
        };
        let start = (self.consumed as usize).min(tag.len());
        let n = buf.len().min(tag.len() - start);
        buf[..n].copy_from_slice(&tag[start..start + n]);
        self.consumed += n as u64;
        n
    }
}

impl<R: Read + Seek> DsdReader for DffReader<R> {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stage {
            Stage::Audio => match self.dst.as_mut() {
                Some(dst) => dst.read(&mut self.cursor, buf),
                None => self.read_physical(buf),
            },
            Stage::Trailer => self.read_physical(buf),
            Stage::RelocatedTag => Ok(self.read_relocated(buf)),
            Stage::Finished | Stage::Closed => Ok(0),
        }
    }

    fn next_chunk(&mut self) -> Result<Option<ChunkId>> {
        match self.stage {
            Stage::Finished | Stage::Closed => return Ok(None),
            Stage::RelocatedTag => {
                self.relocated_tag = None;
                self.stage = Stage::Finished;
                return Ok(None);
            }
            Stage::Audio | Stage::Trailer => {}
        }

        self.consumed = 0;
        if self.next_chunk != 0 {
            self.cursor.seek_to(self.next_chunk)?;
            match self.cursor.try_read_header()? {
                Some(header) => {
                    let body_start = self.cursor.position()?;
                    self.next_chunk = self
                        .cursor
                        .next_chunk_offset(body_start, header.declared_size)?;
                    self.current = header;
                    self.stage = Stage::Trailer;
                    log::trace!("Next chunk {} ({} bytes)", header.id, header.declared_size);
                    return Ok(Some(header.id));
                }
                None => self.next_chunk = 0,
            }
        }

        match self.relocated_tag.as_ref() {
            Some(tag) => {
                self.current = ChunkHeader {
                    id: ID3,
                    declared_size: tag.len() as u64,
                };
                self.stage = Stage::RelocatedTag;
                Ok(Some(ID3))
            }
            None => {
                self.stage = Stage::Finished;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.stage = Stage::Closed;
        self.relocated_tag = None;
        self.dst = None;
        Ok(())
    }
}

fn validate_header<R: Read + Seek>(cursor: &mut ChunkCursor<R>) -> Result<()> {
    let header = cursor.read_header()?;
    let mut form = [0u8; 4];
    cursor.read_exact(&mut form, "form type")?;
    if header.id != FRM8 || ChunkId(form) != DSD {
        return Err(DsdError::NotThisFormat("DSDIFF"));
    }
    Ok(())
}

fn skip_version<R: Read + Seek>(cursor: &mut ChunkCursor<R>) -> Result<()> {
    let header = cursor.read_header()?;
    if header.id != FVER {
        return Err(DsdError::InvalidContainer(format!(
            "expected format version chunk, found {}",
            header.id
        )));
    }
    if header.declared_size < 4 {
        return Err(DsdError::InvalidContainer(format!(
            "format version chunk holds {} bytes",
            header.declared_size
        )));
    }
    let version = cursor.read_u32("format version")?;
    log::debug!(
        "DSDIFF version {}.{}.{}.{}",
        version >> 24,
        (version >> 16) & 0xFF,
        (version >> 8) & 0xFF,
        version & 0xFF
    );
    cursor.skip(cursor.layout().stored_len(header.declared_size) - 4)
}

fn scan_for_properties<R: Read + Seek>(cursor: &mut ChunkCursor<R>) -> Result<PropertyBlock> {
    loop {
        let Some(header) = cursor.try_read_header()? else {
            return Err(DsdError::InvalidContainer(
                "no sound property chunk before end of file".into(),
            ));
        };

        match header.id {
            PROP => {
                if header.declared_size < 4 {
                    return Err(DsdError::InvalidContainer(
                        "property chunk too short for its type tag".into(),
                    ));
                }
                let mut kind = [0u8; 4];
                cursor.read_exact(&mut kind, "property chunk type")?;
                let stored = cursor.layout().stored_len(header.declared_size);
                if ChunkId(kind) != SND {
                    log::debug!("Skipping property chunk of type {}", ChunkId(kind));
                    cursor.skip(stored - 4)?;
                    continue;
                }
                if header.declared_size > MAX_PROPERTY_CHUNK {
                    return Err(DsdError::InvalidContainer(format!(
                        "property chunk of {} bytes is implausibly large",
                        header.declared_size
                    )));
                }

                let mut body = vec![0u8; (header.declared_size - 4) as usize];
                cursor.read_exact(&mut body, "property chunk")?;
                cursor.skip(stored - header.declared_size)?;
                return PropertyBlock::parse(&body);
            }
            DSD | DST => {
                return Err(DsdError::InvalidContainer(format!(
                    "{} audio chunk precedes the sound property chunk",
                    header.id
                )));
            }
            other => {
                log::debug!("Skipping {other} chunk ({} bytes)", header.declared_size);
                cursor.skip_body(header.declared_size)?;
            }
        }
    }
}

fn locate_audio<R: Read + Seek>(
    cursor: &mut ChunkCursor<R>,
    sample_rate: u32,
    channel_count: u16,
    options: &ReaderOptions,
) -> Result<AudioStart> {
    loop {
        let Some(header) = cursor.try_read_header()? else {
            return Err(DsdError::InvalidContainer(
                "no sound data chunk before end of file".into(),
            ));
        };
        let body_start = cursor.position()?;

        match header.id {
            DSD => {
                return Ok(AudioStart {
                    header,
                    data_length: header.declared_size,
                    next_chunk: cursor.next_chunk_offset(body_start, header.declared_size)?,
                    dst: None,
                });
            }
            DST => {
                let frte = cursor.read_header()?;
                if frte.id != FRTE || frte.declared_size < 6 {
                    return Err(DsdError::InvalidContainer(format!(
                        "DST chunk starts with {} ({} bytes) instead of a frame table",
                        frte.id, frte.declared_size
                    )));
                }
                let frame_count = cursor.read_u32("DST frame count")?;
                let frame_rate = cursor.read_u16("DST frame rate")?;
                cursor.skip(cursor.layout().stored_len(frte.declared_size) - 6)?;

                if frame_rate == 0 {
                    return Err(DsdError::InvalidContainer("DST frame rate is zero".into()));
                }
                let frame_size =
                    (sample_rate / frame_rate as u32 / 8) as usize * channel_count as usize;
                if frame_size == 0 {
                    return Err(DsdError::InvalidContainer(format!(
                        "DST frame rate {frame_rate} too high for {sample_rate} Hz"
                    )));
                }

                let first_frame = cursor.position()?;
                let dst_end = cursor.next_chunk_offset(body_start, header.declared_size)?;
                cursor.seek_to(dst_end)?;
                let next_chunk = match cursor.try_read_header()? {
                    Some(index) if index.id == DSTI => {
                        let index_start = cursor.position()?;
                        cursor.next_chunk_offset(index_start, index.declared_size)?
                    }
                    _ => dst_end,
                };
                cursor.seek_to(first_frame)?;

                log::debug!("DST: {frame_count} frames at {frame_rate}/s, {frame_size} bytes each");

                return Ok(AudioStart {
                    header,
                    data_length: frame_count as u64 * frame_size as u64,
                    next_chunk,
                    dst: Some(DstBridge::new(frame_size, frame_count, options)?),
                });
            }
            other => {
                log::debug!("Skipping {other} chunk ({} bytes)", header.declared_size);
                cursor.skip_body(header.declared_size)?;
            }
        }
    }
}

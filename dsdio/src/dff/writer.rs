use std::io::{BufWriter, Seek, Write};

use crate::chunk::{CHUNK_HEADER_SIZE, ChunkCursor, ChunkId, ChunkLayout};
use crate::container::DsdWriter;
use crate::dff::{
    Channels, CompressionType, DSD, DSDIFF_VERSION, DffChunk, FRM8, FormatVersion,
    LoudspeakerConfig, PROP, PString, SND, SampleRate, channel_ids, loudspeaker_config,
};
use crate::utils::errors::{DsdError, Result};

/// DSDIFF writer. Chunk sizes are written as placeholders and patched when
/// each chunk ends; the `FRM8` size is patched by [`finish`](Self::finish).
///
/// The form starts at the stream position `writer` has when it is passed to
/// [`new`](Self::new); anything before it is left untouched.
pub struct DffWriter<W: Write + Seek> {
    cursor: Option<ChunkCursor<BufWriter<W>>>,
    /// Stream offset of the `FRM8` header.
    origin: u64,
    /// Stream offset of the open chunk's header.
    chunk_start: u64,
    chunk_len: u64,
    bytes_written: u64,
    finished: bool,
}

impl<W: Write + Seek> DffWriter<W> {
    /// Writes the form header, version and property chunks, then opens the
    /// `DSD ` audio chunk.
    pub fn new(mut writer: W, sample_rate: u32, channel_count: u16) -> Result<Self> {
        if channel_count == 0 {
            return Err(DsdError::UnsupportedLayout {
                format: "DSDIFF",
                channels: 0,
            });
        }

        let origin = writer.stream_position()?;
        let mut cursor = ChunkCursor::new(BufWriter::new(writer), ChunkLayout::DSDIFF);
        let preamble = preamble(sample_rate, channel_count);
        cursor.write_all(&preamble)?;
        cursor.write_header(DSD, 0)?;

        Ok(Self {
            cursor: Some(cursor),
            origin,
            chunk_start: origin + preamble.len() as u64,
            chunk_len: 0,
            bytes_written: preamble.len() as u64 + CHUNK_HEADER_SIZE,
            finished: false,
        })
    }

    fn cursor(&mut self) -> Result<&mut ChunkCursor<BufWriter<W>>> {
        match self.cursor.as_mut() {
            Some(cursor) if !self.finished => Ok(cursor),
            _ => Err(DsdError::WriterFinished),
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.cursor()?.write_all(buf)?;
        self.chunk_len += buf.len() as u64;
        self.bytes_written += buf.len() as u64;
        Ok(())
    }

    /// Closes the current chunk and opens `id`.
    pub fn next_chunk(&mut self, id: ChunkId) -> Result<()> {
        self.end_chunk()?;
        let cursor = self.cursor()?;
        cursor.write_header(id, 0)?;
        self.chunk_start = self.origin + self.bytes_written;
        self.chunk_len = 0;
        self.bytes_written += CHUNK_HEADER_SIZE;
        Ok(())
    }

    fn end_chunk(&mut self) -> Result<()> {
        let (start, len) = (self.chunk_start, self.chunk_len);
        let cursor = self.cursor()?;
        cursor.write_pad(len)?;
        cursor.patch_size(start, len)?;
        if len % 2 == 1 {
            self.bytes_written += 1;
        }
        Ok(())
    }

    /// Closes the last chunk and patches the form size. Idempotent.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished || self.cursor.is_none() {
            return Ok(());
        }
        self.end_chunk()?;
        let (origin, total) = (self.origin, self.bytes_written);
        let cursor = self.cursor()?;
        cursor.patch_size(origin, total - CHUNK_HEADER_SIZE)?;
        cursor.flush()?;
        self.finished = true;
        log::debug!("DSDIFF writer finished, {total} bytes");
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

impl<W: Write + Seek> DsdWriter for DffWriter<W> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        DffWriter::write(self, buf)
    }

    fn next_chunk(&mut self, id: ChunkId) -> Result<bool> {
        DffWriter::next_chunk(self, id)?;
        Ok(true)
    }

    fn close(&mut self) -> Result<()> {
        self.finish()
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<W: Write + Seek> Drop for DffWriter<W> {
    fn drop(&mut self) {
        if !self.finished && self.cursor.is_some() {
            if let Err(e) = self.finish() {
                log::error!("Failed to finalize DSDIFF output: {e}");
            }
        }
    }
}

/// `FRM8` header with a placeholder size, the form type, `FVER` and `PROP`.
fn preamble(sample_rate: u32, channel_count: u16) -> Vec<u8> {
    let mut properties = SND.as_bytes().to_vec();
    properties.extend(SampleRate { sample_rate }.to_chunk_bytes());
    properties.extend(
        Channels {
            count: channel_count,
            ids: channel_ids(channel_count),
        }
        .to_chunk_bytes(),
    );
    properties.extend(
        CompressionType {
            compression_type: DSD,
            name: PString::new("not compressed"),
        }
        .to_chunk_bytes(),
    );
    properties.extend(
        LoudspeakerConfig {
            config: loudspeaker_config(channel_count),
        }
        .to_chunk_bytes(),
    );

    let mut bytes = crate::join_bytes_be!(FRM8, 0u64, DSD);
    bytes.extend(
        FormatVersion {
            version: DSDIFF_VERSION,
        }
        .to_chunk_bytes(),
    );
    bytes.extend(crate::join_bytes_be!(PROP, properties.len() as u64));
    bytes.extend(properties);
    bytes
}

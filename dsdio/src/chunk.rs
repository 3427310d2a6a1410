//! Chunk headers, alignment arithmetic and a cursor over a chunked stream.
//!
//! Both containers frame their data as `id (4 bytes) + size (u64)` headers.
//! They differ in byte order, in whether the size counts the header itself,
//! and in whether odd-sized bodies are followed by a pad byte. Those rules
//! are captured by [`ChunkLayout`]; [`ChunkCursor`] applies them to a stream
//! without ever buffering a chunk body.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::utils::byteorder::{WriteBytesBe, WriteBytesLe};
use crate::utils::errors::{DsdError, Result};

/// Size of a chunk header on the wire: 4-byte id plus 64-bit size.
pub const CHUNK_HEADER_SIZE: u64 = 12;

/// A four character chunk identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkId(pub [u8; 4]);

impl ChunkId {
    pub const fn new(id: &[u8; 4]) -> Self {
        Self(*id)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            let text: String = self.0.iter().map(|&b| b as char).collect();
            write!(f, "'{text}'")
        } else {
            write!(f, "{:#010X}", u32::from_be_bytes(self.0))
        }
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({self})")
    }
}

impl From<&[u8; 4]> for ChunkId {
    fn from(id: &[u8; 4]) -> Self {
        Self(*id)
    }
}

impl WriteBytesBe for ChunkId {
    fn write_be(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(&self.0);
    }
}

impl WriteBytesLe for ChunkId {
    fn write_le(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(&self.0);
    }
}

/// Tag plus the size field exactly as declared on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    pub declared_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// Framing rules of one container family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub order: ByteOrder,
    /// Odd-length bodies are followed by one zero pad byte.
    pub even_aligned: bool,
    /// The size field counts the 12 header bytes as well as the body.
    pub size_includes_header: bool,
}

impl ChunkLayout {
    pub const DSDIFF: ChunkLayout = ChunkLayout {
        order: ByteOrder::Big,
        even_aligned: true,
        size_includes_header: false,
    };

    pub const DSF: ChunkLayout = ChunkLayout {
        order: ByteOrder::Little,
        even_aligned: false,
        size_includes_header: true,
    };

    /// Logical body length of a chunk with this header.
    pub fn body_len(&self, header: &ChunkHeader) -> u64 {
        if self.size_includes_header {
            header.declared_size.saturating_sub(CHUNK_HEADER_SIZE)
        } else {
            header.declared_size
        }
    }

    /// Bytes occupied on the wire by a body of `len` logical bytes.
    pub fn stored_len(&self, len: u64) -> u64 {
        if self.even_aligned {
            round_up_even(len)
        } else {
            len
        }
    }

    /// Size field value announcing a body of `body_len` bytes.
    pub fn declared_size(&self, body_len: u64) -> u64 {
        if self.size_includes_header {
            body_len + CHUNK_HEADER_SIZE
        } else {
            body_len
        }
    }

    pub fn encode_u64(&self, value: u64) -> [u8; 8] {
        match self.order {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        }
    }

    pub fn decode_u64(&self, bytes: [u8; 8]) -> u64 {
        match self.order {
            ByteOrder::Big => u64::from_be_bytes(bytes),
            ByteOrder::Little => u64::from_le_bytes(bytes),
        }
    }

    /// Serializes a header into its 12 wire bytes.
    pub fn encode_header(&self, id: ChunkId, declared_size: u64) -> [u8; 12] {
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(id.as_bytes());
        bytes[4..].copy_from_slice(&self.encode_u64(declared_size));
        bytes
    }
}

/// Rounds `len` up to the next even value, saturating at `u64::MAX`.
#[inline]
pub fn round_up_even(len: u64) -> u64 {
    len.saturating_add(len & 1)
}

/// Cursor over a chunked stream: header decoding, skipping and seeking with
/// the alignment rules of its [`ChunkLayout`].
#[derive(Debug)]
pub struct ChunkCursor<S> {
    stream: S,
    layout: ChunkLayout,
}

impl<S> ChunkCursor<S> {
    pub fn new(stream: S, layout: ChunkLayout) -> Self {
        Self { stream, layout }
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read> ChunkCursor<S> {
    /// Reads a header, failing with [`DsdError::TruncatedStream`] on a short read.
    pub fn read_header(&mut self) -> Result<ChunkHeader> {
        self.try_read_header()?
            .ok_or(DsdError::TruncatedStream("chunk header"))
    }

    /// Reads a header, returning `None` if the stream ends before a full header.
    pub fn try_read_header(&mut self) -> Result<Option<ChunkHeader>> {
        let mut bytes = [0u8; CHUNK_HEADER_SIZE as usize];
        let filled = self.fill(&mut bytes)?;
        if filled < bytes.len() {
            if filled > 0 {
                log::warn!("Ignoring {filled} trailing bytes after the last chunk");
            }
            return Ok(None);
        }

        let mut id = [0u8; 4];
        id.copy_from_slice(&bytes[..4]);
        let mut size = [0u8; 8];
        size.copy_from_slice(&bytes[4..]);

        Ok(Some(ChunkHeader {
            id: ChunkId(id),
            declared_size: self.layout.decode_u64(size),
        }))
    }

    pub fn read_exact(&mut self, buf: &mut [u8], what: &'static str) -> Result<()> {
        self.stream
            .read_exact(buf)
            .map_err(|e| DsdError::from_io(e, what))
    }

    pub fn read_u16(&mut self, what: &'static str) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b, what)?;
        Ok(match self.layout.order {
            ByteOrder::Big => u16::from_be_bytes(b),
            ByteOrder::Little => u16::from_le_bytes(b),
        })
    }

    pub fn read_u32(&mut self, what: &'static str) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b, what)?;
        Ok(match self.layout.order {
            ByteOrder::Big => u32::from_be_bytes(b),
            ByteOrder::Little => u32::from_le_bytes(b),
        })
    }

    pub fn read_u64(&mut self, what: &'static str) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b, what)?;
        Ok(self.layout.decode_u64(b))
    }

    /// Reads up to `buf.len()` bytes, returning fewer only at end of stream.
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

impl<S: Seek> ChunkCursor<S> {
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.stream.stream_position()?)
    }

    /// Advances `n` bytes.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        if n > 0 {
            let n = i64::try_from(n).map_err(|_| {
                DsdError::InvalidContainer(format!("chunk length {n} exceeds seekable range"))
            })?;
            self.stream.seek(SeekFrom::Current(n))?;
        }
        Ok(())
    }

    /// Skips a body of `len` logical bytes plus its pad byte, if any.
    pub fn skip_body(&mut self, len: u64) -> Result<()> {
        self.skip(self.layout.stored_len(len))
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.stream.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn seek_to_end(&mut self) -> Result<u64> {
        Ok(self.stream.seek(SeekFrom::End(0))?)
    }

    /// Offset of the chunk following a body of `len` bytes starting at `body_start`.
    pub fn next_chunk_offset(&self, body_start: u64, len: u64) -> Result<u64> {
        body_start
            .checked_add(self.layout.stored_len(len))
            .ok_or_else(|| {
                DsdError::InvalidContainer(format!(
                    "chunk of {len} bytes at offset {body_start} runs past the addressable range"
                ))
            })
    }
}

impl<S: Write> ChunkCursor<S> {
    pub fn write_header(&mut self, id: ChunkId, declared_size: u64) -> Result<()> {
        let bytes = self.layout.encode_header(id, declared_size);
        self.stream.write_all(&bytes)?;
        Ok(())
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        Ok(())
    }

    /// Writes the pad byte owed by a body of `len` bytes.
    pub fn write_pad(&mut self, len: u64) -> Result<()> {
        if self.layout.stored_len(len) != len {
            self.stream.write_all(&[0])?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }
}

impl<S: Write + Seek> ChunkCursor<S> {
    /// Overwrites the size field of the chunk whose header starts at
    /// `header_offset`, then returns to the end of the stream.
    pub fn patch_size(&mut self, header_offset: u64, declared_size: u64) -> Result<()> {
        self.patch_u64(header_offset + 4, declared_size)
    }

    /// Overwrites a 64-bit field at `offset`, then returns to the end of the stream.
    pub fn patch_u64(&mut self, offset: u64, value: u64) -> Result<()> {
        self.stream.seek(SeekFrom::Start(offset))?;
        self.stream.write_all(&self.layout.encode_u64(value))?;
        self.stream.seek(SeekFrom::End(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn padding_follows_parity() {
        assert_eq!(round_up_even(0), 0);
        assert_eq!(round_up_even(7), 8);
        assert_eq!(round_up_even(8), 8);
        assert_eq!(ChunkLayout::DSDIFF.stored_len(5), 6);
        assert_eq!(ChunkLayout::DSF.stored_len(5), 5);
        assert_eq!(round_up_even(u64::MAX), u64::MAX);
    }

    #[test]
    fn next_chunk_offset_rejects_overflow() -> Result<()> {
        let cursor = ChunkCursor::new(Cursor::new(Vec::<u8>::new()), ChunkLayout::DSDIFF);
        assert_eq!(cursor.next_chunk_offset(100, 7)?, 108);
        assert!(matches!(
            cursor.next_chunk_offset(100, u64::MAX - 11),
            Err(DsdError::InvalidContainer(_))
        ));
        assert!(matches!(
            cursor.next_chunk_offset(1, u64::MAX),
            Err(DsdError::InvalidContainer(_))
        ));
        Ok(())
    }

    #[test]
    fn header_sizes_per_layout() {
        let header = ChunkHeader {
            id: ChunkId(*b"data"),
            declared_size: 112,
        };
        assert_eq!(ChunkLayout::DSF.body_len(&header), 100);
        assert_eq!(ChunkLayout::DSDIFF.body_len(&header), 112);
        assert_eq!(ChunkLayout::DSF.declared_size(100), 112);
    }

    #[test]
    fn reads_big_endian_header() -> Result<()> {
        let mut bytes = b"COMT".to_vec();
        bytes.extend_from_slice(&0x0102u64.to_be_bytes());
        let mut cursor = ChunkCursor::new(Cursor::new(bytes), ChunkLayout::DSDIFF);

        let header = cursor.read_header()?;
        assert_eq!(header.id, ChunkId(*b"COMT"));
        assert_eq!(header.declared_size, 0x0102);
        assert!(cursor.try_read_header()?.is_none());
        Ok(())
    }

    #[test]
    fn short_header_is_truncation() {
        let mut cursor = ChunkCursor::new(Cursor::new(b"FRM8\0\0".to_vec()), ChunkLayout::DSDIFF);
        assert!(matches!(
            cursor.read_header(),
            Err(DsdError::TruncatedStream(_))
        ));
    }

    #[test]
    fn skip_body_honours_pad_byte() -> Result<()> {
        let mut bytes = ChunkLayout::DSDIFF.encode_header(ChunkId(*b"ODD "), 3).to_vec();
        bytes.extend_from_slice(&[1, 2, 3, 0]);
        bytes.extend_from_slice(&ChunkLayout::DSDIFF.encode_header(ChunkId(*b"NEXT"), 0));
        let mut cursor = ChunkCursor::new(Cursor::new(bytes), ChunkLayout::DSDIFF);

        let first = cursor.read_header()?;
        cursor.skip_body(first.declared_size)?;
        assert_eq!(cursor.read_header()?.id, ChunkId(*b"NEXT"));
        Ok(())
    }

    #[test]
    fn patch_size_returns_to_end() -> Result<()> {
        let mut cursor = ChunkCursor::new(Cursor::new(Vec::new()), ChunkLayout::DSDIFF);
        cursor.write_header(ChunkId(*b"DSD "), 0)?;
        cursor.write_all(&[9, 9, 9])?;
        cursor.write_pad(3)?;
        cursor.patch_size(0, 3)?;
        cursor.write_all(&[7])?;

        let bytes = cursor.into_inner().into_inner();
        assert_eq!(&bytes[4..12], &3u64.to_be_bytes());
        assert_eq!(&bytes[12..], &[9, 9, 9, 0, 7]);
        Ok(())
    }

    #[test]
    fn chunk_id_display() {
        assert_eq!(ChunkId(*b"ID3 ").to_string(), "'ID3 '");
        assert_eq!(ChunkId([0, 0, 0, 1]).to_string(), "0x00000001");
    }
}

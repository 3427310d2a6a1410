use crate::chunk::{CHUNK_HEADER_SIZE, ChunkId, ChunkLayout, round_up_even};
use crate::dff::{CHNL, CMPR, FS, ID3, LSCO};
use crate::utils::errors::{DsdError, Result};

/// Fields of the `PROP`/`SND ` chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyBlock {
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
    pub channel_ids: Vec<ChunkId>,
    pub compression: Option<ChunkId>,
    pub compression_name: Option<String>,
    pub loudspeaker_config: Option<u16>,
    /// Body of an `ID3 ` chunk stored inside the property chunk.
    pub relocated_tag: Option<Vec<u8>>,
}

impl PropertyBlock {
    /// Parses the sub-chunks of a sound property chunk. `body` starts right
    /// after the `SND ` type tag and ends at the chunk's declared size.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let layout = ChunkLayout::DSDIFF;
        let mut block = PropertyBlock::default();
        let mut offset = 0usize;

        while offset < body.len() {
            let remaining = body.len() - offset;
            if remaining < CHUNK_HEADER_SIZE as usize {
                if body[offset..].iter().any(|&b| b != 0) {
                    return Err(DsdError::TruncatedStream("property sub-chunk header"));
                }
                break;
            }

            let mut id = [0u8; 4];
            id.copy_from_slice(&body[offset..offset + 4]);
            let id = ChunkId(id);
            let mut size = [0u8; 8];
            size.copy_from_slice(&body[offset + 4..offset + 12]);
            let size = layout.decode_u64(size);

            let start = offset + CHUNK_HEADER_SIZE as usize;
            let available = (body.len() - start) as u64;
            if size > available {
                return Err(DsdError::InvalidContainer(format!(
                    "property sub-chunk {id} declares {size} bytes, only {available} remain"
                )));
            }
            let data = &body[start..start + size as usize];

            match id {
                FS => block.sample_rate = Some(be_u32(data, id)?),
                CHNL => {
                    let count = be_u16(data, id)?;
                    block.channel_count = Some(count);
                    block.channel_ids = data[2..]
                        .chunks_exact(4)
                        .take(count as usize)
                        .map(|c| ChunkId([c[0], c[1], c[2], c[3]]))
                        .collect();
                }
                CMPR => {
                    let tag = data.get(..4).ok_or_else(|| too_short(id, 4, data.len()))?;
                    block.compression = Some(ChunkId([tag[0], tag[1], tag[2], tag[3]]));
                    block.compression_name = data.get(4).and_then(|&count| {
                        data.get(5..5 + count as usize)
                            .map(|name| String::from_utf8_lossy(name).into_owned())
                    });
                }
                LSCO => block.loudspeaker_config = Some(be_u16(data, id)?),
                ID3 => {
                    log::debug!("Found {} byte ID3 tag inside the property chunk", data.len());
                    block.relocated_tag = Some(data.to_vec());
                }
                other => log::trace!("Skipping property sub-chunk {other} ({size} bytes)"),
            }

            offset = start + round_up_even(size).min(available) as usize;
        }

        Ok(block)
    }
}

fn too_short(id: ChunkId, needed: usize, actual: usize) -> DsdError {
    DsdError::InvalidContainer(format!(
        "property sub-chunk {id} holds {actual} bytes, needs {needed}"
    ))
}

fn be_u16(data: &[u8], id: ChunkId) -> Result<u16> {
    data.get(..2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| too_short(id, 2, data.len()))
}

fn be_u32(data: &[u8], id: ChunkId) -> Result<u32> {
    data.get(..4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| too_short(id, 4, data.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sub_chunk;

    #[test]
    fn parses_rate_channels_and_compression() -> Result<()> {
        let mut body = sub_chunk(b"FS  ", &2_822_400u32.to_be_bytes());
        body.extend(sub_chunk(b"CHNL", b"\x00\x02SLFTSRGT"));
        body.extend(sub_chunk(b"CMPR", b"DSD \x0enot compressed"));
        body.extend(sub_chunk(b"LSCO", &0u16.to_be_bytes()));

        let block = PropertyBlock::parse(&body)?;
        assert_eq!(block.sample_rate, Some(2_822_400));
        assert_eq!(block.channel_count, Some(2));
        assert_eq!(block.channel_ids, vec![ChunkId(*b"SLFT"), ChunkId(*b"SRGT")]);
        assert_eq!(block.compression, Some(ChunkId(*b"DSD ")));
        assert_eq!(block.compression_name.as_deref(), Some("not compressed"));
        assert_eq!(block.loudspeaker_config, Some(0));
        assert!(block.relocated_tag.is_none());
        Ok(())
    }

    #[test]
    fn later_values_win_and_unknown_ids_are_skipped() -> Result<()> {
        let mut body = sub_chunk(b"FS  ", &44_100u32.to_be_bytes());
        body.extend(sub_chunk(b"ABSS", &[1, 2, 3]));
        body.extend(sub_chunk(b"FS  ", &5_644_800u32.to_be_bytes()));
        body.extend(sub_chunk(b"CHNL", &1u16.to_be_bytes()));

        let block = PropertyBlock::parse(&body)?;
        assert_eq!(block.sample_rate, Some(5_644_800));
        assert_eq!(block.channel_count, Some(1));
        Ok(())
    }

    #[test]
    fn keeps_embedded_tag() -> Result<()> {
        let mut body = sub_chunk(b"ID3 ", b"ID3tag");
        body.extend(sub_chunk(b"FS  ", &2_822_400u32.to_be_bytes()));

        let block = PropertyBlock::parse(&body)?;
        assert_eq!(block.relocated_tag.as_deref(), Some(&b"ID3tag"[..]));
        assert_eq!(block.sample_rate, Some(2_822_400));
        Ok(())
    }

    #[test]
    fn overlong_sub_chunk_is_rejected() {
        let mut body = sub_chunk(b"FS  ", &2_822_400u32.to_be_bytes());
        body[11] = 40;
        assert!(matches!(
            PropertyBlock::parse(&body),
            Err(DsdError::InvalidContainer(_))
        ));
    }

    #[test]
    fn short_header_is_truncation() {
        let mut body = sub_chunk(b"FS  ", &2_822_400u32.to_be_bytes());
        body.extend_from_slice(b"CHNL\0\0");
        assert!(matches!(
            PropertyBlock::parse(&body),
            Err(DsdError::TruncatedStream(_))
        ));
    }
}

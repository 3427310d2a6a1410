//! Sony DSF (`.dsf`) container.
//!
//! Three little-endian chunks (`DSD `, `fmt `, `data`) whose sizes include
//! their own headers, followed by an optional ID3v2 tag that the `DSD `
//! chunk points at. Audio is stored as fixed-size blocks per channel.

use crate::chunk::{ChunkId, ChunkLayout};
use crate::impl_repr_enum;
use crate::utils::errors::{DsdError, Result};
use dsdio_macros::{ToBytes, dsf_chunk};

pub mod reader;
pub mod writer;

pub const DSD: ChunkId = ChunkId::new(b"DSD ");
pub const FMT: ChunkId = ChunkId::new(b"fmt ");
pub const DATA: ChunkId = ChunkId::new(b"data");

pub const FORMAT_VERSION: u32 = 1;
pub const FORMAT_ID_RAW: u32 = 0;
pub const BLOCK_SIZE: u32 = 4096;

/// Offsets of the fields patched once the output length is known.
pub const TOTAL_SIZE_OFFSET: u64 = 12;
pub const METADATA_OFFSET_OFFSET: u64 = 20;
pub const SAMPLE_COUNT_OFFSET: u64 = 28 + 12 + 24;
pub const DATA_CHUNK_OFFSET: u64 = 28 + 52;

/// A record that is written as the body of one DSF chunk.
pub trait DsfChunk {
    const ID: ChunkId;

    fn chunk_data(&self) -> Vec<u8>;

    fn to_chunk_bytes(&self) -> Vec<u8> {
        let data = self.chunk_data();
        let layout = ChunkLayout::DSF;
        let mut bytes = layout
            .encode_header(Self::ID, layout.declared_size(data.len() as u64))
            .to_vec();
        bytes.extend_from_slice(&data);
        bytes
    }
}

#[derive(Debug, ToBytes)]
#[dsf_chunk(b"DSD ")]
pub struct FileHeader {
    pub total_size: u64,
    pub metadata_offset: u64,
}

#[derive(Debug, ToBytes)]
#[dsf_chunk(b"fmt ")]
pub struct Format {
    pub version: u32,
    pub format_id: u32,
    pub channel_type: ChannelType,
    pub channel_count: u32,
    pub sample_rate: u32,
    pub bits_per_sample: u32,
    pub sample_count: u64,
    pub block_size: u32,
    pub reserved: u32,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Mono = 1,
    Stereo = 2,
    ThreeChannels = 3,
    Quad = 4,
    FourChannels = 5,
    FiveChannels = 6,
    FivePointOne = 7,
}

impl_repr_enum!(ChannelType, u32);

impl ChannelType {
    /// Layout written for a channel count. Four channels are written as quad.
    pub fn for_channels(channels: u16) -> Result<Self> {
        Ok(match channels {
            1 => ChannelType::Mono,
            2 => ChannelType::Stereo,
            3 => ChannelType::ThreeChannels,
            4 => ChannelType::Quad,
            5 => ChannelType::FiveChannels,
            6 => ChannelType::FivePointOne,
            _ => {
                return Err(DsdError::UnsupportedLayout {
                    format: "DSF",
                    channels,
                });
            }
        })
    }

    pub fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            1 => ChannelType::Mono,
            2 => ChannelType::Stereo,
            3 => ChannelType::ThreeChannels,
            4 => ChannelType::Quad,
            5 => ChannelType::FourChannels,
            6 => ChannelType::FiveChannels,
            7 => ChannelType::FivePointOne,
            _ => return None,
        })
    }

    pub fn channel_count(self) -> u16 {
        match self {
            ChannelType::Mono => 1,
            ChannelType::Stereo => 2,
            ChannelType::ThreeChannels => 3,
            ChannelType::Quad | ChannelType::FourChannels => 4,
            ChannelType::FiveChannels => 5,
            ChannelType::FivePointOne => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_sizes_include_header() {
        let header = FileHeader {
            total_size: 0,
            metadata_offset: 0,
        }
        .to_chunk_bytes();
        assert_eq!(header.len(), 28);
        assert_eq!(&header[4..12], &28u64.to_le_bytes());

        let format = Format {
            version: FORMAT_VERSION,
            format_id: FORMAT_ID_RAW,
            channel_type: ChannelType::FivePointOne,
            channel_count: 6,
            sample_rate: 2_822_400,
            bits_per_sample: 1,
            sample_count: 0x0102_0304,
            block_size: BLOCK_SIZE,
            reserved: 0,
        }
        .to_chunk_bytes();
        assert_eq!(format.len(), 52);
        assert_eq!(&format[20..24], &7u32.to_le_bytes());
        let at = (SAMPLE_COUNT_OFFSET - 28) as usize;
        assert_eq!(&format[at..at + 8], &0x0102_0304u64.to_le_bytes());
    }

    #[test]
    fn channel_types() {
        assert_eq!(ChannelType::for_channels(5).unwrap() as u32, 6);
        assert_eq!(ChannelType::for_channels(6).unwrap() as u32, 7);
        assert!(matches!(
            ChannelType::for_channels(8),
            Err(DsdError::UnsupportedLayout { channels: 8, .. })
        ));
        assert_eq!(ChannelType::from_raw(5).map(ChannelType::channel_count), Some(4));
        assert_eq!(ChannelType::from_raw(9), None);
    }
}

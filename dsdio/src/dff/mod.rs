//! Philips DSDIFF (`.dff`) container.
//!
//! Nested big-endian chunks under a `FRM8` form. Every body is padded to an
//! even length; size fields hold the unpadded length.

use crate::chunk::{ChunkId, ChunkLayout};
use crate::utils::byteorder::WriteBytesBe;
use dsdio_macros::{ToBytes, dff_chunk};

pub mod property;
pub mod reader;
pub mod writer;

pub const FRM8: ChunkId = ChunkId::new(b"FRM8");
pub const DSD: ChunkId = ChunkId::new(b"DSD ");
pub const FVER: ChunkId = ChunkId::new(b"FVER");
pub const PROP: ChunkId = ChunkId::new(b"PROP");
pub const SND: ChunkId = ChunkId::new(b"SND ");
pub const FS: ChunkId = ChunkId::new(b"FS  ");
pub const CHNL: ChunkId = ChunkId::new(b"CHNL");
pub const CMPR: ChunkId = ChunkId::new(b"CMPR");
pub const LSCO: ChunkId = ChunkId::new(b"LSCO");
pub const DST: ChunkId = ChunkId::new(b"DST ");
pub const FRTE: ChunkId = ChunkId::new(b"FRTE");
pub const DSTF: ChunkId = ChunkId::new(b"DSTF");
pub const DSTC: ChunkId = ChunkId::new(b"DSTC");
pub const DSTI: ChunkId = ChunkId::new(b"DSTI");
pub const ID3: ChunkId = ChunkId::new(b"ID3 ");

/// DSDIFF 1.5.0.0
pub const DSDIFF_VERSION: u32 = 0x0105_0000;

pub const LS_CONFIG_2_CHNL: u16 = 0;
pub const LS_CONFIG_5_CHNL: u16 = 3;
pub const LS_CONFIG_6_CHNL: u16 = 4;
pub const LS_CONFIG_UNDEFINED: u16 = 65535;

/// A record that is written as the body of one DSDIFF chunk.
pub trait DffChunk {
    const ID: ChunkId;

    fn chunk_data(&self) -> Vec<u8>;

    /// Header, body and pad byte, ready to be written.
    fn to_chunk_bytes(&self) -> Vec<u8> {
        let data = self.chunk_data();
        let len = data.len() as u64;

        let mut bytes = ChunkLayout::DSDIFF.encode_header(Self::ID, len).to_vec();
        bytes.extend_from_slice(&data);
        if ChunkLayout::DSDIFF.stored_len(len) != len {
            bytes.push(0);
        }
        bytes
    }
}

#[derive(Debug, ToBytes)]
#[dff_chunk(b"FVER")]
pub struct FormatVersion {
    pub version: u32,
}

#[derive(Debug, ToBytes)]
#[dff_chunk(b"FS  ")]
pub struct SampleRate {
    pub sample_rate: u32,
}

#[derive(Debug, ToBytes)]
#[dff_chunk(b"CHNL")]
pub struct Channels {
    pub count: u16,
    pub ids: Vec<ChunkId>,
}

#[derive(Debug, ToBytes)]
#[dff_chunk(b"CMPR")]
pub struct CompressionType {
    pub compression_type: ChunkId,
    pub name: PString,
}

#[derive(Debug, ToBytes)]
#[dff_chunk(b"LSCO")]
pub struct LoudspeakerConfig {
    pub config: u16,
}

/// Count-prefixed string. The chunk it sits in supplies any pad byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PString(pub Vec<u8>);

impl PString {
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        Self(bytes[..bytes.len().min(u8::MAX as usize)].to_vec())
    }
}

impl WriteBytesBe for PString {
    fn write_be(&self, dst: &mut Vec<u8>) {
        dst.push(self.0.len() as u8);
        dst.extend_from_slice(&self.0);
    }
}

impl crate::utils::byteorder::WriteBytesLe for PString {
    fn write_le(&self, dst: &mut Vec<u8>) {
        self.write_be(dst)
    }
}

/// Speaker ids and loudspeaker configuration for a channel count.
#[derive(Debug)]
pub struct SpeakerLayout {
    pub channels: u16,
    pub ids: &'static [ChunkId],
    pub loudspeaker_config: u16,
}

pub const SPEAKER_LAYOUTS: &[SpeakerLayout] = &[
    SpeakerLayout {
        channels: 2,
        ids: &[ChunkId::new(b"SLFT"), ChunkId::new(b"SRGT")],
        loudspeaker_config: LS_CONFIG_2_CHNL,
    },
    SpeakerLayout {
        channels: 5,
        ids: &[
            ChunkId::new(b"MLFT"),
            ChunkId::new(b"MRGT"),
            ChunkId::new(b"C   "),
            ChunkId::new(b"LS  "),
            ChunkId::new(b"RS  "),
        ],
        loudspeaker_config: LS_CONFIG_5_CHNL,
    },
    SpeakerLayout {
        channels: 6,
        ids: &[
            ChunkId::new(b"MLFT"),
            ChunkId::new(b"MRGT"),
            ChunkId::new(b"C   "),
            ChunkId::new(b"LFE "),
            ChunkId::new(b"LS  "),
            ChunkId::new(b"RS  "),
        ],
        loudspeaker_config: LS_CONFIG_6_CHNL,
    },
];

pub fn speaker_layout(channels: u16) -> Option<&'static SpeakerLayout> {
    SPEAKER_LAYOUTS.iter().find(|l| l.channels == channels)
}

/// Channel ids for `channels`, falling back to `C000`, `C001`, ...
pub fn channel_ids(channels: u16) -> Vec<ChunkId> {
    match speaker_layout(channels) {
        Some(layout) => layout.ids.to_vec(),
        None => (0..channels)
            .map(|i| {
                let label = format!("C{:03}", i % 1000);
                let mut id = [b' '; 4];
                id.copy_from_slice(&label.as_bytes()[..4]);
                ChunkId(id)
            })
            .collect(),
    }
}

pub fn loudspeaker_config(channels: u16) -> u16 {
    speaker_layout(channels)
        .map(|l| l.loudspeaker_config)
        .unwrap_or(LS_CONFIG_UNDEFINED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_table_and_fallback() {
        assert_eq!(channel_ids(2), vec![ChunkId(*b"SLFT"), ChunkId(*b"SRGT")]);
        assert_eq!(channel_ids(6)[3], ChunkId(*b"LFE "));
        assert_eq!(
            channel_ids(3),
            vec![ChunkId(*b"C000"), ChunkId(*b"C001"), ChunkId(*b"C002")]
        );
        assert_eq!(loudspeaker_config(5), LS_CONFIG_5_CHNL);
        assert_eq!(loudspeaker_config(1), LS_CONFIG_UNDEFINED);
    }

    #[test]
    fn odd_chunk_gets_pad_byte() {
        let cmpr = CompressionType {
            compression_type: DSD,
            name: PString::new("not compressed"),
        };
        let bytes = cmpr.to_chunk_bytes();
        assert_eq!(&bytes[..4], b"CMPR");
        assert_eq!(&bytes[4..12], &19u64.to_be_bytes());
        assert_eq!(bytes.len(), 12 + 20);
        assert_eq!(bytes[12 + 4], 14);
        assert_eq!(*bytes.last().unwrap(), 0);
    }

    #[test]
    fn channel_chunk_layout() {
        let chnl = Channels {
            count: 2,
            ids: channel_ids(2),
        };
        let bytes = chnl.to_chunk_bytes();
        assert_eq!(&bytes[4..12], &10u64.to_be_bytes());
        assert_eq!(&bytes[12..14], &2u16.to_be_bytes());
        assert_eq!(&bytes[14..], b"SLFTSRGT");
    }
}

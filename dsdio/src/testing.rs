//! Builders for hand-made container streams used across the unit tests.

use crate::chunk::{ChunkId, ChunkLayout};

/// One DSDIFF chunk: header, body and pad byte.
pub fn sub_chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut bytes = ChunkLayout::DSDIFF
        .encode_header(ChunkId(*id), body.len() as u64)
        .to_vec();
    bytes.extend_from_slice(body);
    if body.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes
}

/// Body of a `PROP` chunk with `FS  ` and `CHNL`, plus `extra` sub-chunks.
pub fn sound_properties(sample_rate: u32, channels: u16, extra: &[u8]) -> Vec<u8> {
    let mut body = b"SND ".to_vec();
    body.extend(sub_chunk(b"FS  ", &sample_rate.to_be_bytes()));
    let mut chnl = channels.to_be_bytes().to_vec();
    for id in crate::dff::channel_ids(channels) {
        chnl.extend_from_slice(id.as_bytes());
    }
    body.extend(sub_chunk(b"CHNL", &chnl));
    body.extend_from_slice(extra);
    body
}

/// `DSTF` frame records for a plain (uncoded) frame carrying `samples`.
pub fn plain_frame(samples: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8];
    body.extend_from_slice(samples);
    sub_chunk(b"DSTF", &body)
}

/// Body of a `DST ` chunk: `FRTE` followed by `records`.
pub fn dst_body(frames: u32, frame_rate: u16, records: &[u8]) -> Vec<u8> {
    let mut frte = frames.to_be_bytes().to_vec();
    frte.extend_from_slice(&frame_rate.to_be_bytes());
    let mut body = sub_chunk(b"FRTE", &frte);
    body.extend_from_slice(records);
    body
}

/// Assembles a `FRM8`/`DSD ` form from whole chunks.
#[derive(Debug, Default)]
pub struct DffBuilder {
    chunks: Vec<u8>,
}

impl DffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the `FVER` chunk.
    pub fn version(self) -> Self {
        self.chunk(b"FVER", &crate::dff::DSDIFF_VERSION.to_be_bytes())
    }

    pub fn properties(self, sample_rate: u32, channels: u16) -> Self {
        self.properties_with(sample_rate, channels, &[])
    }

    pub fn properties_with(self, sample_rate: u32, channels: u16, extra: &[u8]) -> Self {
        let body = sound_properties(sample_rate, channels, extra);
        self.chunk(b"PROP", &body)
    }

    pub fn chunk(mut self, id: &[u8; 4], body: &[u8]) -> Self {
        self.chunks.extend(sub_chunk(id, body));
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.chunks.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut bytes = b"FRM8".to_vec();
        bytes.extend_from_slice(&(self.chunks.len() as u64 + 4).to_be_bytes());
        bytes.extend_from_slice(b"DSD ");
        bytes.extend(self.chunks);
        bytes
    }
}

//! Reshuffling between DSF block layout and DSDIFF byte interleaving.
//!
//! DSDIFF stores one byte per channel in turn, most significant bit first.
//! DSF stores fixed-size blocks per channel, usually least significant bit
//! first. The interchange form used across the crate is DSDIFF's.

/// Converts one DSF block group (`channels` blocks of `block_size` bytes) into
/// byte-interleaved data, appending to `out`.
pub fn interleave_block_group(
    group: &[u8],
    channels: usize,
    block_size: usize,
    lsb_first: bool,
    out: &mut Vec<u8>,
) {
    debug_assert_eq!(group.len(), channels * block_size);
    out.reserve(group.len());
    for i in 0..block_size {
        for ch in 0..channels {
            let byte = group[ch * block_size + i];
            out.push(if lsb_first { byte.reverse_bits() } else { byte });
        }
    }
}

/// Accumulates byte-interleaved data into per-channel DSF blocks.
#[derive(Debug)]
pub struct BlockGrouper {
    blocks: Vec<Vec<u8>>,
    block_size: usize,
    next_channel: usize,
    lsb_first: bool,
}

impl BlockGrouper {
    pub fn new(channels: usize, block_size: usize, lsb_first: bool) -> Self {
        Self {
            blocks: (0..channels)
                .map(|_| Vec::with_capacity(block_size))
                .collect(),
            block_size,
            next_channel: 0,
            lsb_first,
        }
    }

    /// Feeds interleaved bytes, calling `emit` with every completed block group.
    pub fn push<E, F>(&mut self, data: &[u8], mut emit: F) -> Result<(), E>
    where
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        for &byte in data {
            let byte = if self.lsb_first {
                byte.reverse_bits()
            } else {
                byte
            };
            self.blocks[self.next_channel].push(byte);
            self.next_channel = (self.next_channel + 1) % self.blocks.len();

            if self.next_channel == 0 && self.blocks[0].len() == self.block_size {
                emit(&self.take_group())?;
            }
        }
        Ok(())
    }

    /// Zero-pads and returns the partial trailing group, if any bytes are pending.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.blocks.iter().all(Vec::is_empty) {
            return None;
        }
        let block_size = self.block_size;
        self.blocks
            .iter_mut()
            .for_each(|block| block.resize(block_size, 0));
        self.next_channel = 0;
        Some(self.take_group())
    }

    fn take_group(&mut self) -> Vec<u8> {
        let mut group = Vec::with_capacity(self.blocks.len() * self.block_size);
        for block in &mut self.blocks {
            group.extend_from_slice(block);
            block.clear();
        }
        group
    }
}

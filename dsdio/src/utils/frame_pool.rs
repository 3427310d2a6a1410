use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A thread-safe pool of frame-sized byte buffers.
///
/// Compressed frame payloads and decoded frame outputs cycle between the
/// reading thread and the decoder workers; recycling them keeps the hot
/// path allocation free once the pool has warmed up.
#[derive(Debug, Clone)]
pub struct FramePool {
    pool: Arc<Mutex<VecDeque<Vec<u8>>>>,
    max_size: usize,
}

impl FramePool {
    /// Creates a pool that retains at most `max_size` idle buffers.
    pub fn new(max_size: usize) -> Self {
        Self {
            pool: Arc::new(Mutex::new(VecDeque::with_capacity(max_size))),
            max_size,
        }
    }

    /// Takes a buffer of exactly `len` zeroed bytes.
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        let mut buffer = self
            .pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default();
        buffer.clear();
        buffer.resize(len, 0);
        buffer
    }

    /// Returns a buffer for reuse; dropped if the pool is full.
    pub fn release(&self, buffer: Vec<u8>) {
        let mut pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        if pool.len() < self.max_size {
            pool.push_back(buffer);
        }
    }

    pub fn idle(&self) -> usize {
        self.pool.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new(32)
    }
}

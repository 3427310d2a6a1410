use std::io::{Read, Seek};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use log::Level;

use crate::chunk::{ChunkCursor, ChunkId};
use crate::container::ReaderOptions;
use crate::dff::{DSTC, DSTF};
use crate::dst::{DecodeSink, FrameDecoder};
use crate::log_or_err;
use crate::utils::errors::{DsdError, FrameError, Result};

/// Frame payloads larger than this many frames' worth of samples are corrupt.
const MAX_FRAME_EXPANSION: usize = 2;

#[derive(Default)]
struct Batch {
    staged: Vec<u8>,
    outstanding: u32,
    errors: Vec<(u64, FrameError)>,
}

#[derive(Default)]
struct BatchState {
    batch: Mutex<Batch>,
    done: Condvar,
}

impl BatchState {
    fn lock(&self) -> MutexGuard<'_, Batch> {
        self.batch.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DecodeSink for BatchState {
    fn frame_decoded(&self, _frame: u64, data: &[u8]) {
        let mut batch = self.lock();
        batch.staged.extend_from_slice(data);
        batch.outstanding = batch.outstanding.saturating_sub(1);
        if batch.outstanding == 0 {
            self.done.notify_all();
        }
    }

    fn frame_error(&self, frame: u64, error: FrameError) {
        self.lock().errors.push((frame, error));
    }
}

enum FrameRecord {
    Frame(Vec<u8>),
    Unexpected(String),
}

/// Turns the `DSTF` records of a `DST ` chunk into decoded DSD bytes.
///
/// Each [`read`](DstBridge::read) decodes as many whole frames as fit in the
/// caller's buffer and blocks until all of them have been delivered.
pub struct DstBridge {
    frame_size: usize,
    frames_remaining: u32,
    frames_read: u64,
    state: Arc<BatchState>,
    decoder: FrameDecoder,
    fail_level: Level,
}

impl DstBridge {
    pub fn new(frame_size: usize, frame_count: u32, options: &ReaderOptions) -> Result<Self> {
        let state = Arc::new(BatchState::default());
        let decoder = FrameDecoder::new(
            Arc::clone(&options.codec),
            frame_size,
            options.decoder_threads,
            state.clone(),
        )?;

        Ok(Self {
            frame_size,
            frames_remaining: frame_count,
            frames_read: 0,
            state,
            decoder,
            fail_level: options.fail_level,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frames_remaining(&self) -> u32 {
        self.frames_remaining
    }

    /// Decodes up to `buf.len() / frame_size` frames into `buf`.
    ///
    /// Returns 0 once every announced frame has been read, or when `buf`
    /// cannot hold a single frame.
    pub fn read<R: Read + Seek>(
        &mut self,
        cursor: &mut ChunkCursor<R>,
        buf: &mut [u8],
    ) -> Result<usize> {
        let requested = (buf.len() / self.frame_size).min(self.frames_remaining as usize) as u32;
        if requested == 0 {
            return Ok(0);
        }

        {
            let mut batch = self.state.lock();
            batch.staged.clear();
            batch.errors.clear();
            batch.outstanding = requested;
        }
        self.frames_remaining -= requested;

        let mut submitted = 0u32;
        let mut corruption = None;
        let mut failure = None;
        while submitted < requested {
            match self.next_record(cursor) {
                Ok(FrameRecord::Frame(payload)) => match self.decoder.submit(payload) {
                    Ok(_) => submitted += 1,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                },
                Ok(FrameRecord::Unexpected(reason)) => {
                    corruption = Some(DsdError::FrameStreamCorruption {
                        frame: self.frames_read + submitted as u64,
                        reason,
                    });
                    break;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if submitted < requested {
            self.frames_remaining = 0;
            let mut batch = self.state.lock();
            batch.outstanding = batch.outstanding.saturating_sub(requested - submitted);
        }
        self.frames_read += submitted as u64;

        let (produced, errors) = {
            let mut batch = self.state.lock();
            while batch.outstanding > 0 {
                batch = self
                    .state
                    .done
                    .wait(batch)
                    .unwrap_or_else(|e| e.into_inner());
            }
            let produced = batch.staged.len().min(buf.len());
            buf[..produced].copy_from_slice(&batch.staged[..produced]);
            (produced, std::mem::take(&mut batch.errors))
        };

        if let Some(e) = failure {
            return Err(e);
        }
        for (frame, source) in errors {
            log_or_err!(self, Level::Warn, DsdError::DecodeFrame { frame, source });
        }
        if let Some(e) = corruption {
            log_or_err!(self, Level::Warn, e);
        }
        Ok(produced)
    }

    /// Next frame payload, skipping CRC records.
    fn next_record<R: Read + Seek>(&mut self, cursor: &mut ChunkCursor<R>) -> Result<FrameRecord> {
        loop {
            let header = cursor.read_header()?;
            match header.id {
                DSTC => cursor.skip_body(header.declared_size)?,
                DSTF => {
                    let limit = (self.frame_size * MAX_FRAME_EXPANSION + 1) as u64;
                    if header.declared_size > limit {
                        return Ok(FrameRecord::Unexpected(format!(
                            "frame record of {} bytes exceeds {limit}",
                            header.declared_size
                        )));
                    }
                    let mut payload = self.decoder.payload_buffer(header.declared_size as usize);
                    cursor.read_exact(&mut payload, "DST frame")?;
                    cursor.skip(cursor.layout().stored_len(header.declared_size) - header.declared_size)?;
                    return Ok(FrameRecord::Frame(payload));
                }
                other => return Ok(FrameRecord::Unexpected(unexpected(other))),
            }
        }
    }
}

fn unexpected(id: ChunkId) -> String {
    format!("unexpected {id} record")
}

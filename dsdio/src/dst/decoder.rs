use std::collections::BTreeMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::dst::{DSD_SILENCE, DecodeSink, FrameCodec};
use crate::utils::errors::{DsdError, FrameError, Result};
use crate::utils::frame_pool::FramePool;

struct Job {
    index: u64,
    payload: Vec<u8>,
}

struct Decoded {
    index: u64,
    payload: Vec<u8>,
    output: Vec<u8>,
    error: Option<FrameError>,
}

/// Pool of worker threads decoding DST frames.
///
/// Frames may finish out of order; a collector thread restores submission
/// order before handing them to the [`DecodeSink`]. Dropping the decoder
/// waits for every submitted frame to be delivered.
pub struct FrameDecoder {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    collector: Option<JoinHandle<()>>,
    pool: FramePool,
    submitted: u64,
}

impl FrameDecoder {
    pub fn new(
        codec: Arc<dyn FrameCodec>,
        frame_size: usize,
        threads: usize,
        sink: Arc<dyn DecodeSink>,
    ) -> Result<Self> {
        let threads = threads.max(1);
        let pool = FramePool::new(threads * 4);
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (done_tx, done_rx) = mpsc::channel::<Decoded>();

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let jobs = Arc::clone(&job_rx);
            let done = done_tx.clone();
            let codec = Arc::clone(&codec);
            let pool = pool.clone();
            let handle = thread::Builder::new()
                .name(format!("dst-decode-{i}"))
                .spawn(move || decode_frames(jobs, done, codec, pool, frame_size))?;
            workers.push(handle);
        }
        drop(done_tx);

        let collector = {
            let pool = pool.clone();
            thread::Builder::new()
                .name("dst-collect".into())
                .spawn(move || deliver_in_order(done_rx, sink, pool))?
        };

        log::debug!("Started {threads} DST decoder threads, frame size {frame_size}");

        Ok(Self {
            jobs: Some(job_tx),
            workers,
            collector: Some(collector),
            pool,
            submitted: 0,
        })
    }

    /// A zeroed buffer of `len` bytes for the next frame payload.
    pub fn payload_buffer(&self, len: usize) -> Vec<u8> {
        self.pool.acquire(len)
    }

    /// Queues one frame; returns its index.
    pub fn submit(&mut self, payload: Vec<u8>) -> Result<u64> {
        let index = self.submitted;
        let sent = self
            .jobs
            .as_ref()
            .map(|jobs| jobs.send(Job { index, payload }).is_ok())
            .unwrap_or(false);
        if !sent {
            return Err(DsdError::Io(io::Error::other("DST decoder threads stopped")));
        }
        self.submitted += 1;
        Ok(index)
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        drop(self.jobs.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("DST decoder thread panicked");
            }
        }
        if let Some(collector) = self.collector.take() {
            if collector.join().is_err() {
                log::error!("DST collector thread panicked");
            }
        }
    }
}

fn decode_frames(
    jobs: Arc<Mutex<Receiver<Job>>>,
    done: Sender<Decoded>,
    codec: Arc<dyn FrameCodec>,
    pool: FramePool,
    frame_size: usize,
) {
    loop {
        let job = jobs.lock().unwrap_or_else(|e| e.into_inner()).recv();
        let Ok(job) = job else { break };

        let mut output = pool.acquire(frame_size);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            codec.decode(&job.payload, &mut output)
        }))
        .unwrap_or_else(|cause| {
            let message = cause
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            Err(FrameError::Panicked(message))
        });

        let error = result.err();
        if error.is_some() {
            output.fill(DSD_SILENCE);
        }

        let decoded = Decoded {
            index: job.index,
            payload: job.payload,
            output,
            error,
        };
        if done.send(decoded).is_err() {
            break;
        }
    }
}

fn deliver_in_order(done: Receiver<Decoded>, sink: Arc<dyn DecodeSink>, pool: FramePool) {
    let mut pending = BTreeMap::new();
    let mut next = 0u64;

    for decoded in done {
        pending.insert(decoded.index, decoded);
        while let Some(frame) = pending.remove(&next) {
            if let Some(error) = frame.error {
                sink.frame_error(frame.index, error);
            }
            sink.frame_decoded(frame.index, &frame.output);
            pool.release(frame.output);
            pool.release(frame.payload);
            next += 1;
        }
    }

    if !pending.is_empty() {
        log::warn!("{} decoded DST frames were never delivered", pending.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Copies the frame's first byte across the output, slowing down even frames.
    struct StaggeredCodec;

    impl FrameCodec for StaggeredCodec {
        fn decode(&self, frame: &[u8], out: &mut [u8]) -> Result<(), FrameError> {
            if frame[0] % 2 == 0 {
                thread::sleep(Duration::from_millis(5));
            }
            if frame[0] == 3 {
                return Err(FrameError::Coded);
            }
            if frame[0] == 5 {
                panic!("bad frame");
            }
            out.fill(frame[0]);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(u64, Vec<u8>)>>,
        errors: Mutex<Vec<(u64, FrameError)>>,
    }

    impl DecodeSink for Recorder {
        fn frame_decoded(&self, frame: u64, data: &[u8]) {
            self.frames.lock().unwrap().push((frame, data.to_vec()));
        }

        fn frame_error(&self, frame: u64, error: FrameError) {
            self.errors.lock().unwrap().push((frame, error));
        }
    }

    #[test]
    fn delivers_in_submission_order_with_silence_for_failures() {
        let recorder = Arc::new(Recorder::default());
        let mut decoder =
            FrameDecoder::new(Arc::new(StaggeredCodec), 2, 4, recorder.clone()).unwrap();
        for i in 0..8u8 {
            let mut payload = decoder.payload_buffer(1);
            payload[0] = i;
            assert_eq!(decoder.submit(payload).unwrap(), i as u64);
        }
        assert_eq!(decoder.submitted(), 8);
        drop(decoder);

        let frames = recorder.frames.lock().unwrap();
        let order: Vec<u64> = frames.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, (0..8).collect::<Vec<_>>());
        assert_eq!(frames[2].1, vec![2, 2]);
        assert_eq!(frames[3].1, vec![DSD_SILENCE; 2]);
        assert_eq!(frames[5].1, vec![DSD_SILENCE; 2]);

        let errors = recorder.errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], (3, FrameError::Coded));
        assert!(matches!(errors[1], (5, FrameError::Panicked(_))));
    }
}

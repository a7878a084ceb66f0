//! Decoded-PCM buffering between the decoder and the device callback
//!
//! The decoder cannot keep real-time pace on every container, so a fill
//! thread owns the `DecoderStream` exclusively and keeps a bounded queue
//! of decoded chunks topped up. The device callback pulls chunks and never
//! waits on decode latency; the fill thread blocks on queue backpressure
//! with a bounded send timeout so seek and shutdown commands stay
//! responsive.
//!
//! Chunks are generation-tagged. A seek or reset bumps the queue's live
//! generation first, then routes the reposition through the fill thread's
//! command channel; chunks decoded before the command was serviced carry
//! the old tag and are silently discarded on pop. No drain handshake, no
//! race on partially consumed data.

use crate::error::{PlaybackError, Result};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TryRecvError};
use drift_audio::DecoderStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long the fill thread waits for queue space before re-checking its
/// command channel
const PUSH_TIMEOUT: Duration = Duration::from_millis(100);

/// How long control calls wait to enqueue a fill command
const COMMAND_TIMEOUT: Duration = Duration::from_millis(250);

/// One decoded PCM chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Queue generation this chunk was decoded under
    pub generation: u64,
    /// Interleaved PCM bytes in the pipeline's negotiated format
    pub bytes: Vec<u8>,
    /// Whether the decoder reached end of stream producing this chunk
    pub end_of_stream: bool,
}

impl Chunk {
    /// A data chunk for the given generation
    pub fn new(generation: u64, bytes: Vec<u8>) -> Self {
        Self {
            generation,
            bytes,
            end_of_stream: false,
        }
    }

    /// A bare end-of-stream marker for the given generation
    pub fn end_marker(generation: u64) -> Self {
        Self {
            generation,
            bytes: Vec::new(),
            end_of_stream: true,
        }
    }
}

/// Bounded queue of decoded chunks with generation-based invalidation
///
/// Shared by `Arc` between exactly one producer (the fill thread) and one
/// consumer (the device callback); control paths additionally call
/// [`ChunkQueue::invalidate`]. The consumer can never observe bytes the
/// producer has not committed: only fully decoded chunks enter the queue.
#[derive(Debug)]
pub struct ChunkQueue {
    tx: Sender<Chunk>,
    rx: Receiver<Chunk>,
    generation: AtomicU64,
    capacity: usize,
}

impl ChunkQueue {
    /// Create a queue holding at most `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            generation: AtomicU64::new(0),
            capacity,
        }
    }

    /// The generation chunks must carry to be consumable
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Enqueue a chunk, waiting up to `timeout` for space
    ///
    /// Returns the chunk back if the queue stayed full, so the producer
    /// can retry after servicing its command channel.
    pub fn push(&self, chunk: Chunk, timeout: Duration) -> std::result::Result<(), Chunk> {
        match self.tx.send_timeout(chunk, timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(chunk) | SendTimeoutError::Disconnected(chunk)) => {
                Err(chunk)
            }
        }
    }

    /// Dequeue the next live chunk without blocking
    ///
    /// Chunks from superseded generations are dropped on the way.
    pub fn try_pop(&self) -> Option<Chunk> {
        loop {
            let chunk = self.rx.try_recv().ok()?;
            if chunk.generation == self.current_generation() {
                return Some(chunk);
            }
        }
    }

    /// Dequeue the next live chunk, waiting up to `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Chunk> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.rx.recv_timeout(remaining) {
                Ok(chunk) if chunk.generation == self.current_generation() => return Some(chunk),
                Ok(_) => {}
                Err(_) => return None,
            }
        }
    }

    /// Supersede all queued chunks and return the new live generation
    ///
    /// Draining here also frees queue slots, which unblocks a producer
    /// stuck on backpressure; anything it was still pushing carries the
    /// old tag and dies in [`ChunkQueue::try_pop`].
    pub fn invalidate(&self) -> u64 {
        let next = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        while self.rx.try_recv().is_ok() {}
        next
    }

    /// Chunks currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum queued chunks
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Commands serviced by the fill thread
enum FillCommand {
    /// Reposition the decoder and start producing under a new generation
    Seek { target: u64, generation: u64 },
    /// Exit the fill loop
    Shutdown,
}

/// Handle to the thread that owns the `DecoderStream`
#[derive(Debug)]
pub(crate) struct FillWorker {
    commands: Sender<FillCommand>,
    done: Receiver<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl FillWorker {
    /// Spawn the fill thread; it owns `stream` until shutdown
    pub fn spawn(
        stream: DecoderStream,
        queue: Arc<ChunkQueue>,
        chunk_bytes: usize,
        shutdown_timeout: Duration,
    ) -> Self {
        let (command_tx, command_rx) = bounded(8);
        let (done_tx, done_rx) = bounded(1);

        let handle = thread::spawn(move || {
            run_fill(stream, &queue, &command_rx, chunk_bytes);
            let _ = done_tx.send(());
        });

        Self {
            commands: command_tx,
            done: done_rx,
            handle: Mutex::new(Some(handle)),
            shutdown_timeout,
        }
    }

    /// Ask the fill thread to reposition the decoder
    ///
    /// Fire-and-forget: the caller has already invalidated the queue and
    /// taken `generation` from it, so ordering is safe without a reply.
    pub fn seek(&self, target: u64, generation: u64) -> Result<()> {
        self.commands
            .send_timeout(FillCommand::Seek { target, generation }, COMMAND_TIMEOUT)
            .map_err(|_| PlaybackError::ChannelDisconnected("fill"))
    }

    /// Stop the fill thread, waiting at most the configured shutdown
    /// timeout before detaching it
    pub fn shutdown(&self) {
        let _ = self
            .commands
            .send_timeout(FillCommand::Shutdown, COMMAND_TIMEOUT);
        let finished = self.done.recv_timeout(self.shutdown_timeout).is_ok();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if finished {
                let _ = handle.join();
            } else {
                warn!("fill thread did not stop in time, detaching");
            }
        }
    }
}

impl Drop for FillWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_fill(
    mut stream: DecoderStream,
    queue: &ChunkQueue,
    commands: &Receiver<FillCommand>,
    chunk_bytes: usize,
) {
    let mut generation = queue.current_generation();
    let mut at_end = false;
    let mut pending: Option<Chunk> = None;

    loop {
        // At end of stream with nothing left to deliver the thread has no
        // work until a seek arrives, so block instead of spinning.
        let idle = at_end && pending.is_none();
        let command = if idle {
            match commands.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => return,
            }
        } else {
            match commands.try_recv() {
                Ok(cmd) => Some(cmd),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => return,
            }
        };

        match command {
            Some(FillCommand::Seek {
                target,
                generation: next_generation,
            }) => {
                pending = None;
                generation = next_generation;
                match stream.set_position(target) {
                    Ok(reached) => {
                        at_end = false;
                        debug!(target, reached, "fill thread repositioned decoder");
                    }
                    Err(err) => {
                        warn!("seek to byte {} failed, ending stream: {}", target, err);
                        at_end = true;
                        pending = Some(Chunk::end_marker(generation));
                    }
                }
                continue;
            }
            Some(FillCommand::Shutdown) => return,
            None => {}
        }

        if let Some(chunk) = pending.take() {
            if let Err(returned) = queue.push(chunk, PUSH_TIMEOUT) {
                pending = Some(returned);
            }
            continue;
        }

        let mut bytes = vec![0u8; chunk_bytes];
        let mut filled = 0;
        let mut ended = false;
        while filled < chunk_bytes {
            match stream.read(&mut bytes[filled..]) {
                Ok(0) => {
                    ended = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(err) => {
                    // Mid-stream failures degrade to a normal end of
                    // stream; the pipeline reports EndOfStream, not an
                    // error, and replay behaves uniformly.
                    warn!("decode failed mid-stream, ending stream: {}", err);
                    ended = true;
                    break;
                }
            }
        }
        bytes.truncate(filled);
        at_end = ended;
        pending = Some(Chunk {
            generation,
            bytes,
            end_of_stream: ended,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // ========================================================================
    // ChunkQueue
    // ========================================================================

    #[test]
    fn chunks_pop_in_push_order() {
        let queue = ChunkQueue::new(4);
        let generation = queue.current_generation();

        queue
            .push(Chunk::new(generation, vec![1, 2]), PUSH_TIMEOUT)
            .unwrap();
        queue
            .push(Chunk::new(generation, vec![3, 4]), PUSH_TIMEOUT)
            .unwrap();

        assert_eq!(queue.try_pop().unwrap().bytes, vec![1, 2]);
        assert_eq!(queue.try_pop().unwrap().bytes, vec![3, 4]);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn full_queue_returns_chunk_to_producer() {
        let queue = ChunkQueue::new(1);
        let generation = queue.current_generation();

        queue
            .push(Chunk::new(generation, vec![1]), Duration::from_millis(1))
            .unwrap();
        let rejected = queue
            .push(Chunk::new(generation, vec![2]), Duration::from_millis(1))
            .unwrap_err();
        assert_eq!(rejected.bytes, vec![2], "rejected chunk comes back intact");
    }

    #[test]
    fn invalidate_supersedes_queued_chunks() {
        let queue = ChunkQueue::new(4);
        let old = queue.current_generation();
        queue
            .push(Chunk::new(old, vec![9, 9]), PUSH_TIMEOUT)
            .unwrap();

        let new = queue.invalidate();
        assert_eq!(new, old + 1);
        assert!(queue.is_empty(), "invalidate drains queued chunks");

        // A straggler with the old tag pushed after the drain dies on pop
        queue
            .push(Chunk::new(old, vec![9, 9]), PUSH_TIMEOUT)
            .unwrap();
        assert!(queue.try_pop().is_none());

        queue.push(Chunk::new(new, vec![1]), PUSH_TIMEOUT).unwrap();
        assert_eq!(queue.try_pop().unwrap().generation, new);
    }

    #[test]
    fn end_marker_carries_no_bytes() {
        let marker = Chunk::end_marker(3);
        assert!(marker.end_of_stream);
        assert!(marker.bytes.is_empty());
        assert_eq!(marker.generation, 3);
    }

    #[test]
    fn pop_timeout_expires_on_empty_queue() {
        let queue = ChunkQueue::new(2);
        let started = Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(20)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    // ========================================================================
    // FillWorker (real decoder, WAV fixture)
    // ========================================================================

    fn sine_wav(dir: &tempfile::TempDir, seconds: f32) -> PathBuf {
        let path = dir.path().join("fixture.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        let frames = (44100.0 * seconds) as u32;
        for n in 0..frames {
            let sample = ((n as f32 * 0.01).sin() * 8000.0) as i16;
            writer.write_sample(sample).unwrap();
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn fill_worker_delivers_chunks_then_end_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = sine_wav(&dir, 0.2);
        let stream = DecoderStream::open(&path).unwrap();

        let queue = Arc::new(ChunkQueue::new(4));
        let worker = FillWorker::spawn(stream, queue.clone(), 8192, Duration::from_millis(500));

        let mut total = 0usize;
        let mut saw_end = false;
        for _ in 0..64 {
            match queue.pop_timeout(Duration::from_millis(500)) {
                Some(chunk) => {
                    total += chunk.bytes.len();
                    if chunk.end_of_stream {
                        saw_end = true;
                        break;
                    }
                }
                None => break,
            }
        }

        assert!(saw_end, "fill worker must emit an end-of-stream marker");
        // 0.2 s of 44.1 kHz stereo S16
        let expected = (44100.0 * 0.2) as usize * 4;
        assert_eq!(total, expected, "all decoded bytes must arrive");

        worker.shutdown();
    }

    #[test]
    fn seek_switches_generation_and_restarts_fill() {
        let dir = tempfile::tempdir().unwrap();
        let path = sine_wav(&dir, 0.5);
        let stream = DecoderStream::open(&path).unwrap();

        let queue = Arc::new(ChunkQueue::new(2));
        let worker = FillWorker::spawn(stream, queue.clone(), 4096, Duration::from_millis(500));

        // Let it produce at least one chunk of the first generation
        let first = queue.pop_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(first.generation, 0);

        let generation = queue.invalidate();
        worker.seek(0, generation).unwrap();

        let fresh = queue
            .pop_timeout(Duration::from_millis(500))
            .expect("fill resumes after seek");
        assert_eq!(fresh.generation, generation);
        assert!(!fresh.end_of_stream);

        worker.shutdown();
    }

    #[test]
    fn seek_past_end_degrades_to_end_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = sine_wav(&dir, 0.1);
        let stream = DecoderStream::open(&path).unwrap();

        let queue = Arc::new(ChunkQueue::new(4));
        let worker = FillWorker::spawn(stream, queue.clone(), 4096, Duration::from_millis(500));

        let generation = queue.invalidate();
        // Far beyond the 0.1 s fixture
        worker.seek(10_000_000, generation).unwrap();

        let mut saw_end = false;
        for _ in 0..16 {
            match queue.pop_timeout(Duration::from_millis(500)) {
                Some(chunk) if chunk.end_of_stream => {
                    saw_end = true;
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }
        assert!(saw_end, "invalid seek target must end the stream cleanly");

        worker.shutdown();
    }
}

//! Playback thread and device callback
//!
//! `cpal` streams are not `Send`, so a dedicated thread builds and owns
//! the output stream for its entire life and everything else talks to it
//! over a bounded command channel. Construction errors (missing device,
//! rejected stream format) travel back to the caller through a one-shot
//! startup handshake, so a pipeline that cannot reach the device fails
//! synchronously instead of dying silently in a thread.
//!
//! The device callback itself never blocks and never locks for long: it
//! pulls decoded chunks from the queue, converts them to `f32`, applies
//! pipeline gain times master gain, and writes silence when the queue
//! runs dry.

use crate::buffer::{Chunk, ChunkQueue};
use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::volume::Gain;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use drift_audio::{PcmFormat, SampleFormat};
use drift_core::{ListenerSet, PlaybackState, PlayerEvent, PlayerId};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// How long control calls wait to enqueue a playback command
const COMMAND_TIMEOUT: Duration = Duration::from_millis(250);

/// Command poll cadence of the playback thread
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// State shared between the control surface, the playback thread, and the
/// device callback
#[derive(Debug)]
pub(crate) struct AudioState {
    /// Playback state; transitions are validated and written by the
    /// control surface, the end-of-stream transition by the thread
    state: Mutex<PlaybackState>,
    /// Pipeline gain (the fade path writes this unclamped)
    pub(crate) gain: Gain,
    /// Mixer master gain, multiplied into every sample
    master: Arc<Gain>,
    /// PCM bytes played under the live generation (time reporting)
    pub(crate) consumed: AtomicU64,
    /// Raised by the callback once the end marker has been fully played
    end_of_stream: AtomicBool,
}

impl AudioState {
    pub(crate) fn new(master: Arc<Gain>) -> Self {
        Self {
            state: Mutex::new(PlaybackState::Stopped),
            gain: Gain::new(1.0),
            master,
            consumed: AtomicU64::new(0),
            end_of_stream: AtomicBool::new(false),
        }
    }

    pub(crate) fn playback_state(&self) -> PlaybackState {
        *self.lock_state()
    }

    /// Lock the state for a validated transition
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flag_end_of_stream(&self) {
        self.end_of_stream.store(true, Ordering::Release);
    }

    fn take_end_of_stream(&self) -> bool {
        self.end_of_stream.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn clear_end_of_stream(&self) {
        self.end_of_stream.store(false, Ordering::Release);
    }

    fn combined_gain(&self) -> f32 {
        self.gain.get() * self.master.get()
    }
}

/// Commands serviced by the playback thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputCommand {
    Play,
    Pause,
    Resume,
    Stop,
    Close,
}

/// Handle to the thread that owns the cpal output stream
#[derive(Debug)]
pub(crate) struct PlaybackThread {
    commands: Sender<OutputCommand>,
    done: Receiver<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl PlaybackThread {
    /// Spawn the playback thread and wait for the output stream to open
    ///
    /// Device and format failures surface here, synchronously, through the
    /// startup handshake.
    pub(crate) fn spawn(
        device: Device,
        format: PcmFormat,
        state: Arc<AudioState>,
        queue: Arc<ChunkQueue>,
        listeners: Arc<ListenerSet>,
        player: PlayerId,
        config: &PlaybackConfig,
    ) -> Result<Self> {
        let (command_tx, command_rx) = bounded(32);
        let (ready_tx, ready_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);

        let handle = thread::spawn(move || {
            run_output(
                device,
                format,
                &state,
                &queue,
                &listeners,
                player,
                &command_rx,
                &ready_tx,
            );
            let _ = done_tx.send(());
        });

        match ready_rx.recv_timeout(config.startup_timeout()) {
            Ok(Ok(())) => Ok(Self {
                commands: command_tx,
                done: done_rx,
                handle: Mutex::new(Some(handle)),
                shutdown_timeout: config.shutdown_timeout(),
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            // Dropping command_tx disconnects the thread's channel, so a
            // stuck thread unwinds on its own once it gets that far
            Err(_) => Err(PlaybackError::device(
                "timed out waiting for the output stream to open",
            )),
        }
    }

    /// Enqueue a command for the playback thread
    pub(crate) fn send(&self, command: OutputCommand) -> Result<()> {
        self.commands
            .send_timeout(command, COMMAND_TIMEOUT)
            .map_err(|_| PlaybackError::ChannelDisconnected("playback"))
    }

    /// Stop the playback thread, waiting at most the configured shutdown
    /// timeout before detaching it
    pub(crate) fn shutdown(&self) {
        let _ = self
            .commands
            .send_timeout(OutputCommand::Close, COMMAND_TIMEOUT);
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
                warn!("playback thread did not stop in time, detaching");
            }
        }
    }
}

impl Drop for PlaybackThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Playback thread main loop; owns the cpal stream for its whole life
#[allow(clippy::too_many_arguments)]
fn run_output(
    device: Device,
    format: PcmFormat,
    state: &Arc<AudioState>,
    queue: &Arc<ChunkQueue>,
    listeners: &Arc<ListenerSet>,
    player: PlayerId,
    commands: &Receiver<OutputCommand>,
    ready: &Sender<Result<()>>,
) {
    let stream_config = StreamConfig {
        channels: format.channels,
        sample_rate: format.sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let mut cursor = ChunkCursor::new(format.sample_format);
    let callback_state = Arc::clone(state);
    let callback_queue = Arc::clone(queue);
    let stream = match device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            fill_device_buffer(data, &callback_state, &callback_queue, &mut cursor);
        },
        |err| warn!("output stream error: {}", err),
        None,
    ) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(PlaybackError::device(format!(
                "failed to open output stream: {}",
                err
            ))));
            return;
        }
    };

    // Some backends hand streams over already running. Force the paused
    // baseline; backends that cannot pause still emit silence because the
    // callback checks the playback state first.
    if let Err(err) = stream.pause() {
        debug!("fresh output stream refused pause: {}", err);
    }
    let _ = ready.send(Ok(()));
    debug!(%player, channels = format.channels, sample_rate = format.sample_rate, "output stream open");

    loop {
        match commands.recv_timeout(POLL_INTERVAL) {
            Ok(OutputCommand::Play | OutputCommand::Resume) => {
                if let Err(err) = stream.play() {
                    warn!("could not start output stream: {}", err);
                }
            }
            Ok(OutputCommand::Pause | OutputCommand::Stop) => {
                if let Err(err) = stream.pause() {
                    debug!("could not pause output stream: {}", err);
                }
            }
            Ok(OutputCommand::Close) => break,
            Err(RecvTimeoutError::Timeout) => {
                if state.take_end_of_stream() {
                    let mut current = state.lock_state();
                    if *current == PlaybackState::Playing {
                        *current = PlaybackState::Stopped;
                        drop(current);
                        if let Err(err) = stream.pause() {
                            debug!("could not pause finished stream: {}", err);
                        }
                        debug!(%player, "stream finished");
                        listeners.dispatch(&PlayerEvent::EndOfStream { player });
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(stream);
    debug!(%player, "output stream closed");
}

/// Read position across callback invocations
struct ChunkCursor {
    sample_format: SampleFormat,
    generation: u64,
    chunk: Option<Chunk>,
    offset: usize,
}

impl ChunkCursor {
    fn new(sample_format: SampleFormat) -> Self {
        Self {
            sample_format,
            generation: 0,
            chunk: None,
            offset: 0,
        }
    }
}

/// The device data callback: chunk bytes to gain-scaled `f32` samples
fn fill_device_buffer(
    data: &mut [f32],
    state: &AudioState,
    queue: &ChunkQueue,
    cursor: &mut ChunkCursor,
) {
    if state.playback_state() != PlaybackState::Playing {
        data.fill(0.0);
        return;
    }

    // A seek/stop supersedes whatever the cursor was holding
    let generation = queue.current_generation();
    if cursor.generation != generation {
        cursor.generation = generation;
        cursor.chunk = None;
        cursor.offset = 0;
    }

    let gain = state.combined_gain();
    let bytes_per_sample = cursor.sample_format.bytes_per_sample();
    let mut written = 0;

    while written < data.len() {
        let Some(chunk) = cursor.chunk.take() else {
            match queue.try_pop() {
                Some(next) => {
                    cursor.offset = 0;
                    cursor.chunk = Some(next);
                    continue;
                }
                // Underrun (or fill idling at end of stream): leave the
                // rest silent rather than block on decode
                None => break,
            }
        };

        let remaining = chunk.bytes.len().saturating_sub(cursor.offset);
        if remaining < bytes_per_sample {
            cursor.offset = 0;
            if chunk.end_of_stream {
                state.flag_end_of_stream();
                break;
            }
            continue;
        }

        let take = (remaining / bytes_per_sample).min(data.len() - written);
        for _ in 0..take {
            let sample = match cursor.sample_format {
                SampleFormat::S16 => {
                    let lo = chunk.bytes[cursor.offset];
                    let hi = chunk.bytes[cursor.offset + 1];
                    f32::from(i16::from_le_bytes([lo, hi])) / 32768.0
                }
                SampleFormat::U8 => (f32::from(chunk.bytes[cursor.offset]) - 128.0) / 128.0,
            };
            data[written] = sample * gain;
            written += 1;
            cursor.offset += bytes_per_sample;
        }
        cursor.chunk = Some(chunk);
    }

    if written > 0 {
        state
            .consumed
            .fetch_add((written * bytes_per_sample) as u64, Ordering::Relaxed);
    }
    for sample in &mut data[written..] {
        *sample = 0.0;
    }
}

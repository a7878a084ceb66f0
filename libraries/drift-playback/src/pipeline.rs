//! File-backed playback pipeline
//!
//! [`PipelinePlayer`] wires one media file through the full chain: a
//! [`DecoderStream`] feeding a fill worker, a bounded chunk queue, and a
//! playback thread that owns the device stream. Control calls validate
//! state transitions synchronously and never block on audio work; the
//! two worker threads only ever learn about changes through channels and
//! the shared [`AudioState`].
//!
//! Time reporting is byte accounting: `base_bytes` is where the last
//! seek pointed the stream, `consumed` counts bytes the device callback
//! has played since. Seeks reset `consumed` and move `base_bytes`
//! optimistically; a seek the decoder cannot satisfy degrades to
//! end-of-stream on the fill thread.

use crate::buffer::{ChunkQueue, FillWorker};
use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::mixer::Mixer;
use crate::output::{AudioState, OutputCommand, PlaybackThread};
use crate::player::Player;
use drift_audio::{AudioError, DecoderStream, PcmFormat};
use drift_core::{ListenerSet, PlaybackState, PlayerEvent, PlayerId, PlayerListener};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// A player backed by one media file
///
/// Create one with [`PipelinePlayer::open`]; the returned handle is a
/// cheap-to-clone [`Arc`] that can be shared with listeners and control
/// surfaces. Dropping the last handle closes the pipeline.
#[derive(Debug)]
pub struct PipelinePlayer {
    id: PlayerId,
    format: PcmFormat,
    duration_secs: f32,
    byte_len: Option<u64>,
    shared: Arc<AudioState>,
    queue: Arc<ChunkQueue>,
    fill: FillWorker,
    thread: PlaybackThread,
    /// Byte position of the last seek; `consumed` counts from here
    base_bytes: AtomicU64,
    fade_time: Mutex<f32>,
    listeners: Arc<ListenerSet>,
}

impl PipelinePlayer {
    /// Open `path` and stand up the full decode-to-device pipeline
    ///
    /// Decode problems (missing file, unsupported container) surface
    /// before any device work, so callers can distinguish a bad file
    /// from a bad output device.
    pub fn open(
        path: impl AsRef<Path>,
        mixer: &Mixer,
        config: &PlaybackConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let path = path.as_ref();

        let stream = DecoderStream::open(path)?;
        let format = stream.format();
        let duration_secs = stream.duration().map_or(0.0, |d| d.as_secs_f32());
        let byte_len = stream.byte_len();

        let queue = Arc::new(ChunkQueue::new(config.buffered_chunks));
        let chunk_bytes = config.chunk_bytes(&format);
        let fill = FillWorker::spawn(
            stream,
            Arc::clone(&queue),
            chunk_bytes,
            config.shutdown_timeout(),
        );

        let shared = Arc::new(AudioState::new(mixer.master_gain()));
        let listeners = Arc::new(ListenerSet::new());
        let id = PlayerId::generate();

        let device = match mixer.open_device() {
            Ok(device) => device,
            Err(err) => {
                fill.shutdown();
                return Err(err);
            }
        };
        let thread = match PlaybackThread::spawn(
            device,
            format,
            Arc::clone(&shared),
            Arc::clone(&queue),
            Arc::clone(&listeners),
            id,
            config,
        ) {
            Ok(thread) => thread,
            Err(err) => {
                fill.shutdown();
                return Err(err);
            }
        };

        debug!(player = %id, path = %path.display(), duration_secs, "pipeline open");
        let player = Arc::new(Self {
            id,
            format,
            duration_secs,
            byte_len,
            shared,
            queue,
            fill,
            thread,
            base_bytes: AtomicU64::new(0),
            fade_time: Mutex::new(0.0),
            listeners,
        });
        let registered: Arc<dyn Player> = Arc::clone(&player) as Arc<dyn Player>;
        mixer.register(&registered);
        Ok(player)
    }

    /// Decoded sample layout of the backing file
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Point the fill worker back at byte zero and reset time accounting
    fn rewind_to_start(&self) {
        let generation = self.queue.invalidate();
        if let Err(err) = self.fill.seek(0, generation) {
            warn!(player = %self.id, "fill worker unreachable on rewind: {}", err);
        }
        self.base_bytes.store(0, Ordering::Release);
        self.shared.consumed.store(0, Ordering::Relaxed);
    }
}

impl Player for PipelinePlayer {
    fn play(&self) -> Result<()> {
        let mut state = self.shared.lock_state();
        match *state {
            PlaybackState::Closed => Err(PlaybackError::Closed),
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                self.thread.send(OutputCommand::Resume)?;
                *state = PlaybackState::Playing;
                drop(state);
                self.listeners
                    .dispatch(&PlayerEvent::Resumed { player: self.id });
                Ok(())
            }
            PlaybackState::Stopped => {
                // A finished stream points at its end; wind it back
                // before starting over. A stream positioned by a seek
                // (consumed still zero) starts from that position.
                if self.shared.consumed.load(Ordering::Relaxed) > 0 {
                    self.rewind_to_start();
                }
                self.shared.clear_end_of_stream();
                self.thread.send(OutputCommand::Play)?;
                *state = PlaybackState::Playing;
                drop(state);
                self.listeners
                    .dispatch(&PlayerEvent::Started { player: self.id });
                Ok(())
            }
        }
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.shared.lock_state();
        match *state {
            PlaybackState::Closed => Err(PlaybackError::Closed),
            PlaybackState::Stopped => Ok(()),
            PlaybackState::Playing | PlaybackState::Paused => {
                self.thread.send(OutputCommand::Stop)?;
                *state = PlaybackState::Stopped;
                drop(state);
                self.rewind_to_start();
                self.shared.clear_end_of_stream();
                self.listeners
                    .dispatch(&PlayerEvent::Stopped { player: self.id });
                Ok(())
            }
        }
    }

    fn pause(&self) -> Result<()> {
        let mut state = self.shared.lock_state();
        match *state {
            PlaybackState::Playing => {
                self.thread.send(OutputCommand::Pause)?;
                *state = PlaybackState::Paused;
                drop(state);
                self.listeners
                    .dispatch(&PlayerEvent::Paused { player: self.id });
                Ok(())
            }
            other => Err(PlaybackError::invalid_state("pause", other)),
        }
    }

    fn resume(&self) -> Result<()> {
        let mut state = self.shared.lock_state();
        match *state {
            PlaybackState::Paused => {
                self.thread.send(OutputCommand::Resume)?;
                *state = PlaybackState::Playing;
                drop(state);
                self.listeners
                    .dispatch(&PlayerEvent::Resumed { player: self.id });
                Ok(())
            }
            other => Err(PlaybackError::invalid_state("resume", other)),
        }
    }

    fn close(&self) -> Result<()> {
        {
            let mut state = self.shared.lock_state();
            if *state == PlaybackState::Closed {
                return Ok(());
            }
            *state = PlaybackState::Closed;
        }
        self.thread.shutdown();
        self.fill.shutdown();
        self.listeners
            .dispatch(&PlayerEvent::Closed { player: self.id });
        self.listeners.clear();
        debug!(player = %self.id, "pipeline closed");
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        self.shared.gain.set(volume);
    }

    fn volume(&self) -> f32 {
        self.shared.gain.get()
    }

    fn set_fade_gain(&self, gain: f32) {
        self.shared.gain.set_faded(gain);
    }

    fn set_fade_time(&self, seconds: f32) {
        let mut fade_time = self
            .fade_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *fade_time = seconds.max(0.0);
    }

    fn fade_time(&self) -> f32 {
        *self
            .fade_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_time(&self, seconds: f32) -> Result<()> {
        if self.shared.playback_state() == PlaybackState::Closed {
            return Err(PlaybackError::Closed);
        }
        let seconds = if seconds.is_finite() {
            seconds.max(0.0)
        } else {
            0.0
        };
        let target = self
            .format
            .align_to_frame(self.format.duration_to_bytes(Duration::from_secs_f32(seconds)));
        if let Some(length) = self.byte_len {
            if target > length {
                return Err(PlaybackError::Audio(AudioError::InvalidPosition {
                    requested: target,
                    length: Some(length),
                }));
            }
        }

        let generation = self.queue.invalidate();
        self.fill.seek(target, generation)?;
        // Report the target right away; a seek the decoder cannot honor
        // degrades to end-of-stream on the fill thread
        self.base_bytes.store(target, Ordering::Release);
        self.shared.consumed.store(0, Ordering::Relaxed);
        debug!(player = %self.id, target, "seek");
        Ok(())
    }

    fn time(&self) -> f32 {
        let bytes = self.base_bytes.load(Ordering::Acquire)
            + self.shared.consumed.load(Ordering::Relaxed);
        self.format.bytes_to_duration(bytes).as_secs_f32()
    }

    fn duration(&self) -> f32 {
        self.duration_secs
    }

    fn state(&self) -> PlaybackState {
        self.shared.playback_state()
    }

    fn id(&self) -> PlayerId {
        self.id
    }

    fn add_listener(&self, listener: Arc<dyn PlayerListener>) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn PlayerListener>) {
        self.listeners.remove(listener);
    }
}

impl Drop for PipelinePlayer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    // ==================== fixtures ====================

    fn sine_wav(dir: &std::path::Path, seconds: f32) -> PathBuf {
        let path = dir.join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        let frames = (44100.0 * seconds) as u32;
        for n in 0..frames {
            let sample = ((n as f32 * 0.02).sin() * 6000.0) as i16;
            writer.write_sample(sample).unwrap();
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn test_mixer() -> Option<Mixer> {
        Mixer::new().ok()
    }

    // ==================== device-backed tests ====================
    // Every test here skips silently when no output device exists.

    #[test]
    fn open_rejects_invalid_config() {
        let Some(mixer) = test_mixer() else { return };
        let dir = tempfile::tempdir().unwrap();
        let path = sine_wav(dir.path(), 0.1);

        let config = PlaybackConfig {
            chunk_ms: 0,
            ..PlaybackConfig::default()
        };
        let err = PipelinePlayer::open(&path, &mixer, &config).unwrap_err();
        assert!(
            matches!(err, PlaybackError::InvalidConfig(_)),
            "got {err:?}"
        );
    }

    #[test]
    fn open_missing_file_is_an_audio_error() {
        let Some(mixer) = test_mixer() else { return };
        let err = PipelinePlayer::open(
            "/definitely/not/here.wav",
            &mixer,
            &PlaybackConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PlaybackError::Audio(_)), "got {err:?}");
    }

    #[test]
    fn play_stop_round_trip() {
        let Some(mixer) = test_mixer() else { return };
        let dir = tempfile::tempdir().unwrap();
        let path = sine_wav(dir.path(), 0.5);

        let player = PipelinePlayer::open(&path, &mixer, &PlaybackConfig::default()).unwrap();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(player.duration() > 0.4 && player.duration() < 0.6);

        let starts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&starts);
        player.add_listener(Arc::new(move |event: &PlayerEvent| {
            if matches!(event, PlayerEvent::Started { .. }) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        }));

        player.play().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        // Idempotent while already playing
        player.play().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        player.stop().unwrap();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.time(), 0.0, "stop rewinds to the start");

        player.close().unwrap();
        assert_eq!(player.state(), PlaybackState::Closed);
        player.close().unwrap();
        assert!(matches!(player.play(), Err(PlaybackError::Closed)));
    }

    #[test]
    fn pause_requires_playing() {
        let Some(mixer) = test_mixer() else { return };
        let dir = tempfile::tempdir().unwrap();
        let path = sine_wav(dir.path(), 0.3);

        let player = PipelinePlayer::open(&path, &mixer, &PlaybackConfig::default()).unwrap();
        let err = player.pause().unwrap_err();
        assert!(
            matches!(
                err,
                PlaybackError::InvalidState {
                    operation: "pause",
                    state: PlaybackState::Stopped
                }
            ),
            "got {err:?}"
        );

        player.play().unwrap();
        player.pause().unwrap();
        assert_eq!(player.state(), PlaybackState::Paused);
        // play() from paused resumes rather than restarting
        player.play().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[test]
    fn seek_past_end_is_rejected_for_known_lengths() {
        let Some(mixer) = test_mixer() else { return };
        let dir = tempfile::tempdir().unwrap();
        let path = sine_wav(dir.path(), 0.2);

        let player = PipelinePlayer::open(&path, &mixer, &PlaybackConfig::default()).unwrap();
        let err = player.set_time(1000.0).unwrap_err();
        assert!(
            matches!(
                err,
                PlaybackError::Audio(AudioError::InvalidPosition { .. })
            ),
            "got {err:?}"
        );

        player.set_time(0.1).unwrap();
        assert!((player.time() - 0.1).abs() < 0.01, "got {}", player.time());
    }

    #[test]
    fn volume_clamps_but_fade_gain_does_not() {
        let Some(mixer) = test_mixer() else { return };
        let dir = tempfile::tempdir().unwrap();
        let path = sine_wav(dir.path(), 0.2);

        let player = PipelinePlayer::open(&path, &mixer, &PlaybackConfig::default()).unwrap();
        player.set_volume(1.8);
        assert_eq!(player.volume(), 1.0);
        player.set_fade_gain(1.13);
        assert!((player.volume() - 1.13).abs() < 1e-6, "overshoot preserved");
    }
}

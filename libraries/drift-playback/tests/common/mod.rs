//! Shared test double standing in for a real playback pipeline

use drift_core::{ListenerSet, PlaybackState, PlayerEvent, PlayerId, PlayerListener};
use drift_playback::{PlaybackError, Player, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory player with scriptable behavior
///
/// Control calls mutate state and dispatch events synchronously on the
/// calling thread, so tests observe deterministic ordering. A requested
/// fade-out keeps the player audible until [`FakePlayer::finish_fade_out`]
/// is called, mirroring how a real pipeline stays alive through its ramp.
pub struct FakePlayer {
    id: PlayerId,
    state: Mutex<PlaybackState>,
    volume: Mutex<f32>,
    fade_time: Mutex<f32>,
    position: Mutex<f32>,
    duration: f32,
    fail_play: bool,
    pub play_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub resume_calls: AtomicUsize,
    fade_out_requested: AtomicBool,
    gains: Mutex<Vec<f32>>,
    listeners: ListenerSet,
}

impl FakePlayer {
    pub fn new() -> Arc<Self> {
        Self::with_options(10.0, false)
    }

    /// A player whose `play()` always fails with a device error
    pub fn failing() -> Arc<Self> {
        Self::with_options(10.0, true)
    }

    pub fn with_options(duration: f32, fail_play: bool) -> Arc<Self> {
        Arc::new(Self {
            id: PlayerId::generate(),
            state: Mutex::new(PlaybackState::Stopped),
            volume: Mutex::new(1.0),
            fade_time: Mutex::new(1.0),
            position: Mutex::new(0.0),
            duration,
            fail_play,
            play_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            resume_calls: AtomicUsize::new(0),
            fade_out_requested: AtomicBool::new(false),
            gains: Mutex::new(Vec::new()),
            listeners: ListenerSet::new(),
        })
    }

    /// Every gain `set_fade_gain` received, in call order
    pub fn gain_log(&self) -> Vec<f32> {
        self.gains.lock().unwrap().clone()
    }

    pub fn fade_out_requested(&self) -> bool {
        self.fade_out_requested.load(Ordering::SeqCst)
    }

    /// Land a pending fade-out: stop and announce it
    pub fn finish_fade_out(&self) {
        *self.state.lock().unwrap() = PlaybackState::Stopped;
        self.listeners
            .dispatch(&PlayerEvent::Stopped { player: self.id });
    }

    /// Simulate the stream running out of audio
    pub fn emit_end_of_stream(&self) {
        *self.state.lock().unwrap() = PlaybackState::Stopped;
        self.listeners
            .dispatch(&PlayerEvent::EndOfStream { player: self.id });
    }
}

impl Player for FakePlayer {
    fn play(&self) -> Result<()> {
        if self.fail_play {
            return Err(PlaybackError::device("scripted play failure"));
        }
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = PlaybackState::Playing;
        self.listeners
            .dispatch(&PlayerEvent::Started { player: self.id });
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = PlaybackState::Stopped;
        self.listeners
            .dispatch(&PlayerEvent::Stopped { player: self.id });
        Ok(())
    }

    fn stop_with_fade(&self) -> Result<()> {
        // Stays audible until finish_fade_out(), like a real ramp
        self.fade_out_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if *state != PlaybackState::Playing {
            return Err(PlaybackError::invalid_state("pause", *state));
        }
        *state = PlaybackState::Paused;
        drop(state);
        self.listeners
            .dispatch(&PlayerEvent::Paused { player: self.id });
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.resume_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if *state != PlaybackState::Paused {
            return Err(PlaybackError::invalid_state("resume", *state));
        }
        *state = PlaybackState::Playing;
        drop(state);
        self.listeners
            .dispatch(&PlayerEvent::Resumed { player: self.id });
        Ok(())
    }

    fn close(&self) -> Result<()> {
        *self.state.lock().unwrap() = PlaybackState::Closed;
        self.listeners
            .dispatch(&PlayerEvent::Closed { player: self.id });
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock().unwrap() = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        *self.volume.lock().unwrap()
    }

    fn set_fade_gain(&self, gain: f32) {
        self.gains.lock().unwrap().push(gain);
        // Unclamped, mirroring the pipeline gain cell
        *self.volume.lock().unwrap() = gain;
    }

    fn set_fade_time(&self, seconds: f32) {
        *self.fade_time.lock().unwrap() = seconds.max(0.0);
    }

    fn fade_time(&self) -> f32 {
        *self.fade_time.lock().unwrap()
    }

    fn set_time(&self, seconds: f32) -> Result<()> {
        *self.position.lock().unwrap() = seconds;
        Ok(())
    }

    fn time(&self) -> f32 {
        *self.position.lock().unwrap()
    }

    fn duration(&self) -> f32 {
        self.duration
    }

    fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap()
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

/// Collects every event it sees, tagged with the publishing player
pub struct EventLog {
    events: Mutex<Vec<PlayerEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<PlayerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, matcher: impl Fn(&PlayerEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| matcher(e)).count()
    }
}

impl PlayerListener for EventLog {
    fn on_event(&self, event: &PlayerEvent) {
        self.events.lock().unwrap().push(*event);
    }
}

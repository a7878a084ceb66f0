//! Replay orchestration
//!
//! Decoders cannot seek backward cheaply, so replaying a sound that is
//! still audible means standing up a brand-new pipeline and letting the
//! old one fade out beside it. [`SlotPlayer`] hides that swap behind one
//! stable identity: it owns a pipeline factory, retires the previous
//! pipeline on re-trigger, and re-publishes every lifecycle event under
//! its own id so listeners never notice the exchange.

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::fade::FadingPlayer;
use crate::mixer::Mixer;
use crate::pipeline::PipelinePlayer;
use crate::player::{EventForwarder, Player};
use crate::transition::Transition;
use crate::volume::Gain;
use drift_core::{ListenerSet, PlaybackState, PlayerEvent, PlayerId, PlayerListener};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Builds a fresh pipeline for one more run of the slot's sound
pub type PipelineFactory = dyn Fn() -> Result<Arc<dyn Player>> + Send + Sync;

/// One logical sound position, stable across pipeline swaps
///
/// `play()` on a live slot does not rewind: it builds a replacement
/// pipeline from the factory and fades the old one out in parallel. The
/// previous instance keeps playing until its own fade-out finishes.
pub struct SlotPlayer {
    id: PlayerId,
    factory: Box<PipelineFactory>,
    backing: Mutex<Option<Arc<dyn Player>>>,
    /// Pipelines fading out after a replay, kept alive until they stop
    retired: Arc<Mutex<Vec<Arc<dyn Player>>>>,
    /// Stored settings applied to every pipeline the factory builds
    volume: Gain,
    fade_time: Mutex<f32>,
    closed: AtomicBool,
    forwarder: Arc<dyn PlayerListener>,
    listeners: Arc<ListenerSet>,
}

impl SlotPlayer {
    /// Create a slot around an arbitrary pipeline factory
    pub fn new<F>(factory: F) -> Arc<Self>
    where
        F: Fn() -> Result<Arc<dyn Player>> + Send + Sync + 'static,
    {
        let id = PlayerId::generate();
        let listeners = Arc::new(ListenerSet::new());
        let forwarder: Arc<dyn PlayerListener> =
            Arc::new(EventForwarder::new(id, Arc::clone(&listeners)));
        Arc::new(Self {
            id,
            factory: Box::new(factory),
            backing: Mutex::new(None),
            retired: Arc::new(Mutex::new(Vec::new())),
            volume: Gain::new(1.0),
            fade_time: Mutex::new(1.0),
            closed: AtomicBool::new(false),
            forwarder,
            listeners,
        })
    }

    /// Slot that replays `path` through fade-controlled pipelines
    pub fn for_file(
        path: impl Into<PathBuf>,
        mixer: Arc<Mixer>,
        config: PlaybackConfig,
        transition: Transition,
    ) -> Arc<Self> {
        let path = path.into();
        Self::new(move || {
            let pipeline = PipelinePlayer::open(&path, &mixer, &config)?;
            let player: Arc<dyn Player> =
                FadingPlayer::new(pipeline, transition.clone(), &config);
            Ok(player)
        })
    }

    /// Pipelines this slot keeps alive: the current one plus any still
    /// fading out
    pub fn live_pipelines(&self) -> usize {
        let current = self
            .backing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|p| p.state() != PlaybackState::Closed);
        let retiring = self
            .retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        usize::from(current) + retiring
    }

    fn stored_fade_time(&self) -> f32 {
        *self
            .fade_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<Arc<dyn Player>> {
        self.backing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PlaybackError::Closed);
        }
        Ok(())
    }

    /// Detach the old pipeline from the slot and wind it down
    ///
    /// With a zero fade time it closes on the spot. Otherwise it joins
    /// the retired roster and a private listener closes it once its own
    /// fade-out lands on `Stopped`.
    fn retire(&self, old: Arc<dyn Player>) {
        old.remove_listener(&self.forwarder);
        if old.fade_time() <= 0.0 {
            if let Err(err) = old.close() {
                warn!(slot = %self.id, "retired pipeline close failed: {}", err);
            }
            return;
        }

        {
            let mut retired = self
                .retired
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            retired.push(Arc::clone(&old));
        }

        let roster = Arc::clone(&self.retired);
        let handle = Arc::clone(&old);
        old.add_listener(Arc::new(move |event: &PlayerEvent| {
            if matches!(
                event,
                PlayerEvent::Stopped { .. }
                    | PlayerEvent::EndOfStream { .. }
                    | PlayerEvent::Closed { .. }
            ) {
                let mut retired = roster.lock().unwrap_or_else(PoisonError::into_inner);
                retired.retain(|p| !Arc::ptr_eq(p, &handle));
                drop(retired);
                if !matches!(event, PlayerEvent::Closed { .. }) {
                    if let Err(err) = handle.close() {
                        warn!("retired pipeline close failed: {}", err);
                    }
                }
            }
        }));

        if let Err(err) = old.stop_with_fade() {
            warn!(slot = %self.id, "retired pipeline would not fade out: {}", err);
            let _ = old.close();
            let mut retired = self
                .retired
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            retired.retain(|p| !Arc::ptr_eq(p, &old));
        }
    }
}

impl Player for SlotPlayer {
    fn play(&self) -> Result<()> {
        self.ensure_open()?;
        let mut backing = self.backing.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = backing.as_ref().map(Arc::clone) {
            match current.state() {
                // In-place paths run outside the slot lock so their
                // events cannot re-enter it
                PlaybackState::Paused => {
                    drop(backing);
                    return current.resume();
                }
                PlaybackState::Stopped => {
                    drop(backing);
                    return current.play();
                }
                PlaybackState::Playing => {
                    // Replay: the successor inherits the live settings
                    self.volume.set(current.volume());
                    *self
                        .fade_time
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = current.fade_time();
                    *backing = None;
                    self.retire(current);
                }
                PlaybackState::Closed => *backing = None,
            }
        }

        let fresh = (self.factory)()?;
        fresh.set_volume(self.volume.get());
        fresh.set_fade_time(self.stored_fade_time());
        fresh.add_listener(Arc::clone(&self.forwarder));
        *backing = Some(Arc::clone(&fresh));
        drop(backing);
        debug!(slot = %self.id, pipeline = %fresh.id(), "slot pipeline swapped in");
        fresh.play()
    }

    fn stop(&self) -> Result<()> {
        self.ensure_open()?;
        match self.current() {
            Some(current) => current.stop(),
            None => Ok(()),
        }
    }

    fn stop_with_fade(&self) -> Result<()> {
        self.ensure_open()?;
        match self.current() {
            Some(current) => current.stop_with_fade(),
            None => Ok(()),
        }
    }

    fn pause(&self) -> Result<()> {
        self.ensure_open()?;
        match self.current() {
            Some(current) => current.pause(),
            None => Err(PlaybackError::invalid_state(
                "pause",
                PlaybackState::Stopped,
            )),
        }
    }

    fn resume(&self) -> Result<()> {
        self.ensure_open()?;
        match self.current() {
            Some(current) => current.resume(),
            None => Err(PlaybackError::invalid_state(
                "resume",
                PlaybackState::Stopped,
            )),
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let backing = self
            .backing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(current) = backing {
            current.remove_listener(&self.forwarder);
            if let Err(err) = current.close() {
                warn!(slot = %self.id, "backing pipeline close failed: {}", err);
            }
        }

        let retiring = std::mem::take(
            &mut *self
                .retired
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for player in retiring {
            if let Err(err) = player.close() {
                warn!(slot = %self.id, "retired pipeline close failed: {}", err);
            }
        }

        self.listeners
            .dispatch(&PlayerEvent::Closed { player: self.id });
        self.listeners.clear();
        debug!(slot = %self.id, "slot closed");
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        self.volume.set(volume);
        if let Some(current) = self.current() {
            current.set_volume(self.volume.get());
        }
    }

    fn volume(&self) -> f32 {
        self.volume.get()
    }

    fn set_fade_time(&self, seconds: f32) {
        let seconds = seconds.max(0.0);
        *self
            .fade_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = seconds;
        if let Some(current) = self.current() {
            current.set_fade_time(seconds);
        }
    }

    fn fade_time(&self) -> f32 {
        self.stored_fade_time()
    }

    fn set_time(&self, seconds: f32) -> Result<()> {
        self.ensure_open()?;
        match self.current() {
            Some(current) => current.set_time(seconds),
            None => Err(PlaybackError::invalid_state(
                "set_time",
                PlaybackState::Stopped,
            )),
        }
    }

    fn time(&self) -> f32 {
        self.current().map_or(0.0, |current| current.time())
    }

    fn duration(&self) -> f32 {
        self.current().map_or(0.0, |current| current.duration())
    }

    fn state(&self) -> PlaybackState {
        if self.closed.load(Ordering::Acquire) {
            return PlaybackState::Closed;
        }
        self.current().map_or(PlaybackState::Stopped, |current| {
            match current.state() {
                // A pipeline someone closed externally does not close
                // the slot; the next play() rebuilds it
                PlaybackState::Closed => PlaybackState::Stopped,
                state => state,
            }
        })
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

impl Drop for SlotPlayer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

//! The player control surface
//!
//! Every pipeline stage and decorator implements the same narrow trait:
//! the concrete pipeline, the fade-controlled wrapper, and the slot
//! orchestrator all look identical to callers. Decorators exclusively own
//! the stage beneath them and compose by wrapping, not by inheriting.

use crate::error::Result;
use drift_core::{ListenerSet, PlaybackState, PlayerEvent, PlayerId, PlayerListener};
use std::sync::Arc;

/// Uniform control surface over a playback pipeline or decorator
///
/// Control calls are non-blocking: they mutate shared state (atomics,
/// bounded channel sends) that background threads observe. Only
/// construction of a concrete pipeline blocks, briefly, for the decoder
/// probe and the device handshake.
pub trait Player: Send + Sync {
    /// Start playback from the stopped state
    ///
    /// Starting an already-playing player is a no-op at this level; replay
    /// semantics live in the slot orchestrator.
    fn play(&self) -> Result<()>;

    /// Stop immediately, discard buffered data, rewind to the start
    fn stop(&self) -> Result<()>;

    /// Stop after fading out over the configured fade time
    ///
    /// Stages without fade support stop immediately.
    fn stop_with_fade(&self) -> Result<()> {
        self.stop()
    }

    /// Halt consumption, keeping buffered data and the device line
    fn pause(&self) -> Result<()>;

    /// Continue from the paused cursor
    fn resume(&self) -> Result<()>;

    /// Tear down threads and release the device line; terminal
    fn close(&self) -> Result<()>;

    /// Set the volume, clamped to `[0, 1]`
    fn set_volume(&self, volume: f32);

    /// Current volume in `[0, 1]`
    fn volume(&self) -> f32;

    /// Set the fade duration in seconds (negative values clamp to 0)
    fn set_fade_time(&self, seconds: f32);

    /// Configured fade duration in seconds
    fn fade_time(&self) -> f32;

    /// Seek to a playback position in seconds
    fn set_time(&self, seconds: f32) -> Result<()>;

    /// Current playback position in seconds
    fn time(&self) -> f32;

    /// Total duration in seconds; 0.0 when the source length is unknown
    fn duration(&self) -> f32;

    /// Current playback state
    fn state(&self) -> PlaybackState;

    /// Whether the player is currently playing
    fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Whether the player is paused
    fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    /// Whether the player has been closed
    fn is_closed(&self) -> bool {
        self.state() == PlaybackState::Closed
    }

    /// Identity this player publishes events under
    fn id(&self) -> PlayerId;

    /// Register a lifecycle event listener
    fn add_listener(&self, listener: Arc<dyn PlayerListener>);

    /// Unregister a listener previously registered with `add_listener`
    fn remove_listener(&self, listener: &Arc<dyn PlayerListener>);

    /// Fade-driver entry point for instantaneous gain updates
    ///
    /// Decorators forward this to the stage beneath them so overshooting
    /// curves reach the gain cell unclamped. The default is a plain
    /// clamped volume set for stages without a dedicated fade path.
    fn set_fade_gain(&self, gain: f32) {
        self.set_volume(gain.clamp(0.0, 1.0));
    }
}

/// Re-publishes inner events under a decorator's own identity
///
/// Attached by decorators to the stage beneath them so listeners on the
/// outer surface see one stable id regardless of what happens inside
/// (including pipeline swaps in the slot orchestrator).
pub(crate) struct EventForwarder {
    id: PlayerId,
    listeners: Arc<ListenerSet>,
}

impl EventForwarder {
    pub(crate) fn new(id: PlayerId, listeners: Arc<ListenerSet>) -> Self {
        Self { id, listeners }
    }
}

impl PlayerListener for EventForwarder {
    fn on_event(&self, event: &PlayerEvent) {
        self.listeners.dispatch(&event.with_player(self.id));
    }
}

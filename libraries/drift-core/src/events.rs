//! Playback lifecycle events
//!
//! Event-based communication between the playback pipelines and whatever is
//! listening (scenario glue, UI bridges, orchestration layers). Events are
//! emitted at state transitions and at natural end-of-stream.
//!
//! Listener registration is safe against concurrent dispatch: `ListenerSet`
//! snapshots the current listeners before iterating, so a listener may add
//! or remove listeners (including itself) from inside its callback without
//! deadlocking the dispatch.

use crate::types::PlayerId;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Events emitted by a player
///
/// Every event names the player it originated from. Decorators re-publish
/// inner events under their own identity, so a listener attached to a slot
/// player keeps seeing one stable id across pipeline swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// Playback started from the stopped state
    Started {
        /// Originating player
        player: PlayerId,
    },
    /// Playback stopped (explicitly, or after a completed fade-out)
    Stopped {
        /// Originating player
        player: PlayerId,
    },
    /// Playback paused; buffered data retained
    Paused {
        /// Originating player
        player: PlayerId,
    },
    /// Playback resumed from the paused cursor
    Resumed {
        /// Originating player
        player: PlayerId,
    },
    /// Player closed; no further events will follow
    Closed {
        /// Originating player
        player: PlayerId,
    },
    /// The decoded stream ran out naturally (or the fill loop degraded
    /// a read failure to end-of-stream)
    EndOfStream {
        /// Originating player
        player: PlayerId,
    },
}

impl PlayerEvent {
    /// The player this event originated from
    pub fn player(&self) -> PlayerId {
        match *self {
            Self::Started { player }
            | Self::Stopped { player }
            | Self::Paused { player }
            | Self::Resumed { player }
            | Self::Closed { player }
            | Self::EndOfStream { player } => player,
        }
    }

    /// Same event re-published under a different player identity
    pub fn with_player(self, player: PlayerId) -> Self {
        match self {
            Self::Started { .. } => Self::Started { player },
            Self::Stopped { .. } => Self::Stopped { player },
            Self::Paused { .. } => Self::Paused { player },
            Self::Resumed { .. } => Self::Resumed { player },
            Self::Closed { .. } => Self::Closed { player },
            Self::EndOfStream { .. } => Self::EndOfStream { player },
        }
    }
}

/// Receiver of player lifecycle events
///
/// Callbacks run on pipeline-internal threads. Implementations must not
/// block for long; heavy work belongs on the listener's own executor.
pub trait PlayerListener: Send + Sync {
    /// Called for every event the player publishes
    fn on_event(&self, event: &PlayerEvent);
}

impl<F> PlayerListener for F
where
    F: Fn(&PlayerEvent) + Send + Sync,
{
    fn on_event(&self, event: &PlayerEvent) {
        self(event);
    }
}

/// Registry of listeners with copy-on-iterate dispatch
///
/// Dispatch takes a snapshot of the current listener set and iterates the
/// snapshot with no lock held, so listeners may mutate the registry from
/// their callbacks. Removal matches by `Arc` identity, not by value.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<Arc<dyn PlayerListener>>>,
}

impl ListenerSet {
    /// Create an empty listener set
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking listener must not wedge every later dispatch
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn PlayerListener>>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener
    pub fn add(&self, listener: Arc<dyn PlayerListener>) {
        self.lock().push(listener);
    }

    /// Unregister a listener previously passed to [`ListenerSet::add`]
    ///
    /// Returns `true` if the listener was found and removed.
    pub fn remove(&self, listener: &Arc<dyn PlayerListener>) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Drop all listeners (used when a player closes)
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish an event to every listener registered at dispatch time
    pub fn dispatch(&self, event: &PlayerEvent) {
        // Snapshot under the lock, iterate without it
        let snapshot: Vec<Arc<dyn PlayerListener>> = self.lock().clone();
        for listener in snapshot {
            listener.on_event(event);
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl PlayerListener for Counter {
        fn on_event(&self, _event: &PlayerEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatch_reaches_all_listeners() {
        let set = ListenerSet::new();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let b = Arc::new(Counter(AtomicUsize::new(0)));
        set.add(a.clone());
        set.add(b.clone());

        let id = PlayerId::generate();
        set.dispatch(&PlayerEvent::Started { player: id });

        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_matches_by_identity() {
        let set = ListenerSet::new();
        let a: Arc<dyn PlayerListener> = Arc::new(Counter(AtomicUsize::new(0)));
        let b: Arc<dyn PlayerListener> = Arc::new(Counter(AtomicUsize::new(0)));
        set.add(a.clone());

        assert!(!set.remove(&b), "unrelated listener must not match");
        assert!(set.remove(&a));
        assert!(set.is_empty());
    }

    #[test]
    fn listener_may_remove_itself_during_dispatch() {
        struct SelfRemover {
            set: Arc<ListenerSet>,
            me: Mutex<Option<Arc<dyn PlayerListener>>>,
            fired: AtomicUsize,
        }

        impl PlayerListener for SelfRemover {
            fn on_event(&self, _event: &PlayerEvent) {
                self.fired.fetch_add(1, Ordering::SeqCst);
                if let Some(me) = self.me.lock().unwrap().take() {
                    self.set.remove(&me);
                }
            }
        }

        let set = Arc::new(ListenerSet::new());
        let remover = Arc::new(SelfRemover {
            set: set.clone(),
            me: Mutex::new(None),
            fired: AtomicUsize::new(0),
        });
        let as_listener: Arc<dyn PlayerListener> = remover.clone();
        *remover.me.lock().unwrap() = Some(as_listener.clone());
        set.add(as_listener);

        let id = PlayerId::generate();
        set.dispatch(&PlayerEvent::Stopped { player: id });
        set.dispatch(&PlayerEvent::Stopped { player: id });

        // First dispatch fires and removes; second finds nothing
        assert_eq!(remover.fired.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn event_identity_rewrite() {
        let original = PlayerId::generate();
        let forwarded = PlayerId::generate();
        let event = PlayerEvent::EndOfStream { player: original };

        let republished = event.with_player(forwarded);
        assert_eq!(republished.player(), forwarded);
        assert!(matches!(republished, PlayerEvent::EndOfStream { .. }));
    }

    #[test]
    fn events_serialize_with_player_identity() {
        let id = PlayerId::generate();
        let event = PlayerEvent::Paused { player: id };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Paused"));
        assert!(json.contains(&id.to_string()));
    }
}

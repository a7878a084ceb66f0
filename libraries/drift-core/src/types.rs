//! Identity and state types for Drift Player pipelines

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Player identifier
///
/// Tags every lifecycle event with the player that emitted it. Decorator
/// layers (fading player, slot player) each carry their own id so listeners
/// can tell which surface an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Generate a new random player ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::generate()
    }
}

/// Playback state of a pipeline
///
/// `Closed` is terminal: no transition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Not playing; buffered data discarded, decoder at position 0
    Stopped,
    /// Actively submitting frames to the output device
    Playing,
    /// Consumption halted, buffered data and device line retained
    Paused,
    /// Torn down; the pipeline can never be used again
    Closed,
}

impl PlaybackState {
    /// Whether the pipeline still holds live resources (threads, device line)
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }

    /// Whether this state permits a transition to `next`
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Stopped => matches!(next, Self::Playing | Self::Closed),
            Self::Playing => matches!(next, Self::Paused | Self::Stopped | Self::Closed),
            Self::Paused => matches!(next, Self::Playing | Self::Stopped | Self::Closed),
            Self::Closed => false,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_ids_are_unique() {
        let a = PlayerId::generate();
        let b = PlayerId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn player_id_serializes_transparently() {
        let id = PlayerId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let back: PlayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn closed_is_terminal() {
        for next in [
            PlaybackState::Stopped,
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Closed,
        ] {
            assert!(!PlaybackState::Closed.can_transition_to(next));
        }
    }

    #[test]
    fn stopped_cannot_pause() {
        assert!(!PlaybackState::Stopped.can_transition_to(PlaybackState::Paused));
        assert!(PlaybackState::Stopped.can_transition_to(PlaybackState::Playing));
    }

    #[test]
    fn pause_resume_round_trip_is_legal() {
        assert!(PlaybackState::Playing.can_transition_to(PlaybackState::Paused));
        assert!(PlaybackState::Paused.can_transition_to(PlaybackState::Playing));
    }

    #[test]
    fn active_states() {
        assert!(PlaybackState::Playing.is_active());
        assert!(PlaybackState::Paused.is_active());
        assert!(!PlaybackState::Stopped.is_active());
        assert!(!PlaybackState::Closed.is_active());
    }
}

//! Playback-layer errors

use drift_audio::AudioError;
use drift_core::PlaybackState;
use thiserror::Error;

/// Result type alias using `PlaybackError`
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Playback error types
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Decode-layer failure (bad source, unsupported codec, mid-stream I/O)
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Output device unavailable or the stream format was rejected
    #[error("Device error: {0}")]
    Device(String),

    /// The call is not valid in the player's current state
    #[error("Invalid operation '{operation}' while {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the player was in
        state: PlaybackState,
    },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The player was closed and can no longer be used
    #[error("Player is closed")]
    Closed,

    /// An internal channel to a pipeline thread is gone
    #[error("Channel disconnected: {0}")]
    ChannelDisconnected(&'static str),
}

impl PlaybackError {
    /// Build a [`PlaybackError::Device`] from any displayable cause
    pub fn device(msg: impl std::fmt::Display) -> Self {
        Self::Device(msg.to_string())
    }

    /// Build a [`PlaybackError::InvalidState`] for `operation` attempted in `state`
    pub fn invalid_state(operation: &'static str, state: PlaybackState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Build a [`PlaybackError::InvalidConfig`] from any displayable cause
    pub fn invalid_config(msg: impl std::fmt::Display) -> Self {
        Self::InvalidConfig(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_errors_convert() {
        let audio = AudioError::decode("truncated packet");
        let playback: PlaybackError = audio.into();
        assert!(matches!(playback, PlaybackError::Audio(_)));
    }

    #[test]
    fn invalid_state_names_operation_and_state() {
        let err = PlaybackError::invalid_state("resume", PlaybackState::Stopped);
        let msg = err.to_string();
        assert!(msg.contains("resume"), "message was: {}", msg);
        assert!(msg.contains("stopped"), "message was: {}", msg);
    }

    #[test]
    fn device_helper_formats_cause() {
        let err = PlaybackError::device("no default output device");
        assert!(err.to_string().contains("no default output device"));
    }
}

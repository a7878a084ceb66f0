//! Decode-layer errors

use thiserror::Error;

/// Result type alias using `AudioError`
pub type Result<T> = std::result::Result<T, AudioError>;

/// Audio error types
#[derive(Error, Debug)]
pub enum AudioError {
    /// The container/codec could not be handled at all
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The source probed fine but decoding failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// The requested byte position is not reachable
    #[error("Invalid position: {requested} (length {length:?})")]
    InvalidPosition {
        /// Requested decoded-byte position
        requested: u64,
        /// Known stream length, if any
        length: Option<u64>,
    },

    /// The stream was closed and can no longer be read
    #[error("Stream is closed")]
    StreamClosed,

    /// I/O error from the underlying media source
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AudioError {
    /// Build an [`AudioError::UnsupportedFormat`] from any displayable cause
    pub fn unsupported(msg: impl std::fmt::Display) -> Self {
        Self::UnsupportedFormat(msg.to_string())
    }

    /// Build an [`AudioError::Decode`] from any displayable cause
    pub fn decode(msg: impl std::fmt::Display) -> Self {
        Self::Decode(msg.to_string())
    }
}

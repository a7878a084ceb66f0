//! Drift Player Core
//!
//! Shared vocabulary for the Drift Player playback engine.
//!
//! This crate holds the types every other playback crate agrees on:
//! player identity, the playback state machine, lifecycle events, and the
//! listener registry used to publish those events. It stays free of audio
//! and device dependencies so event consumers (UI bridges, scenario glue)
//! can link against it without pulling in a decoder or an output backend.
//!
//! # Example
//!
//! ```rust
//! use drift_core::{PlaybackState, PlayerEvent, PlayerId};
//!
//! let id = PlayerId::generate();
//! let event = PlayerEvent::Started { player: id };
//! assert_eq!(event.player(), id);
//! assert!(PlaybackState::Stopped.can_transition_to(PlaybackState::Playing));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod events;
pub mod types;

// Re-export commonly used types
pub use events::{ListenerSet, PlayerEvent, PlayerListener};
pub use types::{PlaybackState, PlayerId};

//! Drift Player - Playback Layer
//!
//! Everything between decoded PCM and the speaker: buffered streaming
//! through a bounded chunk queue, a playback thread owning the `cpal`
//! output stream, per-pipeline and master gain, fade transitions, and
//! replay orchestration.
//!
//! The layer is built from small pieces that stack:
//!
//! - [`PipelinePlayer`] plays one file through decode, queue, and device.
//! - [`FadingPlayer`] wraps any [`Player`] and ramps gain through a
//!   [`Transition`] instead of starting or stopping abruptly.
//! - [`SlotPlayer`] re-triggers a sound by swapping in a fresh pipeline
//!   while the previous one fades out beside it.
//! - [`Mixer`] owns the output device, a master gain, and teardown.
//!
//! Control calls never block on audio work; threads communicate over
//! bounded channels and a handful of atomics.
//!
//! # Example
//!
//! ```rust,no_run
//! use drift_playback::{Mixer, PlaybackConfig, Player, SlotPlayer, Transition};
//! use std::sync::Arc;
//!
//! # fn main() -> drift_playback::Result<()> {
//! let mixer = Arc::new(Mixer::new()?);
//! let slot = SlotPlayer::for_file(
//!     "/sounds/rain.ogg",
//!     Arc::clone(&mixer),
//!     PlaybackConfig::default(),
//!     Transition::power(2.0),
//! );
//!
//! slot.set_fade_time(1.5);
//! slot.play()?;
//! // Re-triggering while audible crossfades into a fresh pipeline
//! slot.play()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod config;
pub mod error;
pub mod fade;
pub mod mixer;
mod output;
pub mod pipeline;
pub mod player;
pub mod slot;
pub mod transition;
pub mod volume;

// Re-export commonly used types
pub use drift_core::{PlaybackState, PlayerEvent, PlayerId, PlayerListener};

pub use buffer::{Chunk, ChunkQueue};
pub use config::PlaybackConfig;
pub use error::{PlaybackError, Result};
pub use fade::{fade_gain, FadeDirection, FadePhase, FadingPlayer};
pub use mixer::{DeviceInfo, Mixer};
pub use pipeline::PipelinePlayer;
pub use player::Player;
pub use slot::{PipelineFactory, SlotPlayer};
pub use transition::Transition;
pub use volume::Gain;

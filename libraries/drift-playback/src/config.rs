//! Playback pipeline tuning knobs
//!
//! One `PlaybackConfig` is shared by every stage of a pipeline: the fill
//! thread sizes its chunks from it, the playback thread takes its startup
//! and shutdown deadlines from it, and the fade driver takes its tick
//! cadence from it. The defaults are what the desktop application ships.

use crate::error::{PlaybackError, Result};
use drift_audio::PcmFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning parameters for a playback pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Milliseconds of audio per buffered chunk (default: 250)
    pub chunk_ms: u32,

    /// Chunks held between the fill thread and the device callback (default: 8)
    pub buffered_chunks: usize,

    /// Fade driver tick interval in milliseconds (default: 25)
    pub fade_tick_ms: u64,

    /// How long pipeline construction may wait for the output stream to
    /// open before giving up (default: 2000)
    pub startup_timeout_ms: u64,

    /// How long teardown waits for pipeline threads before detaching them
    /// (default: 500)
    pub shutdown_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_ms: 250,
            buffered_chunks: 8,
            fade_tick_ms: 25,
            startup_timeout_ms: 2000,
            shutdown_timeout_ms: 500,
        }
    }
}

impl PlaybackConfig {
    /// Check that every field is usable; pipelines call this once at
    /// construction so a bad config fails before any thread is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_ms == 0 {
            return Err(PlaybackError::invalid_config("chunk_ms must be at least 1"));
        }
        if self.buffered_chunks == 0 {
            return Err(PlaybackError::invalid_config(
                "buffered_chunks must be at least 1",
            ));
        }
        if self.fade_tick_ms == 0 {
            return Err(PlaybackError::invalid_config(
                "fade_tick_ms must be at least 1",
            ));
        }
        Ok(())
    }

    /// Audio covered by one chunk
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.chunk_ms))
    }

    /// Bytes per chunk for `format`, frame-aligned, never zero
    pub fn chunk_bytes(&self, format: &PcmFormat) -> usize {
        let raw = format.bytes_per_second() as u64 * u64::from(self.chunk_ms) / 1000;
        let aligned = format.align_to_frame(raw) as usize;
        aligned.max(format.frame_size())
    }

    /// Fade driver tick interval
    pub fn fade_tick(&self) -> Duration {
        Duration::from_millis(self.fade_tick_ms)
    }

    /// Construction deadline for the output stream handshake
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Teardown deadline before pipeline threads are detached
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

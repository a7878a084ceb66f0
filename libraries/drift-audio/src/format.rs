//! Decoded PCM format description
//!
//! The decode layer emits raw interleaved PCM bytes; `PcmFormat` is the
//! contract telling consumers how to interpret them. Two byte layouts
//! exist: unsigned 8-bit (only when the source is natively 8-bit) and
//! signed 16-bit little-endian (everything else).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Byte layout of one decoded sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Unsigned 8-bit PCM (silence at 128)
    U8,
    /// Signed 16-bit little-endian PCM (silence at 0)
    S16,
}

impl SampleFormat {
    /// Bytes occupied by one sample of this format
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
        }
    }
}

/// Interleaved PCM stream format
///
/// Channel count and sample rate always mirror the source file; only the
/// sample layout is negotiated (see [`SampleFormat`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    /// Number of interleaved channels
    pub channels: u16,
    /// Frames per second
    pub sample_rate: u32,
    /// Byte layout of each sample
    pub sample_format: SampleFormat,
}

impl PcmFormat {
    /// Create a new format descriptor
    pub fn new(channels: u16, sample_rate: u32, sample_format: SampleFormat) -> Self {
        Self {
            channels,
            sample_rate,
            sample_format,
        }
    }

    /// Bytes occupied by one frame (one sample per channel)
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    /// Bytes of PCM representing one second of audio
    pub fn bytes_per_second(&self) -> usize {
        self.frame_size() * self.sample_rate as usize
    }

    /// Round a byte position down to the nearest frame boundary
    pub fn align_to_frame(&self, bytes: u64) -> u64 {
        let frame = self.frame_size() as u64;
        bytes - (bytes % frame)
    }

    /// Byte count covering `duration` of audio, frame-aligned
    pub fn duration_to_bytes(&self, duration: Duration) -> u64 {
        let micros = duration.as_micros() as u64;
        let exact = micros * self.sample_rate as u64 * self.frame_size() as u64 / 1_000_000;
        self.align_to_frame(exact)
    }

    /// Playback time represented by `bytes` of PCM
    pub fn bytes_to_duration(&self, bytes: u64) -> Duration {
        let bps = self.bytes_per_second() as f64;
        Duration::from_secs_f64(bytes as f64 / bps)
    }
}

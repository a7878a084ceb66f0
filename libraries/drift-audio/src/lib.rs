//! Drift Player - Decode Layer
//!
//! Streaming decode of media files into seekable PCM byte streams.
//!
//! This crate wraps Symphonia behind a deliberately small surface:
//! [`DecoderStream`] opens a file, negotiates a PCM byte format
//! ([`PcmFormat`]), and then behaves like a forward-readable, restartable
//! byte stream. It knows nothing about output devices, buffering, or
//! volume; those concerns live in `drift-playback`.
//!
//! # Supported formats
//!
//! Containers and codecs are whatever the enabled Symphonia features
//! provide (mp3, flac, ogg/vorbis, wav, aac, m4a). Decoded output is
//! unsigned 8-bit PCM only when the source is natively 8-bit, otherwise
//! signed 16-bit little-endian, always at the source channel count and
//! sample rate.
//!
//! # Example
//!
//! ```rust,no_run
//! use drift_audio::DecoderStream;
//!
//! # fn main() -> drift_audio::Result<()> {
//! let mut stream = DecoderStream::open("/sounds/rain.ogg")?;
//! let format = stream.format();
//!
//! let mut pcm = vec![0u8; format.bytes_per_second()];
//! let n = stream.read(&mut pcm)?;
//! println!("decoded {} bytes of {:?}", n, format.sample_format);
//!
//! // Rewind: forces a fresh decode from the top of the file
//! stream.set_position(0)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod convert;
pub mod error;
pub mod format;
pub mod stream;

// Re-export commonly used types
pub use error::{AudioError, Result};
pub use format::{PcmFormat, SampleFormat};
pub use stream::DecoderStream;

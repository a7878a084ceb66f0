//! Seekable decoded-PCM byte stream over a Symphonia decoder
//!
//! `DecoderStream` turns a compressed source file into a forward-readable
//! stream of interleaved PCM bytes. Compressed decoders cannot seek
//! backward, so positioning is layered on top of forward decode:
//!
//! - forward targets discard decoded bytes through a scratch buffer sized
//!   to one second of audio
//! - backward targets reopen the container from scratch and then discard
//!   forward from byte 0
//!
//! The negotiated byte format is unsigned 8-bit only when the source is
//! natively 8-bit; everything else decodes to signed 16-bit little-endian.
//! Channel count and sample rate always mirror the source.

use crate::convert::decoded_to_bytes;
use crate::error::{AudioError, Result};
use crate::format::{PcmFormat, SampleFormat};
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Decoder half that is rebuilt on every reopen
struct DecodeParts {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    is_eof: bool,
}

/// Seekable PCM byte stream decoded from a media file
///
/// Positions and lengths are in decoded-byte units and stay frame-aligned.
/// `read` returning `Ok(0)` means end of stream (for a non-empty buffer).
pub struct DecoderStream {
    path: PathBuf,
    format: PcmFormat,
    byte_len: Option<u64>,
    parts: Option<DecodeParts>,
    /// Decoded bytes not yet handed to the caller
    carry: VecDeque<u8>,
    /// Scratch for converting one packet
    packet_buf: Vec<u8>,
    position: u64,
    reopens: u64,
}

impl DecoderStream {
    /// Open a media file and negotiate the decoded byte format
    ///
    /// Only metadata and decoder setup happen here; packets are decoded
    /// on demand during `read`.
    ///
    /// # Errors
    /// Unsupported or corrupt sources fail here with
    /// [`AudioError::UnsupportedFormat`] or [`AudioError::Decode`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let parts = Self::open_parts(&path)?;

        // Negotiate the output byte format from the source track
        let track = parts
            .reader
            .tracks()
            .iter()
            .find(|t| t.id == parts.track_id)
            .ok_or_else(|| AudioError::decode("selected track disappeared after probe"))?;
        let params = &track.codec_params;

        let sample_rate = params.sample_rate.unwrap_or(44100);
        let channels = params.channels.map(|c| c.count()).unwrap_or(2) as u16;
        let sample_format = if params.bits_per_sample == Some(8) {
            SampleFormat::U8
        } else {
            SampleFormat::S16
        };
        let format = PcmFormat::new(channels, sample_rate, sample_format);

        // Best-effort length: duration metadata first, then a raw frame
        // count, otherwise unknown
        let byte_len = match (params.time_base, params.n_frames) {
            (Some(time_base), Some(n_frames)) => {
                let time = time_base.calc_time(n_frames);
                let micros = time.seconds * 1_000_000 + (time.frac * 1_000_000.0) as u64;
                let bytes = micros * u64::from(sample_rate) * format.frame_size() as u64 / 1_000_000;
                Some(format.align_to_frame(bytes))
            }
            (None, Some(n_frames)) => Some(n_frames * format.frame_size() as u64),
            _ => None,
        };

        debug!(
            "opened {}: {} Hz, {} ch, {:?}, length {:?} bytes",
            path.display(),
            sample_rate,
            channels,
            sample_format,
            byte_len
        );

        Ok(Self {
            path,
            format,
            byte_len,
            parts: Some(parts),
            carry: VecDeque::new(),
            packet_buf: Vec::new(),
            position: 0,
            reopens: 0,
        })
    }

    /// Probe the container and build a decoder for the default track
    fn open_parts(path: &Path) -> Result<DecodeParts> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::unsupported(format!("failed to probe file: {}", e)))?;

        let reader = probed.format;
        let track = reader
            .default_track()
            .ok_or_else(|| AudioError::unsupported("no audio tracks found"))?;
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::unsupported(format!("failed to create decoder: {}", e)))?;

        Ok(DecodeParts {
            reader,
            decoder,
            track_id,
            is_eof: false,
        })
    }

    /// The negotiated decoded format
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Source path this stream decodes
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current position in decoded bytes
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Best-effort total length in decoded bytes (`None` = unknown)
    pub fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }

    /// Best-effort total duration (`None` = unknown)
    pub fn duration(&self) -> Option<Duration> {
        self.byte_len.map(|b| self.format.bytes_to_duration(b))
    }

    /// Number of full container reopens performed for backward seeks
    pub fn reopen_count(&self) -> u64 {
        self.reopens
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.parts.is_none()
    }

    /// Read decoded bytes into `buf`
    ///
    /// Blocks on decode as needed. Returns the number of bytes written,
    /// which may be less than `buf.len()` near end of stream; `Ok(0)` for a
    /// non-empty `buf` means the stream is exhausted.
    ///
    /// # Errors
    /// [`AudioError::StreamClosed`] after `close`; decode and I/O failures
    /// propagate as-is.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.parts.is_none() {
            return Err(AudioError::StreamClosed);
        }

        let mut written = 0;
        while written < buf.len() {
            if self.carry.is_empty() && !self.decode_next_packet()? {
                break;
            }

            let n = self.carry.len().min(buf.len() - written);
            for (dst, src) in buf[written..written + n].iter_mut().zip(self.carry.drain(..n)) {
                *dst = src;
            }
            written += n;
        }

        self.position += written as u64;
        Ok(written)
    }

    /// Decode the next packet of the selected track into the carry buffer
    ///
    /// Returns `Ok(false)` once the stream is exhausted.
    fn decode_next_packet(&mut self) -> Result<bool> {
        let parts = self.parts.as_mut().ok_or(AudioError::StreamClosed)?;
        if parts.is_eof {
            return Ok(false);
        }

        let packet = match parts.reader.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                parts.is_eof = true;
                return Ok(false);
            }
            Err(symphonia::core::errors::Error::IoError(e)) => {
                return Err(AudioError::Io(e));
            }
            Err(e) => {
                return Err(AudioError::decode(format!("error reading packet: {}", e)));
            }
        };

        // Skip packets from other tracks
        if packet.track_id() != parts.track_id {
            return Ok(true);
        }

        let decoded = parts
            .decoder
            .decode(&packet)
            .map_err(|e| AudioError::decode(format!("decode error: {}", e)))?;

        self.packet_buf.clear();
        decoded_to_bytes(&decoded, self.format.sample_format, &mut self.packet_buf);
        self.carry.extend(self.packet_buf.iter().copied());

        Ok(true)
    }

    /// Move the read position to `target` decoded bytes
    ///
    /// The target is rounded down to a frame boundary. Targets before the
    /// current position force a full reopen followed by a forward discard
    /// from byte 0; targets at or past the current position discard forward
    /// through a one-second scratch buffer. Returns the position actually
    /// reached, which is short of the target only when the stream ends
    /// first.
    ///
    /// # Errors
    /// [`AudioError::InvalidPosition`] when the target lies beyond the known
    /// stream length; [`AudioError::StreamClosed`] after `close`.
    pub fn set_position(&mut self, target: u64) -> Result<u64> {
        if self.parts.is_none() {
            return Err(AudioError::StreamClosed);
        }

        let target = self.format.align_to_frame(target);
        if let Some(len) = self.byte_len {
            if target > len {
                return Err(AudioError::InvalidPosition {
                    requested: target,
                    length: self.byte_len,
                });
            }
        }

        if target < self.position {
            self.reopen()?;
        }
        self.skip_forward(target)?;
        Ok(self.position)
    }

    /// Discard decoded bytes until `target` or end of stream
    fn skip_forward(&mut self, target: u64) -> Result<()> {
        // Scratch sized to one second of audio
        let mut scratch = vec![0u8; self.format.bytes_per_second()];
        while self.position < target {
            let want = ((target - self.position) as usize).min(scratch.len());
            let n = self.read(&mut scratch[..want])?;
            if n == 0 {
                debug!(
                    "skip hit end of stream at {} (target {})",
                    self.position, target
                );
                break;
            }
        }
        Ok(())
    }

    /// Rebuild the reader and decoder from scratch, resetting to byte 0
    fn reopen(&mut self) -> Result<()> {
        debug!("reopening {} for backward seek", self.path.display());
        let parts = Self::open_parts(&self.path)?;
        self.parts = Some(parts);
        self.carry.clear();
        self.position = 0;
        self.reopens += 1;
        Ok(())
    }

    /// Release decoder resources; subsequent reads fail
    pub fn close(&mut self) {
        self.parts = None;
        self.carry.clear();
        self.carry.shrink_to_fit();
    }
}

impl std::fmt::Debug for DecoderStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderStream")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("position", &self.position)
            .field("byte_len", &self.byte_len)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_file_fails() {
        let err = DecoderStream::open("/nonexistent/missing.wav").unwrap_err();
        assert!(matches!(err, AudioError::Io(_)));
    }

    #[test]
    fn open_garbage_fails_as_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"this is definitely not audio data").unwrap();

        let err = DecoderStream::open(&path).unwrap_err();
        assert!(
            matches!(err, AudioError::UnsupportedFormat(_) | AudioError::Decode(_)),
            "unexpected error: {err}"
        );
    }
}

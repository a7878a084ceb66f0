//! Sample conversion from decoded Symphonia buffers to wire PCM bytes
//!
//! The decoder hands back planar buffers in whatever sample type the codec
//! produced (F32, F64, S8..S32, U8..U32). This module interleaves them and
//! rescales every layout through a common signed-16-bit intermediate, then
//! emits bytes in the negotiated [`SampleFormat`]:
//!
//! - **S16**: little-endian signed 16-bit, the default target
//! - **U8**: top byte re-biased to unsigned, used only when the source is
//!   natively 8-bit (the i16 detour is exact for that case)
//!
//! Only the per-sample rescale closure changes per source layout; the
//! interleaving logic is shared.

use crate::format::SampleFormat;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};

/// Interleave a planar buffer and append it to `out` in the target layout
///
/// # Type Parameters
/// * `T` - Source sample type
/// * `F` - Rescale function: T -> i16 full-scale
fn interleave_bytes<T, F>(
    buf: &AudioBuffer<T>,
    target: SampleFormat,
    out: &mut Vec<u8>,
    rescale: F,
) where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> i16,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    out.reserve(frames * channels * target.bytes_per_sample());

    for frame_idx in 0..frames {
        for ch in 0..channels {
            let sample = rescale(buf.chan(ch)[frame_idx]);
            match target {
                SampleFormat::S16 => out.extend_from_slice(&sample.to_le_bytes()),
                SampleFormat::U8 => out.push((((sample as i32) >> 8) + 128) as u8),
            }
        }
    }
}

/// Convert one decoded packet to interleaved PCM bytes
///
/// Handles all Symphonia sample formats. Channel count and order are
/// preserved as decoded.
pub(crate) fn decoded_to_bytes(
    decoded: &AudioBufferRef<'_>,
    target: SampleFormat,
    out: &mut Vec<u8>,
) {
    match decoded {
        // Float formats - clamp and scale to full 16-bit range
        AudioBufferRef::F32(buf) => {
            interleave_bytes(buf, target, out, |s| {
                (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
            });
        }
        AudioBufferRef::F64(buf) => {
            interleave_bytes(buf, target, out, |s| {
                (s.clamp(-1.0, 1.0) * f64::from(i16::MAX)) as i16
            });
        }

        // Signed integer formats - shift into 16-bit range
        AudioBufferRef::S8(buf) => {
            interleave_bytes(buf, target, out, |s| i16::from(s) << 8);
        }
        AudioBufferRef::S16(buf) => {
            interleave_bytes(buf, target, out, |s| s);
        }
        AudioBufferRef::S24(buf) => {
            interleave_bytes(buf, target, out, |s| (s.inner() >> 8) as i16);
        }
        AudioBufferRef::S32(buf) => {
            interleave_bytes(buf, target, out, |s| (s >> 16) as i16);
        }

        // Unsigned integer formats - remove bias, then shift
        AudioBufferRef::U8(buf) => {
            interleave_bytes(buf, target, out, |s| (i16::from(s) - 128) << 8);
        }
        AudioBufferRef::U16(buf) => {
            interleave_bytes(buf, target, out, |s| (i32::from(s) - 32768) as i16);
        }
        AudioBufferRef::U24(buf) => {
            interleave_bytes(buf, target, out, |s| {
                ((s.inner() as i32 - 8_388_608) >> 8) as i16
            });
        }
        AudioBufferRef::U32(buf) => {
            interleave_bytes(buf, target, out, |s| ((s as i64 - 2_147_483_648) >> 16) as i16);
        }
    }
}

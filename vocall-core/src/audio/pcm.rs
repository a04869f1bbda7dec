//! PCM16 codec and the base64 transport encoding.
//!
//! Float samples are clamped to [-1, 1] and scaled asymmetrically:
//! negative values by 32768, non-negative values by 32767, truncating toward
//! zero. Decoding divides by 32768. The round trip is quantization-bounded,
//! never bit-exact.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{Result, VocallError};

/// Encode float samples as little-endian signed 16-bit PCM bytes.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // NaN maps to silence rather than an arbitrary clamp bound.
        let s = if sample.is_nan() {
            0.0
        } else {
            sample.clamp(-1.0, 1.0)
        };
        let value = if s < 0.0 {
            (s * 32_768.0) as i16
        } else {
            (s * 32_767.0) as i16
        };
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode little-endian signed 16-bit PCM bytes to float samples.
///
/// # Errors
/// `VocallError::MalformedAudio` when `bytes.len()` is odd. No partial output
/// is produced.
pub fn pcm16_to_float(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(VocallError::MalformedAudio(format!(
            "odd PCM16 payload length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect())
}

pub fn bytes_to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// # Errors
/// `VocallError::MalformedAudio` when `data` is not standard base64.
pub fn base64_to_bytes(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| VocallError::MalformedAudio(format!("invalid base64 payload: {e}")))
}

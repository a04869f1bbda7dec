//! Typed audio frames passed between capture, the voice session and playback.

use crate::audio::pcm;
use crate::error::Result;

/// An immutable block of mono PCM samples at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Mono f32 samples in [-1.0, 1.0].
    samples: Vec<f32>,
    /// Sample rate in Hz (16000 for capture, 24000 for playback).
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Transport representation of an [`AudioFrame`]: 16-bit little-endian PCM,
/// base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub sample_rate: u32,
    /// Base64 of the PCM16 bytes.
    pub data: String,
}

impl EncodedFrame {
    pub fn new(sample_rate: u32, data: impl Into<String>) -> Self {
        Self {
            sample_rate,
            data: data.into(),
        }
    }

    pub fn encode(frame: &AudioFrame) -> Self {
        let bytes = pcm::float_to_pcm16(frame.samples());
        Self {
            sample_rate: frame.sample_rate(),
            data: pcm::bytes_to_base64(&bytes),
        }
    }

    /// Decode back to float samples.
    ///
    /// # Errors
    /// `VocallError::MalformedAudio` when the payload is not valid base64 or
    /// its byte length is odd.
    pub fn decode(&self) -> Result<AudioFrame> {
        let bytes = pcm::base64_to_bytes(&self.data)?;
        let samples = pcm::pcm16_to_float(&bytes)?;
        Ok(AudioFrame::new(samples, self.sample_rate))
    }

    /// MIME type announced to the remote service, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Parse the rate out of an `audio/pcm;rate=N` MIME type.
    pub fn rate_from_mime(mime: &str) -> Option<u32> {
        mime.split(';')
            .filter_map(|p| p.trim().strip_prefix("rate="))
            .find_map(|r| r.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_sample_rate() {
        let frame = AudioFrame::new(vec![0.0; 12_000], 24_000);
        assert!((frame.duration_secs() - 0.5).abs() < 1e-9);
        assert_eq!(AudioFrame::new(vec![], 0).duration_secs(), 0.0);
    }

    #[test]
    fn encoded_frame_announces_its_rate() {
        let frame = EncodedFrame::encode(&AudioFrame::new(vec![0.25, -0.25], 16_000));
        assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(EncodedFrame::rate_from_mime("audio/pcm;rate=24000"), Some(24_000));
        assert_eq!(EncodedFrame::rate_from_mime("audio/pcm"), None);
    }

    #[test]
    fn decode_rejects_odd_payload() {
        // base64 of [0x00, 0x01, 0x02]
        let frame = EncodedFrame::new(24_000, "AAEC");
        let err = frame.decode().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedAudio);
    }
}

//! Streaming sample-rate conversion on rubato's `FastFixedIn`.
//!
//! Capture runs device rate → 16 kHz, playback runs 24 kHz → device rate.
//! Both directions keep one converter alive for the whole stream: a fresh
//! resampler starts from silence, so converting frame by frame would put a
//! dip at every frame edge.
//!
//! The converter holds back a few input samples of interpolation lookahead
//! plus any partial chunk. [`RateConverter::flush`] pushes that tail out
//! when the stream ends.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, error};

use crate::buffering::AudioFrame;
use crate::error::{Result, VocallError};

/// Playback resampler stride: 64 samples at 24 kHz, under 3 ms.
const PLAYBACK_CHUNK: usize = 64;

/// Mono f32 converter between two fixed rates. A passthrough when they match.
pub struct RateConverter {
    from_rate: u32,
    to_rate: u32,
    /// `None` when `from_rate == to_rate`.
    resampler: Option<FastFixedIn<f32>>,
    /// Input not yet handed to rubato (less than one chunk after `process`).
    pending: Vec<f32>,
    out: Vec<Vec<f32>>,
    /// Input samples accepted since the last reset.
    consumed: u64,
    /// Output samples returned since the last reset, delay included.
    produced: u64,
}

impl RateConverter {
    /// # Errors
    /// `VocallError::AudioStream` for a zero rate or chunk, or if rubato
    /// refuses the ratio.
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self> {
        let resampler = if from_rate == to_rate {
            None
        } else {
            if from_rate == 0 || to_rate == 0 || chunk_size == 0 {
                return Err(VocallError::AudioStream(format!(
                    "invalid resampler parameters from={from_rate} to={to_rate} chunk={chunk_size}"
                )));
            }
            let ratio = f64::from(to_rate) / f64::from(from_rate);
            let resampler =
                FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
                    .map_err(|e| VocallError::AudioStream(format!("resampler init: {e}")))?;
            debug!(from_rate, to_rate, chunk_size, "resampler ready");
            Some(resampler)
        };
        let out = match &resampler {
            Some(r) => vec![vec![0f32; r.output_frames_max()]],
            None => Vec::new(),
        };

        Ok(Self {
            from_rate,
            to_rate,
            resampler,
            pending: Vec::new(),
            out,
            consumed: 0,
            produced: 0,
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Leading output samples that precede the first input sample.
    pub fn delay(&self) -> usize {
        self.resampler.as_ref().map_or(0, |r| r.output_delay())
    }

    /// Feed the next stretch of the stream. Returns whatever output is ready,
    /// possibly nothing.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);
        self.consumed += samples.len() as u64;

        let chunk = resampler.input_frames_next();
        let mut ready = Vec::new();
        let mut used = 0;
        while self.pending.len() - used >= chunk {
            let input = &self.pending[used..used + chunk];
            match resampler.process_into_buffer(&[input], &mut self.out, None) {
                Ok((_, written)) => ready.extend_from_slice(&self.out[0][..written]),
                Err(e) => error!("resampler process error: {e}"),
            }
            used += chunk;
        }
        self.pending.drain(..used);
        self.produced += ready.len() as u64;
        ready
    }

    /// End the stream: return the held-back tail and start over from silence.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Vec::new();
        };

        let ratio = f64::from(self.to_rate) / f64::from(self.from_rate);
        let expected = resampler.output_delay() as u64 + (self.consumed as f64 * ratio).round() as u64;

        let mut tail = Vec::new();
        if !self.pending.is_empty() {
            let input = [self.pending.as_slice()];
            match resampler.process_partial_into_buffer(Some(&input[..]), &mut self.out, None) {
                Ok((_, written)) => tail.extend_from_slice(&self.out[0][..written]),
                Err(e) => error!("resampler flush error: {e}"),
            }
        }
        match resampler.process_partial_into_buffer(None::<&[&[f32]]>, &mut self.out, None) {
            Ok((_, written)) => tail.extend_from_slice(&self.out[0][..written]),
            Err(e) => error!("resampler flush error: {e}"),
        }
        tail.truncate(expected.saturating_sub(self.produced) as usize);

        self.reset();
        tail
    }

    /// Drop buffered input and interpolation state.
    pub fn reset(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.pending.clear();
        self.consumed = 0;
        self.produced = 0;
    }
}

/// A run of device-rate samples pinned to a device frame index.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineBuffer {
    pub start_frame: u64,
    pub samples: Vec<f32>,
}

impl TimelineBuffer {
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Continuous stretch of frames fed through one converter run.
struct Segment {
    /// Source-clock time the next frame must start at to continue this run.
    source_end: f64,
    /// Device frame the next converted sample lands on.
    next_frame: u64,
    /// Delay samples still to discard.
    skip: usize,
}

impl Segment {
    fn emit(&mut self, mut samples: Vec<f32>) -> Option<TimelineBuffer> {
        let skipped = self.skip.min(samples.len());
        samples.drain(..skipped);
        self.skip -= skipped;
        if samples.is_empty() {
            return None;
        }
        let buffer = TimelineBuffer {
            start_frame: self.next_frame,
            samples,
        };
        self.next_frame = buffer.end_frame();
        Some(buffer)
    }
}

/// Places scheduled playback frames on the output device's frame timeline.
///
/// Back-to-back frames share one converter run, so their converted samples
/// abut exactly. A frame that does not start where the previous one ended
/// closes the run (its tail is flushed) and opens a new one at its own start.
pub struct PlaybackTimeline {
    device_rate: u32,
    converter: Option<RateConverter>,
    segment: Option<Segment>,
}

impl PlaybackTimeline {
    pub fn new(device_rate: u32) -> Self {
        Self {
            device_rate,
            converter: None,
            segment: None,
        }
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Convert `frame`, due at `start_at` seconds on the device clock, into
    /// buffers to queue in order.
    ///
    /// # Errors
    /// `VocallError::AudioStream` if no converter can be built for the
    /// frame's rate.
    pub fn place(&mut self, frame: &AudioFrame, start_at: f64) -> Result<Vec<TimelineBuffer>> {
        let source_rate = frame.sample_rate();
        let mut buffers = Vec::new();

        let same_rate = self
            .converter
            .as_ref()
            .is_some_and(|c| c.from_rate() == source_rate);
        let continues = same_rate
            && self.segment.as_ref().is_some_and(|seg| {
                (start_at - seg.source_end).abs() <= 0.5 / f64::from(source_rate.max(1))
            });

        if !continues {
            buffers.extend(self.finish());
            if !same_rate {
                self.converter = Some(RateConverter::new(
                    source_rate,
                    self.device_rate,
                    PLAYBACK_CHUNK,
                )?);
            }
            let skip = self.converter.as_ref().map_or(0, RateConverter::delay);
            self.segment = Some(Segment {
                source_end: start_at,
                next_frame: (start_at.max(0.0) * f64::from(self.device_rate)).round() as u64,
                skip,
            });
        }

        if let (Some(converter), Some(segment)) = (self.converter.as_mut(), self.segment.as_mut())
        {
            let converted = converter.process(frame.samples());
            segment.source_end = start_at + frame.duration_secs();
            buffers.extend(segment.emit(converted));
        }
        Ok(buffers)
    }

    /// Close the current run and return its held-back tail, if any.
    pub fn finish(&mut self) -> Option<TimelineBuffer> {
        let mut segment = self.segment.take()?;
        let tail = self.converter.as_mut().map(RateConverter::flush)?;
        segment.emit(tail)
    }
}

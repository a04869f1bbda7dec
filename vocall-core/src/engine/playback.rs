//! Playback scheduler: gapless, in-order rendering of inbound model audio.
//!
//! Each decoded frame starts at `max(device_now, cursor)` and pushes the
//! cursor forward by its own duration, so a burst of frames lands
//! back-to-back and a late frame starts immediately instead of in the past.

use std::collections::VecDeque;

use tracing::warn;

use crate::audio::device::OutputDevice;
use crate::buffering::EncodedFrame;
use crate::error::Result;

/// Where a frame landed on the device clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledFrame {
    pub start: f64,
    pub duration: f64,
}

impl ScheduledFrame {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

pub struct PlaybackScheduler {
    device: Box<dyn OutputDevice>,
    cursor: f64,
    /// End times of scheduled frames that have not finished yet, oldest first.
    in_flight: VecDeque<f64>,
    closed: bool,
}

impl PlaybackScheduler {
    pub fn new(device: Box<dyn OutputDevice>) -> Self {
        Self {
            device,
            cursor: 0.0,
            in_flight: VecDeque::new(),
            closed: false,
        }
    }

    /// Pin the cursor to the device clock. Called when the call connects.
    pub fn start(&mut self) {
        self.cursor = self.device.current_time();
        self.in_flight.clear();
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn is_playing(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Decode and queue one inbound frame.
    ///
    /// Returns `Ok(None)` for an empty frame.
    ///
    /// # Errors
    /// `MalformedAudio` when the payload does not decode; the cursor is left
    /// untouched and the caller drops the frame.
    pub fn schedule(&mut self, frame: &EncodedFrame) -> Result<Option<ScheduledFrame>> {
        let audio = frame.decode()?;
        if audio.is_empty() || self.closed {
            return Ok(None);
        }
        let duration = audio.duration_secs();
        let start = self.device.current_time().max(self.cursor);
        self.device.schedule(audio, start)?;
        self.cursor = start + duration;
        self.in_flight.push_back(self.cursor);
        Ok(Some(ScheduledFrame { start, duration }))
    }

    /// Count frames whose playback finished since the last poll.
    pub fn poll_completed(&mut self) -> usize {
        let now = self.device.current_time();
        let mut done = 0;
        while self.in_flight.front().is_some_and(|&end| end <= now) {
            self.in_flight.pop_front();
            done += 1;
        }
        done
    }

    /// Forget the cursor and anything in flight.
    pub fn reset(&mut self) {
        self.cursor = 0.0;
        self.in_flight.clear();
    }

    /// Close the output device, cutting off anything still queued. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reset();
        self.device.close().inspect_err(|e| {
            warn!("output device close failed: {e}");
        })
    }
}

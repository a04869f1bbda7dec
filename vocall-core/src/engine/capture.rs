//! Capture pipeline: microphone samples → fixed-size blocks → voice session.
//!
//! ## Per block
//!
//! ```text
//! 1. RMS loudness → surfaced as the call's volume level
//! 2. not wired yet (still CONNECTING) → discard
//! 3. muted → consume, never transmit
//! 4. otherwise → PCM16 + base64 → exactly one VoiceSession::send
//! ```
//!
//! There is no outbound queue here. A send the session refuses is dropped:
//! for a live call only the freshest audio matters.

use tracing::debug;

use crate::audio::device::MicrophoneStream;
use crate::buffering::{AudioFrame, EncodedFrame};
use crate::error::Result;
use crate::session::VoiceSession;

/// What happened to one captured block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Pipeline not wired to the session yet.
    Discarded,
    /// Consumed while muted.
    Muted,
    /// Handed to the session.
    Sent,
    /// The session refused it (not open yet, or saturated).
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockReport {
    pub rms: f32,
    pub outcome: BlockOutcome,
}

pub struct CapturePipeline {
    mic: Box<dyn MicrophoneStream>,
    block_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    wired: bool,
    released: bool,
}

impl CapturePipeline {
    pub fn new(mic: Box<dyn MicrophoneStream>, block_size: usize, sample_rate: u32) -> Self {
        let block_size = block_size.max(1);
        Self {
            mic,
            block_size,
            sample_rate,
            pending: Vec::with_capacity(block_size * 2),
            wired: false,
            released: false,
        }
    }

    /// Start forwarding blocks to the session.
    pub fn wire(&mut self) {
        self.wired = true;
    }

    /// Stop forwarding and drop any partial block.
    pub fn disconnect(&mut self) {
        self.wired = false;
        self.pending.clear();
    }

    /// Drain the microphone and process every complete block, in capture order.
    ///
    /// # Errors
    /// Propagates microphone read failures (device lost).
    pub fn pump(
        &mut self,
        muted: bool,
        session: Option<&dyn VoiceSession>,
    ) -> Result<Vec<BlockReport>> {
        if self.released {
            return Ok(Vec::new());
        }
        self.mic.read(&mut self.pending)?;

        let mut reports = Vec::new();
        while self.pending.len() >= self.block_size {
            let block: Vec<f32> = self.pending.drain(..self.block_size).collect();
            let rms = compute_rms(&block);

            let outcome = if !self.wired {
                BlockOutcome::Discarded
            } else if muted {
                BlockOutcome::Muted
            } else {
                let frame = EncodedFrame::encode(&AudioFrame::new(block, self.sample_rate));
                match session {
                    Some(session) => match session.send(frame) {
                        Ok(()) => BlockOutcome::Sent,
                        Err(e) => {
                            debug!("captured block dropped: {e}");
                            BlockOutcome::Dropped
                        }
                    },
                    None => BlockOutcome::Dropped,
                }
            };
            reports.push(BlockReport { rms, outcome });
        }
        Ok(reports)
    }

    /// Stop the device tracks. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.disconnect();
        self.mic.release()
    }
}

/// Root-mean-square of a sample slice, clamped to [0.0, 1.0].
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt().min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VocallError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedMic {
        chunks: Vec<Vec<f32>>,
        releases: Arc<AtomicUsize>,
    }

    impl MicrophoneStream for ScriptedMic {
        fn read(&mut self, out: &mut Vec<f32>) -> Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            out.extend_from_slice(&chunk);
            Ok(chunk.len())
        }

        fn release(&mut self) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSession {
        sends: AtomicUsize,
        open: bool,
    }

    impl VoiceSession for CountingSession {
        fn send(&self, _frame: EncodedFrame) -> Result<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.open {
                Ok(())
            } else {
                Err(VocallError::SessionNotOpen)
            }
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn pipeline(chunks: Vec<Vec<f32>>, block: usize) -> (CapturePipeline, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let mic = ScriptedMic {
            chunks,
            releases: Arc::clone(&releases),
        };
        (CapturePipeline::new(Box::new(mic), block, 16_000), releases)
    }

    #[test]
    fn frames_fixed_size_blocks_across_reads() {
        let (mut cap, _) = pipeline(vec![vec![0.5; 6], vec![0.5; 5]], 4);
        cap.wire();
        let session = CountingSession {
            open: true,
            ..Default::default()
        };
        assert_eq!(cap.pump(false, Some(&session)).unwrap().len(), 1);
        // 2 left over + 5 = 7 → one more block, 3 pending
        assert_eq!(cap.pump(false, Some(&session)).unwrap().len(), 1);
        assert_eq!(session.sends.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn muted_blocks_are_consumed_but_never_sent() {
        let (mut cap, _) = pipeline(vec![vec![0.2; 12]], 4);
        cap.wire();
        let session = CountingSession {
            open: true,
            ..Default::default()
        };
        let reports = cap.pump(true, Some(&session)).unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.outcome == BlockOutcome::Muted));
        assert_eq!(session.sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unwired_blocks_are_discarded() {
        let (mut cap, _) = pipeline(vec![vec![0.2; 8]], 4);
        let session = CountingSession::default();
        let reports = cap.pump(false, Some(&session)).unwrap();
        assert!(reports.iter().all(|r| r.outcome == BlockOutcome::Discarded));
        assert_eq!(session.sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn refused_send_drops_the_block_without_retry() {
        let (mut cap, _) = pipeline(vec![vec![0.2; 8]], 4);
        cap.wire();
        let session = CountingSession::default();
        let reports = cap.pump(false, Some(&session)).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.outcome == BlockOutcome::Dropped));
        // one attempt per block
        assert_eq!(session.sends.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rms_of_square_wave() {
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        assert!((compute_rms(&samples) - 0.5).abs() < 1e-5);
        assert_eq!(compute_rms(&[]), 0.0);
    }

    #[test]
    fn release_is_idempotent() {
        let (mut cap, releases) = pipeline(vec![], 4);
        cap.release().unwrap();
        cap.release().unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(cap.pump(false, None).unwrap().is_empty());
    }
}

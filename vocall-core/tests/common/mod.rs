//! Test doubles for the device and session boundaries, with spy counters.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use vocall_core::audio::device::{AudioBackend, CaptureRequest, MicrophoneStream, OutputDevice};
use vocall_core::buffering::{AudioFrame, EncodedFrame};
use vocall_core::error::{Result, VocallError};
use vocall_core::session::{
    AgentConfig, SessionEvent, SessionEventKind, SessionEventSender, VoiceConnector, VoiceSession,
};
use vocall_core::{CallState, CallStatusEvent, EngineConfig};

#[derive(Debug, Default)]
pub struct Spies {
    pub mic_opens: AtomicUsize,
    pub mic_releases: AtomicUsize,
    pub output_opens: AtomicUsize,
    pub output_closes: AtomicUsize,
    pub session_opens: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub sends: AtomicUsize,
}

impl Spies {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockBackend {
    pub spies: Arc<Spies>,
    /// Samples the microphone hands out on its next read.
    pub mic_samples: Arc<Mutex<Vec<f32>>>,
    /// Output device clock, in seconds.
    pub clock: Arc<Mutex<f64>>,
    /// `(start_at, sample_count)` per scheduled frame.
    pub scheduled: Arc<Mutex<Vec<(f64, usize)>>>,
    pub fail_microphone: bool,
}

impl MockBackend {
    pub fn push_samples(&self, value: f32, count: usize) {
        self.mic_samples
            .lock()
            .extend(std::iter::repeat(value).take(count));
    }

    pub fn set_clock(&self, seconds: f64) {
        *self.clock.lock() = seconds;
    }

    pub fn scheduled(&self) -> Vec<(f64, usize)> {
        self.scheduled.lock().clone()
    }
}

impl AudioBackend for MockBackend {
    fn open_microphone(&self, _request: &CaptureRequest) -> Result<Box<dyn MicrophoneStream>> {
        if self.fail_microphone {
            return Err(VocallError::DeviceUnavailable("permission denied".into()));
        }
        self.spies.mic_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockMicrophone {
            spies: Arc::clone(&self.spies),
            samples: Arc::clone(&self.mic_samples),
            released: false,
        }))
    }

    fn open_output(&self, _sample_rate: u32) -> Result<Box<dyn OutputDevice>> {
        self.spies.output_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockOutput {
            spies: Arc::clone(&self.spies),
            clock: Arc::clone(&self.clock),
            scheduled: Arc::clone(&self.scheduled),
            closed: false,
        }))
    }
}

pub struct MockMicrophone {
    spies: Arc<Spies>,
    samples: Arc<Mutex<Vec<f32>>>,
    released: bool,
}

impl MicrophoneStream for MockMicrophone {
    fn read(&mut self, out: &mut Vec<f32>) -> Result<usize> {
        let mut samples = self.samples.lock();
        let n = samples.len();
        out.append(&mut samples);
        Ok(n)
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.spies.mic_releases.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct MockOutput {
    spies: Arc<Spies>,
    clock: Arc<Mutex<f64>>,
    scheduled: Arc<Mutex<Vec<(f64, usize)>>>,
    closed: bool,
}

impl OutputDevice for MockOutput {
    fn current_time(&self) -> f64 {
        *self.clock.lock()
    }

    fn schedule(&mut self, frame: AudioFrame, start_at: f64) -> Result<()> {
        self.scheduled.lock().push((start_at, frame.len()));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.spies.output_closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Records the event sender of every opened session so the test can play
/// the remote side.
#[derive(Clone, Default)]
pub struct MockConnector {
    pub spies: Arc<Spies>,
    opened: Arc<Mutex<Vec<(u64, SessionEventSender)>>>,
    notify: Arc<Notify>,
}

impl MockConnector {
    pub fn with_spies(spies: Arc<Spies>) -> Self {
        Self {
            spies,
            ..Default::default()
        }
    }

    /// Wait for the engine to open a session; returns its call id and the
    /// sender the remote side reports through.
    pub async fn wait_for_open(&self) -> (u64, RemoteSide) {
        loop {
            let next = {
                let mut opened = self.opened.lock();
                (!opened.is_empty()).then(|| opened.remove(0))
            };
            if let Some((call_id, events)) = next {
                return (call_id, RemoteSide { call_id, events });
            }
            tokio::time::timeout(Duration::from_secs(30), self.notify.notified())
                .await
                .expect("session was never opened");
        }
    }
}

impl VoiceConnector for MockConnector {
    fn open(
        &self,
        _agent: &AgentConfig,
        call_id: u64,
        events: SessionEventSender,
    ) -> Result<Box<dyn VoiceSession>> {
        self.spies.session_opens.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().push((call_id, events));
        self.notify.notify_one();
        Ok(Box::new(MockSession {
            spies: Arc::clone(&self.spies),
            closed: false,
        }))
    }
}

pub struct MockSession {
    spies: Arc<Spies>,
    closed: bool,
}

impl VoiceSession for MockSession {
    fn send(&self, _frame: EncodedFrame) -> Result<()> {
        if self.closed {
            return Err(VocallError::SessionNotOpen);
        }
        self.spies.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.spies.session_closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct RemoteSide {
    pub call_id: u64,
    events: SessionEventSender,
}

impl RemoteSide {
    pub fn emit(&self, kind: SessionEventKind) {
        self.events
            .send(SessionEvent {
                call_id: self.call_id,
                kind,
            })
            .expect("engine stopped listening");
    }

    /// Same channel, tagged with another call id.
    pub fn for_call(&self, call_id: u64) -> RemoteSide {
        RemoteSide {
            call_id,
            events: self.events.clone(),
        }
    }

    pub fn open(&self) {
        self.emit(SessionEventKind::Opened);
    }

    pub fn speak(&self, samples: usize) {
        let frame = AudioFrame::new(vec![0.3; samples], 24_000);
        self.emit(SessionEventKind::Frame(EncodedFrame::encode(&frame)));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn test_config() -> EngineConfig {
    EngineConfig {
        block_size: 160,
        ..EngineConfig::default()
    }
}

pub fn agent() -> AgentConfig {
    AgentConfig::new("job", "Job coach", "Help the caller prepare for interviews.")
}

/// Next status event, bounded by virtual time.
pub async fn next_status(rx: &mut broadcast::Receiver<CallStatusEvent>) -> CallStatusEvent {
    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed")
}

pub async fn expect_state(
    rx: &mut broadcast::Receiver<CallStatusEvent>,
    state: CallState,
) -> CallStatusEvent {
    let event = next_status(rx).await;
    assert_eq!(event.state, state, "unexpected status event {event:?}");
    event
}

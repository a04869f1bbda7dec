//! Call controller: the one place call state changes.
//!
//! ## States
//!
//! ```text
//! begin() ─► CONNECTING ──opened──► CONNECTED
//!                │                      │
//!                └──────┬───────────────┘
//!                       ▼
//!                     ENDED  (hangup | remote close | channel error |
//!                             device failure | timeout | replaced | disposed)
//! ```
//!
//! Every path into `ENDED` runs the same teardown: close the session,
//! disconnect capture, release the microphone, close the output device and
//! reset the playback cursor. Each step is skipped when its resource was
//! never acquired, and a failing step never stops the ones after it.
//!
//! The controller is synchronous and single-owner. `CallEngine` drives it
//! from one event loop, so session callbacks, capture pumps and timer ticks
//! never interleave.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::capture::{BlockOutcome, CapturePipeline};
use super::playback::PlaybackScheduler;
use super::EngineConfig;
use crate::audio::device::{MicrophoneStream, OutputDevice};
use crate::error::{Result, VocallError};
use crate::ipc::events::{
    CallDurationEvent, CallLevelEvent, CallSnapshot, CallState, CallStatusEvent, CallSummary,
    EndReason, LevelSource,
};
use crate::session::{AgentConfig, SessionEvent, SessionEventKind, VoiceSession};
use crate::CAPTURE_SAMPLE_RATE;

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Per-call counters. Reset when a call begins.
#[derive(Debug, Default)]
pub struct CallDiagnostics {
    pub blocks_captured: AtomicUsize,
    pub blocks_sent: AtomicUsize,
    pub blocks_muted: AtomicUsize,
    pub blocks_dropped: AtomicUsize,
    pub blocks_discarded: AtomicUsize,
    pub frames_received: AtomicUsize,
    pub frames_scheduled: AtomicUsize,
    pub frames_malformed: AtomicUsize,
    pub teardown_failures: AtomicUsize,
}

impl CallDiagnostics {
    pub fn reset(&self) {
        self.blocks_captured.store(0, Ordering::Relaxed);
        self.blocks_sent.store(0, Ordering::Relaxed);
        self.blocks_muted.store(0, Ordering::Relaxed);
        self.blocks_dropped.store(0, Ordering::Relaxed);
        self.blocks_discarded.store(0, Ordering::Relaxed);
        self.frames_received.store(0, Ordering::Relaxed);
        self.frames_scheduled.store(0, Ordering::Relaxed);
        self.frames_malformed.store(0, Ordering::Relaxed);
        self.teardown_failures.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            blocks_captured: self.blocks_captured.load(Ordering::Relaxed),
            blocks_sent: self.blocks_sent.load(Ordering::Relaxed),
            blocks_muted: self.blocks_muted.load(Ordering::Relaxed),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
            blocks_discarded: self.blocks_discarded.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_scheduled: self.frames_scheduled.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            teardown_failures: self.teardown_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub blocks_captured: usize,
    pub blocks_sent: usize,
    pub blocks_muted: usize,
    pub blocks_dropped: usize,
    pub blocks_discarded: usize,
    pub frames_received: usize,
    pub frames_scheduled: usize,
    pub frames_malformed: usize,
    pub teardown_failures: usize,
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Outbound side of every engine-to-UI channel plus the shared snapshot.
#[derive(Clone)]
pub struct CallSignals {
    pub status: broadcast::Sender<CallStatusEvent>,
    pub level: broadcast::Sender<CallLevelEvent>,
    pub duration: broadcast::Sender<CallDurationEvent>,
    pub summary: broadcast::Sender<CallSummary>,
    pub snapshot: Arc<Mutex<CallSnapshot>>,
}

impl CallSignals {
    pub fn new(capacity: usize) -> Self {
        let (status, _) = broadcast::channel(capacity);
        let (level, _) = broadcast::channel(capacity);
        let (duration, _) = broadcast::channel(capacity);
        let (summary, _) = broadcast::channel(capacity);
        Self {
            status,
            level,
            duration,
            summary,
            snapshot: Arc::new(Mutex::new(CallSnapshot::default())),
        }
    }
}

// ---------------------------------------------------------------------------
// Call session
// ---------------------------------------------------------------------------

/// Bookkeeping for one call. Device handles live in the controller's slots.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: u64,
    pub agent: AgentConfig,
    pub state: CallState,
    pub started_at: chrono::DateTime<Utc>,
    pub duration_secs: u64,
    pub muted: bool,
    pub level: f32,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct CallController {
    config: EngineConfig,
    signals: CallSignals,
    diagnostics: Arc<CallDiagnostics>,
    next_call_id: u64,
    call: Option<CallSession>,
    session: Option<Box<dyn VoiceSession>>,
    capture: Option<CapturePipeline>,
    playback: Option<PlaybackScheduler>,
}

impl CallController {
    pub fn new(config: EngineConfig, signals: CallSignals, diagnostics: Arc<CallDiagnostics>) -> Self {
        Self {
            config,
            signals,
            diagnostics,
            next_call_id: 1,
            call: None,
            session: None,
            capture: None,
            playback: None,
        }
    }

    pub fn call(&self) -> Option<&CallSession> {
        self.call.as_ref()
    }

    pub fn state(&self) -> Option<CallState> {
        self.call.as_ref().map(|c| c.state)
    }

    /// `true` while `call_id` is the current call and has not ended.
    pub fn is_live(&self, call_id: u64) -> bool {
        self.call
            .as_ref()
            .is_some_and(|c| c.id == call_id && c.state.is_active())
    }

    /// Start a new call in `CONNECTING`. Any call still active is ended with
    /// `Replaced` and fully torn down first.
    pub fn begin(&mut self, agent: AgentConfig) -> u64 {
        if self.call.as_ref().is_some_and(|c| c.state.is_active()) {
            self.end(EndReason::Replaced, None);
        }

        let id = self.next_call_id;
        self.next_call_id += 1;
        self.diagnostics.reset();

        info!(call_id = id, agent = %agent.id, "call connecting");
        self.call = Some(CallSession {
            id,
            agent,
            state: CallState::Connecting,
            started_at: Utc::now(),
            duration_secs: 0,
            muted: false,
            level: 0.0,
        });
        self.publish_status(None, None);
        id
    }

    /// Hand freshly acquired devices to the call. Devices for a call that is
    /// no longer live are released on the spot.
    pub fn attach_devices(
        &mut self,
        call_id: u64,
        mut mic: Box<dyn MicrophoneStream>,
        mut output: Box<dyn OutputDevice>,
    ) -> bool {
        if !self.is_live(call_id) {
            debug!(call_id, "releasing devices acquired for a stale call");
            if let Err(e) = mic.release() {
                warn!(call_id, "stale microphone release failed: {e}");
                CallDiagnostics::bump(&self.diagnostics.teardown_failures);
            }
            if let Err(e) = output.close() {
                warn!(call_id, "stale output close failed: {e}");
                CallDiagnostics::bump(&self.diagnostics.teardown_failures);
            }
            return false;
        }
        self.capture = Some(CapturePipeline::new(
            mic,
            self.config.block_size,
            CAPTURE_SAMPLE_RATE,
        ));
        self.playback = Some(PlaybackScheduler::new(output));
        true
    }

    /// Adopt the session opened for `call_id`, or close it if that call is gone.
    pub fn attach_session(&mut self, call_id: u64, mut session: Box<dyn VoiceSession>) -> bool {
        if !self.is_live(call_id) {
            debug!(call_id, "closing session opened for a stale call");
            if let Err(e) = session.close() {
                warn!(call_id, "stale session close failed: {e}");
                CallDiagnostics::bump(&self.diagnostics.teardown_failures);
            }
            return false;
        }
        self.session = Some(session);
        true
    }

    /// Device acquisition failed: the call never reaches `CONNECTED`.
    pub fn devices_failed(&mut self, call_id: u64, err: &VocallError) {
        if self.is_live(call_id) {
            warn!(call_id, "device acquisition failed: {err}");
            self.end(EndReason::DeviceUnavailable, Some(err.to_string()));
        }
    }

    /// The connector refused to start opening a session.
    pub fn session_failed(&mut self, call_id: u64, err: &VocallError) {
        if self.is_live(call_id) {
            warn!(call_id, "session open failed: {err}");
            self.end(EndReason::ChannelError, Some(err.to_string()));
        }
    }

    pub fn connect_timed_out(&mut self, call_id: u64) {
        if self.is_live(call_id) && self.state() == Some(CallState::Connecting) {
            warn!(call_id, "call still connecting after timeout");
            self.end(EndReason::ConnectTimeout, None);
        }
    }

    /// Returns `true` when the event moved the call to `CONNECTED`.
    pub fn on_session_event(&mut self, event: SessionEvent) -> bool {
        if !self.is_live(event.call_id) {
            debug!(call_id = event.call_id, "ignoring event for stale call");
            return false;
        }
        match event.kind {
            SessionEventKind::Opened => return self.on_opened(),
            SessionEventKind::Frame(frame) => {
                CallDiagnostics::bump(&self.diagnostics.frames_received);
                let Some(playback) = self.playback.as_mut() else {
                    return false;
                };
                match playback.schedule(&frame) {
                    Ok(Some(_)) => {
                        CallDiagnostics::bump(&self.diagnostics.frames_scheduled);
                        self.publish_level(self.config.speaking_level, LevelSource::Agent);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        CallDiagnostics::bump(&self.diagnostics.frames_malformed);
                        warn!(call_id = event.call_id, "dropping inbound frame: {e}");
                    }
                }
            }
            SessionEventKind::Closed => self.end(EndReason::RemoteClosed, None),
            SessionEventKind::Error(detail) => self.end(EndReason::ChannelError, Some(detail)),
        }
        false
    }

    fn on_opened(&mut self) -> bool {
        let Some(call) = self.call.as_mut() else {
            return false;
        };
        if call.state != CallState::Connecting {
            return false;
        }
        call.state = CallState::Connected;
        info!(call_id = call.id, "call connected");
        if let Some(playback) = self.playback.as_mut() {
            playback.start();
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.wire();
        }
        self.publish_status(None, None);
        true
    }

    /// One second of call time. Counts only while `CONNECTED`.
    pub fn on_tick(&mut self) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        if call.state != CallState::Connected {
            return;
        }
        call.duration_secs += 1;
        let event = CallDurationEvent {
            call_id: call.id,
            seconds: call.duration_secs,
        };
        self.signals.snapshot.lock().duration_secs = event.seconds;
        let _ = self.signals.duration.send(event);
    }

    /// Move captured audio toward the session and retire finished playback.
    pub fn pump(&mut self) {
        let Some(call) = self.call.as_ref() else {
            return;
        };
        if !call.state.is_active() {
            return;
        }
        let (call_id, muted) = (call.id, call.muted);

        let pumped = match self.capture.as_mut() {
            Some(capture) => capture.pump(muted, self.session.as_deref()),
            None => Ok(Vec::new()),
        };
        match pumped {
            Ok(reports) => {
                for report in reports {
                    CallDiagnostics::bump(&self.diagnostics.blocks_captured);
                    let counter = match report.outcome {
                        BlockOutcome::Discarded => &self.diagnostics.blocks_discarded,
                        BlockOutcome::Muted => &self.diagnostics.blocks_muted,
                        BlockOutcome::Sent => &self.diagnostics.blocks_sent,
                        BlockOutcome::Dropped => &self.diagnostics.blocks_dropped,
                    };
                    CallDiagnostics::bump(counter);
                    if report.outcome != BlockOutcome::Discarded {
                        self.publish_level(report.rms, LevelSource::Microphone);
                    }
                }
            }
            Err(e) => {
                warn!(call_id, "microphone lost: {e}");
                self.end(EndReason::DeviceUnavailable, Some(e.to_string()));
                return;
            }
        }

        if let Some(playback) = self.playback.as_mut() {
            if playback.poll_completed() > 0 && !playback.is_playing() {
                self.publish_level(0.0, LevelSource::Agent);
            }
        }
    }

    /// Flip the mute flag of the active call. Returns the new flag; `false`
    /// when there is no active call.
    pub fn toggle_mute(&mut self) -> bool {
        let Some(call) = self.call.as_mut().filter(|c| c.state.is_active()) else {
            return false;
        };
        call.muted = !call.muted;
        let muted = call.muted;
        debug!(call_id = call.id, muted, "mute toggled");
        self.signals.snapshot.lock().muted = muted;
        muted
    }

    /// User hangup. A no-op when nothing is active.
    pub fn hangup(&mut self) {
        self.end(EndReason::Hangup, None);
    }

    /// Engine shutdown path.
    pub fn dispose(&mut self) {
        self.end(EndReason::Disposed, None);
    }

    /// Move the active call to `ENDED`. Teardown runs regardless, so calling
    /// this with no active call only re-checks that every slot is empty.
    pub fn end(&mut self, reason: EndReason, detail: Option<String>) {
        if let Err(e) = self.teardown() {
            warn!("{e}");
        }

        let Some(call) = self.call.as_mut().filter(|c| c.state.is_active()) else {
            return;
        };
        call.state = CallState::Ended;
        call.level = 0.0;
        info!(
            call_id = call.id,
            ?reason,
            duration_secs = call.duration_secs,
            "call ended"
        );

        let summary = CallSummary {
            call_id: call.id,
            agent_id: call.agent.id.clone(),
            agent_name: call.agent.name.clone(),
            duration_secs: call.duration_secs,
            reason,
            ended_at: Utc::now(),
        };
        self.publish_status(Some(reason), detail);
        let _ = self.signals.summary.send(summary);
    }

    /// Release every resource the call holds, in order. Each step runs even
    /// if an earlier one failed.
    ///
    /// # Errors
    /// `TeardownPartial` naming the failed steps.
    pub fn teardown(&mut self) -> Result<()> {
        let mut failed = Vec::new();

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                warn!("session close failed: {e}");
                failed.push("close session".to_string());
            }
        }
        if let Some(mut capture) = self.capture.take() {
            capture.disconnect();
            if let Err(e) = capture.release() {
                warn!("microphone release failed: {e}");
                failed.push("release microphone".to_string());
            }
        }
        if let Some(mut playback) = self.playback.take() {
            if let Err(e) = playback.close() {
                warn!("output close failed: {e}");
                failed.push("close output".to_string());
            }
            playback.reset();
        }

        if failed.is_empty() {
            Ok(())
        } else {
            self.diagnostics
                .teardown_failures
                .fetch_add(failed.len(), Ordering::Relaxed);
            Err(VocallError::TeardownPartial { failed })
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn publish_status(&self, reason: Option<EndReason>, detail: Option<String>) {
        let Some(call) = self.call.as_ref() else {
            return;
        };
        {
            let mut snap = self.signals.snapshot.lock();
            *snap = CallSnapshot {
                call_id: call.id,
                agent_id: Some(call.agent.id.clone()),
                state: Some(call.state),
                duration_secs: call.duration_secs,
                level: call.level,
                muted: call.muted,
            };
        }
        let _ = self.signals.status.send(CallStatusEvent {
            call_id: call.id,
            state: call.state,
            reason,
            detail,
        });
    }

    fn publish_level(&mut self, level: f32, source: LevelSource) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        let level = level.clamp(0.0, 1.0);
        call.level = level;
        self.signals.snapshot.lock().level = level;
        let _ = self.signals.level.send(CallLevelEvent {
            call_id: call.id,
            level,
            source,
        });
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{AudioFrame, EncodedFrame};
    use crate::error::ErrorKind;

    #[derive(Default)]
    struct Spies {
        mic_releases: AtomicUsize,
        output_closes: AtomicUsize,
        session_closes: AtomicUsize,
        sends: AtomicUsize,
    }

    struct SpyMic {
        spies: Arc<Spies>,
        fail_release: bool,
    }

    impl MicrophoneStream for SpyMic {
        fn read(&mut self, out: &mut Vec<f32>) -> Result<usize> {
            out.extend_from_slice(&[0.1; 8]);
            Ok(8)
        }

        fn release(&mut self) -> Result<()> {
            self.spies.mic_releases.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                return Err(VocallError::AudioStream("track stuck".into()));
            }
            Ok(())
        }
    }

    struct SpyOutput(Arc<Spies>);

    impl OutputDevice for SpyOutput {
        fn current_time(&self) -> f64 {
            0.0
        }

        fn schedule(&mut self, _frame: AudioFrame, _start_at: f64) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.0.output_closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SpySession(Arc<Spies>);

    impl VoiceSession for SpySession {
        fn send(&self, _frame: EncodedFrame) -> Result<()> {
            self.0.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.0.session_closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StuckSession(Arc<Spies>);

    impl VoiceSession for StuckSession {
        fn send(&self, _frame: EncodedFrame) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.0.session_closes.fetch_add(1, Ordering::SeqCst);
            Err(VocallError::Channel("socket already gone".into()))
        }
    }

    fn controller() -> (CallController, CallSignals) {
        let config = EngineConfig {
            block_size: 8,
            ..EngineConfig::default()
        };
        let signals = CallSignals::new(64);
        let ctl = CallController::new(
            config,
            signals.clone(),
            Arc::new(CallDiagnostics::default()),
        );
        (ctl, signals)
    }

    fn wire(ctl: &mut CallController, spies: &Arc<Spies>, fail_release: bool) -> u64 {
        let id = ctl.begin(AgentConfig::new("job", "Job coach", "help"));
        let mic = SpyMic {
            spies: Arc::clone(spies),
            fail_release,
        };
        assert!(ctl.attach_devices(id, Box::new(mic), Box::new(SpyOutput(Arc::clone(spies)))));
        assert!(ctl.attach_session(id, Box::new(SpySession(Arc::clone(spies)))));
        id
    }

    fn event(call_id: u64, kind: SessionEventKind) -> SessionEvent {
        SessionEvent { call_id, kind }
    }

    #[test]
    fn opened_connects_and_double_end_releases_once() {
        let (mut ctl, signals) = controller();
        let mut status = signals.status.subscribe();
        let spies = Arc::new(Spies::default());
        let id = wire(&mut ctl, &spies, false);

        assert!(ctl.on_session_event(event(id, SessionEventKind::Opened)));
        ctl.pump();
        assert_eq!(spies.sends.load(Ordering::SeqCst), 1);

        ctl.hangup();
        ctl.hangup();
        assert_eq!(ctl.state(), Some(CallState::Ended));
        assert_eq!(spies.session_closes.load(Ordering::SeqCst), 1);
        assert_eq!(spies.mic_releases.load(Ordering::SeqCst), 1);
        assert_eq!(spies.output_closes.load(Ordering::SeqCst), 1);

        let states: Vec<_> = std::iter::from_fn(|| status.try_recv().ok())
            .map(|e| e.state)
            .collect();
        assert_eq!(
            states,
            vec![CallState::Connecting, CallState::Connected, CallState::Ended]
        );
    }

    #[test]
    fn failing_step_does_not_stop_teardown() {
        let (mut ctl, _) = controller();
        let spies = Arc::new(Spies::default());
        wire(&mut ctl, &spies, true);

        let err = ctl.teardown().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TeardownPartial);
        assert_eq!(spies.session_closes.load(Ordering::SeqCst), 1);
        assert_eq!(spies.output_closes.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.diagnostics.snapshot().teardown_failures, 1);
    }

    #[test]
    fn events_for_a_replaced_call_are_ignored() {
        let (mut ctl, signals) = controller();
        let mut summaries = signals.summary.subscribe();
        let spies = Arc::new(Spies::default());
        let first = wire(&mut ctl, &spies, false);
        let second = ctl.begin(AgentConfig::new("travel", "Travel", ""));

        let replaced = summaries.try_recv().expect("summary for replaced call");
        assert_eq!(replaced.call_id, first);
        assert_eq!(replaced.reason, EndReason::Replaced);

        assert!(!ctl.on_session_event(event(first, SessionEventKind::Opened)));
        assert_eq!(ctl.state(), Some(CallState::Connecting));
        assert_ne!(first, second);
    }

    #[test]
    fn tick_counts_only_while_connected() {
        let (mut ctl, signals) = controller();
        let spies = Arc::new(Spies::default());
        let id = wire(&mut ctl, &spies, false);

        ctl.on_tick();
        assert_eq!(ctl.call().unwrap().duration_secs, 0);

        ctl.on_session_event(event(id, SessionEventKind::Opened));
        ctl.on_tick();
        ctl.on_tick();
        assert_eq!(signals.snapshot.lock().duration_secs, 2);

        ctl.on_session_event(event(id, SessionEventKind::Error("reset by peer".into())));
        ctl.on_tick();
        assert_eq!(ctl.call().unwrap().duration_secs, 2);
    }

    #[test]
    fn stale_devices_are_released_immediately() {
        let (mut ctl, _) = controller();
        let spies = Arc::new(Spies::default());
        let id = ctl.begin(AgentConfig::new("job", "Job", ""));
        ctl.hangup();

        let mic = SpyMic {
            spies: Arc::clone(&spies),
            fail_release: false,
        };
        assert!(!ctl.attach_devices(id, Box::new(mic), Box::new(SpyOutput(Arc::clone(&spies)))));
        assert_eq!(spies.mic_releases.load(Ordering::SeqCst), 1);
        assert_eq!(spies.output_closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_session_close_failure_is_counted() {
        let (mut ctl, _) = controller();
        let spies = Arc::new(Spies::default());
        let id = ctl.begin(AgentConfig::new("job", "Job", ""));
        ctl.hangup();
        let before = ctl.diagnostics.snapshot().teardown_failures;

        assert!(!ctl.attach_session(id, Box::new(StuckSession(Arc::clone(&spies)))));
        assert_eq!(spies.session_closes.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.diagnostics.snapshot().teardown_failures, before + 1);
        assert_eq!(ctl.state(), Some(CallState::Ended));
    }

    #[test]
    fn malformed_frame_is_counted_and_call_continues() {
        let (mut ctl, _) = controller();
        let spies = Arc::new(Spies::default());
        let id = wire(&mut ctl, &spies, false);
        ctl.on_session_event(event(id, SessionEventKind::Opened));

        ctl.on_session_event(event(
            id,
            SessionEventKind::Frame(EncodedFrame::new(24_000, "AAEC")),
        ));
        assert_eq!(ctl.state(), Some(CallState::Connected));
        let diag = ctl.diagnostics.snapshot();
        assert_eq!(diag.frames_received, 1);
        assert_eq!(diag.frames_malformed, 1);
    }
}

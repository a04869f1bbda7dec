//! `CallEngine`: the handle the UI talks to.
//!
//! ## Event loop
//!
//! ```text
//! CallEngine::new()
//!     └─► spawn(event loop)   owns CallController; one select! over
//!           commands          start_call / end_call / toggle_mute / shutdown
//!           internal          device acquisition results, connect timeout
//!           session events    opened / frame / closed / error
//!           1 s ticker        call duration (reset when the call connects)
//!           capture poll      pump microphone blocks, retire finished playback
//! ```
//!
//! Nothing in the controller runs outside that loop, so no call state is
//! shared between tasks. Device acquisition runs in a blocking task and
//! reports back through the internal channel; a result for a call that has
//! meanwhile ended is released on arrival.
//!
//! Dropping the last `CallEngine` closes the command channel; the loop then
//! tears down the active call and exits.

pub mod capture;
pub mod controller;
pub mod playback;

pub use controller::{CallController, CallDiagnostics, CallSignals, DiagnosticsSnapshot};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::{
    audio::device::{AudioBackend, CaptureRequest, MicrophoneStream, OutputDevice},
    error::{Result, VocallError},
    ipc::events::{CallDurationEvent, CallLevelEvent, CallSnapshot, CallStatusEvent, CallSummary},
    session::{AgentConfig, SessionEvent, VoiceConnector},
    CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE,
};

/// Broadcast channel capacity per signal.
const BROADCAST_CAP: usize = 256;
const COMMAND_QUEUE_CAP: usize = 32;
const DURATION_TICK: Duration = Duration::from_secs(1);

/// Configuration for `CallEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Samples per captured block at 16 kHz. Default: 4096 (256 ms).
    pub block_size: usize,
    /// How often the loop drains the microphone. Default: 20 ms.
    pub capture_poll_interval: Duration,
    /// Level reported while model audio is playing. Default: 0.5.
    pub speaking_level: f32,
    /// End a call still connecting after this long. Default: `None`
    /// (wait for the session to open or fail).
    pub connect_timeout: Option<Duration>,
    /// Input device name to prefer. `None` uses the default device.
    pub preferred_input_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: 4_096,
            capture_poll_interval: Duration::from_millis(20),
            speaking_level: 0.5,
            connect_timeout: None,
            preferred_input_device: None,
        }
    }
}

enum Command {
    StartCall {
        agent: AgentConfig,
        reply: oneshot::Sender<u64>,
    },
    EndCall {
        reply: oneshot::Sender<()>,
    },
    ToggleMute {
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

type AcquiredDevices = (Box<dyn MicrophoneStream>, Box<dyn OutputDevice>);

enum Internal {
    DevicesAcquired {
        call_id: u64,
        result: Result<AcquiredDevices>,
    },
    ConnectTimeout {
        call_id: u64,
    },
}

/// The top-level engine handle.
///
/// Must be created inside a Tokio runtime. All methods take `&self`; wrap
/// in `Arc<CallEngine>` to share with event-forwarding tasks.
pub struct CallEngine {
    commands: mpsc::Sender<Command>,
    signals: CallSignals,
    diagnostics: Arc<CallDiagnostics>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CallEngine {
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn AudioBackend>,
        connector: Arc<dyn VoiceConnector>,
    ) -> Self {
        let signals = CallSignals::new(BROADCAST_CAP);
        let diagnostics = Arc::new(CallDiagnostics::default());
        let running = Arc::new(AtomicBool::new(true));
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAP);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = mpsc::unbounded_channel();

        let event_loop = EventLoop {
            controller: CallController::new(
                config.clone(),
                signals.clone(),
                Arc::clone(&diagnostics),
            ),
            config,
            backend,
            connector,
            commands: commands_rx,
            internal_tx,
            internal_rx,
            session_tx,
            session_rx,
            running: Arc::clone(&running),
        };
        let task = tokio::spawn(event_loop.run());

        Self {
            commands: commands_tx,
            signals,
            diagnostics,
            running,
            task: Mutex::new(Some(task)),
        }
    }

    /// Start a call with `agent`, ending any active call first. Resolves
    /// once the call is `CONNECTING`; the outcome arrives as status events.
    ///
    /// # Errors
    /// `EngineStopped` after `shutdown()`.
    pub async fn start_call(&self, agent: AgentConfig) -> Result<u64> {
        self.request(|reply| Command::StartCall { agent, reply }).await
    }

    /// Hang up. A no-op when no call is active.
    pub async fn end_call(&self) -> Result<()> {
        self.request(|reply| Command::EndCall { reply }).await
    }

    /// Flip the mute flag; returns the new value.
    pub async fn toggle_mute(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleMute { reply }).await
    }

    /// End the active call with `Disposed` and stop the event loop.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(()) | Err(VocallError::EngineStopped) => {}
            Err(e) => return Err(e),
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current (or last) call, as last published by the loop.
    pub fn snapshot(&self) -> CallSnapshot {
        self.signals.snapshot.lock().clone()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<CallStatusEvent> {
        self.signals.status.subscribe()
    }

    pub fn subscribe_level(&self) -> broadcast::Receiver<CallLevelEvent> {
        self.signals.level.subscribe()
    }

    pub fn subscribe_duration(&self) -> broadcast::Receiver<CallDurationEvent> {
        self.signals.duration.subscribe()
    }

    pub fn subscribe_summaries(&self) -> broadcast::Receiver<CallSummary> {
        self.signals.summary.subscribe()
    }

    /// Counters for the current call.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| VocallError::EngineStopped)?;
        rx.await.map_err(|_| VocallError::EngineStopped)
    }
}

struct EventLoop {
    config: EngineConfig,
    backend: Arc<dyn AudioBackend>,
    connector: Arc<dyn VoiceConnector>,
    controller: CallController,
    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    session_tx: mpsc::UnboundedSender<SessionEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    running: Arc<AtomicBool>,
}

impl EventLoop {
    async fn run(mut self) {
        let mut ticker = time::interval_at(Instant::now() + DURATION_TICK, DURATION_TICK);
        let mut poll = time::interval(self.config.capture_poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("call engine started");
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        self.controller.dispose();
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.on_command(cmd),
                    None => {
                        debug!("engine handle dropped");
                        self.controller.dispose();
                        break;
                    }
                },
                Some(event) = self.internal_rx.recv() => self.on_internal(event),
                Some(event) = self.session_rx.recv() => {
                    if self.controller.on_session_event(event) {
                        // Seconds count from the moment the call connected.
                        ticker.reset();
                    }
                }
                _ = ticker.tick() => self.controller.on_tick(),
                _ = poll.tick() => self.controller.pump(),
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("call engine stopped");
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::StartCall { agent, reply } => {
                let call_id = self.controller.begin(agent);
                self.acquire_devices(call_id);
                if let Some(timeout) = self.config.connect_timeout {
                    let tx = self.internal_tx.clone();
                    tokio::spawn(async move {
                        time::sleep(timeout).await;
                        let _ = tx.send(Internal::ConnectTimeout { call_id });
                    });
                }
                let _ = reply.send(call_id);
            }
            Command::EndCall { reply } => {
                self.controller.hangup();
                let _ = reply.send(());
            }
            Command::ToggleMute { reply } => {
                let _ = reply.send(self.controller.toggle_mute());
            }
            Command::Shutdown { reply } => {
                self.controller.dispose();
                let _ = reply.send(());
            }
        }
    }

    fn on_internal(&mut self, event: Internal) {
        match event {
            Internal::DevicesAcquired { call_id, result } => match result {
                Ok((mic, output)) => {
                    if self.controller.attach_devices(call_id, mic, output) {
                        self.open_session(call_id);
                    }
                }
                Err(e) => self.controller.devices_failed(call_id, &e),
            },
            Internal::ConnectTimeout { call_id } => self.controller.connect_timed_out(call_id),
        }
    }

    fn acquire_devices(&self, call_id: u64) {
        let backend = Arc::clone(&self.backend);
        let tx = self.internal_tx.clone();
        let request = CaptureRequest {
            sample_rate: CAPTURE_SAMPLE_RATE,
            preferred_device: self.config.preferred_input_device.clone(),
        };
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || acquire(backend.as_ref(), &request))
                .await
                .unwrap_or_else(|e| {
                    Err(VocallError::Other(anyhow::anyhow!(
                        "device acquisition task failed: {e}"
                    )))
                });
            let _ = tx.send(Internal::DevicesAcquired { call_id, result });
        });
    }

    fn open_session(&mut self, call_id: u64) {
        let Some(agent) = self.controller.call().map(|c| c.agent.clone()) else {
            return;
        };
        match self.connector.open(&agent, call_id, self.session_tx.clone()) {
            Ok(session) => {
                self.controller.attach_session(call_id, session);
            }
            Err(e) => self.controller.session_failed(call_id, &e),
        }
    }
}

/// Acquire output then microphone; on microphone failure the output is
/// closed again before the error is returned.
fn acquire(backend: &dyn AudioBackend, request: &CaptureRequest) -> Result<AcquiredDevices> {
    let mut output = backend.open_output(PLAYBACK_SAMPLE_RATE)?;
    match backend.open_microphone(request) {
        Ok(mic) => Ok((mic, output)),
        Err(e) => {
            let _ = output.close();
            Err(e)
        }
    }
}

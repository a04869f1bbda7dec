//! Websocket client for the Gemini Live bidirectional streaming API.
//!
//! ## Connection task
//!
//! ```text
//! open() ──spawn──► connect_async ─► send setup ─► loop {
//!                                     shutdown signal  → Close frame, exit quietly
//!                                     outbound frame   → realtimeInput
//!                                     inbound message  → Opened / Frame events
//!                                     socket closed    → Closed event
//!                                     transport error  → Error event
//!                                   }
//! ```
//!
//! The handle returned by `open()` holds the bounded outbound queue and the
//! shutdown signal. Closing from our side never emits `Closed`: the call is
//! already ending.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use super::wire::{ClientMessage, ServerMessage};
use super::{
    AgentConfig, SessionEvent, SessionEventKind, SessionEventSender, VoiceConnector, VoiceSession,
};
use crate::buffering::EncodedFrame;
use crate::error::{Result, VocallError};

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Frames waiting for the socket writer. Full means the link is behind real
/// time and the newest frame is dropped.
const OUTBOUND_QUEUE_CAP: usize = 8;

#[derive(Clone)]
pub struct GeminiLiveConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
}

impl GeminiLiveConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self) -> String {
        if self.api_key.is_empty() {
            return self.endpoint.clone();
        }
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.endpoint, sep, self.api_key)
    }
}

impl std::fmt::Debug for GeminiLiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GeminiLiveConnector {
    config: GeminiLiveConfig,
}

impl GeminiLiveConnector {
    pub fn new(config: GeminiLiveConfig) -> Self {
        Self { config }
    }
}

impl VoiceConnector for GeminiLiveConnector {
    fn open(
        &self,
        agent: &AgentConfig,
        call_id: u64,
        events: SessionEventSender,
    ) -> Result<Box<dyn VoiceSession>> {
        let setup = serde_json::to_string(&ClientMessage::setup(
            &self.config.model,
            &agent.system_instruction,
        ))
        .map_err(|e| VocallError::Channel(format!("encode setup: {e}")))?;

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAP);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let open = Arc::new(AtomicBool::new(false));

        let link = Link {
            url: self.config.url(),
            setup,
            call_id,
            events,
            open: Arc::clone(&open),
        };
        info!(call_id, agent = %agent.id, model = %self.config.model, "opening live session");
        tokio::spawn(link.run(outbound_rx, shutdown_rx));

        Ok(Box::new(GeminiLiveSession {
            outbound: outbound_tx,
            shutdown: Some(shutdown_tx),
            open,
        }))
    }
}

pub struct GeminiLiveSession {
    outbound: mpsc::Sender<EncodedFrame>,
    shutdown: Option<oneshot::Sender<()>>,
    open: Arc<AtomicBool>,
}

impl VoiceSession for GeminiLiveSession {
    fn send(&self, frame: EncodedFrame) -> Result<()> {
        if self.shutdown.is_none() || !self.open.load(Ordering::Acquire) {
            return Err(VocallError::SessionNotOpen);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                VocallError::Channel("outbound queue full".into())
            }
            mpsc::error::TrySendError::Closed(_) => VocallError::SessionNotOpen,
        })
    }

    fn close(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            self.open.store(false, Ordering::Release);
            // The task may already be gone after a remote close; nothing to release then.
            let _ = shutdown.send(());
        }
        Ok(())
    }
}

impl Drop for GeminiLiveSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct Link {
    url: String,
    setup: String,
    call_id: u64,
    events: SessionEventSender,
    open: Arc<AtomicBool>,
}

impl Link {
    fn emit(&self, kind: SessionEventKind) {
        let _ = self.events.send(SessionEvent {
            call_id: self.call_id,
            kind,
        });
    }

    async fn run(
        self,
        mut outbound: mpsc::Receiver<EncodedFrame>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let call_id = self.call_id;
        let connect = tokio::select! {
            _ = &mut shutdown => {
                debug!(call_id, "session closed before connect completed");
                return;
            }
            res = connect_async(self.url.as_str()) => res,
        };
        let ws = match connect {
            Ok((ws, _response)) => ws,
            Err(e) => {
                warn!(call_id, "live session connect failed: {e}");
                self.emit(SessionEventKind::Error(format!("connect: {e}")));
                return;
            }
        };
        let (mut sink, mut stream) = ws.split();

        if let Err(e) = sink.send(Message::Text(self.setup.clone())).await {
            self.emit(SessionEventKind::Error(format!("send setup: {e}")));
            return;
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    self.open.store(false, Ordering::Release);
                    let _ = sink.send(Message::Close(None)).await;
                    debug!(call_id, "live session closed locally");
                    return;
                }
                Some(frame) = outbound.recv() => {
                    let payload = match serde_json::to_string(&ClientMessage::audio(&frame)) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(call_id, "encode realtime input: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(payload)).await {
                        self.fail(format!("send audio: {e}"));
                        return;
                    }
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.on_payload(text.as_bytes()),
                    Some(Ok(Message::Binary(bytes))) => self.on_payload(&bytes),
                    Some(Ok(Message::Close(frame))) => {
                        info!(call_id, ?frame, "live session closed by remote");
                        self.open.store(false, Ordering::Release);
                        self.emit(SessionEventKind::Closed);
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.fail(format!("receive: {e}"));
                        return;
                    }
                    None => {
                        self.open.store(false, Ordering::Release);
                        self.emit(SessionEventKind::Closed);
                        return;
                    }
                },
            }
        }
    }

    fn fail(&self, detail: String) {
        warn!(call_id = self.call_id, "live session error: {detail}");
        self.open.store(false, Ordering::Release);
        self.emit(SessionEventKind::Error(detail));
    }

    fn on_payload(&self, bytes: &[u8]) {
        let msg: ServerMessage = match serde_json::from_slice(bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(call_id = self.call_id, "unparseable server message: {e}");
                return;
            }
        };
        if msg.setup_complete.is_some() && !self.open.swap(true, Ordering::AcqRel) {
            info!(call_id = self.call_id, "live session open");
            self.emit(SessionEventKind::Opened);
        }
        if let Some(content) = msg.server_content.as_ref() {
            if content.interrupted {
                debug!(call_id = self.call_id, "model turn interrupted");
            }
        }
        for frame in msg.audio_frames() {
            self.emit(SessionEventKind::Frame(frame));
        }
        if msg.go_away.is_some() {
            info!(call_id = self.call_id, "service announced disconnect");
        }
    }
}

//! Voice session abstraction: one logical duplex channel to a remote voice
//! service per call.
//!
//! `VoiceConnector::open` never waits for the channel. Completion, inbound
//! audio, remote close and failures all arrive later as [`SessionEvent`]s on
//! the sender handed to `open`, tagged with the call they belong to. The call
//! controller is the only consumer of those events.

pub mod gemini;
pub mod loopback;
pub mod wire;

pub use gemini::{GeminiLiveConfig, GeminiLiveConnector};
pub use loopback::LoopbackConnector;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::buffering::EncodedFrame;
use crate::error::Result;

/// The agent a call is placed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    /// Free-form instruction the remote model is primed with at open.
    pub system_instruction: String,
}

impl AgentConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            system_instruction: system_instruction.into(),
        }
    }
}

/// Lifecycle notification from a voice session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    /// Call that opened the session. Events from a superseded call are ignored.
    pub call_id: u64,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    /// Channel established, ready to stream.
    Opened,
    /// Model audio (PCM16, 24 kHz mono).
    Frame(EncodedFrame),
    /// The remote side closed the channel.
    Closed,
    /// Transport or service failure. Treated as a close; never retried.
    Error(String),
}

pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;

/// Handle to one open (or opening) session.
pub trait VoiceSession: Send {
    /// Fire-and-forget send of one captured frame.
    ///
    /// # Errors
    /// `SessionNotOpen` before "opened" or after close, `Channel` when the
    /// outbound queue is saturated. Callers drop the frame either way.
    fn send(&self, frame: EncodedFrame) -> Result<()>;

    /// Release the channel. Safe to call any number of times; the underlying
    /// resource is released exactly once.
    fn close(&mut self) -> Result<()>;
}

/// Factory for sessions. One connector serves many calls.
pub trait VoiceConnector: Send + Sync + 'static {
    /// Begin opening a session for `agent`. Must be called inside a Tokio
    /// runtime; returns as soon as the connection attempt is under way.
    fn open(
        &self,
        agent: &AgentConfig,
        call_id: u64,
        events: SessionEventSender,
    ) -> Result<Box<dyn VoiceSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_config_uses_camel_case() {
        let agent = AgentConfig::new("travel", "Travel Guide", "You plan trips.");
        let json = serde_json::to_value(&agent).expect("serialize agent");
        assert_eq!(json["systemInstruction"], "You plan trips.");
        let back: AgentConfig = serde_json::from_value(json).expect("deserialize agent");
        assert_eq!(back, agent);
    }
}

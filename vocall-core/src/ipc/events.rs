//! Signals the engine publishes for the presentation layer.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `CallStatusEvent` | `CallEngine::subscribe_status` |
//! | `CallLevelEvent` | `CallEngine::subscribe_level` |
//! | `CallDurationEvent` | `CallEngine::subscribe_duration` |
//! | `CallSummary` | `CallEngine::subscribe_summaries` |
//!
//! All payloads serialize camelCase so a web front-end can consume them as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Call state
// ---------------------------------------------------------------------------

/// Lifecycle of one call. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    Connecting,
    Connected,
    Ended,
}

impl CallState {
    pub fn is_active(self) -> bool {
        !matches!(self, CallState::Ended)
    }
}

/// Why a call reached `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// The user hung up.
    Hangup,
    /// The remote service closed the channel.
    RemoteClosed,
    /// Network or service failure.
    ChannelError,
    /// Microphone or speaker could not be acquired, or was lost.
    DeviceUnavailable,
    /// Still connecting when the configured connect timeout elapsed.
    ConnectTimeout,
    /// A new call was started over this one.
    Replaced,
    /// The engine itself was shut down.
    Disposed,
}

/// Emitted on every state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusEvent {
    pub call_id: u64,
    pub state: CallState,
    /// Set when `state` is `Ended`.
    pub reason: Option<EndReason>,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Level / duration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelSource {
    /// RMS of the latest captured block.
    Microphone,
    /// Fixed level while model audio is playing, zero when a frame finishes.
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLevelEvent {
    pub call_id: u64,
    /// Loudness in [0.0, 1.0].
    pub level: f32,
    pub source: LevelSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDurationEvent {
    pub call_id: u64,
    pub seconds: u64,
}

// ---------------------------------------------------------------------------
// Snapshot / summary
// ---------------------------------------------------------------------------

/// Read-only view of the current (or last) call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub call_id: u64,
    pub agent_id: Option<String>,
    /// `None` until the first call starts.
    pub state: Option<CallState>,
    pub duration_secs: u64,
    pub level: f32,
    pub muted: bool,
}

/// Published once per call when it reaches `Ended`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub call_id: u64,
    pub agent_id: String,
    pub agent_name: String,
    pub duration_secs: u64,
    pub reason: EndReason,
    pub ended_at: DateTime<Utc>,
}

impl CallSummary {
    /// One-line recap for a chat transcript, e.g. `Call ended (2:05)`.
    pub fn headline(&self) -> String {
        format!("Call ended ({})", format_duration(self.duration_secs))
    }
}

/// `m:ss`, minutes unbounded.
pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

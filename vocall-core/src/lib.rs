//! # vocall-core
//!
//! Real-time voice call engine SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → CpalMicrophone → SPSC RingBuffer → CapturePipeline ─► VoiceSession::send
//!                                                      (16 kHz blocks, RMS, mute)
//!
//! VoiceSession events ─► CallController ─► PlaybackScheduler ─► CpalOutput timeline
//!                              │               (24 kHz, gapless cursor)
//!                              ▼
//!              broadcast: status / level / duration / summary
//! ```
//!
//! `CallEngine` runs the controller on a single Tokio task; the cpal
//! callbacks only move samples through lock-free queues.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod session;

/// Rate of every captured block sent to the voice service (Hz).
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
/// Rate of every model frame received from the voice service (Hz).
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

// Convenience re-exports for downstream crates
pub use audio::device::{list_input_devices, AudioBackend, DeviceInfo};
pub use engine::{CallEngine, DiagnosticsSnapshot, EngineConfig};
pub use error::{ErrorKind, VocallError};
pub use ipc::events::{
    format_duration, CallDurationEvent, CallLevelEvent, CallSnapshot, CallState,
    CallStatusEvent, CallSummary, EndReason, LevelSource,
};
pub use session::{AgentConfig, GeminiLiveConfig, GeminiLiveConnector, LoopbackConnector};

#[cfg(feature = "audio-cpal")]
pub use audio::CpalBackend;

use thiserror::Error;

/// All errors produced by vocall-core.
#[derive(Debug, Error)]
pub enum VocallError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    #[error("voice channel error: {0}")]
    Channel(String),

    #[error("voice session is not open")]
    SessionNotOpen,

    #[error("teardown incomplete, failed steps: {}", failed.join(", "))]
    TeardownPartial { failed: Vec<String> },

    #[error("call engine has stopped")]
    EngineStopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse error categories used for lifecycle decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Microphone or output device cannot be acquired. Fatal for the call attempt.
    DeviceUnavailable,
    /// Frame byte length inconsistent with 16-bit framing. The frame is dropped.
    MalformedAudio,
    /// Network or service-side failure. Ends the call, never retried.
    ChannelError,
    /// One or more release steps failed during teardown.
    TeardownPartial,
    Internal,
}

impl VocallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceUnavailable(_)
            | Self::NoDefaultInputDevice
            | Self::NoDefaultOutputDevice
            | Self::AudioStream(_) => ErrorKind::DeviceUnavailable,
            Self::MalformedAudio(_) => ErrorKind::MalformedAudio,
            Self::Channel(_) | Self::SessionNotOpen => ErrorKind::ChannelError,
            Self::TeardownPartial { .. } => ErrorKind::TeardownPartial,
            Self::EngineStopped | Self::Io(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, VocallError>;

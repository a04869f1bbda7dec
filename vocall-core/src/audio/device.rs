//! Device boundary: the traits the engine acquires audio I/O through, and
//! input device enumeration.
//!
//! Acquisition is blocking (the OS may prompt for permission or spin up a
//! driver); the engine calls [`AudioBackend`] methods from a blocking task.
//! Release is explicit and must be safe to call more than once.

use serde::{Deserialize, Serialize};

use crate::buffering::AudioFrame;
use crate::error::Result;

/// What the engine asks of the capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Rate the microphone handle must deliver samples at.
    pub sample_rate: u32,
    /// Input device name to prefer; falls back to the default device.
    pub preferred_device: Option<String>,
}

/// Factory for device handles. One backend serves many calls.
pub trait AudioBackend: Send + Sync + 'static {
    /// Acquire the microphone.
    ///
    /// # Errors
    /// A `DeviceUnavailable`-kind error when permission is denied or no
    /// device exists.
    fn open_microphone(&self, request: &CaptureRequest) -> Result<Box<dyn MicrophoneStream>>;

    /// Acquire the output device. Frames handed to it are at `sample_rate`.
    fn open_output(&self, sample_rate: u32) -> Result<Box<dyn OutputDevice>>;
}

/// A live microphone. Samples are mono at the requested capture rate.
pub trait MicrophoneStream: Send {
    /// Append every sample captured since the previous call to `out`.
    /// Returns how many samples were appended.
    fn read(&mut self, out: &mut Vec<f32>) -> Result<usize>;

    /// Stop the device tracks and release the handle. Idempotent.
    fn release(&mut self) -> Result<()>;
}

/// An output device with its own clock.
pub trait OutputDevice: Send {
    /// Device clock in seconds. Monotonically non-decreasing.
    fn current_time(&self) -> f64;

    /// Queue `frame` to start playing at `start_at` on the device clock.
    /// A start time already in the past plays immediately.
    fn schedule(&mut self, frame: AudioFrame, start_at: f64) -> Result<()>;

    /// Close the device. Audio still queued is cut off. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Metadata about an audio input device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    pub is_default: bool,
}

/// List available audio input devices, default device first.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            return default_name
                .map(|name| {
                    vec![DeviceInfo {
                        name,
                        is_default: true,
                    }]
                })
                .unwrap_or_default();
        }
    };

    let mut list = devices
        .enumerate()
        .map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
            let is_default = default_name.as_deref() == Some(name.as_str());
            DeviceInfo { name, is_default }
        })
        .collect::<Vec<_>>();
    sort_devices(&mut list);
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

fn sort_devices(list: &mut [DeviceInfo]) {
    list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}

/// Position of the preferred device among `names`: an exact match wins,
/// then a case-insensitive one. Surrounding whitespace is ignored.
pub fn match_device_index(names: &[String], preferred: &str) -> Option<usize> {
    let wanted = preferred.trim();
    if wanted.is_empty() {
        return None;
    }
    names
        .iter()
        .position(|name| name.trim() == wanted)
        .or_else(|| {
            names
                .iter()
                .position(|name| name.trim().eq_ignore_ascii_case(wanted))
        })
}

//! Contract with the platform capture layer.
//!
//! A backend enumerates inputs and acquires one; the acquired source is then
//! started with a fully built [`Processor`]. Splitting acquisition from
//! start lets a failed acquisition abort before any stage exists.

use crate::error::CaptureError;
use crate::processor::Processor;

/// One selectable input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: String,
    pub label: String,
    pub is_default: bool,
}

/// What the engine asks of the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_size: Option<u32>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl CaptureRequest {
    /// Unprocessed instrument input: no echo cancellation, noise suppression
    /// or automatic gain.
    pub fn raw(sample_rate: u32, channels: u16, block_size: Option<u32>) -> Self {
        Self {
            sample_rate,
            channels,
            block_size,
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
        }
    }
}

pub trait CaptureBackend {
    type Source: CaptureSource;

    fn list_input_devices(&self) -> Result<Vec<InputDevice>, CaptureError>;

    /// Open `device_id` (or the default input) without starting audio.
    fn acquire(&mut self, device_id: Option<&str>, request: &CaptureRequest) -> Result<Self::Source, CaptureError>;
}

/// An acquired, not yet running, input.
pub trait CaptureSource {
    type Stream: LiveStream;

    /// Rate the processor must be built for.
    fn sample_rate(&self) -> u32;

    /// Start audio, moving the processor onto the audio thread.
    fn start(self, processor: Processor) -> Result<Self::Stream, CaptureError>;
}

/// A running capture → process → output pipeline. Dropping it releases the
/// device.
pub trait LiveStream {
    /// Set once the device reported a fatal error (e.g. unplugged).
    fn fault(&self) -> Option<String>;

    /// Stop audio and release the device. Resources are released even when
    /// an error is returned.
    fn stop(self) -> Result<(), CaptureError>;
}

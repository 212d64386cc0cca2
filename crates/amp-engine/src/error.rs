use thiserror::Error;

use crate::session::SessionState;

/// Why an input could not be captured. Raised only while acquiring or
/// starting capture; the DSP path itself has no failure modes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("access to the audio input was denied")]
    PermissionDenied,
    #[error("no audio input device found")]
    DeviceNotFound,
    #[error("audio input device is in use by another application")]
    DeviceBusy,
    #[error("audio capture unsupported: {0}")]
    Unsupported(String),
    #[error("audio capture failed: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Everything except `Unsupported` can succeed on a later attempt once
    /// the user fixes the cause.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CaptureError::Unsupported(_))
    }

    /// Short hint for the control surface.
    pub fn hint(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied => "allow microphone/input access for this program and retry",
            CaptureError::DeviceNotFound => "connect an instrument interface or microphone and retry",
            CaptureError::DeviceBusy => "close other programs using the input and retry",
            CaptureError::Unsupported(_) => "this audio host cannot capture with the required format",
            CaptureError::Unknown(_) => "check that the input is connected and accessible",
        }
    }

    /// Classify a host-specific error message.
    pub(crate) fn from_backend(description: &str) -> Self {
        let d = description.to_lowercase();
        if d.contains("denied") || d.contains("permission") || d.contains("not authorized") {
            CaptureError::PermissionDenied
        } else if d.contains("busy") || d.contains("in use") || d.contains("exclusive") {
            CaptureError::DeviceBusy
        } else if d.contains("no such device") || d.contains("not found") {
            CaptureError::DeviceNotFound
        } else {
            CaptureError::Unknown(description.to_string())
        }
    }
}

#[allow(unreachable_patterns)]
impl From<cpal::BuildStreamError> for CaptureError {
    fn from(e: cpal::BuildStreamError) -> Self {
        match e {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            cpal::BuildStreamError::StreamConfigNotSupported => {
                CaptureError::Unsupported("stream configuration rejected by device".into())
            }
            cpal::BuildStreamError::BackendSpecific { err } => CaptureError::from_backend(&err.description),
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

#[allow(unreachable_patterns)]
impl From<cpal::PlayStreamError> for CaptureError {
    fn from(e: cpal::PlayStreamError) -> Self {
        match e {
            cpal::PlayStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            cpal::PlayStreamError::BackendSpecific { err } => CaptureError::from_backend(&err.description),
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

#[allow(unreachable_patterns)]
impl From<cpal::PauseStreamError> for CaptureError {
    fn from(e: cpal::PauseStreamError) -> Self {
        match e {
            cpal::PauseStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            cpal::PauseStreamError::BackendSpecific { err } => CaptureError::from_backend(&err.description),
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

#[allow(unreachable_patterns)]
impl From<cpal::SupportedStreamConfigsError> for CaptureError {
    fn from(e: cpal::SupportedStreamConfigsError) -> Self {
        match e {
            cpal::SupportedStreamConfigsError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            cpal::SupportedStreamConfigsError::BackendSpecific { err } => {
                CaptureError::from_backend(&err.description)
            }
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

#[allow(unreachable_patterns)]
impl From<cpal::DefaultStreamConfigError> for CaptureError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                CaptureError::Unsupported("device has no input stream".into())
            }
            cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                CaptureError::from_backend(&err.description)
            }
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

impl From<cpal::DevicesError> for CaptureError {
    fn from(e: cpal::DevicesError) -> Self {
        CaptureError::from_backend(&e.to_string())
    }
}

/// Rejected control-plane mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("channel can only be switched while the amp is off (currently {0:?})")]
    ChannelLocked(SessionState),
    #[error("input device can only be changed while the amp is off (currently {0:?})")]
    DeviceLocked(SessionState),
}

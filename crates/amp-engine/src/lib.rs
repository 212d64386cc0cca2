pub mod backend;
pub mod capture;
pub mod control;
pub mod devices;
pub mod dsp;
pub mod error;
pub mod graph;
pub mod meter;
pub mod preset;
pub mod processor;
pub mod ring;
pub mod session;

use std::time::Duration;

pub use backend::CpalBackend;
pub use capture::{CaptureBackend, CaptureRequest, CaptureSource, InputDevice, LiveStream};
pub use control::{ControlState, StageParams};
pub use error::{CaptureError, ControlError};
pub use meter::{LevelHandle, LevelSample};
pub use preset::{Channel, ChannelPreset};
pub use processor::Processor;
pub use session::{Session, SessionEvent, SessionState};

/// Rate asked of the capture device; the device may negotiate another.
pub const PREFERRED_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub output_name: Option<String>, // match by substring (case-insensitive)
    pub output_index: Option<usize>, // explicit index from device list
    pub sample_rate: u32,
    pub block_size: Option<u32>, // frames per buffer (if backend supports)
    pub partition_size: usize,   // reverb convolution block, rounded to 2^n
    pub meter_window: usize,
    pub meter_interval: Duration,
    pub impulse_seed: Option<u64>, // fixed seed for a reproducible reverb tail
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_name: None,
            output_index: None,
            sample_rate: PREFERRED_SAMPLE_RATE,
            block_size: None,
            partition_size: dsp::convolver::DEFAULT_PARTITION,
            meter_window: meter::METER_WINDOW,
            meter_interval: meter::METER_INTERVAL,
            impulse_seed: None,
        }
    }
}

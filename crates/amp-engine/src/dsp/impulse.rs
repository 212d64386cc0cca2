//! Synthetic reverb kernel: stereo white noise under a power-law decay.

use rand::Rng;

/// Reverb tail length used by the signal graph.
pub const REVERB_SECONDS: f32 = 2.0;
/// Envelope exponent used by the signal graph.
pub const REVERB_DECAY: f32 = 2.0;

/// Target RMS of a normalized kernel at the calibration rate.
pub const NORMALIZE_GAIN: f32 = 0.00125;
/// Rate the normalization gain is calibrated at.
pub const NORMALIZE_SAMPLE_RATE: f32 = 44_100.0;
/// Floor for the kernel RMS so silent kernels do not blow up the scale.
const NORMALIZE_MIN_RMS: f32 = 0.000125;

/// Two-channel impulse response. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    channels: [Vec<f32>; 2],
    sample_rate: u32,
}

impl ImpulseResponse {
    /// `duration * sample_rate` samples per channel, sample `i` drawn from
    /// U(-1, 1) and scaled by `(1 - i/len)^decay`.
    pub fn synthesize<R: Rng>(duration: f32, decay: f32, sample_rate: u32, rng: &mut R) -> Self {
        let len = (duration.max(0.0) * sample_rate as f32).round() as usize;
        let mut channel = || -> Vec<f32> {
            (0..len)
                .map(|i| {
                    let env = (1.0 - i as f32 / len as f32).powf(decay);
                    rng.gen_range(-1.0f32..1.0) * env
                })
                .collect()
        };
        let left = channel();
        let right = channel();
        Self { channels: [left, right], sample_rate }
    }

    /// Wrap recorded or hand-built kernels. The shorter channel is
    /// zero-padded to the longer one.
    pub fn from_channels(mut left: Vec<f32>, mut right: Vec<f32>, sample_rate: u32) -> Self {
        let len = left.len().max(right.len());
        left.resize(len, 0.0);
        right.resize(len, 0.0);
        Self { channels: [left, right], sample_rate }
    }

    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }

    pub fn channel(&self, idx: usize) -> &[f32] {
        &self.channels[idx]
    }

    pub fn left(&self) -> &[f32] {
        &self.channels[0]
    }

    pub fn right(&self) -> &[f32] {
        &self.channels[1]
    }

    /// Kernel gain that brings the RMS over both channels to
    /// [`NORMALIZE_GAIN`], compensated for sample rate so a longer kernel
    /// at a higher rate plays at the same level.
    pub fn normalization_scale(&self) -> f32 {
        let count = self.channels.iter().map(Vec::len).sum::<usize>().max(1);
        let energy: f64 = self.channels.iter().flatten().map(|&h| (h as f64) * (h as f64)).sum();
        let mut rms = (energy / count as f64).sqrt() as f32;
        if !rms.is_finite() || rms < NORMALIZE_MIN_RMS {
            rms = NORMALIZE_MIN_RMS;
        }
        let mut scale = NORMALIZE_GAIN / rms;
        if self.sample_rate > 0 {
            scale *= NORMALIZE_SAMPLE_RATE / self.sample_rate as f32;
        }
        scale
    }
}

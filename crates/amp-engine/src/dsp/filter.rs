//! Lowpass tone control.

use std::f32::consts::PI;

use super::smooth::Smooth;
use super::stage::Stage;

/// Resonance of the tone filter.
pub const TONE_Q: f32 = 1.0;
/// Lowest cutoff the tone filter accepts.
pub const MIN_CUTOFF_HZ: f32 = 10.0;

const CUTOFF_GLIDE_MS: f32 = 20.0;
/// Coefficients are recomputed at most this often while the cutoff glides.
const COEFF_INTERVAL: usize = 16;

/// RBJ cookbook lowpass biquad, transposed direct form II.
pub struct ToneFilter {
    sample_rate: f32,
    q: f32,
    target: f32,
    cutoff: Smooth,
    coeff_hz: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl ToneFilter {
    pub fn new(sample_rate: f32, cutoff_hz: f32, q: f32) -> Self {
        let cutoff_hz = clamp_cutoff(cutoff_hz, sample_rate);
        let mut f = Self {
            sample_rate,
            q,
            target: cutoff_hz,
            cutoff: Smooth::new(sample_rate, CUTOFF_GLIDE_MS, cutoff_hz),
            coeff_hz: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        };
        f.update_coefficients(cutoff_hz);
        f
    }

    /// Target cutoff, clamped to `[MIN_CUTOFF_HZ, 0.49 * sample_rate]`.
    pub fn set_cutoff(&mut self, hz: f32) {
        self.target = clamp_cutoff(hz, self.sample_rate);
    }

    pub fn cutoff(&self) -> f32 {
        self.coeff_hz
    }

    fn update_coefficients(&mut self, hz: f32) {
        let w0 = 2.0 * PI * hz / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * self.q);
        let a0 = 1.0 + alpha;
        let b1 = (1.0 - cos_w0) / a0;
        self.b0 = b1 * 0.5;
        self.b1 = b1;
        self.b2 = b1 * 0.5;
        self.a1 = -2.0 * cos_w0 / a0;
        self.a2 = (1.0 - alpha) / a0;
        self.coeff_hz = hz;
    }

    #[inline]
    fn tick(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

fn clamp_cutoff(hz: f32, sample_rate: f32) -> f32 {
    let hi = 0.49 * sample_rate;
    if hz.is_nan() { hi } else { hz.clamp(MIN_CUTOFF_HZ, hi) }
}

impl Stage for ToneFilter {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
        self.cutoff.reset(self.target);
        self.update_coefficients(self.target);
    }

    fn process(&mut self, block: &mut [f32]) {
        for chunk in block.chunks_mut(COEFF_INTERVAL) {
            if self.coeff_hz != self.target {
                let hz = self.cutoff.skip(self.target, chunk.len());
                // snap once the glide is inaudible
                let hz = if (hz - self.target).abs() < 0.01 { self.target } else { hz };
                self.update_coefficients(hz);
            }
            for s in chunk.iter_mut() {
                *s = self.tick(*s);
            }
        }
    }
}

use super::smooth::Smooth;
use super::stage::Stage;

/// Gain ramp length.
pub const GAIN_GLIDE_MS: f32 = 10.0;

/// Linear gain with de-zippered changes.
pub struct Gain {
    target: f32,
    smooth: Smooth,
}

impl Gain {
    pub fn new(sample_rate: f32, gain: f32) -> Self {
        Self { target: gain, smooth: Smooth::new(sample_rate, GAIN_GLIDE_MS, gain) }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.target = gain;
    }

    /// Current (smoothed) gain, advanced by one sample.
    #[inline]
    pub fn next_gain(&mut self) -> f32 {
        self.smooth.next(self.target)
    }
}

impl Stage for Gain {
    fn reset(&mut self) {
        self.smooth.reset(self.target);
    }

    fn process(&mut self, block: &mut [f32]) {
        for s in block.iter_mut() {
            *s *= self.smooth.next(self.target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_gain_scales() {
        let mut g = Gain::new(44_100.0, 0.5);
        let mut block = [1.0f32, -1.0, 0.25];
        g.process(&mut block);
        assert_eq!(block, [0.5, -0.5, 0.125]);
    }

    #[test]
    fn gain_change_ramps() {
        let mut g = Gain::new(44_100.0, 0.0);
        g.set_gain(1.0);
        let mut block = [1.0f32; 64];
        g.process(&mut block);
        assert!(block[0] < 0.01);
        assert!(block.windows(2).all(|w| w[1] >= w[0]));
        assert!(block[63] < 1.0);
        g.reset();
        assert_eq!(g.next_gain(), 1.0);
    }
}

use std::mem;

use super::curve::DistortionCurve;
use super::stage::Stage;

/// Waveshaper driven by a precomputed transfer table.
pub struct Shaper {
    curve: DistortionCurve,
}

impl Shaper {
    pub fn new(curve: DistortionCurve) -> Self {
        Self { curve }
    }

    pub fn curve(&self) -> &DistortionCurve {
        &self.curve
    }

    /// Install a new table, handing back the old one so the caller decides
    /// where it gets dropped.
    pub fn swap_curve(&mut self, curve: DistortionCurve) -> DistortionCurve {
        mem::replace(&mut self.curve, curve)
    }
}

impl Stage for Shaper {
    fn process(&mut self, block: &mut [f32]) {
        for s in block.iter_mut() {
            *s = self.curve.lookup(*s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_curve_passes_signal() {
        let mut sh = Shaper::new(DistortionCurve::identity());
        let mut block = [0.0f32, 0.5, -0.5, 0.9];
        sh.process(&mut block);
        assert_relative_eq!(block[1], 0.5, epsilon = 1e-4);
        assert_relative_eq!(block[2], -0.5, epsilon = 1e-4);
        assert_relative_eq!(block[3], 0.9, epsilon = 1e-4);
    }

    #[test]
    fn hot_input_is_bounded() {
        let mut sh = Shaper::new(DistortionCurve::new(150.0));
        let mut block = [8.0f32, -8.0, 1.0, -1.0];
        sh.process(&mut block);
        assert!(block.iter().all(|s| s.abs() < 0.36));
    }

    #[test]
    fn swap_returns_previous_table() {
        let mut sh = Shaper::new(DistortionCurve::new(20.0));
        let old = sh.swap_curve(DistortionCurve::new(40.0));
        assert_eq!(old.amount(), 20.0);
        assert_eq!(sh.curve().amount(), 40.0);
    }
}

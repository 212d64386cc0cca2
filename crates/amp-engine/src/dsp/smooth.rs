/// One-pole parameter smoother.
#[derive(Debug, Clone)]
pub struct Smooth {
    y: f32,
    a: f32,
}

impl Smooth {
    pub fn new(sr: f32, ms: f32, initial: f32) -> Self {
        Self { y: initial, a: Self::coeff(sr, ms) }
    }

    fn coeff(sr: f32, ms: f32) -> f32 {
        let n = ms * 0.001 * sr;
        if n <= 0.0 { 0.0 } else { (-1.0 / n).exp() }
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.y
    }

    #[inline]
    pub fn next(&mut self, target: f32) -> f32 {
        self.y = self.a * self.y + (1.0 - self.a) * target;
        self.y
    }

    /// Advance `n` steps towards a fixed target at once.
    #[inline]
    pub fn skip(&mut self, target: f32, n: usize) -> f32 {
        let k = self.a.powi(n as i32);
        self.y = target + (self.y - target) * k;
        self.y
    }

    /// Jump straight to `value`.
    pub fn reset(&mut self, value: f32) {
        self.y = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn converges_to_target() {
        let mut s = Smooth::new(44_100.0, 10.0, 0.0);
        let mut y = 0.0;
        for _ in 0..44_100 {
            y = s.next(1.0);
        }
        assert_relative_eq!(y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn no_step_on_change() {
        let mut s = Smooth::new(44_100.0, 10.0, 0.0);
        let first = s.next(1.0);
        assert!(first > 0.0 && first < 0.01);
    }

    #[test]
    fn skip_matches_stepping() {
        let mut a = Smooth::new(48_000.0, 5.0, 0.2);
        let mut b = a.clone();
        for _ in 0..64 {
            a.next(0.9);
        }
        b.skip(0.9, 64);
        assert_relative_eq!(a.value(), b.value(), epsilon = 1e-5);
    }

    #[test]
    fn zero_time_is_instant() {
        let mut s = Smooth::new(44_100.0, 0.0, 0.0);
        assert_eq!(s.next(0.7), 0.7);
    }
}

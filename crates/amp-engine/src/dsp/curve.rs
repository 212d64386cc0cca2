//! Soft-saturation transfer curve for the waveshaper.

use std::f64::consts::PI;

/// Number of points in every curve table.
pub const CURVE_LEN: usize = 44_100;

const DEG: f64 = PI / 180.0;

/// Transfer function value for input `x` in [-1, 1] at drive `amount`.
/// `amount == 0` is the identity.
pub fn curve_value(amount: f64, x: f64) -> f64 {
    if amount == 0.0 {
        x
    } else {
        (3.0 + amount) * x * 20.0 * DEG / (PI + amount * x.abs())
    }
}

/// Upper bound of `|curve_value(amount, x)|` over x in [-1, 1].
pub fn curve_bound(amount: f64) -> f64 {
    (3.0 + amount) * 20.0 * DEG
}

/// Lookup table of `CURVE_LEN` points covering inputs [-1, 1).
///
/// Tables are immutable once built; a drive change builds a fresh one.
#[derive(Debug, Clone, PartialEq)]
pub struct DistortionCurve {
    amount: f32,
    table: Box<[f32]>,
}

impl DistortionCurve {
    /// Negative or non-finite amounts are treated as 0.
    pub fn new(amount: f32) -> Self {
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        let a = amount as f64;
        let n = CURVE_LEN as f64;
        let table = (0..CURVE_LEN)
            .map(|i| {
                let x = (i as f64 * 2.0) / n - 1.0;
                curve_value(a, x) as f32
            })
            .collect();
        Self { amount, table }
    }

    pub fn identity() -> Self {
        Self::new(0.0)
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Interpolated lookup; inputs outside [-1, 1) clamp to the table ends.
    /// Position `(x + 1) * N/2` inverts the table's index-to-input map, so
    /// silence maps exactly onto `curve(0) = 0`.
    #[inline]
    pub fn lookup(&self, x: f32) -> f32 {
        let last = self.table.len() - 1;
        let pos = (x + 1.0) * (self.table.len() as f32 * 0.5);
        if pos.is_nan() || pos <= 0.0 {
            return self.table[0];
        }
        if pos >= last as f32 {
            return self.table[last];
        }
        let i = pos as usize;
        let frac = pos - i as f32;
        let a = self.table[i];
        let b = self.table[i + 1];
        a + (b - a) * frac
    }
}

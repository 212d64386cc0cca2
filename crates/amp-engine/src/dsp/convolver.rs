//! Uniformly partitioned overlap-save convolution.
//!
//! The kernel is split into `P` blocks of `B` samples, each transformed once
//! at construction. Every `B` input samples the newest `2B` window is
//! transformed, stored in a frequency-domain delay line and multiplied
//! against all partitions. Output lags input by exactly `B` samples.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::impulse::ImpulseResponse;

/// Default partition length.
pub const DEFAULT_PARTITION: usize = 256;

type C32 = Complex<f32>;

pub struct Convolver {
    block: usize,
    partitions: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    scratch: Vec<C32>,
    /// Kernel spectra, `partitions * 2B` per channel.
    kernel: [Vec<C32>; 2],
    /// Input spectra ring, newest at `head`.
    fdl: Vec<C32>,
    head: usize,
    /// `[previous block | current block]`
    window: Vec<f32>,
    fill: usize,
    spectrum: Vec<C32>,
    acc: Vec<C32>,
    out: [Vec<f32>; 2],
}

impl Convolver {
    /// Convolve with `ir` as given. `block` is rounded up to a power of two
    /// (minimum 16).
    pub fn new(ir: &ImpulseResponse, block: usize) -> Self {
        Self::with_gain(ir, block, 1.0)
    }

    /// Convolve with `ir` scaled by its [`ImpulseResponse::normalization_scale`].
    pub fn normalized(ir: &ImpulseResponse, block: usize) -> Self {
        Self::with_gain(ir, block, ir.normalization_scale())
    }

    /// Convolve with `ir * gain`.
    pub fn with_gain(ir: &ImpulseResponse, block: usize, gain: f32) -> Self {
        let block = block.max(16).next_power_of_two();
        let n = 2 * block;
        let partitions = ir.len().div_ceil(block).max(1);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);
        let scratch_len = fft.get_inplace_scratch_len().max(ifft.get_inplace_scratch_len());
        let mut scratch = vec![C32::default(); scratch_len];

        let mut spectra = |taps: &[f32]| -> Vec<C32> {
            let mut out = vec![C32::default(); partitions * n];
            for (p, part) in out.chunks_mut(n).enumerate() {
                let start = (p * block).min(taps.len());
                let end = (start + block).min(taps.len());
                for (dst, &t) in part.iter_mut().zip(&taps[start..end]) {
                    *dst = C32::new(t * gain, 0.0);
                }
                fft.process_with_scratch(part, &mut scratch);
            }
            out
        };
        let kernel = [spectra(ir.left()), spectra(ir.right())];

        Self {
            block,
            partitions,
            fft,
            ifft,
            scratch,
            kernel,
            fdl: vec![C32::default(); partitions * n],
            head: 0,
            window: vec![0.0; n],
            fill: 0,
            spectrum: vec![C32::default(); n],
            acc: vec![C32::default(); n],
            out: [vec![0.0; block], vec![0.0; block]],
        }
    }

    /// Samples of delay between input and output.
    pub fn latency(&self) -> usize {
        self.block
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Feed one mono sample, get one stereo sample back.
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> (f32, f32) {
        let i = self.fill;
        self.window[self.block + i] = x;
        let y = (self.out[0][i], self.out[1][i]);
        self.fill += 1;
        if self.fill == self.block {
            self.run_block();
            self.fill = 0;
        }
        y
    }

    fn run_block(&mut self) {
        let b = self.block;
        let n = 2 * b;
        let p_count = self.partitions;

        for (s, &v) in self.spectrum.iter_mut().zip(&self.window) {
            *s = C32::new(v, 0.0);
        }
        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);
        self.head = (self.head + p_count - 1) % p_count;
        self.fdl[self.head * n..(self.head + 1) * n].copy_from_slice(&self.spectrum);

        let scale = 1.0 / n as f32;
        for ch in 0..2 {
            let kernel = &self.kernel[ch];
            // real input: only bins 0..=B are independent
            self.acc[..=b].fill(C32::default());
            for p in 0..p_count {
                let slot = (self.head + p) % p_count;
                let x = &self.fdl[slot * n..slot * n + b + 1];
                let h = &kernel[p * n..p * n + b + 1];
                for ((a, xv), hv) in self.acc[..=b].iter_mut().zip(x).zip(h) {
                    *a += xv * hv;
                }
            }
            for k in b + 1..n {
                self.acc[k] = self.acc[n - k].conj();
            }
            self.ifft.process_with_scratch(&mut self.acc, &mut self.scratch);
            for (o, a) in self.out[ch].iter_mut().zip(&self.acc[b..]) {
                *o = a.re * scale;
            }
        }

        self.window.copy_within(b..n, 0);
    }

    pub fn clear(&mut self) {
        self.fdl.fill(C32::default());
        self.window.fill(0.0);
        self.out[0].fill(0.0);
        self.out[1].fill(0.0);
        self.fill = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn direct(x: &[f32], h: &[f32]) -> Vec<f32> {
        (0..x.len())
            .map(|t| h.iter().enumerate().filter(|(k, _)| *k <= t).map(|(k, hv)| hv * x[t - k]).sum())
            .collect()
    }

    #[test]
    fn matches_direct_convolution() {
        let mut rng = StdRng::seed_from_u64(5);
        let left: Vec<f32> = (0..70).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let right: Vec<f32> = (0..70).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let ir = ImpulseResponse::from_channels(left.clone(), right.clone(), 44_100);
        let mut conv = Convolver::new(&ir, 16);
        assert_eq!(conv.partitions(), 5);

        let x: Vec<f32> = (0..300).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let (yl, yr): (Vec<f32>, Vec<f32>) = x.iter().map(|&s| conv.process_sample(s)).unzip();
        let want_l = direct(&x, &left);
        let want_r = direct(&x, &right);
        let lat = conv.latency();
        assert!(yl[..lat].iter().all(|&s| s == 0.0));
        for t in 0..x.len() - lat {
            assert!((yl[t + lat] - want_l[t]).abs() < 1e-4, "left sample {t}");
            assert!((yr[t + lat] - want_r[t]).abs() < 1e-4, "right sample {t}");
        }
    }

    #[test]
    fn unit_impulse_kernel_is_pure_delay() {
        let ir = ImpulseResponse::from_channels(vec![1.0], vec![0.5], 44_100);
        let mut conv = Convolver::new(&ir, 32);
        let mut out = Vec::new();
        for t in 0..100 {
            out.push(conv.process_sample(if t == 3 { 1.0 } else { 0.0 }));
        }
        for (t, (l, r)) in out.iter().enumerate() {
            let (el, er) = if t == 35 { (1.0, 0.5) } else { (0.0, 0.0) };
            assert!((l - el).abs() < 1e-5 && (r - er).abs() < 1e-5, "t={t}: {l} {r}");
        }
    }

    #[test]
    fn normalized_kernel_is_scaled() {
        let ir = ImpulseResponse::from_channels(vec![1.0], vec![-1.0], 44_100);
        let scale = ir.normalization_scale();
        let mut conv = Convolver::normalized(&ir, 16);
        let mut out = Vec::new();
        for t in 0..40 {
            out.push(conv.process_sample(if t == 0 { 1.0 } else { 0.0 }));
        }
        let (l, r) = out[conv.latency()];
        assert!((l - scale).abs() < 1e-6 && (r + scale).abs() < 1e-6, "{l} {r}");
    }

    #[test]
    fn block_is_power_of_two() {
        let ir = ImpulseResponse::from_channels(vec![1.0; 10], vec![1.0; 10], 44_100);
        assert_eq!(Convolver::new(&ir, 100).latency(), 128);
        assert_eq!(Convolver::new(&ir, 1).latency(), 16);
    }

    #[test]
    fn clear_silences_tail() {
        let ir = ImpulseResponse::from_channels(vec![1.0; 64], vec![1.0; 64], 44_100);
        let mut conv = Convolver::new(&ir, 16);
        for _ in 0..40 {
            conv.process_sample(1.0);
        }
        conv.clear();
        for _ in 0..200 {
            assert_eq!(conv.process_sample(0.0), (0.0, 0.0));
        }
    }
}

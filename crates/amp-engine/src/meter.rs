//! Input level metering.
//!
//! The audio thread copies every captured sample into a [`LevelTap`]
//! (wait-free, fixed size). A meter thread wakes every few milliseconds,
//! reads the newest window from the tap, and publishes its RMS through an
//! atomic that the control surface can read at any time.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::control::AtomicF32;

/// Samples per RMS window.
pub const METER_WINDOW: usize = 256;
/// Meter refresh period.
pub const METER_INTERVAL: Duration = Duration::from_millis(8);
/// Tap slots; must hold at least one window.
pub const TAP_CAPACITY: usize = 4096;

/// Exact root-mean-square deviation from `center`.
pub fn rms(samples: &[f32], center: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let d = (s - center) as f64;
            d * d
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Bar-graph mapping of an RMS value, in percent.
pub fn display_level(rms: f32) -> f32 {
    (rms * 200.0).min(100.0)
}

/// One published meter reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LevelSample {
    pub rms: f32,
}

impl LevelSample {
    pub fn display(&self) -> f32 {
        display_level(self.rms)
    }
}

/// Circular record of the most recent captured samples.
pub struct LevelTap {
    buf: Box<[AtomicU32]>,
    mask: usize,
    write: AtomicUsize,
}

impl LevelTap {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(2).next_power_of_two();
        Self {
            buf: (0..cap).map(|_| AtomicU32::new(0)).collect(),
            mask: cap - 1,
            write: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Audio thread: record samples, overwriting the oldest.
    #[inline]
    pub fn push(&self, samples: &[f32]) {
        let mut w = self.write.load(Ordering::Relaxed);
        for &s in samples {
            self.buf[w & self.mask].store(s.to_bits(), Ordering::Relaxed);
            w = w.wrapping_add(1);
        }
        self.write.store(w, Ordering::Release);
    }

    /// Copy the newest samples into `out` (oldest first). Returns how many
    /// were available, at most `out.len()`.
    pub fn latest(&self, out: &mut [f32]) -> usize {
        let w = self.write.load(Ordering::Acquire);
        let n = out.len().min(w).min(self.buf.len());
        let start = w.wrapping_sub(n);
        for (i, o) in out[..n].iter_mut().enumerate() {
            *o = f32::from_bits(self.buf[start.wrapping_add(i) & self.mask].load(Ordering::Relaxed));
        }
        n
    }
}

/// Handle the control surface reads the level from.
#[derive(Clone, Default)]
pub struct LevelHandle {
    value: Arc<AtomicF32>,
}

impl LevelHandle {
    pub fn read(&self) -> LevelSample {
        LevelSample { rms: self.value.load() }
    }

    pub(crate) fn publish(&self, rms: f32) {
        self.value.store(rms);
    }
}

/// Computes RMS over the newest tap window.
pub struct LevelMeter {
    tap: Arc<LevelTap>,
    out: LevelHandle,
    window: Vec<f32>,
}

impl LevelMeter {
    pub fn new(tap: Arc<LevelTap>, out: LevelHandle, window: usize) -> Self {
        let window = window.clamp(1, tap.capacity());
        Self { tap, out, window: vec![0.0; window] }
    }

    /// Take one reading and publish it.
    pub fn poll(&mut self) -> LevelSample {
        let n = self.tap.latest(&mut self.window);
        let sample = LevelSample { rms: rms(&self.window[..n], 0.0) };
        self.out.publish(sample.rms);
        sample
    }
}

/// Background thread running a [`LevelMeter`] on a fixed cadence.
pub struct MeterThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MeterThread {
    pub fn spawn(mut meter: LevelMeter, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new().name("amp-meter".into()).spawn(move || {
            debug!("meter running every {interval:?}");
            while !flag.load(Ordering::Acquire) {
                meter.poll();
                thread::sleep(interval);
            }
            meter.out.publish(0.0);
        })?;
        Ok(Self { stop, handle: Some(handle) })
    }

    /// Halt and join. The published level drops to zero.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                warn!("meter thread panicked");
            }
        }
    }
}

impl Drop for MeterThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rms_of_known_signals() {
        assert_eq!(rms(&[], 0.0), 0.0);
        assert_eq!(rms(&[0.5; 64], 0.0), 0.5);
        assert_eq!(rms(&[0.5, -0.5, 0.5, -0.5], 0.0), 0.5);
        let sine: Vec<f32> =
            (0..256).map(|i| (2.0 * std::f32::consts::PI * i as f32 / 64.0).sin()).collect();
        assert_relative_eq!(rms(&sine, 0.0), std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-5);
    }

    #[test]
    fn rms_respects_center() {
        // unsigned byte samples centred on 128
        let bytes = [128.0f32, 138.0, 118.0, 128.0];
        assert_relative_eq!(rms(&bytes, 128.0), (200.0f32 / 4.0).sqrt());
    }

    #[test]
    fn display_is_clamped() {
        assert_eq!(display_level(0.0), 0.0);
        assert_eq!(display_level(0.25), 50.0);
        assert_eq!(display_level(0.9), 100.0);
    }

    #[test]
    fn tap_returns_newest_window() {
        let tap = LevelTap::new(8);
        tap.push(&[1.0, 2.0, 3.0]);
        let mut out = [0.0f32; 4];
        assert_eq!(tap.latest(&mut out), 3);
        assert_eq!(&out[..3], &[1.0, 2.0, 3.0]);
        tap.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(tap.latest(&mut out), 4);
        assert_eq!(out, [7.0, 8.0, 9.0, 10.0]);
        let mut big = [0.0f32; 32];
        assert_eq!(tap.latest(&mut big), 8);
        assert_eq!(&big[..8], &[3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn meter_publishes_window_rms() {
        let tap = Arc::new(LevelTap::new(TAP_CAPACITY));
        let handle = LevelHandle::default();
        let mut meter = LevelMeter::new(tap.clone(), handle.clone(), 4);
        tap.push(&[0.9; 100]);
        tap.push(&[0.1, -0.1, 0.1, -0.1]);
        let s = meter.poll();
        assert_relative_eq!(s.rms, 0.1, epsilon = 1e-6);
        assert_eq!(handle.read(), s);
        assert_relative_eq!(s.display(), 20.0, epsilon = 1e-4);
    }

    #[test]
    fn meter_thread_runs_and_resets_on_stop() {
        let tap = Arc::new(LevelTap::new(TAP_CAPACITY));
        let handle = LevelHandle::default();
        tap.push(&[0.5; METER_WINDOW]);
        let t = MeterThread::spawn(LevelMeter::new(tap, handle.clone(), METER_WINDOW), Duration::from_millis(1))
            .unwrap();
        let mut seen = 0.0;
        for _ in 0..500 {
            seen = handle.read().rms;
            if seen > 0.0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert_relative_eq!(seen, 0.5, epsilon = 1e-6);
        t.stop();
        assert_eq!(handle.read().rms, 0.0);
    }
}

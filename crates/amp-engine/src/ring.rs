//! Lock-free single-producer/single-consumer ring of interleaved output
//! frames, carrying processed audio from the capture callback to the
//! playback callback.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn next_pow2(x: usize) -> usize {
    x.max(1).next_power_of_two()
}

pub struct SpscRing {
    // written only through `Producer`, read only through `Consumer`
    buf: UnsafeCell<Box<[f32]>>,
    mask: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

// Safety: one writer and one reader exist (enforced by the `Producer` /
// `Consumer` split). The writer only touches slots outside [read, write)
// and then advances `write`; the reader only reads [read, write) and then
// advances `read`.
unsafe impl Send for SpscRing {}
unsafe impl Sync for SpscRing {}

impl SpscRing {
    /// Usable capacity is one less than the power-of-two slot count.
    pub fn with_capacity(cap: usize) -> Self {
        let cap_pow2 = next_pow2(cap.max(2));
        Self {
            buf: UnsafeCell::new(vec![0.0f32; cap_pow2].into_boxed_slice()),
            mask: cap_pow2 - 1,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn len(&self, w: usize, r: usize) -> usize {
        w.wrapping_sub(r) & self.mask
    }

    pub fn capacity(&self) -> usize {
        self.mask
    }

    pub fn available(&self) -> usize {
        self.len(self.write.load(Ordering::Acquire), self.read.load(Ordering::Acquire))
    }

    /// Append all of `data` or nothing. False when it does not fit.
    fn push_slice(&self, data: &[f32]) -> bool {
        let r = self.read.load(Ordering::Acquire);
        let w = self.write.load(Ordering::Relaxed);
        let free = self.mask - self.len(w, r);
        if free < data.len() {
            return false;
        }

        // SAFETY: `Producer` is the only caller and is not Clone; slots in
        // [w, w + free) are not visible to the consumer until `write` moves.
        let buf = unsafe { &mut *self.buf.get() };
        let mut wi = w;
        for &v in data {
            buf[wi & self.mask] = v;
            wi = wi.wrapping_add(1);
        }
        self.write.store(wi, Ordering::Release);
        true
    }

    /// Fill all of `out` or nothing. False when too little is queued.
    fn pop_into(&self, out: &mut [f32]) -> bool {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Relaxed);
        if self.len(w, r) < out.len() {
            return false;
        }

        // SAFETY: `Consumer` is the only caller; [r, w) was published by the
        // Release store of `write` and the producer does not touch it.
        let buf = unsafe { &*self.buf.get() };
        let mut ri = r;
        for o in out.iter_mut() {
            *o = buf[ri & self.mask];
            ri = ri.wrapping_add(1);
        }
        self.read.store(ri, Ordering::Release);
        true
    }
}

/// Split a ring into its two ends.
pub fn spsc(cap: usize) -> (Producer, Consumer) {
    let ring = std::sync::Arc::new(SpscRing::with_capacity(cap));
    (Producer { ring: ring.clone() }, Consumer { ring })
}

pub struct Producer {
    ring: std::sync::Arc<SpscRing>,
}

impl Producer {
    pub fn push_slice(&mut self, data: &[f32]) -> bool {
        self.ring.push_slice(data)
    }
}

pub struct Consumer {
    ring: std::sync::Arc<SpscRing>,
}

impl Consumer {
    pub fn pop_into(&mut self, out: &mut [f32]) -> bool {
        self.ring.pop_into(out)
    }

    pub fn available(&self) -> usize {
        self.ring.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_up() {
        assert_eq!(SpscRing::with_capacity(1000).capacity(), 1023);
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1024), 1024);
    }

    #[test]
    fn fifo_order_across_wrap() {
        let (mut tx, mut rx) = spsc(8);
        let mut out = [0.0f32; 5];
        for round in 0..10 {
            let base = round as f32 * 10.0;
            let data: Vec<f32> = (0..5).map(|i| base + i as f32).collect();
            assert!(tx.push_slice(&data));
            assert!(rx.pop_into(&mut out));
            assert_eq!(out.as_slice(), data.as_slice());
        }
    }

    #[test]
    fn overflow_and_underflow_are_refused() {
        let (mut tx, mut rx) = spsc(8);
        assert!(tx.push_slice(&[1.0; 7]));
        assert!(!tx.push_slice(&[1.0]));
        let mut out = [0.0f32; 8];
        assert!(!rx.pop_into(&mut out));
        assert_eq!(rx.available(), 7);
        assert!(rx.pop_into(&mut out[..7]));
        assert_eq!(rx.available(), 0);
    }

    #[test]
    fn threads_see_every_sample() {
        let (mut tx, mut rx) = spsc(256);
        let writer = std::thread::spawn(move || {
            let mut next = 0.0f32;
            while next < 10_000.0 {
                let chunk = [next, next + 1.0, next + 2.0, next + 3.0];
                if tx.push_slice(&chunk) {
                    next += 4.0;
                } else {
                    std::thread::yield_now();
                }
            }
        });
        let mut expect = 0.0f32;
        let mut out = [0.0f32; 4];
        while expect < 10_000.0 {
            if rx.pop_into(&mut out) {
                for v in out {
                    assert_eq!(v, expect);
                    expect += 1.0;
                }
            } else {
                std::thread::yield_now();
            }
        }
        writer.join().unwrap();
    }
}

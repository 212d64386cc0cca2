use std::sync::Arc;

use crate::control::ParamReader;
use crate::graph::{SignalGraph, MAX_BLOCK};
use crate::meter::LevelTap;

/// Audio-thread owner of a live [`SignalGraph`].
///
/// Called once per capture callback. At each block boundary it pulls the
/// latest parameters (and curve, if one was published), feeds the level tap
/// with the raw input, renders, and interleaves into the output buffer.
/// Nothing here blocks, locks or allocates.
pub struct Processor {
    graph: SignalGraph,
    params: ParamReader,
    tap: Arc<LevelTap>,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl Processor {
    pub fn new(graph: SignalGraph, params: ParamReader, tap: Arc<LevelTap>) -> Self {
        Self { graph, params, tap, left: vec![0.0; MAX_BLOCK], right: vec![0.0; MAX_BLOCK] }
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }

    /// Render mono `input` into interleaved `out` with `channels` channels.
    /// `out` must hold `input.len() * channels` samples; extra space is
    /// zeroed. Even channels carry the left mix, odd ones the right.
    pub fn process(&mut self, input: &[f32], out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        self.tap.push(input);

        self.graph.apply(&self.params.params());
        if let Some(curve) = self.params.next_curve() {
            let old = self.graph.swap_curve(curve);
            self.params.retire(old);
        }

        let frames = input.len().min(out.len() / channels);
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(MAX_BLOCK);
            let (l, r) = (&mut self.left[..n], &mut self.right[..n]);
            self.graph.process(&input[done..done + n], l, r);
            let dst = &mut out[done * channels..(done + n) * channels];
            for (i, frame) in dst.chunks_exact_mut(channels).enumerate() {
                for (c, s) in frame.iter_mut().enumerate() {
                    *s = if c % 2 == 0 { l[i] } else { r[i] };
                }
            }
            done += n;
        }
        out[frames * channels..].fill(0.0);
    }
}

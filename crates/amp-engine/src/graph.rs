use crate::control::{BlockParams, StageParams};
use crate::dsp::delay::{DELAY_FEEDBACK, DELAY_SECONDS, MAX_DELAY_SECONDS};
use crate::dsp::{Convolver, DistortionCurve, FeedbackDelay, Gain, ImpulseResponse, Shaper, Stage, ToneFilter};

/// Largest block processed in one pass; longer inputs are split.
pub const MAX_BLOCK: usize = 1024;

/// The amp's fixed processing topology. Owns every stage.
///
/// ```text
/// in ─▶ pre-gain ─▶ shaper ─▶ tone ─┬─▶ dry ───────────────────────┐
///                                   ├─▶ delay send ─▶ delay ◀─┐ fb ─┤
///                                   │                  └──────┘    ├─▶ output ─▶ L/R
///                                   └─▶ reverb send ─▶ convolver ──┘
/// ```
pub struct SignalGraph {
    sample_rate: u32,
    pre_gain: Gain,
    shaper: Shaper,
    tone: ToneFilter,
    dry: Gain,
    delay_send: Gain,
    delay: FeedbackDelay,
    reverb_send: Gain,
    reverb: Convolver,
    output: Gain,
    main: Vec<f32>,
    dry_buf: Vec<f32>,
    delay_buf: Vec<f32>,
    reverb_buf: Vec<f32>,
}

impl SignalGraph {
    /// Build every stage at the given parameters. The shaper starts with a
    /// curve for `params.drive`; the reverb kernel is normalized to a fixed
    /// RMS so the send level alone sets how loud the tail is.
    pub fn new(sample_rate: u32, params: &StageParams, impulse: &ImpulseResponse, partition: usize) -> Self {
        let sr = sample_rate as f32;
        Self {
            sample_rate,
            pre_gain: Gain::new(sr, params.stage_gain),
            shaper: Shaper::new(DistortionCurve::new(params.drive)),
            tone: ToneFilter::new(sr, params.cutoff_hz, params.q),
            dry: Gain::new(sr, params.dry_gain),
            delay_send: Gain::new(sr, params.delay_send),
            delay: FeedbackDelay::new(sr, MAX_DELAY_SECONDS, DELAY_SECONDS, DELAY_FEEDBACK),
            reverb_send: Gain::new(sr, params.reverb_send),
            reverb: Convolver::normalized(impulse, partition),
            output: Gain::new(sr, params.output_gain),
            main: vec![0.0; MAX_BLOCK],
            dry_buf: vec![0.0; MAX_BLOCK],
            delay_buf: vec![0.0; MAX_BLOCK],
            reverb_buf: vec![0.0; MAX_BLOCK],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples between the input and the reverb return.
    pub fn reverb_latency(&self) -> usize {
        self.reverb.latency()
    }

    /// Retarget the scalar stages. Changes glide in over a few ms.
    pub fn apply(&mut self, p: &BlockParams) {
        self.pre_gain.set_gain(p.stage_gain);
        self.tone.set_cutoff(p.cutoff_hz);
        self.dry.set_gain(p.dry_gain);
        self.delay_send.set_gain(p.delay_send);
        self.reverb_send.set_gain(p.reverb_send);
        self.output.set_gain(p.output_gain);
    }

    /// Install a new shaper table; returns the old one.
    pub fn swap_curve(&mut self, curve: DistortionCurve) -> DistortionCurve {
        self.shaper.swap_curve(curve)
    }

    pub fn curve(&self) -> &DistortionCurve {
        self.shaper.curve()
    }

    /// Render `input` (mono) into `left`/`right`. All three must have the
    /// same length.
    pub fn process(&mut self, input: &[f32], left: &mut [f32], right: &mut [f32]) {
        debug_assert!(left.len() >= input.len() && right.len() >= input.len());
        let mut offset = 0;
        for chunk in input.chunks(MAX_BLOCK) {
            let end = offset + chunk.len();
            self.process_chunk(chunk, &mut left[offset..end], &mut right[offset..end]);
            offset = end;
        }
    }

    fn process_chunk(&mut self, input: &[f32], left: &mut [f32], right: &mut [f32]) {
        let n = input.len();
        let main = &mut self.main[..n];
        main.copy_from_slice(input);
        self.pre_gain.process(main);
        self.shaper.process(main);
        self.tone.process(main);

        let dry = &mut self.dry_buf[..n];
        dry.copy_from_slice(main);
        self.dry.process(dry);

        let echo = &mut self.delay_buf[..n];
        echo.copy_from_slice(main);
        self.delay_send.process(echo);
        self.delay.process_block(echo);

        let wet = &mut self.reverb_buf[..n];
        wet.copy_from_slice(main);
        self.reverb_send.process(wet);

        for i in 0..n {
            let (rl, rr) = self.reverb.process_sample(wet[i]);
            let g = self.output.next_gain();
            let direct = dry[i] + echo[i];
            left[i] = (direct + rl) * g;
            right[i] = (direct + rr) * g;
        }
    }

    /// Silence all internal state (delay line, reverb tail, filter memory)
    /// and snap gains to their targets.
    pub fn reset(&mut self) {
        self.pre_gain.reset();
        self.tone.reset();
        self.dry.reset();
        self.delay_send.reset();
        self.delay.clear();
        self.reverb_send.reset();
        self.reverb.clear();
        self.output.reset();
    }
}

//! Control plane: user-facing settings, the parameters derived from them,
//! and the lock-free hand-off of those parameters to the audio thread.
//!
//! ```text
//! control thread                            audio thread
//! ControlState ─derive()─▶ StageParams
//!                          │ scalars ──▶ ParamBank (atomics) ──▶ read per block
//!                          │ drive   ──▶ new DistortionCurve ──chan──▶ swap in
//!                          ◀──chan── retired curve (dropped here)
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::debug;

use crate::dsp::curve::DistortionCurve;
use crate::dsp::filter::TONE_Q;
use crate::preset::Channel;

/// Gain setting at which a channel plays at its preset voicing.
pub const NEUTRAL_GAIN: f32 = 30.0;
/// Tone setting at which the filter sits at the preset cutoff.
pub const NEUTRAL_TONE: f32 = 50.0;
/// Reverb send at full reverb.
pub const REVERB_SEND_MAX: f32 = 0.4;
/// How much the dry path is ducked at full reverb.
pub const DRY_DUCK: f32 = 0.3;

/// Curves in flight between the control and audio threads.
const CURVE_QUEUE: usize = 4;

/// Knob positions and switches, as set by the user. Percent values are
/// clamped to [0, 100] when parameters are derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    pub channel: Channel,
    pub gain: f32,
    pub tone: f32,
    pub volume: f32,
    pub reverb: f32,
    pub delay: f32,
    pub muted: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            channel: Channel::Clean,
            gain: NEUTRAL_GAIN,
            tone: NEUTRAL_TONE,
            volume: 50.0,
            reverb: 20.0,
            delay: 0.0,
            muted: false,
        }
    }
}

pub fn clamp_percent(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) }
}

impl ControlState {
    /// Copy with every percent value inside [0, 100].
    pub fn clamped(&self) -> Self {
        Self {
            channel: self.channel,
            gain: clamp_percent(self.gain),
            tone: clamp_percent(self.tone),
            volume: clamp_percent(self.volume),
            reverb: clamp_percent(self.reverb),
            delay: clamp_percent(self.delay),
            muted: self.muted,
        }
    }

    /// Resolve the stage parameters. Pure: equal states give equal params.
    pub fn derive(&self) -> StageParams {
        let s = self.clamped();
        let preset = s.channel.preset();
        let gain_multiplier = s.gain / NEUTRAL_GAIN;
        let tone_multiplier = s.tone / NEUTRAL_TONE;
        let reverb_level = s.reverb / 100.0;
        StageParams {
            stage_gain: preset.base_gain * gain_multiplier,
            drive: preset.base_drive * gain_multiplier,
            cutoff_hz: preset.cutoff_hz * tone_multiplier,
            q: TONE_Q,
            dry_gain: 1.0 - reverb_level * DRY_DUCK,
            reverb_send: reverb_level * REVERB_SEND_MAX,
            delay_send: s.delay / 100.0,
            output_gain: if s.muted { 0.0 } else { s.volume / 100.0 },
        }
    }
}

/// Everything the signal graph needs from the control plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageParams {
    pub stage_gain: f32,
    pub drive: f32,
    pub cutoff_hz: f32,
    pub q: f32,
    pub dry_gain: f32,
    pub reverb_send: f32,
    pub delay_send: f32,
    pub output_gain: f32,
}

/// f32 stored as bits in an `AtomicU32`.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

/// The scalars the audio thread re-reads every block. Drive and Q only
/// matter when a stage is built or a curve is swapped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockParams {
    pub stage_gain: f32,
    pub cutoff_hz: f32,
    pub dry_gain: f32,
    pub reverb_send: f32,
    pub delay_send: f32,
    pub output_gain: f32,
}

impl StageParams {
    pub fn block(&self) -> BlockParams {
        BlockParams {
            stage_gain: self.stage_gain,
            cutoff_hz: self.cutoff_hz,
            dry_gain: self.dry_gain,
            reverb_send: self.reverb_send,
            delay_send: self.delay_send,
            output_gain: self.output_gain,
        }
    }
}

/// Latest block parameters, one atomic per value. Each value is
/// independently most-recent-wins.
#[derive(Debug, Default)]
pub struct ParamBank {
    stage_gain: AtomicF32,
    cutoff_hz: AtomicF32,
    dry_gain: AtomicF32,
    reverb_send: AtomicF32,
    delay_send: AtomicF32,
    output_gain: AtomicF32,
}

impl ParamBank {
    pub fn new(p: &BlockParams) -> Self {
        let bank = Self::default();
        bank.store(p);
        bank
    }

    pub fn store(&self, p: &BlockParams) {
        self.stage_gain.store(p.stage_gain);
        self.cutoff_hz.store(p.cutoff_hz);
        self.dry_gain.store(p.dry_gain);
        self.reverb_send.store(p.reverb_send);
        self.delay_send.store(p.delay_send);
        self.output_gain.store(p.output_gain);
    }

    pub fn load(&self) -> BlockParams {
        BlockParams {
            stage_gain: self.stage_gain.load(),
            cutoff_hz: self.cutoff_hz.load(),
            dry_gain: self.dry_gain.load(),
            reverb_send: self.reverb_send.load(),
            delay_send: self.delay_send.load(),
            output_gain: self.output_gain.load(),
        }
    }
}

/// Connect a control-side publisher to an audio-side reader, both starting
/// at `initial`. The reader assumes the graph was built with a curve for
/// `initial.drive`.
pub fn param_link(initial: &StageParams) -> (ParamPublisher, ParamReader) {
    let bank = Arc::new(ParamBank::new(&initial.block()));
    let (curve_tx, curve_rx) = bounded(CURVE_QUEUE);
    // one spare slot so the audio side never has to drop a table itself
    let (retired_tx, retired_rx) = bounded(CURVE_QUEUE + 1);
    (
        ParamPublisher { bank: bank.clone(), curve_tx, retired_rx, pending: None, drive: initial.drive },
        ParamReader { bank, curve_rx, retired_tx },
    )
}

/// Control-thread end. Builds curves; never blocks.
pub struct ParamPublisher {
    bank: Arc<ParamBank>,
    curve_tx: Sender<DistortionCurve>,
    retired_rx: Receiver<DistortionCurve>,
    pending: Option<DistortionCurve>,
    drive: f32,
}

impl ParamPublisher {
    pub fn publish(&mut self, p: &StageParams) {
        self.bank.store(&p.block());
        if p.drive != self.drive {
            debug!("drive {} -> {}, rebuilding curve", self.drive, p.drive);
            self.drive = p.drive;
            // a newer table supersedes any still waiting
            self.pending = Some(DistortionCurve::new(p.drive));
        }
        self.flush();
    }

    /// Reclaim retired tables and retry a curve the queue had no room for.
    pub fn flush(&mut self) {
        while let Ok(old) = self.retired_rx.try_recv() {
            drop(old);
        }
        if let Some(curve) = self.pending.take() {
            match self.curve_tx.try_send(curve) {
                Ok(()) => {}
                Err(TrySendError::Full(curve)) => self.pending = Some(curve),
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Audio-thread end. Never blocks, allocates or frees.
pub struct ParamReader {
    bank: Arc<ParamBank>,
    curve_rx: Receiver<DistortionCurve>,
    retired_tx: Sender<DistortionCurve>,
}

impl ParamReader {
    #[inline]
    pub fn params(&self) -> BlockParams {
        self.bank.load()
    }

    /// Newest curve published since the last call. Superseded ones go
    /// straight back to the control side.
    pub fn next_curve(&self) -> Option<DistortionCurve> {
        let mut latest = None;
        while let Ok(curve) = self.curve_rx.try_recv() {
            if let Some(old) = latest.replace(curve) {
                self.retire(old);
            }
        }
        latest
    }

    /// Hand a table back for deallocation off the audio thread.
    pub fn retire(&self, curve: DistortionCurve) {
        // Full only if the control side stopped draining; the table is
        // then freed here.
        let _ = self.retired_tx.try_send(curve);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn overdrive_at_neutral_settings() {
        let state = ControlState { channel: Channel::Overdrive, gain: 30.0, tone: 50.0, ..Default::default() };
        let p = state.derive();
        assert_eq!(p.stage_gain, 4.0);
        assert_eq!(p.drive, 40.0);
        assert_eq!(p.cutoff_hz, 4000.0);
        assert_eq!(p.q, 1.0);
    }

    #[test]
    fn gain_and_tone_scale_preset() {
        let state = ControlState { channel: Channel::Metal, gain: 60.0, tone: 25.0, ..Default::default() };
        let p = state.derive();
        assert_relative_eq!(p.stage_gain, 30.0);
        assert_relative_eq!(p.drive, 300.0);
        assert_relative_eq!(p.cutoff_hz, 2250.0);
    }

    #[test]
    fn derivation_is_deterministic() {
        let state = ControlState {
            channel: Channel::Fuzz,
            gain: 77.0,
            tone: 13.0,
            volume: 64.0,
            reverb: 42.0,
            delay: 55.0,
            muted: false,
        };
        assert_eq!(state.derive(), state.derive());
    }

    #[test]
    fn mute_overrides_volume() {
        for volume in [0.0, 1.0, 50.0, 100.0, 250.0] {
            let state = ControlState { volume, muted: true, ..Default::default() };
            assert_eq!(state.derive().output_gain, 0.0);
        }
        let state = ControlState { volume: 80.0, muted: false, ..Default::default() };
        assert_relative_eq!(state.derive().output_gain, 0.8);
    }

    #[test]
    fn reverb_dry_tradeoff_bounds() {
        for r in 0..=100 {
            let state = ControlState { reverb: r as f32, ..Default::default() };
            let p = state.derive();
            assert!((0.7 - 1e-6..=1.0).contains(&p.dry_gain), "dry {}", p.dry_gain);
            assert!((0.0..=0.4 + 1e-6).contains(&p.reverb_send), "send {}", p.reverb_send);
        }
        let full = ControlState { reverb: 100.0, ..Default::default() }.derive();
        assert_relative_eq!(full.dry_gain, 0.7);
        assert_relative_eq!(full.reverb_send, 0.4);
        let none = ControlState { reverb: 0.0, ..Default::default() }.derive();
        assert_eq!(none.dry_gain, 1.0);
        assert_eq!(none.reverb_send, 0.0);
    }

    #[test]
    fn delay_send_follows_amount() {
        let p = ControlState { delay: 35.0, ..Default::default() }.derive();
        assert_relative_eq!(p.delay_send, 0.35);
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        let state = ControlState {
            channel: Channel::Crunch,
            gain: 400.0,
            tone: -20.0,
            volume: f32::NAN,
            reverb: 1000.0,
            delay: -5.0,
            muted: false,
        };
        let p = state.derive();
        let max_gain = 100.0 / NEUTRAL_GAIN;
        assert_relative_eq!(p.stage_gain, 2.0 * max_gain);
        assert_eq!(p.cutoff_hz, 0.0);
        assert_eq!(p.output_gain, 0.0);
        assert_relative_eq!(p.reverb_send, 0.4);
        assert_eq!(p.delay_send, 0.0);
    }

    #[test]
    fn defaults_match_front_panel() {
        let s = ControlState::default();
        assert_eq!(s.channel, Channel::Clean);
        assert_eq!((s.gain, s.tone, s.volume, s.reverb, s.delay), (30.0, 50.0, 50.0, 20.0, 0.0));
        assert!(!s.muted);
    }

    #[test]
    fn scalars_reach_reader() {
        let a = ControlState::default().derive();
        let (mut tx, rx) = param_link(&a);
        assert_eq!(rx.params(), a.block());
        let b = ControlState { volume: 90.0, reverb: 0.0, ..Default::default() }.derive();
        tx.publish(&b);
        assert_eq!(rx.params(), b.block());
        // same drive: no curve traffic
        assert!(rx.next_curve().is_none());
    }

    #[test]
    fn drive_change_sends_one_curve_latest_wins() {
        let base = ControlState { channel: Channel::Crunch, ..Default::default() };
        let (mut tx, rx) = param_link(&base.derive());
        for gain in [40.0, 50.0, 60.0] {
            tx.publish(&ControlState { gain, ..base }.derive());
        }
        let curve = rx.next_curve().expect("curve");
        assert_relative_eq!(curve.amount(), 40.0);
        assert!(rx.next_curve().is_none());
        rx.retire(curve);
        // the superseded tables and the retired one are reclaimed here
        tx.flush();
        assert!(!tx.has_pending());
    }

    #[test]
    fn full_queue_keeps_newest_pending() {
        let base = ControlState { channel: Channel::Fuzz, ..Default::default() };
        let (mut tx, rx) = param_link(&base.derive());
        for i in 0..(CURVE_QUEUE + 2) {
            tx.publish(&ControlState { gain: 31.0 + i as f32, ..base }.derive());
        }
        assert!(tx.has_pending());
        let queued = rx.next_curve().expect("queued curve");
        rx.retire(queued);
        tx.flush();
        assert!(!tx.has_pending());
        let newest = rx.next_curve().expect("pending curve delivered");
        let want = 120.0 * (31.0 + (CURVE_QUEUE + 1) as f32) / NEUTRAL_GAIN;
        assert_relative_eq!(newest.amount(), want, epsilon = 1e-3);
    }
}

//! Amp session: owns the control state and, while on, the live pipeline.
//!
//! ```text
//! Idle ──start()──▶ Negotiating ──acquired + started──▶ Active
//!  ▲                    │ error                            │ stop() / device fault
//!  └────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Nothing audio-related exists while Idle. All mutation happens on the
//! thread that owns the session; the audio thread only sees parameters
//! through the lock-free link built at start.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::capture::{CaptureBackend, CaptureRequest, CaptureSource, InputDevice, LiveStream};
use crate::control::{param_link, ControlState, ParamPublisher, StageParams};
use crate::dsp::impulse::{REVERB_DECAY, REVERB_SECONDS};
use crate::dsp::ImpulseResponse;
use crate::error::{CaptureError, ControlError};
use crate::graph::SignalGraph;
use crate::meter::{LevelHandle, LevelMeter, LevelSample, LevelTap, MeterThread, TAP_CAPACITY};
use crate::preset::Channel;
use crate::processor::Processor;
use crate::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Negotiating,
    Active,
}

/// Notifications for the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    State(SessionState),
}

type StreamOf<B> = <<B as CaptureBackend>::Source as CaptureSource>::Stream;

struct Live<S> {
    stream: S,
    publisher: ParamPublisher,
    meter: MeterThread,
    sample_rate: u32,
}

pub struct Session<B: CaptureBackend> {
    backend: B,
    config: EngineConfig,
    controls: ControlState,
    device: Option<String>,
    state: SessionState,
    live: Option<Live<StreamOf<B>>>,
    level: LevelHandle,
    subscribers: Vec<Sender<SessionEvent>>,
}

impl<B: CaptureBackend> Session<B> {
    pub fn new(backend: B, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            controls: ControlState::default(),
            device: None,
            state: SessionState::Idle,
            live: None,
            level: LevelHandle::default(),
            subscribers: Vec::new(),
        }
    }

    /// Receive every state transition from now on.
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn controls(&self) -> &ControlState {
        &self.controls
    }

    pub fn stage_params(&self) -> StageParams {
        self.controls.derive()
    }

    /// Negotiated rate of the running pipeline.
    pub fn sample_rate(&self) -> Option<u32> {
        self.live.as_ref().map(|l| l.sample_rate)
    }

    pub fn list_input_devices(&self) -> Result<Vec<InputDevice>, CaptureError> {
        self.backend.list_input_devices()
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Choose the input used by the next `start`. `None` means the default.
    pub fn select_device(&mut self, id: Option<String>) -> Result<(), ControlError> {
        if self.state != SessionState::Idle {
            return Err(ControlError::DeviceLocked(self.state));
        }
        self.device = id;
        Ok(())
    }

    /// Channels only switch while the amp is off; the shaper table and
    /// voicing are rebuilt at the next start.
    pub fn set_channel(&mut self, channel: Channel) -> Result<(), ControlError> {
        if self.state != SessionState::Idle {
            return Err(ControlError::ChannelLocked(self.state));
        }
        self.controls.channel = channel;
        Ok(())
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.update(|c| c.gain = gain);
    }

    pub fn set_tone(&mut self, tone: f32) {
        self.update(|c| c.tone = tone);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.update(|c| c.volume = volume);
    }

    pub fn set_reverb(&mut self, reverb: f32) {
        self.update(|c| c.reverb = reverb);
    }

    pub fn set_delay(&mut self, delay: f32) {
        self.update(|c| c.delay = delay);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.update(|c| c.muted = muted);
    }

    /// Flip mute; returns the new state.
    pub fn toggle_mute(&mut self) -> bool {
        self.update(|c| c.muted = !c.muted);
        self.controls.muted
    }

    /// Replace every control at once. Fails without changing anything when
    /// the channel differs and the amp is not off.
    pub fn apply_controls(&mut self, state: ControlState) -> Result<(), ControlError> {
        if state.channel != self.controls.channel && self.state != SessionState::Idle {
            return Err(ControlError::ChannelLocked(self.state));
        }
        self.update(|c| *c = state);
        Ok(())
    }

    fn update(&mut self, f: impl FnOnce(&mut ControlState)) {
        f(&mut self.controls);
        self.controls = self.controls.clamped();
        if let Some(live) = self.live.as_mut() {
            live.publisher.publish(&self.controls.derive());
        }
    }

    /// Turn the amp on. A second call while on is a no-op. On failure the
    /// session is back in Idle and no processing stage was built.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != SessionState::Idle {
            debug!("start ignored while {:?}", self.state);
            return Ok(());
        }
        self.set_state(SessionState::Negotiating);

        let request = CaptureRequest::raw(self.config.sample_rate, 1, self.config.block_size);
        let launched = self.backend.acquire(self.device.as_deref(), &request).and_then(|source| self.launch(source));
        match launched {
            Ok(live) => {
                info!(
                    "amp on: {} @ {} Hz, gain {} tone {} volume {}",
                    self.controls.channel, live.sample_rate, self.controls.gain, self.controls.tone, self.controls.volume
                );
                self.live = Some(live);
                self.set_state(SessionState::Active);
                Ok(())
            }
            Err(e) => {
                warn!("capture unavailable: {e}");
                self.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    fn launch(&self, source: B::Source) -> Result<Live<StreamOf<B>>, CaptureError> {
        let sample_rate = source.sample_rate();
        let impulse = self.impulse(sample_rate);
        let params = self.controls.derive();
        let graph = SignalGraph::new(sample_rate, &params, &impulse, self.config.partition_size);
        debug!("graph built: reverb {} samples, latency {} samples", impulse.len(), graph.reverb_latency());

        let (publisher, reader) = param_link(&params);
        let tap = Arc::new(LevelTap::new(TAP_CAPACITY.max(self.config.meter_window)));
        let stream = source.start(Processor::new(graph, reader, tap.clone()))?;

        let meter = LevelMeter::new(tap, self.level.clone(), self.config.meter_window);
        let meter = match MeterThread::spawn(meter, self.config.meter_interval) {
            Ok(m) => m,
            Err(e) => {
                if let Err(stop_err) = stream.stop() {
                    warn!("releasing capture: {stop_err}");
                }
                return Err(CaptureError::Unknown(format!("meter thread: {e}")));
            }
        };
        Ok(Live { stream, publisher, meter, sample_rate })
    }

    fn impulse(&self, sample_rate: u32) -> ImpulseResponse {
        let mut rng = match self.config.impulse_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        ImpulseResponse::synthesize(REVERB_SECONDS, REVERB_DECAY, sample_rate, &mut rng)
    }

    /// Turn the amp off and release the device. Best-effort: failures are
    /// logged and the session still ends in Idle.
    pub fn stop(&mut self) {
        if let Some(Live { stream, publisher, meter, .. }) = self.live.take() {
            if let Err(e) = stream.stop() {
                warn!("stopping capture: {e}");
            }
            meter.stop();
            drop(publisher);
            info!("amp off");
        }
        self.level.publish(0.0);
        if self.state != SessionState::Idle {
            self.set_state(SessionState::Idle);
        }
    }

    /// Housekeeping for the owning thread; call regularly while on.
    /// Returns the reason when a device fault tore the session down.
    pub fn poll(&mut self) -> Option<String> {
        let live = self.live.as_mut()?;
        match live.stream.fault() {
            Some(reason) => {
                warn!("capture lost: {reason}");
                self.stop();
                Some(reason)
            }
            None => {
                live.publisher.flush();
                None
            }
        }
    }

    pub fn level(&self) -> LevelSample {
        self.level.read()
    }

    /// Shareable reader for a display thread.
    pub fn level_handle(&self) -> LevelHandle {
        self.level.clone()
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("session {:?} -> {:?}", self.state, state);
        self.state = state;
        self.subscribers.retain(|tx| tx.send(SessionEvent::State(state)).is_ok());
    }
}

impl<B: CaptureBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend whose acquisition always fails.
    struct Refusing(CaptureError);

    struct NeverSource;
    struct NeverStream;

    impl LiveStream for NeverStream {
        fn fault(&self) -> Option<String> {
            None
        }
        fn stop(self) -> Result<(), CaptureError> {
            Ok(())
        }
    }

    impl CaptureSource for NeverSource {
        type Stream = NeverStream;
        fn sample_rate(&self) -> u32 {
            unreachable!()
        }
        fn start(self, _: Processor) -> Result<NeverStream, CaptureError> {
            unreachable!()
        }
    }

    impl CaptureBackend for Refusing {
        type Source = NeverSource;
        fn list_input_devices(&self) -> Result<Vec<InputDevice>, CaptureError> {
            Ok(vec![InputDevice { id: "in-1".into(), label: "Interface".into(), is_default: true }])
        }
        fn acquire(&mut self, _: Option<&str>, _: &CaptureRequest) -> Result<NeverSource, CaptureError> {
            Err(self.0.clone())
        }
    }

    fn session(err: CaptureError) -> Session<Refusing> {
        Session::new(Refusing(err), EngineConfig::default())
    }

    #[test]
    fn starts_idle_with_front_panel_defaults() {
        let s = session(CaptureError::DeviceBusy);
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(*s.controls(), ControlState::default());
        assert_eq!(s.level().rms, 0.0);
        assert!(s.sample_rate().is_none());
    }

    #[test]
    fn failed_start_reports_negotiation_then_idle() {
        let mut s = session(CaptureError::PermissionDenied);
        let events = s.subscribe();
        assert_eq!(s.start(), Err(CaptureError::PermissionDenied));
        assert_eq!(s.state(), SessionState::Idle);
        let seen: Vec<_> = events.try_iter().collect();
        assert_eq!(
            seen,
            vec![SessionEvent::State(SessionState::Negotiating), SessionEvent::State(SessionState::Idle)]
        );
    }

    #[test]
    fn controls_are_clamped_while_idle() {
        let mut s = session(CaptureError::DeviceBusy);
        s.set_gain(250.0);
        s.set_tone(-3.0);
        s.set_volume(f32::NAN);
        assert_eq!((s.controls().gain, s.controls().tone, s.controls().volume), (100.0, 0.0, 0.0));
        assert!(s.toggle_mute());
        assert_eq!(s.stage_params().output_gain, 0.0);
    }

    #[test]
    fn channel_and_device_change_while_idle() {
        let mut s = session(CaptureError::DeviceBusy);
        s.set_channel(Channel::Metal).unwrap();
        s.select_device(Some("in-1".into())).unwrap();
        assert_eq!(s.controls().channel, Channel::Metal);
        assert_eq!(s.device(), Some("in-1"));
        assert_eq!(s.list_input_devices().unwrap().len(), 1);
    }

    #[test]
    fn stop_while_idle_is_harmless() {
        let mut s = session(CaptureError::DeviceBusy);
        let events = s.subscribe();
        s.stop();
        assert_eq!(s.poll(), None);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut s = session(CaptureError::DeviceBusy);
        drop(s.subscribe());
        let live = s.subscribe();
        let _ = s.start();
        assert_eq!(s.subscribers.len(), 1);
        assert_eq!(live.try_iter().count(), 2);
    }
}

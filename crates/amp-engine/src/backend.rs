//! cpal implementation of the capture contract.
//!
//! Two streams run per session: the input callback renders the signal graph
//! and pushes interleaved frames into an SPSC ring; the output callback pops
//! them. Both callbacks only touch preallocated buffers.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedStreamConfigRange};
use log::{info, warn};
use parking_lot::Mutex;

use crate::capture::{CaptureBackend, CaptureRequest, CaptureSource, InputDevice, LiveStream};
use crate::devices;
use crate::error::CaptureError;
use crate::processor::Processor;
use crate::ring::{next_pow2, spsc, Consumer, Producer};
use crate::EngineConfig;

/// Frames rendered per pass inside one callback.
const SCRATCH_FRAMES: usize = 4096;

type FaultSlot = Arc<Mutex<Option<String>>>;

pub struct CpalBackend {
    host: cpal::Host,
    output_name: Option<String>,
    output_index: Option<usize>,
}

impl CpalBackend {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            host: cpal::default_host(),
            output_name: cfg.output_name.clone(),
            output_index: cfg.output_index,
        }
    }
}

pub struct CpalSource {
    input: cpal::Device,
    output: cpal::Device,
    in_cfg: cpal::StreamConfig,
    in_format: SampleFormat,
    out_cfg: cpal::StreamConfig,
    out_format: SampleFormat,
}

impl CaptureBackend for CpalBackend {
    type Source = CpalSource;

    fn list_input_devices(&self) -> Result<Vec<InputDevice>, CaptureError> {
        devices::list_input_devices(&self.host)
    }

    fn acquire(&mut self, device_id: Option<&str>, request: &CaptureRequest) -> Result<CpalSource, CaptureError> {
        let input = devices::find_input(&self.host, device_id)?;
        let output = devices::pick_output(&self.host, self.output_name.as_deref(), self.output_index)?;

        let in_ranges: Vec<_> = input.supported_input_configs()?.collect();
        let out_ranges: Vec<_> = output.supported_output_configs()?.collect();
        if in_ranges.is_empty() {
            return Err(CaptureError::Unsupported("input offers no stream configurations".into()));
        }

        // Preferred rate first, then whatever the devices default to.
        let candidates = [
            Some(request.sample_rate),
            output.default_output_config().ok().map(|c| c.sample_rate().0),
            input.default_input_config().ok().map(|c| c.sample_rate().0),
        ];
        for rate in candidates.into_iter().flatten() {
            let (Some(in_range), Some(out_range)) =
                (best_range(&in_ranges, rate, request.channels), best_range(&out_ranges, rate, 2))
            else {
                continue;
            };
            let in_sup = in_range.with_sample_rate(cpal::SampleRate(rate));
            let out_sup = out_range.with_sample_rate(cpal::SampleRate(rate));
            let mut in_cfg = in_sup.config();
            let mut out_cfg = out_sup.config();
            // the host may still pick its own period
            if let Some(bs) = request.block_size {
                in_cfg.buffer_size = cpal::BufferSize::Fixed(bs);
                out_cfg.buffer_size = cpal::BufferSize::Fixed(bs);
            }
            if rate != request.sample_rate {
                info!("{} Hz unavailable on this device pair, using {rate} Hz", request.sample_rate);
            }
            info!(
                "capture '{}' {}ch {:?} -> '{}' {}ch {:?} @ {rate} Hz",
                input.name().unwrap_or_default(),
                in_cfg.channels,
                in_sup.sample_format(),
                output.name().unwrap_or_default(),
                out_cfg.channels,
                out_sup.sample_format(),
            );
            return Ok(CpalSource {
                input,
                output,
                in_cfg,
                in_format: in_sup.sample_format(),
                out_cfg,
                out_format: out_sup.sample_format(),
            });
        }
        Err(CaptureError::Unsupported("input and output share no usable sample rate".into()))
    }
}

fn format_rank(f: SampleFormat) -> Option<u8> {
    match f {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Range covering `rate` with the channel count closest to `channels`,
/// preferring float samples.
fn best_range(ranges: &[SupportedStreamConfigRange], rate: u32, channels: u16) -> Option<SupportedStreamConfigRange> {
    ranges
        .iter()
        .filter(|r| r.min_sample_rate().0 <= rate && rate <= r.max_sample_rate().0)
        .filter_map(|r| format_rank(r.sample_format()).map(|rank| (r, rank)))
        .min_by_key(|(r, rank)| (r.channels().abs_diff(channels), *rank))
        .map(|(r, _)| r.clone())
}

impl CaptureSource for CpalSource {
    type Stream = CpalStream;

    fn sample_rate(&self) -> u32 {
        self.in_cfg.sample_rate.0
    }

    fn start(self, processor: Processor) -> Result<CpalStream, CaptureError> {
        let in_channels = self.in_cfg.channels as usize;
        let out_channels = self.out_cfg.channels as usize;

        let (tx, rx) = spsc(ring_slots(&self.out_cfg.buffer_size, out_channels));
        let fault: FaultSlot = Arc::new(Mutex::new(None));

        let input_stream = match self.in_format {
            SampleFormat::F32 => {
                build_input::<f32>(&self.input, &self.in_cfg, processor, tx, in_channels, out_channels, fault.clone())
            }
            SampleFormat::I16 => {
                build_input::<i16>(&self.input, &self.in_cfg, processor, tx, in_channels, out_channels, fault.clone())
            }
            SampleFormat::U16 => {
                build_input::<u16>(&self.input, &self.in_cfg, processor, tx, in_channels, out_channels, fault.clone())
            }
            other => return Err(CaptureError::Unsupported(format!("input sample format {other:?}"))),
        }?;

        let output_stream = match self.out_format {
            SampleFormat::F32 => build_output::<f32>(&self.output, &self.out_cfg, rx, fault.clone()),
            SampleFormat::I16 => build_output::<i16>(&self.output, &self.out_cfg, rx, fault.clone()),
            SampleFormat::U16 => build_output::<u16>(&self.output, &self.out_cfg, rx, fault.clone()),
            other => return Err(CaptureError::Unsupported(format!("output sample format {other:?}"))),
        }?;

        input_stream.play()?;
        output_stream.play()?;

        Ok(CpalStream { input: input_stream, output: output_stream, fault })
    }
}

/// Ring slots for `out_channels` interleaved output. Holds two of the
/// largest blocks the input side pushes at once, and at least eight device
/// buffers when the buffer size is fixed.
fn ring_slots(buffer_size: &cpal::BufferSize, out_channels: usize) -> usize {
    let frames = match buffer_size {
        cpal::BufferSize::Fixed(n) => (*n as usize * 8).max(SCRATCH_FRAMES),
        cpal::BufferSize::Default => SCRATCH_FRAMES,
    };
    next_pow2(frames * out_channels.max(1) * 2).max(1024)
}

fn record_fault(slot: &FaultSlot, which: &str, err: cpal::StreamError) {
    warn!("{which} stream error: {err}");
    if let cpal::StreamError::DeviceNotAvailable = err {
        slot.lock().get_or_insert_with(|| format!("{which} device disconnected"));
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut processor: Processor,
    mut tx: Producer,
    in_channels: usize,
    out_channels: usize,
    fault: FaultSlot,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let in_channels = in_channels.max(1);
    // sized once here; the callback only clears and refills them
    let mut mono = Vec::<f32>::with_capacity(SCRATCH_FRAMES);
    let mut rendered = Vec::<f32>::with_capacity(SCRATCH_FRAMES * out_channels);
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for block in data.chunks(SCRATCH_FRAMES * in_channels) {
                mono.clear();
                // the instrument is on the first channel
                mono.extend(block.chunks(in_channels).map(|frame| f32::from_sample(frame[0])));
                rendered.clear();
                rendered.resize(mono.len() * out_channels, 0.0);
                processor.process(&mono, &mut rendered, out_channels);
                // overrun: the playback side is behind, drop this block
                let _ = tx.push_slice(&rendered);
            }
        },
        move |err| record_fault(&fault, "input", err),
        None,
    )?;
    Ok(stream)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut rx: Consumer,
    fault: FaultSlot,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut tmp = vec![0.0f32; SCRATCH_FRAMES * config.channels.max(1) as usize];
    let stream = device.build_output_stream(
        config,
        move |out: &mut [T], _: &cpal::OutputCallbackInfo| {
            for chunk in out.chunks_mut(tmp.len()) {
                let buf = &mut tmp[..chunk.len()];
                if !rx.pop_into(buf) {
                    buf.fill(0.0);
                }
                for (o, &v) in chunk.iter_mut().zip(buf.iter()) {
                    *o = T::from_sample(v.clamp(-1.0, 1.0));
                }
            }
        },
        move |err| record_fault(&fault, "output", err),
        None,
    )?;
    Ok(stream)
}

pub struct CpalStream {
    input: cpal::Stream,
    output: cpal::Stream,
    fault: FaultSlot,
}

impl LiveStream for CpalStream {
    fn fault(&self) -> Option<String> {
        self.fault.lock().clone()
    }

    fn stop(self) -> Result<(), CaptureError> {
        let paused_in = self.input.pause();
        let paused_out = self.output.pause();
        // dropping the streams closes the devices whatever pause reported
        drop(self.input);
        drop(self.output);
        paused_in?;
        paused_out?;
        Ok(())
    }
}

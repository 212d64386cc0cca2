mod commands;

use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use amp_engine::{devices, CaptureBackend, CaptureError, Channel, CpalBackend, EngineConfig, Session};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use log::{debug, LevelFilter};

use commands::Command;

#[derive(Parser)]
#[command(name = "amp", version, about = "Live guitar amp: instrument input -> amp chain -> speakers")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List audio input devices
    Devices,
    /// Play through the amp until `quit` or end of input
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Input device: name, part of a name, or index from `amp devices`
    #[arg(short, long)]
    input: Option<String>,
    #[arg(short, long, default_value_t = Channel::Clean)]
    channel: Channel,
    #[arg(long, default_value_t = 30.0)]
    gain: f32,
    #[arg(long, default_value_t = 50.0)]
    tone: f32,
    #[arg(long, default_value_t = 50.0)]
    volume: f32,
    #[arg(long, default_value_t = 20.0)]
    reverb: f32,
    #[arg(long, default_value_t = 0.0)]
    delay: f32,
    /// Start muted
    #[arg(long)]
    mute: bool,
    /// Output device (substring of its name)
    #[arg(long)]
    output: Option<String>,
    /// Output device index among outputs
    #[arg(long)]
    output_index: Option<usize>,
    /// Preferred sample rate
    #[arg(long, default_value_t = amp_engine::PREFERRED_SAMPLE_RATE)]
    sample_rate: u32,
    /// Frames per device buffer (if the host supports it)
    #[arg(long)]
    block_size: Option<u32>,
    /// Seed for the reverb impulse
    #[arg(long)]
    seed: Option<u64>,
    /// Redraw the input meter continuously
    #[arg(long)]
    meter: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::builder().filter_level(level).parse_default_env().init();

    match cli.cmd {
        Cmd::Devices => {
            let backend = CpalBackend::new(&EngineConfig::default());
            devices::print_devices(&backend.list_input_devices()?);
            Ok(())
        }
        Cmd::Run(args) => run(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = EngineConfig {
        output_name: args.output.clone(),
        output_index: args.output_index,
        sample_rate: args.sample_rate,
        block_size: args.block_size,
        impulse_seed: args.seed,
        ..Default::default()
    };
    let mut amp = Session::new(CpalBackend::new(&config), config);
    amp.select_device(args.input.clone())?;
    amp.set_channel(args.channel)?;
    amp.set_gain(args.gain);
    amp.set_tone(args.tone);
    amp.set_volume(args.volume);
    amp.set_reverb(args.reverb);
    amp.set_delay(args.delay);
    amp.set_muted(args.mute);

    if let Err(e) = switch_on(&mut amp) {
        if !e.is_recoverable() {
            return Err(e.into());
        }
    }
    println!("{}", commands::HELP);

    let lines = stdin_lines().context("spawning stdin reader")?;
    loop {
        match lines.recv_timeout(Duration::from_millis(50)) {
            Ok(line) => match commands::parse(&line) {
                Ok(Some(cmd)) => {
                    if !execute(&mut amp, cmd) {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => eprintln!("{e:#}"),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("stdin closed");
                break;
            }
        }
        if let Some(reason) = amp.poll() {
            eprintln!("input lost ({reason}); `start` to retry");
        }
        if args.meter && amp.is_active() {
            eprint!("\r{}", commands::meter_bar(amp.level().display()));
        }
    }
    amp.stop();
    Ok(())
}

fn switch_on<B: CaptureBackend>(amp: &mut Session<B>) -> Result<(), CaptureError> {
    let started = amp.start();
    if let Err(e) = &started {
        eprintln!("error: {e}");
        eprintln!("hint: {}", e.hint());
    }
    started
}

/// Returns false to quit.
fn execute<B: CaptureBackend>(amp: &mut Session<B>, cmd: Command) -> bool {
    match cmd {
        Command::Gain(v) => amp.set_gain(v),
        Command::Tone(v) => amp.set_tone(v),
        Command::Volume(v) => amp.set_volume(v),
        Command::Reverb(v) => amp.set_reverb(v),
        Command::Delay(v) => amp.set_delay(v),
        Command::Mute => {
            let muted = amp.toggle_mute();
            println!("{}", if muted { "muted" } else { "unmuted" });
        }
        Command::Channel(ch) => match amp.set_channel(ch) {
            Ok(()) => println!("channel {ch}"),
            Err(e) => eprintln!("{e}"),
        },
        Command::Device(id) => {
            if let Err(e) = amp.select_device(id) {
                eprintln!("{e}");
            }
        }
        Command::Start => {
            let _ = switch_on(amp);
        }
        Command::Stop => amp.stop(),
        Command::Level => println!("{}", commands::meter_bar(amp.level().display())),
        Command::Status => print_status(amp),
        Command::Devices => match amp.list_input_devices() {
            Ok(list) => devices::print_devices(&list),
            Err(e) => eprintln!("error: {e}"),
        },
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => return false,
    }
    true
}

fn print_status<B: CaptureBackend>(amp: &Session<B>) {
    let c = amp.controls();
    let rate = amp.sample_rate().map(|r| format!(" @ {r} Hz")).unwrap_or_default();
    println!("{:?}{rate}  input: {}", amp.state(), amp.device().unwrap_or("(default)"));
    println!(
        "channel {}  gain {}  tone {}  volume {}  reverb {}  delay {}{}",
        c.channel,
        c.gain,
        c.tone,
        c.volume,
        c.reverb,
        c.delay,
        if c.muted { "  [muted]" } else { "" }
    );
}

/// Stdin is read on its own thread so the session stays on this one.
fn stdin_lines() -> io::Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new().name("amp-stdin".into()).spawn(move || {
        for line in io::stdin().lock().lines().map_while(|line| line.ok()) {
            if tx.send(line).is_err() {
                break;
            }
        }
    })?;
    Ok(rx)
}

//! Line commands typed while the amp runs.

use amp_engine::Channel;
use anyhow::{anyhow, bail, Context, Result};

pub const HELP: &str = "\
commands:
  gain|tone|volume|reverb|delay <0-100>   set a knob
  channel <name>                          switch channel (amp must be off)
  device [name|index]                     choose input (amp must be off)
  mute                                    toggle mute
  start | stop                            turn the amp on/off
  level                                   show the input meter
  status                                  show knobs and state
  devices                                 list inputs
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Gain(f32),
    Tone(f32),
    Volume(f32),
    Reverb(f32),
    Delay(f32),
    Channel(Channel),
    Device(Option<String>),
    Mute,
    Start,
    Stop,
    Level,
    Status,
    Devices,
    Help,
    Quit,
}

/// Parse one input line. Blank lines give `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();
    let head = head.to_lowercase();

    let knob = |name: &str| -> Result<f32> {
        let [value] = rest.as_slice() else {
            bail!("usage: {name} <0-100>");
        };
        let v: f32 = value.parse().with_context(|| format!("{name}: '{value}' is not a number"))?;
        if !v.is_finite() {
            bail!("{name}: value must be finite");
        }
        Ok(v)
    };

    let cmd = match head.as_str() {
        "gain" | "g" => Command::Gain(knob("gain")?),
        "tone" | "t" => Command::Tone(knob("tone")?),
        "volume" | "vol" | "v" => Command::Volume(knob("volume")?),
        "reverb" | "r" => Command::Reverb(knob("reverb")?),
        "delay" | "d" => Command::Delay(knob("delay")?),
        "channel" | "ch" => {
            let name = rest.first().ok_or_else(|| anyhow!("usage: channel <{}>", channel_names()))?;
            Command::Channel(name.parse()?)
        }
        "device" => Command::Device((!rest.is_empty()).then(|| rest.join(" "))),
        "mute" | "m" => Command::Mute,
        "start" | "on" => Command::Start,
        "stop" | "off" => Command::Stop,
        "level" => Command::Level,
        "status" => Command::Status,
        "devices" => Command::Devices,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => bail!("unknown command '{other}' (try `help`)"),
    };
    Ok(Some(cmd))
}

fn channel_names() -> String {
    Channel::ALL.iter().map(|c| c.name()).collect::<Vec<_>>().join("|")
}

/// Text bar for a 0-100 meter value.
pub fn meter_bar(level: f32) -> String {
    let filled = ((level / 5.0).round() as usize).min(20);
    format!("[{:<20}] {:>3.0}%", "#".repeat(filled), level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knobs() {
        assert_eq!(parse("gain 60").unwrap(), Some(Command::Gain(60.0)));
        assert_eq!(parse("  Tone   12.5 ").unwrap(), Some(Command::Tone(12.5)));
        assert_eq!(parse("vol 0").unwrap(), Some(Command::Volume(0.0)));
        assert!(parse("gain").is_err());
        assert!(parse("gain loud").is_err());
        assert!(parse("gain 1 2").is_err());
        assert!(parse("reverb NaN").is_err());
    }

    #[test]
    fn channels_by_name() {
        assert_eq!(parse("channel metal").unwrap(), Some(Command::Channel(Channel::Metal)));
        assert!(parse("channel jazz").is_err());
        assert!(parse("channel").is_err());
    }

    #[test]
    fn device_with_spaces_or_default() {
        assert_eq!(parse("device USB Audio").unwrap(), Some(Command::Device(Some("USB Audio".into()))));
        assert_eq!(parse("device").unwrap(), Some(Command::Device(None)));
    }

    #[test]
    fn words_and_blanks() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("mute").unwrap(), Some(Command::Mute));
        assert_eq!(parse("QUIT").unwrap(), Some(Command::Quit));
        assert!(parse("dance").is_err());
    }

    #[test]
    fn bar_scales_to_twenty_cells() {
        assert_eq!(meter_bar(0.0), format!("[{}]   0%", " ".repeat(20)));
        assert_eq!(meter_bar(50.0), format!("[{}{}]  50%", "#".repeat(10), " ".repeat(10)));
        assert_eq!(meter_bar(100.0), format!("[{}] 100%", "#".repeat(20)));
    }
}

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Amplifier channel voicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    #[default]
    Clean,
    Acoustic,
    Crunch,
    Overdrive,
    Distortion,
    Fuzz,
    Metal,
}

/// Fixed voicing of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelPreset {
    pub channel: Channel,
    /// Pre-shaper gain multiplier at the neutral gain setting.
    pub base_gain: f32,
    /// Distortion curve amount at the neutral gain setting.
    pub base_drive: f32,
    /// Tone filter cutoff at the neutral tone setting.
    pub cutoff_hz: f32,
}

const fn preset(channel: Channel, base_gain: f32, base_drive: f32, cutoff_hz: f32) -> ChannelPreset {
    ChannelPreset { channel, base_gain, base_drive, cutoff_hz }
}

/// Indexed by `Channel as usize`.
pub const PRESETS: [ChannelPreset; 7] = [
    preset(Channel::Clean, 0.5, 0.0, 8000.0),
    preset(Channel::Acoustic, 0.3, 0.0, 12000.0),
    preset(Channel::Crunch, 2.0, 20.0, 5000.0),
    preset(Channel::Overdrive, 4.0, 40.0, 4000.0),
    preset(Channel::Distortion, 8.0, 80.0, 3500.0),
    preset(Channel::Fuzz, 12.0, 120.0, 3000.0),
    preset(Channel::Metal, 15.0, 150.0, 4500.0),
];

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Clean,
        Channel::Acoustic,
        Channel::Crunch,
        Channel::Overdrive,
        Channel::Distortion,
        Channel::Fuzz,
        Channel::Metal,
    ];

    pub fn preset(self) -> &'static ChannelPreset {
        &PRESETS[self as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Clean => "clean",
            Channel::Acoustic => "acoustic",
            Channel::Crunch => "crunch",
            Channel::Overdrive => "overdrive",
            Channel::Distortion => "distortion",
            Channel::Fuzz => "fuzz",
            Channel::Metal => "metal",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown channel '{0}' (expected one of clean, acoustic, crunch, overdrive, distortion, fuzz, metal)")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Channel::ALL
            .into_iter()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_channel() {
        for ch in Channel::ALL {
            assert_eq!(ch.preset().channel, ch);
        }
    }

    #[test]
    fn overdrive_voicing() {
        let p = Channel::Overdrive.preset();
        assert_eq!(p.base_gain, 4.0);
        assert_eq!(p.base_drive, 40.0);
        assert_eq!(p.cutoff_hz, 4000.0);
    }

    #[test]
    fn clean_channels_have_no_drive() {
        assert_eq!(Channel::Clean.preset().base_drive, 0.0);
        assert_eq!(Channel::Acoustic.preset().base_drive, 0.0);
        assert!(Channel::ALL.iter().all(|c| c.preset().cutoff_hz > 0.0));
    }

    #[test]
    fn parse_names() {
        assert_eq!("Metal".parse::<Channel>(), Ok(Channel::Metal));
        assert_eq!(" fuzz ".parse::<Channel>(), Ok(Channel::Fuzz));
        assert!("jazz".parse::<Channel>().is_err());
        for ch in Channel::ALL {
            assert_eq!(ch.to_string().parse::<Channel>(), Ok(ch));
        }
    }
}

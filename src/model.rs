use bitflags::bitflags;

use crate::calibration::VoltageRange;
use crate::config::{CHANNEL_COUNT, ChannelConfiguration, Coupling, DeviceConfiguration, Termination};

const UNSUPPORTED_DEVICE_NAME: &str = "No device or device not supported";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    PS6402, PS6402A, PS6402B, PS6402C, PS6402D,
    PS6403, PS6403A, PS6403B, PS6403C, PS6403D,
    PS6404, PS6404A, PS6404B, PS6404C, PS6404D,
    PS6407,
    PS6408,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Features: u8 {
        /// Arbitrary waveform generator in addition to the built-in function generator.
        const ArbitraryWaveform = 1<<0;
        /// Inputs are 50 Ω only, with a single fixed range.
        const FixedInput        = 1<<1;
    }
}

impl Model {
    /// Parse the variant string reported by the unit, e.g. `"6403B"`.
    pub fn parse(variant: &str) -> Option<Model> {
        let variant = variant.trim_end_matches('\0').trim();
        let (number, suffix) = match (variant.get(..4), variant.get(4..)) {
            (Some(number), Some("")) => (number, None),
            (Some(number), Some(suffix)) if suffix.len() == 1 =>
                (number, suffix.chars().next().map(|c| c.to_ascii_uppercase())),
            _ => return None
        };
        let model = match (number, suffix) {
            ("6402", None)      => Model::PS6402,
            ("6402", Some('A')) => Model::PS6402A,
            ("6402", Some('B')) => Model::PS6402B,
            ("6402", Some('C')) => Model::PS6402C,
            ("6402", Some('D')) => Model::PS6402D,
            ("6403", None)      => Model::PS6403,
            ("6403", Some('A')) => Model::PS6403A,
            ("6403", Some('B')) => Model::PS6403B,
            ("6403", Some('C')) => Model::PS6403C,
            ("6403", Some('D')) => Model::PS6403D,
            ("6404", None)      => Model::PS6404,
            ("6404", Some('A')) => Model::PS6404A,
            ("6404", Some('B')) => Model::PS6404B,
            ("6404", Some('C')) => Model::PS6404C,
            ("6404", Some('D')) => Model::PS6404D,
            ("6407", None)      => Model::PS6407,
            ("6408", None)      => Model::PS6408,
            _ => return None
        };
        Some(model)
    }

    pub fn name(self) -> &'static str {
        match self {
            Model::PS6402  => "PS6402",
            Model::PS6402A => "PS6402A",
            Model::PS6402B => "PS6402B",
            Model::PS6402C => "PS6402C",
            Model::PS6402D => "PS6402D",
            Model::PS6403  => "PS6403",
            Model::PS6403A => "PS6403A",
            Model::PS6403B => "PS6403B",
            Model::PS6403C => "PS6403C",
            Model::PS6403D => "PS6403D",
            Model::PS6404  => "PS6404",
            Model::PS6404A => "PS6404A",
            Model::PS6404B => "PS6404B",
            Model::PS6404C => "PS6404C",
            Model::PS6404D => "PS6404D",
            Model::PS6407  => "PS6407",
            Model::PS6408  => "PS6408",
        }
    }

    pub fn features(self) -> Features {
        match self {
            Model::PS6402A | Model::PS6403A | Model::PS6404A => Features::empty(),
            Model::PS6407 | Model::PS6408 => Features::ArbitraryWaveform | Features::FixedInput,
            _ => Features::ArbitraryWaveform,
        }
    }

    pub fn channel_count(self) -> usize {
        CHANNEL_COUNT
    }

    pub fn first_range(self) -> VoltageRange {
        if self.features().contains(Features::FixedInput) {
            VoltageRange::Mv100
        } else {
            VoltageRange::Mv50
        }
    }

    pub fn last_range(self) -> VoltageRange {
        if self.features().contains(Features::FixedInput) {
            VoltageRange::Mv100
        } else {
            VoltageRange::V20
        }
    }

    pub fn default_configuration(self) -> DeviceConfiguration {
        let channel = if self.features().contains(Features::FixedInput) {
            ChannelConfiguration {
                enabled: true,
                coupling: Coupling::DC,
                termination: Termination::Ohm50,
                range: VoltageRange::Mv100,
            }
        } else {
            ChannelConfiguration::default()
        };
        DeviceConfiguration { channels: [channel; CHANNEL_COUNT] }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_name: String,
    pub channel_count: usize,
    pub serial: String,
}

impl DeviceInfo {
    pub fn new(model: Option<Model>, serial: String) -> DeviceInfo {
        match model {
            Some(model) => DeviceInfo {
                device_name: model.name().to_owned(),
                channel_count: model.channel_count(),
                serial,
            },
            None => DeviceInfo {
                device_name: UNSUPPORTED_DEVICE_NAME.to_owned(),
                channel_count: 0,
                serial,
            }
        }
    }
}

//! Trigger specifications and their translation into driver codes.

use crate::{Error, Result};
use crate::calibration::{Calibration, VoltageRange};
use crate::config::CHANNEL_COUNT;
use crate::sys::{AdvancedTriggerCodes, ChannelPropertyCodes, PulseWidthCodes, SimpleTriggerCodes};

/// Pre-trigger offset used by triggered captures, in percent of the capture (negative is pre-).
pub const PRE_TRIGGER_DELAY: i32 = -10;

/// Hysteresis used by the advanced level trigger, in ADC codes.
pub const DEFAULT_HYSTERESIS: u16 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Channel {
    #[default]
    A,
    B,
    C,
    D,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [Channel::A, Channel::B, Channel::C, Channel::D];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Result<Channel> {
        Self::ALL.get(index).copied().ok_or(Error::InvalidChannelIndex(index))
    }

    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdDirection {
    #[default]
    Rising,
    Falling,
}

impl ThresholdDirection {
    pub(crate) fn ps6000_code(self) -> i32 {
        match self {
            Self::Rising  => 2,
            Self::Falling => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionState {
    #[default]
    DontCare,
    True,
    False,
}

impl ConditionState {
    pub(crate) fn ps6000_code(self) -> i32 {
        match self {
            Self::DontCare => 0,
            Self::True     => 1,
            Self::False    => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdMode {
    #[default]
    Level,
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseWidthType {
    LessThan,
    GreaterThan,
    InRange,
    OutOfRange,
}

impl PulseWidthType {
    pub(crate) fn ps6000_code(self) -> i32 {
        match self {
            Self::LessThan    => 1,
            Self::GreaterThan => 2,
            Self::InRange     => 3,
            Self::OutOfRange  => 4,
        }
    }
}

/// Qualifies an advanced trigger by the width of the triggering pulse, in sample periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseWidthQualifier {
    pub conditions: [ConditionState; CHANNEL_COUNT],
    pub direction: ThresholdDirection,
    pub kind: PulseWidthType,
    pub lower: u32,
    /// Only used by `InRange` and `OutOfRange`.
    pub upper: u32,
}

impl PulseWidthQualifier {
    fn validate(&self) -> Result<()> {
        match self.kind {
            PulseWidthType::InRange | PulseWidthType::OutOfRange if self.lower >= self.upper =>
                Err(Error::TriggerConfig(format!(
                    "pulse width range {}..{} is empty", self.lower, self.upper))),
            _ => Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleTrigger {
    pub channel: Channel,
    pub direction: ThresholdDirection,
    pub threshold_mv: f64,
    pub delay: i32,
    /// Fire without a trigger event after this many milliseconds; 0 waits indefinitely.
    pub auto_trigger_ms: i16,
}

impl SimpleTrigger {
    pub fn new(channel: Channel, direction: ThresholdDirection, threshold_mv: f64) -> Self {
        SimpleTrigger {
            channel,
            direction,
            threshold_mv,
            delay: PRE_TRIGGER_DELAY,
            auto_trigger_ms: 0,
        }
    }

    pub(crate) fn validate(&self, range: VoltageRange) -> Result<()> {
        if !self.threshold_mv.is_finite() || self.threshold_mv.abs() > range.millivolts() as f64 {
            return Err(Error::TriggerConfig(format!(
                "threshold {} mV is outside of the {} mV range of channel {}",
                self.threshold_mv, range.millivolts(), self.channel.letter())))
        }
        Ok(())
    }

    pub(crate) fn to_codes(&self, calibration: &Calibration, range: VoltageRange)
            -> SimpleTriggerCodes {
        SimpleTriggerCodes {
            source: self.channel.index() as i32,
            threshold: calibration.physical_to_adc(self.threshold_mv, range),
            direction: self.direction.ps6000_code(),
            delay: self.delay,
            auto_trigger_ms: self.auto_trigger_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvancedTrigger {
    pub conditions: [ConditionState; CHANNEL_COUNT],
    pub directions: [ThresholdDirection; CHANNEL_COUNT],
    /// Level threshold, or upper edge of the window.
    pub threshold_major_mv: f64,
    /// Lower edge of the window; unused in level mode.
    pub threshold_minor_mv: f64,
    /// In ADC codes; unused in window mode.
    pub hysteresis: u16,
    pub mode: ThresholdMode,
    pub delay: i32,
    pub auto_trigger_ms: i32,
    pub pulse_width: Option<PulseWidthQualifier>,
}

impl AdvancedTrigger {
    /// Level trigger on the rising edge of a single channel.
    pub fn single_channel(channel: Channel, threshold_mv: f64) -> Self {
        let mut conditions = [ConditionState::DontCare; CHANNEL_COUNT];
        conditions[channel.index()] = ConditionState::True;
        AdvancedTrigger {
            conditions,
            directions: [ThresholdDirection::Rising; CHANNEL_COUNT],
            threshold_major_mv: threshold_mv,
            threshold_minor_mv: 0.0,
            hysteresis: DEFAULT_HYSTERESIS,
            mode: ThresholdMode::Level,
            delay: PRE_TRIGGER_DELAY,
            auto_trigger_ms: 0,
            pulse_width: None,
        }
    }

    /// Returns the channel the trigger is armed on.
    ///
    /// Exactly one channel must be `True`; every other channel must be `DontCare`, since
    /// a single condition cannot combine several channels.
    pub fn validate(&self) -> Result<Channel> {
        let mut armed = None;
        for (index, state) in self.conditions.iter().enumerate() {
            match state {
                ConditionState::DontCare => (),
                ConditionState::True if armed.is_none() =>
                    armed = Some(Channel::from_index(index)?),
                ConditionState::True =>
                    return Err(Error::TriggerConfig(
                        "more than one channel condition is true".to_owned())),
                ConditionState::False =>
                    return Err(Error::TriggerConfig(format!(
                        "channel {} condition is false; only one channel may be qualified",
                        Channel::from_index(index)?.letter()))),
            }
        }
        let channel = armed.ok_or_else(||
            Error::TriggerConfig("no channel condition is true".to_owned()))?;
        if !self.threshold_major_mv.is_finite() || !self.threshold_minor_mv.is_finite() {
            return Err(Error::TriggerConfig("threshold is not finite".to_owned()))
        }
        if self.mode == ThresholdMode::Window && self.threshold_minor_mv >= self.threshold_major_mv {
            return Err(Error::TriggerConfig(format!(
                "window {}..{} mV is empty", self.threshold_minor_mv, self.threshold_major_mv)))
        }
        if let Some(pulse_width) = &self.pulse_width {
            pulse_width.validate()?;
        }
        Ok(channel)
    }

    pub(crate) fn to_codes(&self, channel: Channel, calibration: &Calibration,
            range: VoltageRange) -> AdvancedTriggerCodes {
        let (hysteresis_upper, threshold_lower) = match self.mode {
            ThresholdMode::Level => (self.hysteresis, 0),
            ThresholdMode::Window => (0, calibration.physical_to_adc(self.threshold_minor_mv, range)),
        };
        AdvancedTriggerCodes {
            conditions: self.conditions.map(ConditionState::ps6000_code),
            directions: self.directions.map(ThresholdDirection::ps6000_code),
            properties: ChannelPropertyCodes {
                channel: channel.index() as i32,
                threshold_upper: calibration.physical_to_adc(self.threshold_major_mv, range),
                hysteresis_upper,
                threshold_lower,
                hysteresis_lower: 0,
                mode: match self.mode {
                    ThresholdMode::Level  => 0,
                    ThresholdMode::Window => 1,
                },
            },
            delay: self.delay,
            auto_trigger_ms: self.auto_trigger_ms,
            pulse_width: self.pulse_width.map(|pulse_width| PulseWidthCodes {
                conditions: pulse_width.conditions.map(ConditionState::ps6000_code),
                direction: pulse_width.direction.ps6000_code(),
                lower: pulse_width.lower,
                upper: pulse_width.upper,
                kind: pulse_width.kind.ps6000_code(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TriggerSpec {
    #[default]
    None,
    Simple(SimpleTrigger),
    Advanced(AdvancedTrigger),
}

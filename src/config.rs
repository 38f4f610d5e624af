//! High-level configuration of the device and of an acquisition session.

use std::path::PathBuf;
use std::time::Duration;

use crate::calibration::{TimeUnit, VoltageRange};

pub const CHANNEL_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    #[default]
    Ohm1M,
    Ohm50,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coupling {
    #[default]
    DC,
    AC
}

impl Coupling {
    pub(crate) fn ps6000_code(self, termination: Termination) -> i32 {
        match (self, termination) {
            (Coupling::AC, _) => 0,
            (Coupling::DC, Termination::Ohm1M) => 1,
            (Coupling::DC, Termination::Ohm50) => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfiguration {
    pub enabled: bool,
    pub coupling: Coupling,
    pub termination: Termination,
    pub range: VoltageRange,
}

impl Default for ChannelConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            coupling: Default::default(),
            termination: Default::default(),
            range: VoltageRange::V5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceConfiguration {
    pub channels: [ChannelConfiguration; CHANNEL_COUNT]
}

impl Default for DeviceConfiguration {
    fn default() -> Self {
        DeviceConfiguration {
            channels: [ChannelConfiguration::default(); CHANNEL_COUNT]
        }
    }
}

impl DeviceConfiguration {
    pub fn enabled_mask(&self) -> [bool; CHANNEL_COUNT] {
        self.channels.map(|channel| channel.enabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamingConfiguration {
    /// Samples per display sweep in plain streaming mode.
    pub sweep_samples: usize,
    /// Samples requested from the driver per pull in plain streaming mode.
    pub pull_samples: usize,
    pub fast_interval: u32,
    pub fast_interval_unit: TimeUnit,
    pub fast_aggregation: u32,
    pub fast_overview_size: u32,
    /// Samples the driver keeps for a streaming capture; a fast streaming capture auto-stops
    /// once it has collected this many.
    pub buffer_size: usize,
}

impl Default for StreamingConfiguration {
    fn default() -> Self {
        Self {
            sweep_samples: 500,
            pull_samples: 1024,
            fast_interval: 10,
            fast_interval_unit: TimeUnit::Microseconds,
            fast_aggregation: 100,
            fast_overview_size: 30_000,
            buffer_size: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfiguration {
    /// Display time per division, in seconds. The display shows five divisions.
    pub time_per_division: f64,
    /// Samples captured per block, and the minimum window size.
    pub block_size: usize,
    pub oversample: i16,
    pub poll_interval: Duration,
    pub cycle_delay: Duration,
    pub scale_to_physical: bool,
    /// Where to write block captures of the advanced-triggered and ETS modes.
    pub export_path: Option<PathBuf>,
    pub streaming: StreamingConfiguration,
}

impl Default for AcquisitionConfiguration {
    fn default() -> Self {
        Self {
            time_per_division: 1e-3,
            block_size: 1024,
            oversample: 1,
            poll_interval: Duration::from_millis(100),
            cycle_delay: Duration::from_millis(100),
            scale_to_physical: true,
            export_path: None,
            streaming: StreamingConfiguration::default(),
        }
    }
}

impl AcquisitionConfiguration {
    /// Time covered by one display window.
    pub fn frame_time(&self) -> f64 {
        5.0 * self.time_per_division
    }
}

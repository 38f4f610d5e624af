use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use bitflags::bitflags;

use crate::Result;
use crate::calibration::{TimeUnit, VoltageRange};
use crate::config::{CHANNEL_COUNT, Coupling, Termination};

pub mod sim;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub i16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitInfo {
    DriverVersion = 0,
    UsbVersion    = 1,
    HardwareVersion = 2,
    VariantInfo   = 3,
    BatchAndSerial = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtsMode {
    Off  = 0,
    Fast = 1,
    Slow = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveType {
    #[default]
    Sine     = 0,
    Square   = 1,
    Triangle = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatioMode {
    None      = 0,
    Aggregate = 1,
}

bitflags! {
    /// Channels whose input exceeded the selected range during a capture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Overflow: u16 {
        const ChannelA = 1<<0;
        const ChannelB = 1<<1;
        const ChannelC = 1<<2;
        const ChannelD = 1<<3;
    }
}

/// Per-channel sample storage filled by the driver. Disabled channels are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBuffers {
    pub channels: [Option<Vec<i16>>; CHANNEL_COUNT],
}

impl SampleBuffers {
    pub fn for_channels(enabled: [bool; CHANNEL_COUNT]) -> SampleBuffers {
        SampleBuffers {
            channels: enabled.map(|enabled| if enabled { Some(Vec::new()) } else { None })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadInfo {
    pub count: usize,
    pub overflow: Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimebaseInfo {
    /// Sample interval in `unit` ticks; never zero.
    pub interval: u64,
    pub unit: TimeUnit,
    pub max_samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingParameters {
    pub interval: u32,
    pub unit: TimeUnit,
    pub max_pre_trigger_samples: u32,
    pub max_post_trigger_samples: u32,
    pub auto_stop: bool,
    pub aggregation: u32,
    pub ratio_mode: RatioMode,
    pub overview_buffer_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleTriggerCodes {
    pub source: i32,
    pub threshold: i16,
    pub direction: i32,
    /// Percent of the capture; negative values request pre-trigger samples.
    pub delay: i32,
    pub auto_trigger_ms: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPropertyCodes {
    pub channel: i32,
    pub threshold_upper: i16,
    pub hysteresis_upper: u16,
    pub threshold_lower: i16,
    pub hysteresis_lower: u16,
    pub mode: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseWidthCodes {
    pub conditions: [i32; CHANNEL_COUNT],
    pub direction: i32,
    pub lower: u32,
    pub upper: u32,
    pub kind: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvancedTriggerCodes {
    pub conditions: [i32; CHANNEL_COUNT],
    pub directions: [i32; CHANNEL_COUNT],
    pub properties: ChannelPropertyCodes,
    pub delay: i32,
    pub auto_trigger_ms: i32,
    pub pulse_width: Option<PulseWidthCodes>,
}

/// Progress of a fast streaming capture, updated by the driver callback.
///
/// The callback may run on a driver thread; it publishes with `Release` and the poll loop
/// observes with `Acquire`.
#[derive(Debug, Default)]
pub struct StreamingProgress {
    total_samples: AtomicU64,
    auto_stop: AtomicBool,
    triggered: AtomicBool,
    trigger_at: AtomicU32,
}

impl StreamingProgress {
    pub fn new() -> StreamingProgress {
        Default::default()
    }

    pub fn reset(&self) {
        self.total_samples.store(0, Ordering::Release);
        self.auto_stop.store(false, Ordering::Release);
        self.triggered.store(false, Ordering::Release);
        self.trigger_at.store(0, Ordering::Release);
    }

    /// Record a driver callback reporting `count` new samples.
    pub fn record(&self, count: u64, auto_stop: bool, trigger_at: Option<u32>) {
        if let Some(trigger_at) = trigger_at {
            self.trigger_at.store(trigger_at, Ordering::Relaxed);
            self.triggered.store(true, Ordering::Release);
        }
        self.total_samples.fetch_add(count, Ordering::AcqRel);
        if auto_stop {
            self.auto_stop.store(true, Ordering::Release);
        }
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples.load(Ordering::Acquire)
    }

    pub fn auto_stopped(&self) -> bool {
        self.auto_stop.load(Ordering::Acquire)
    }

    pub fn trigger_at(&self) -> Option<u32> {
        if self.triggered.load(Ordering::Acquire) {
            Some(self.trigger_at.load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

/// Capabilities of the vendor driver for one instrument.
///
/// Every method maps onto one driver entry point (or a short fixed sequence of them) and
/// reports a rejected call as `Error::DeviceCommandFailed`.
pub trait Driver {
    fn open_unit(&mut self) -> Result<Handle>;
    fn close_unit(&mut self, handle: Handle) -> Result<()>;
    fn unit_info(&mut self, handle: Handle, info: UnitInfo) -> Result<String>;

    fn set_channel(&mut self, handle: Handle, channel: usize, enabled: bool, coupling: Coupling,
        termination: Termination, range: VoltageRange) -> Result<()>;
    /// Returns the effective ETS sample time in picoseconds.
    fn set_ets(&mut self, handle: Handle, mode: EtsMode, cycles: i16, interleave: i16)
        -> Result<i32>;
    /// Configures the simple trigger, or disables triggering if `trigger` is `None`.
    fn set_simple_trigger(&mut self, handle: Handle, trigger: Option<&SimpleTriggerCodes>)
        -> Result<()>;
    fn set_advanced_trigger(&mut self, handle: Handle, trigger: &AdvancedTriggerCodes)
        -> Result<()>;

    /// Returns `None` if the device cannot sample `samples` points at timebase `index`.
    fn get_timebase(&mut self, handle: Handle, index: u32, samples: u32, oversample: i16)
        -> Result<Option<TimebaseInfo>>;
    /// Starts a block capture; returns the time the device is expected to be busy, in ms.
    fn run_block(&mut self, handle: Handle, pre_trigger_samples: u32, post_trigger_samples: u32,
        timebase: u32, oversample: i16) -> Result<i32>;
    fn is_ready(&mut self, handle: Handle) -> Result<bool>;
    fn stop(&mut self, handle: Handle) -> Result<()>;
    fn read_block(&mut self, handle: Handle, buffers: &mut SampleBuffers, samples: usize)
        -> Result<ReadInfo>;

    /// Starts streaming; returns the sample interval actually selected by the device.
    fn run_streaming(&mut self, handle: Handle, enabled: [bool; CHANNEL_COUNT],
        parameters: &StreamingParameters) -> Result<u32>;
    /// Copies up to `samples` values collected since the previous call.
    fn get_streaming_values(&mut self, handle: Handle, buffers: &mut SampleBuffers,
        samples: usize) -> Result<ReadInfo>;
    /// Invokes the driver callback for data collected since the previous call.
    fn get_streaming_latest_values(&mut self, handle: Handle, progress: &StreamingProgress)
        -> Result<()>;
    /// Reads back the whole non-aggregated capture after streaming has stopped.
    fn get_streaming_values_no_aggregation(&mut self, handle: Handle,
        buffers: &mut SampleBuffers, samples: usize) -> Result<ReadInfo>;

    fn set_sig_gen_built_in(&mut self, handle: Handle, wave: WaveType, frequency: f64,
        peak_to_peak_uv: u32) -> Result<()>;
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
#[path = "linux.rs"]
pub mod imp;

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
#[path = "stub.rs"]
pub mod imp;

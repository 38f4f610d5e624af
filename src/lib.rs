mod sys;
mod calibration;
mod config;
mod model;
mod trigger;
mod device;
mod capture;
mod window;
mod sampler;
pub mod export;

#[derive(Debug)]
pub enum Error {
    NotFound,
    DeviceOpenFailed(u32),
    DeviceCommandFailed { command: &'static str, status: u32 },
    TriggerConfig(String),
    InvalidChannelIndex(usize),
    InvalidVoltageRange(f64),
    InvalidUnit(i32),
    InvalidFrequency(f64),
    Io(std::io::Error),
    Export(csv::Error),
    Other(Box<dyn std::error::Error + Sync + Send + 'static>),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NotFound =>
                write!(f, "device not connected or driver library not installed"),
            Self::DeviceOpenFailed(status) =>
                write!(f, "failed to open device (status {:#x})", status),
            Self::DeviceCommandFailed { command, status } =>
                write!(f, "device rejected {} (status {:#x})", command, status),
            Self::TriggerConfig(reason) =>
                write!(f, "invalid trigger configuration: {}", reason),
            Self::InvalidChannelIndex(channel) =>
                write!(f, "invalid channel index {}", channel),
            Self::InvalidVoltageRange(volts) =>
                write!(f, "no input range covers {} V", volts),
            Self::InvalidUnit(tag) =>
                write!(f, "driver reported unknown time unit {}", tag),
            Self::InvalidFrequency(hertz) =>
                write!(f, "signal generator frequency {} Hz out of range", hertz),
            Self::Io(io_error) =>
                write!(f, "I/O error: {}", io_error),
            Self::Export(csv_error) =>
                write!(f, "export error: {}", csv_error),
            Self::Other(error) =>
                write!(f, "{}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            &Self::Io(ref io_error) => Some(io_error),
            &Self::Export(ref csv_error) => Some(csv_error),
            _ => None
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(error) => error,
            Err(error) => Error::Io(error),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Self {
        Error::Export(error)
    }
}

impl Error {
    /// Whether the error was caused by caller input and was rejected before touching hardware.
    pub fn is_input_error(&self) -> bool {
        matches!(self,
            Self::TriggerConfig(_) |
            Self::InvalidChannelIndex(_) |
            Self::InvalidVoltageRange(_) |
            Self::InvalidFrequency(_))
    }
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use sys::{
    Driver,
    Handle,
    UnitInfo,
    EtsMode,
    WaveType,
    Overflow,
    SampleBuffers,
    ReadInfo,
    TimebaseInfo,
    StreamingParameters,
    StreamingProgress,
    RatioMode,
};

pub use sys::sim::{
    SimulatedDriver,
    Command,
    Signal,
};

pub use calibration::{
    VoltageRange,
    TimeUnit,
    Calibration,
    FULL_SCALE_CODE,
    time_unit_multiplier,
};

pub use config::{
    Termination,
    Coupling,
    ChannelConfiguration,
    DeviceConfiguration,
    AcquisitionConfiguration,
    StreamingConfiguration,
    CHANNEL_COUNT,
};

pub use model::{
    Model,
    Features,
    DeviceInfo,
};

pub use trigger::{
    Channel,
    ThresholdDirection,
    ConditionState,
    ThresholdMode,
    PulseWidthType,
    PulseWidthQualifier,
    SimpleTrigger,
    AdvancedTrigger,
    TriggerSpec,
};

pub use device::TimebaseSetting;

pub type Device =
    device::Device<crate::sys::imp::Ps6000DriverImpl>;

pub use device::Device as Session;

pub use capture::{
    Mode,
    CaptureState,
    SampleBatch,
    Cycle,
    Capture,
};

pub use window::{
    WindowBuffer,
    Windows,
    DisplaySink,
    ChannelSink,
    Trace,
};

pub use sampler::{
    CancellationToken,
    Sampler,
    run_acquisition,
};

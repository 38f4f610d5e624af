use crate::{Error, Result};
use crate::calibration::VoltageRange;
use crate::config::{CHANNEL_COUNT, Coupling, Termination};
use super::*;

/// Placeholder for platforms without driver bindings; it can never be constructed.
#[derive(Debug)]
pub enum Ps6000DriverImpl {}

impl Ps6000DriverImpl {
    pub fn new() -> Result<Ps6000DriverImpl> {
        Err(Error::NotFound)
    }
}

impl Driver for Ps6000DriverImpl {
    fn open_unit(&mut self) -> Result<Handle> { match *self {} }
    fn close_unit(&mut self, _handle: Handle) -> Result<()> { match *self {} }
    fn unit_info(&mut self, _handle: Handle, _info: UnitInfo) -> Result<String> { match *self {} }

    fn set_channel(&mut self, _handle: Handle, _channel: usize, _enabled: bool,
            _coupling: Coupling, _termination: Termination, _range: VoltageRange) -> Result<()> {
        match *self {}
    }

    fn set_ets(&mut self, _handle: Handle, _mode: EtsMode, _cycles: i16, _interleave: i16)
            -> Result<i32> {
        match *self {}
    }

    fn set_simple_trigger(&mut self, _handle: Handle, _trigger: Option<&SimpleTriggerCodes>)
            -> Result<()> {
        match *self {}
    }

    fn set_advanced_trigger(&mut self, _handle: Handle, _trigger: &AdvancedTriggerCodes)
            -> Result<()> {
        match *self {}
    }

    fn get_timebase(&mut self, _handle: Handle, _index: u32, _samples: u32, _oversample: i16)
            -> Result<Option<TimebaseInfo>> {
        match *self {}
    }

    fn run_block(&mut self, _handle: Handle, _pre_trigger_samples: u32,
            _post_trigger_samples: u32, _timebase: u32, _oversample: i16) -> Result<i32> {
        match *self {}
    }

    fn is_ready(&mut self, _handle: Handle) -> Result<bool> { match *self {} }
    fn stop(&mut self, _handle: Handle) -> Result<()> { match *self {} }

    fn read_block(&mut self, _handle: Handle, _buffers: &mut SampleBuffers, _samples: usize)
            -> Result<ReadInfo> {
        match *self {}
    }

    fn run_streaming(&mut self, _handle: Handle, _enabled: [bool; CHANNEL_COUNT],
            _parameters: &StreamingParameters) -> Result<u32> {
        match *self {}
    }

    fn get_streaming_values(&mut self, _handle: Handle, _buffers: &mut SampleBuffers,
            _samples: usize) -> Result<ReadInfo> {
        match *self {}
    }

    fn get_streaming_latest_values(&mut self, _handle: Handle, _progress: &StreamingProgress)
            -> Result<()> {
        match *self {}
    }

    fn get_streaming_values_no_aggregation(&mut self, _handle: Handle,
            _buffers: &mut SampleBuffers, _samples: usize) -> Result<ReadInfo> {
        match *self {}
    }

    fn set_sig_gen_built_in(&mut self, _handle: Handle, _wave: WaveType, _frequency: f64,
            _peak_to_peak_uv: u32) -> Result<()> {
        match *self {}
    }
}

use crate::{Error, Result};
use crate::calibration::{Calibration, TimeUnit, VoltageRange};
use crate::config::{CHANNEL_COUNT, Coupling, DeviceConfiguration, Termination};
use crate::model::{DeviceInfo, Model};
use crate::sys::{Driver, EtsMode, Handle, ReadInfo, SampleBuffers, StreamingParameters};
use crate::sys::{StreamingProgress, UnitInfo, WaveType};
use crate::trigger::{AdvancedTrigger, Channel, SimpleTrigger, TriggerSpec};

const STATUS_INVALID_TIMEBASE: u32 = 0x0E;

// Timebase indices tried before giving up on finding a valid one.
const MAX_TIMEBASE_SCAN: u32 = 1 << 16;
// Timebase indices `set_timebase` tries one by one before searching.
const LINEAR_TIMEBASE_SCAN: u32 = 64;
// Samples requested when querying timebases for `set_timebase`.
const TIMEBASE_QUERY_SAMPLES: u32 = 1024;
const MAX_WINDOW_SAMPLES: usize = 1 << 20;

const SIG_GEN_MIN_FREQUENCY: f64 = 1e3;
const SIG_GEN_MAX_FREQUENCY: f64 = 20e6;
const SIG_GEN_PEAK_TO_PEAK_UV: u32 = 2_000_000;

/// A timebase accepted by the device, with the display window it implies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimebaseSetting {
    pub index: u32,
    /// Sample interval in `unit` ticks.
    pub interval: u64,
    pub unit: TimeUnit,
    pub oversample: i16,
    pub max_samples: u32,
    /// Samples covering one display window, never fewer than the requested block.
    pub window_samples: usize,
}

impl TimebaseSetting {
    /// Sample interval in seconds.
    pub fn sample_interval(&self) -> f64 {
        self.interval as f64 * self.unit.multiplier()
    }
}

/// Samples needed to cover `frame_time` at `sample_interval`, plus one, but at least `minimum`.
pub(crate) fn window_samples(frame_time: f64, sample_interval: f64, minimum: usize) -> usize {
    let ratio = frame_time / sample_interval;
    // absorb representation error, so that 5 ms / 10 us is exactly 500
    let ratio = if (ratio - ratio.round()).abs() < 1e-6 { ratio.round() } else { ratio.ceil() };
    let covering = ratio as usize + 1;
    let samples = covering.max(minimum);
    if samples > MAX_WINDOW_SAMPLES.max(minimum) {
        log::warn!("window of {} samples clamped to {}", samples, MAX_WINDOW_SAMPLES.max(minimum));
        MAX_WINDOW_SAMPLES.max(minimum)
    } else {
        samples
    }
}

/// An open instrument: the driver, its handle, and the channel and trigger state pushed to it.
#[derive(Debug)]
pub struct Device<D: Driver> {
    driver: D,
    handle: Handle,
    open: bool,
    model: Option<Model>,
    info: DeviceInfo,
    configuration: DeviceConfiguration,
    calibration: Calibration,
    trigger: TriggerSpec,
    timebase: u32,
    time_per_division: Option<f64>,
}

impl Device<crate::sys::imp::Ps6000DriverImpl> {
    pub fn new() -> Result<Device<crate::sys::imp::Ps6000DriverImpl>> {
        Self::open(crate::sys::imp::Ps6000DriverImpl::new()?)
    }
}

impl<D: Driver> Device<D> {
    pub fn open(mut driver: D) -> Result<Device<D>> {
        let handle = driver.open_unit()?;
        log::debug!("open_unit() = {:?}", handle);
        let mut device = Device {
            driver,
            handle,
            open: true,
            model: None,
            info: DeviceInfo::new(None, String::new()),
            configuration: DeviceConfiguration::default(),
            calibration: Calibration::default(),
            trigger: TriggerSpec::None,
            timebase: 0,
            time_per_division: None,
        };
        device.read_info()?;
        log::info!("opened {} (serial {})", device.info.device_name, device.info.serial);
        Ok(device)
    }

    fn read_info(&mut self) -> Result<()> {
        let variant = self.driver.unit_info(self.handle, UnitInfo::VariantInfo)?;
        let serial = self.driver.unit_info(self.handle, UnitInfo::BatchAndSerial)?;
        self.model = Model::parse(&variant);
        match self.model {
            Some(model) => self.configuration = model.default_configuration(),
            None => log::warn!("unsupported device variant {:?}", variant),
        }
        self.info = DeviceInfo::new(self.model, serial);
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.open = false;
        log::debug!("close_unit({:?})", self.handle);
        self.driver.close_unit(self.handle)
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn model(&self) -> Option<Model> {
        self.model
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn configuration(&self) -> &DeviceConfiguration {
        &self.configuration
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn set_scale_to_physical(&mut self, scale_to_physical: bool) {
        self.calibration.scale_to_physical = scale_to_physical;
    }

    pub fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    /// Time per division selected by the last `set_timebase` call.
    pub fn time_per_division(&self) -> Option<f64> {
        self.time_per_division
    }

    pub fn timebase(&self) -> u32 {
        self.timebase
    }

    fn channel_count(&self) -> usize {
        self.model.map_or(CHANNEL_COUNT, Model::channel_count)
    }

    fn range_span(&self) -> (VoltageRange, VoltageRange) {
        match self.model {
            Some(model) => (model.first_range(), model.last_range()),
            None => (VoltageRange::Mv10, VoltageRange::V50),
        }
    }

    fn check_channel(&self, channel: usize) -> Result<()> {
        if channel >= self.channel_count() {
            return Err(Error::InvalidChannelIndex(channel))
        }
        Ok(())
    }

    /// Push every channel configuration to the device, with ETS disabled.
    pub fn apply_channel_defaults(&mut self) -> Result<()> {
        log::debug!("apply_channel_defaults({:?})", self.configuration);
        self.driver.set_ets(self.handle, EtsMode::Off, 0, 0)?;
        for (index, channel) in self.configuration.channels.iter().enumerate() {
            self.driver.set_channel(self.handle, index, channel.enabled, channel.coupling,
                channel.termination, channel.range)?;
        }
        Ok(())
    }

    /// Select the smallest range that fits five divisions of `volts_per_division`, and enable
    /// the channel.
    pub fn set_voltages(&mut self, channel: usize, volts_per_division: f64) -> Result<()> {
        self.check_channel(channel)?;
        let full_scale = 5.0 * volts_per_division;
        if !(full_scale.is_finite() && full_scale > 0.0) {
            return Err(Error::InvalidVoltageRange(full_scale))
        }
        let (first, last) = self.range_span();
        let range = VoltageRange::ALL[first.index()..=last.index()].iter()
            .copied()
            .find(|range| range.volts() >= full_scale)
            .ok_or(Error::InvalidVoltageRange(full_scale))?;
        log::debug!("set_voltages({}, {}) = {:?}", channel, volts_per_division, range);
        let channel = &mut self.configuration.channels[channel];
        channel.range = range;
        channel.enabled = true;
        Ok(())
    }

    pub fn set_channel_enabled(&mut self, channel: usize, enabled: bool) -> Result<()> {
        self.check_channel(channel)?;
        self.configuration.channels[channel].enabled = enabled;
        Ok(())
    }

    pub fn set_coupling(&mut self, coupling: Coupling) {
        for channel in self.configuration.channels.iter_mut() {
            channel.coupling = coupling;
        }
    }

    pub fn set_termination(&mut self, termination: Termination) {
        for channel in self.configuration.channels.iter_mut() {
            channel.termination = termination;
        }
    }

    fn check_trigger_channel(&self, channel: Channel) -> Result<()> {
        if !self.configuration.channels[channel.index()].enabled {
            return Err(Error::TriggerConfig(format!("channel {} is disabled", channel.letter())))
        }
        Ok(())
    }

    pub fn configure_simple_trigger(&mut self, trigger: &SimpleTrigger) -> Result<()> {
        let range = self.configuration.channels[trigger.channel.index()].range;
        trigger.validate(range)?;
        self.check_trigger_channel(trigger.channel)?;
        let codes = trigger.to_codes(&self.calibration, range);
        log::debug!("configure_simple_trigger({:?}) = {:?}", trigger, codes);
        self.driver.set_simple_trigger(self.handle, Some(&codes))
            .map_err(rejected_trigger)?;
        self.trigger = TriggerSpec::Simple(*trigger);
        Ok(())
    }

    pub fn configure_advanced_trigger(&mut self, trigger: &AdvancedTrigger) -> Result<()> {
        let channel = trigger.validate()?;
        self.check_trigger_channel(channel)?;
        let range = self.configuration.channels[channel.index()].range;
        let codes = trigger.to_codes(channel, &self.calibration, range);
        log::debug!("configure_advanced_trigger({:?}) = {:?}", trigger, codes);
        self.driver.set_advanced_trigger(self.handle, &codes)
            .map_err(rejected_trigger)?;
        self.trigger = TriggerSpec::Advanced(*trigger);
        Ok(())
    }

    pub fn disable_trigger(&mut self) -> Result<()> {
        self.driver.set_simple_trigger(self.handle, None)?;
        self.trigger = TriggerSpec::None;
        Ok(())
    }

    // Interval of timebase `index` in seconds, or `None` if the device rejects it.
    fn timebase_interval(&mut self, index: u32) -> Result<Option<f64>> {
        let info = self.driver.get_timebase(self.handle, index, TIMEBASE_QUERY_SAMPLES, 1)?;
        Ok(info.map(|info| info.interval as f64 * info.unit.multiplier()))
    }

    /// Choose the coarsest timebase giving at least 100 samples per division.
    ///
    /// Low indices are scanned one by one, since the device may reject some of them. Past
    /// that, intervals grow with the index and the boundary is found by an exponential then
    /// binary search over the whole index space.
    pub fn set_timebase(&mut self, time_per_division: f64) -> Result<u32> {
        if !(time_per_division.is_finite() && time_per_division > 0.0) {
            return Err(Error::Other(
                format!("time per division {} s is not positive", time_per_division).into()))
        }
        // absorb representation error, so that 6.4 ns steps can land exactly on the budget
        let budget = time_per_division * 0.01 * (1.0 + 1e-9);
        let mut first_valid = None;
        let mut selected = None;
        let mut exceeded = false;
        for index in 0..LINEAR_TIMEBASE_SCAN {
            if let Some(interval) = self.timebase_interval(index)? {
                first_valid.get_or_insert(index);
                if interval <= budget {
                    selected = Some(index);
                } else {
                    exceeded = true;
                    break
                }
            }
        }
        if let (Some(mut lower), false) = (selected, exceeded) {
            // `lower` is within budget; find an index that is not
            let mut step = 1u32;
            let upper = loop {
                let index = lower.saturating_add(step);
                if index == lower {
                    break None
                }
                match self.timebase_interval(index)? {
                    Some(interval) if interval <= budget => {
                        lower = index;
                        step = step.saturating_mul(2);
                    }
                    _ => break Some(index)
                }
            };
            if let Some(mut upper) = upper {
                while upper - lower > 1 {
                    let middle = lower + (upper - lower) / 2;
                    match self.timebase_interval(middle)? {
                        Some(interval) if interval <= budget => lower = middle,
                        _ => upper = middle,
                    }
                }
            }
            selected = Some(lower);
        }
        let timebase = selected.or(first_valid).ok_or(Error::DeviceCommandFailed {
            command: "ps6000GetTimebase2", status: STATUS_INVALID_TIMEBASE })?;
        log::debug!("set_timebase({}) = {}", time_per_division, timebase);
        self.timebase = timebase;
        self.time_per_division = Some(time_per_division);
        Ok(timebase)
    }

    /// Find the first timebase, starting from the selected one, at which the device can
    /// capture `requested_samples`.
    pub fn resolve_timebase(&mut self, requested_samples: usize, time_per_division: f64,
            oversample: i16) -> Result<TimebaseSetting> {
        let samples = u32::try_from(requested_samples)
            .map_err(|_| Error::DeviceCommandFailed {
                command: "ps6000GetTimebase2", status: STATUS_INVALID_TIMEBASE })?;
        let start = self.timebase;
        for index in start..start.saturating_add(MAX_TIMEBASE_SCAN) {
            let info = match self.driver.get_timebase(self.handle, index, samples, oversample)? {
                Some(info) if info.interval > 0 && info.max_samples > 0 => info,
                _ => continue
            };
            let frame_time = 5.0 * time_per_division;
            let sample_interval = info.interval as f64 * info.unit.multiplier();
            if sample_interval > frame_time {
                log::warn!("timebase {} interval {} {} exceeds the {} s frame",
                    index, info.interval, info.unit.symbol(), frame_time);
            }
            let setting = TimebaseSetting {
                index,
                interval: info.interval,
                unit: info.unit,
                oversample,
                max_samples: info.max_samples,
                window_samples: window_samples(frame_time, sample_interval, requested_samples),
            };
            log::debug!("resolve_timebase({}, {}) = {:?}", requested_samples, time_per_division,
                setting);
            return Ok(setting)
        }
        log::error!("no valid timebase in {}..{}", start, start.saturating_add(MAX_TIMEBASE_SCAN));
        Err(Error::DeviceCommandFailed { command: "ps6000GetTimebase2", status: STATUS_INVALID_TIMEBASE })
    }

    pub fn set_sig_gen(&mut self, wave: WaveType, frequency: f64) -> Result<()> {
        if !(SIG_GEN_MIN_FREQUENCY..=SIG_GEN_MAX_FREQUENCY).contains(&frequency) {
            return Err(Error::InvalidFrequency(frequency))
        }
        log::debug!("set_sig_gen({:?}, {})", wave, frequency);
        self.driver.set_sig_gen_built_in(self.handle, wave, frequency, SIG_GEN_PEAK_TO_PEAK_UV)
    }

    pub(crate) fn set_ets(&mut self, mode: EtsMode, cycles: i16, interleave: i16) -> Result<i32> {
        let sample_time_ps = self.driver.set_ets(self.handle, mode, cycles, interleave)?;
        log::debug!("set_ets({:?}, {}, {}) = {} ps", mode, cycles, interleave, sample_time_ps);
        Ok(sample_time_ps)
    }

    pub(crate) fn run_block(&mut self, pre_trigger_samples: u32, post_trigger_samples: u32,
            timebase: &TimebaseSetting) -> Result<()> {
        let time_indisposed_ms = self.driver.run_block(self.handle, pre_trigger_samples,
            post_trigger_samples, timebase.index, timebase.oversample)?;
        log::debug!("run_block({}, {}, {}) = {} ms", pre_trigger_samples, post_trigger_samples,
            timebase.index, time_indisposed_ms);
        Ok(())
    }

    pub(crate) fn is_ready(&mut self) -> Result<bool> {
        let ready = self.driver.is_ready(self.handle)?;
        log::trace!("is_ready() = {}", ready);
        Ok(ready)
    }

    pub(crate) fn stop(&mut self) -> Result<()> {
        log::debug!("stop()");
        self.driver.stop(self.handle)
    }

    pub(crate) fn read_block(&mut self, buffers: &mut SampleBuffers, samples: usize)
            -> Result<ReadInfo> {
        let info = self.driver.read_block(self.handle, buffers, samples)?;
        log::debug!("read_block({}) = {:?}", samples, info);
        Ok(info)
    }

    pub(crate) fn run_streaming(&mut self, parameters: &StreamingParameters) -> Result<u32> {
        let enabled = self.configuration.enabled_mask();
        let interval = self.driver.run_streaming(self.handle, enabled, parameters)?;
        log::debug!("run_streaming({:?}) = {} {}", parameters, interval, parameters.unit.symbol());
        Ok(interval)
    }

    pub(crate) fn get_streaming_values(&mut self, buffers: &mut SampleBuffers, samples: usize)
            -> Result<ReadInfo> {
        let info = self.driver.get_streaming_values(self.handle, buffers, samples)?;
        log::trace!("get_streaming_values({}) = {:?}", samples, info);
        Ok(info)
    }

    pub(crate) fn get_streaming_latest_values(&mut self, progress: &StreamingProgress)
            -> Result<()> {
        self.driver.get_streaming_latest_values(self.handle, progress)
    }

    pub(crate) fn get_streaming_values_no_aggregation(&mut self, buffers: &mut SampleBuffers,
            samples: usize) -> Result<ReadInfo> {
        let info = self.driver.get_streaming_values_no_aggregation(self.handle, buffers, samples)?;
        log::debug!("get_streaming_values_no_aggregation({}) = {:?}", samples, info);
        Ok(info)
    }
}

impl<D: Driver> Drop for Device<D> {
    fn drop(&mut self) {
        if self.open {
            if let Err(error) = self.driver.close_unit(self.handle) {
                log::warn!("failed to close device: {}", error);
            }
        }
    }
}

fn rejected_trigger(error: Error) -> Error {
    match error {
        Error::DeviceCommandFailed { command, status } =>
            Error::TriggerConfig(format!("device rejected {} (status {:#x})", command, status)),
        error => error
    }
}

//! Acquisition modes and the capture cycle they share.

use std::thread::sleep;
use std::time::Duration;

use crate::Result;
use crate::calibration::TimeUnit;
use crate::config::{AcquisitionConfiguration, DeviceConfiguration};
use crate::device::{Device, TimebaseSetting, window_samples};
use crate::export;
use crate::sampler::CancellationToken;
use crate::sys::{Driver, EtsMode, Overflow, RatioMode, SampleBuffers, StreamingParameters};
use crate::sys::StreamingProgress;
use crate::trigger::{AdvancedTrigger, Channel, PRE_TRIGGER_DELAY, SimpleTrigger, ThresholdDirection};

const ETS_CYCLES: i16 = 60;
const ETS_INTERLEAVE: i16 = 4;
const ETS_TRIGGER_MV: f64 = 1500.0;

const FAST_STREAMING_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Immediate,
    SimpleTriggered(SimpleTrigger),
    AdvancedTriggered(AdvancedTrigger),
    /// Equivalent-time sampling, triggered on channel A rising past 1.5 V.
    Ets,
    Streaming,
    FastStreaming,
    FastStreamingTriggered(AdvancedTrigger),
}

impl Mode {
    fn is_exported(&self) -> bool {
        matches!(self, Mode::AdvancedTriggered(_) | Mode::Ets | Mode::FastStreamingTriggered(_))
    }

    fn validate(&self, configuration: &DeviceConfiguration) -> Result<()> {
        match self {
            Mode::SimpleTriggered(trigger) =>
                trigger.validate(configuration.channels[trigger.channel.index()].range),
            Mode::AdvancedTriggered(trigger) |
            Mode::FastStreamingTriggered(trigger) =>
                trigger.validate().map(|_| ()),
            _ => Ok(())
        }
    }

    // in percent of the capture; negative values are pre-trigger
    fn trigger_delay(&self) -> i32 {
        match self {
            Mode::SimpleTriggered(trigger) => trigger.delay,
            Mode::AdvancedTriggered(trigger) => trigger.delay,
            Mode::Ets => PRE_TRIGGER_DELAY,
            _ => 0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Configured,
    Armed,
    Polling,
    Ready,
    Delivered,
    Collecting,
    Aborting,
    Done,
}

/// Raw samples from one driver read.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub buffers: SampleBuffers,
    pub count: usize,
    /// Ticks of `unit` between consecutive samples.
    pub interval: u64,
    pub unit: TimeUnit,
    pub overflow: Overflow,
    /// First batch of a display sweep; the window must restart before it is shown.
    pub new_sweep: bool,
    pub trigger_at: Option<u32>,
}

impl SampleBatch {
    pub fn samples(&self, channel: Channel) -> Option<&[i16]> {
        self.buffers.channels[channel.index()].as_deref()
            .map(|samples| &samples[..self.count.min(samples.len())])
    }

    pub fn tick(&self, index: usize) -> u64 {
        index as u64 * self.interval
    }

    /// Sample times in seconds, relative to the first sample of the batch.
    pub fn times(&self) -> Vec<f64> {
        let multiplier = self.unit.multiplier();
        (0..self.count).map(|index| self.tick(index) as f64 * multiplier).collect()
    }
}

#[derive(Debug)]
pub enum Cycle {
    Batch(SampleBatch),
    /// The cancellation token was observed; the device has been stopped.
    Cancelled,
    /// The mode has delivered everything it will.
    Finished,
}

/// One acquisition session in a given mode, borrowing the device for its duration.
#[derive(Debug)]
pub struct Capture<'a, D: Driver> {
    device: &'a mut Device<D>,
    mode: Mode,
    config: AcquisitionConfiguration,
    state: CaptureState,
    timebase: Option<TimebaseSetting>,
    sample_interval: (u64, TimeUnit),
    window_samples: usize,
    sweep_position: usize,
    progress: StreamingProgress,
    torn_down: bool,
}

impl<'a, D: Driver> Capture<'a, D> {
    /// Prepare the device for `mode`: channel defaults, trigger, and timebase or streaming.
    pub fn configure(device: &'a mut Device<D>, mode: Mode, config: &AcquisitionConfiguration)
            -> Result<Capture<'a, D>> {
        mode.validate(device.configuration())?;
        log::info!("capture: configuring {:?}", mode);
        device.set_scale_to_physical(config.scale_to_physical);
        device.apply_channel_defaults()?;
        let mut capture = Capture {
            device,
            mode,
            config: config.clone(),
            state: CaptureState::Configured,
            timebase: None,
            sample_interval: (1, TimeUnit::Nanoseconds),
            window_samples: config.block_size,
            sweep_position: 0,
            progress: StreamingProgress::new(),
            torn_down: false,
        };
        match mode {
            Mode::Immediate | Mode::Streaming | Mode::FastStreaming =>
                capture.device.disable_trigger()?,
            Mode::SimpleTriggered(trigger) =>
                capture.device.configure_simple_trigger(&trigger)?,
            Mode::AdvancedTriggered(trigger) | Mode::FastStreamingTriggered(trigger) =>
                capture.device.configure_advanced_trigger(&trigger)?,
            Mode::Ets =>
                capture.device.configure_simple_trigger(
                    &SimpleTrigger::new(Channel::A, ThresholdDirection::Rising, ETS_TRIGGER_MV))?,
        }
        match mode {
            Mode::Streaming => capture.start_streaming()?,
            Mode::FastStreaming | Mode::FastStreamingTriggered(_) => capture.start_fast_streaming()?,
            _ => capture.resolve_timebase()?,
        }
        Ok(capture)
    }

    fn resolve_timebase(&mut self) -> Result<()> {
        let time_per_division = self.config.time_per_division;
        if self.device.time_per_division() != Some(time_per_division) {
            self.device.set_timebase(time_per_division)?;
        }
        let timebase = self.device.resolve_timebase(self.config.block_size, time_per_division,
            self.config.oversample)?;
        self.sample_interval = (timebase.interval, timebase.unit);
        if let Mode::Ets = self.mode {
            let sample_time_ps = self.device.set_ets(EtsMode::Fast, ETS_CYCLES, ETS_INTERLEAVE)?;
            if sample_time_ps > 0 {
                self.sample_interval = (sample_time_ps as u64, TimeUnit::Picoseconds);
            }
        }
        self.window_samples = timebase.window_samples;
        self.timebase = Some(timebase);
        Ok(())
    }

    fn start_streaming(&mut self) -> Result<()> {
        // 100 samples per division
        let requested = (self.config.time_per_division * 1e4).round().max(1.0) as u32;
        let interval = self.device.run_streaming(&StreamingParameters {
            interval: requested,
            unit: TimeUnit::Microseconds,
            max_pre_trigger_samples: 0,
            max_post_trigger_samples: self.config.streaming.buffer_size as u32,
            auto_stop: false,
            aggregation: 1,
            ratio_mode: RatioMode::None,
            overview_buffer_size: self.config.streaming.buffer_size as u32,
        })?;
        self.sample_interval = (interval as u64, TimeUnit::Microseconds);
        self.window_samples = window_samples(self.config.frame_time(),
            interval as f64 * TimeUnit::Microseconds.multiplier(), self.config.block_size);
        self.state = CaptureState::Collecting;
        Ok(())
    }

    fn start_fast_streaming(&mut self) -> Result<()> {
        let streaming = self.config.streaming;
        self.progress.reset();
        let interval = self.device.run_streaming(&StreamingParameters {
            interval: streaming.fast_interval,
            unit: streaming.fast_interval_unit,
            max_pre_trigger_samples: 0,
            max_post_trigger_samples: streaming.buffer_size as u32,
            auto_stop: true,
            aggregation: streaming.fast_aggregation,
            ratio_mode: RatioMode::Aggregate,
            overview_buffer_size: streaming.fast_overview_size,
        })?;
        self.sample_interval = (interval as u64, streaming.fast_interval_unit);
        self.window_samples = self.config.block_size.max(streaming.buffer_size);
        self.state = CaptureState::Collecting;
        Ok(())
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn device(&self) -> &Device<D> {
        &*self.device
    }

    pub fn timebase(&self) -> Option<&TimebaseSetting> {
        self.timebase.as_ref()
    }

    /// Samples covering one display window in this mode.
    pub fn window_samples(&self) -> usize {
        self.window_samples
    }

    pub fn run_one_cycle(&mut self, token: &CancellationToken) -> Result<Cycle> {
        match self.state {
            CaptureState::Done => return Ok(Cycle::Finished),
            CaptureState::Delivered => self.state = CaptureState::Configured,
            _ => ()
        }
        match self.mode {
            Mode::Streaming => self.streaming_cycle(token),
            Mode::FastStreaming | Mode::FastStreamingTriggered(_) => self.fast_streaming_cycle(token),
            _ => self.block_cycle(token),
        }
    }

    fn abort(&mut self) -> Result<Cycle> {
        log::debug!("capture: cancelled in state {:?}", self.state);
        self.state = CaptureState::Aborting;
        self.device.stop()?;
        self.state = CaptureState::Done;
        Ok(Cycle::Cancelled)
    }

    fn new_buffers(&self) -> SampleBuffers {
        SampleBuffers::for_channels(self.device.configuration().enabled_mask())
    }

    fn block_cycle(&mut self, token: &CancellationToken) -> Result<Cycle> {
        let timebase = match self.timebase {
            Some(timebase) => timebase,
            None => return Ok(Cycle::Finished),
        };
        let samples = self.config.block_size;
        let pre_trigger = match self.mode.trigger_delay() {
            delay if delay < 0 => samples * (-delay).min(100) as usize / 100,
            _ => 0
        };
        self.device.run_block(pre_trigger as u32, (samples - pre_trigger) as u32, &timebase)?;
        self.state = CaptureState::Armed;

        self.state = CaptureState::Polling;
        loop {
            if token.is_cancelled() {
                return self.abort()
            }
            if self.device.is_ready()? {
                break
            }
            sleep(self.config.poll_interval);
        }

        self.state = CaptureState::Ready;
        self.device.stop()?;
        let mut buffers = self.new_buffers();
        let info = self.device.read_block(&mut buffers, samples)?;
        if !info.overflow.is_empty() {
            log::debug!("capture: overflow on {:?}", info.overflow);
        }
        let batch = SampleBatch {
            buffers,
            count: info.count,
            interval: self.sample_interval.0,
            unit: self.sample_interval.1,
            overflow: info.overflow,
            new_sweep: false,
            trigger_at: None,
        };
        self.export(&batch);
        self.state = CaptureState::Delivered;
        Ok(Cycle::Batch(batch))
    }

    fn streaming_cycle(&mut self, token: &CancellationToken) -> Result<Cycle> {
        if token.is_cancelled() {
            return self.abort()
        }
        let sweep_samples = self.config.streaming.sweep_samples.max(1);
        let new_sweep = self.sweep_position == 0;
        let pull = self.config.streaming.pull_samples.min(sweep_samples - self.sweep_position);
        let mut buffers = self.new_buffers();
        let info = self.device.get_streaming_values(&mut buffers, pull)?;
        self.sweep_position += info.count;
        if self.sweep_position >= sweep_samples {
            self.sweep_position = 0;
        }
        Ok(Cycle::Batch(SampleBatch {
            buffers,
            count: info.count,
            interval: self.sample_interval.0,
            unit: self.sample_interval.1,
            overflow: info.overflow,
            new_sweep,
            trigger_at: None,
        }))
    }

    fn fast_streaming_cycle(&mut self, token: &CancellationToken) -> Result<Cycle> {
        let mut previous = 0;
        loop {
            if token.is_cancelled() {
                log::debug!("capture: cancelled after {} samples", previous);
                break
            }
            self.device.get_streaming_latest_values(&self.progress)?;
            let total = self.progress.total_samples();
            if total != previous {
                log::trace!("capture: collected {} samples", total - previous);
                previous = total;
            }
            if self.progress.auto_stopped() {
                break
            }
            sleep(FAST_STREAMING_POLL);
        }
        self.device.stop()?;

        let mut buffers = self.new_buffers();
        let info = self.device.get_streaming_values_no_aggregation(&mut buffers,
            self.config.streaming.buffer_size)?;
        let batch = SampleBatch {
            buffers,
            count: info.count,
            interval: self.sample_interval.0,
            unit: self.sample_interval.1,
            overflow: info.overflow,
            new_sweep: true,
            trigger_at: self.progress.trigger_at(),
        };
        if let Some(trigger_at) = batch.trigger_at {
            log::debug!("capture: triggered at sample {}", trigger_at);
        }
        self.export(&batch);
        self.state = CaptureState::Done;
        Ok(Cycle::Batch(batch))
    }

    fn export(&self, batch: &SampleBatch) {
        if !self.mode.is_exported() {
            return
        }
        if let Some(path) = &self.config.export_path {
            match export::write_block(path, batch, &*self.device) {
                Ok(()) => log::debug!("capture: exported {} samples to {}",
                    batch.count, path.display()),
                Err(error) => log::warn!("capture: cannot export to {}: {}",
                    path.display(), error),
            }
        }
    }

    /// Stop the device and undo mode-specific device state. Safe to call more than once.
    pub fn teardown(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(())
        }
        self.torn_down = true;
        self.state = CaptureState::Done;
        log::debug!("capture: tearing down {:?}", self.mode);
        self.device.stop()?;
        if let Mode::Ets = self.mode {
            self.device.set_ets(EtsMode::Off, 0, 0)?;
        }
        Ok(())
    }
}

impl<'a, D: Driver> Drop for Capture<'a, D> {
    fn drop(&mut self) {
        if let Err(error) = self.teardown() {
            log::warn!("capture: teardown failed: {}", error);
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Instant;

    use super::*;
    use crate::Error;
    use crate::sys::sim::{Command, Signal, SimulatedDriver};

    fn config() -> AcquisitionConfiguration {
        AcquisitionConfiguration {
            poll_interval: Duration::from_millis(10),
            cycle_delay: Duration::from_millis(0),
            ..Default::default()
        }
    }

    fn device(driver: SimulatedDriver) -> Device<SimulatedDriver> {
        Device::open(driver).unwrap()
    }

    fn batch(cycle: Cycle) -> SampleBatch {
        match cycle {
            Cycle::Batch(batch) => batch,
            other => panic!("expected a batch, got {:?}", other),
        }
    }

    #[test]
    fn test_immediate_cycle() {
        let mut device = device(SimulatedDriver::new().with_ready_after(2));
        let token = CancellationToken::new();
        let mut capture = Capture::configure(&mut device, Mode::Immediate, &config()).unwrap();
        // 1 ms per division allows 10 us per sample: 1562 steps of 6.4 ns
        let timebase = *capture.timebase().unwrap();
        assert_eq!(timebase.index, 1566);
        assert_eq!((timebase.interval, timebase.unit), (9_996_800, TimeUnit::Picoseconds));
        assert_eq!(capture.window_samples(), 1024);
        let batch = batch(capture.run_one_cycle(&token).unwrap());
        assert_eq!(capture.state(), CaptureState::Delivered);
        assert_eq!(batch.count, 1024);
        assert!(batch.samples(Channel::D).is_some());
        assert_eq!(batch.tick(3), 3 * timebase.interval);
        assert_eq!(batch.times().len(), 1024);
        capture.run_one_cycle(&token).unwrap();
        capture.teardown().unwrap();
        drop(capture);
        let driver = device.driver();
        assert_eq!(driver.count(|c| matches!(c, Command::SetSimpleTrigger(None))), 1);
        assert_eq!(driver.count(|c| *c == Command::RunBlock {
            pre_trigger_samples: 0, post_trigger_samples: 1024, timebase: 1566 }), 2);
        assert_eq!(driver.count(|c| matches!(c, Command::ReadBlock { samples: 1024 })), 2);
        // two per cycle, then once on teardown
        assert_eq!(driver.count(|c| *c == Command::Stop), 3);
    }

    #[test]
    fn test_simple_triggered_pre_trigger() {
        let mut device = device(SimulatedDriver::new());
        let trigger = SimpleTrigger::new(Channel::B, ThresholdDirection::Rising, 500.0);
        let mut capture = Capture::configure(&mut device, Mode::SimpleTriggered(trigger),
            &config()).unwrap();
        capture.run_one_cycle(&CancellationToken::new()).unwrap();
        drop(capture);
        let runs: Vec<_> = device.driver().commands().iter()
            .filter(|c| matches!(c, Command::RunBlock { .. }))
            .cloned()
            .collect();
        assert!(matches!(runs[..], [Command::RunBlock {
            pre_trigger_samples: 102, post_trigger_samples: 922, .. }]));
    }

    #[test]
    fn test_cancel_while_polling() {
        let mut device = device(SimulatedDriver::new().with_ready_after(u32::MAX));
        let token = CancellationToken::new();
        let mut capture = Capture::configure(&mut device, Mode::Immediate, &config()).unwrap();
        let canceller = token.clone();
        let started = Instant::now();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });
        assert!(matches!(capture.run_one_cycle(&token).unwrap(), Cycle::Cancelled));
        thread.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(capture.state(), CaptureState::Done);
        assert!(matches!(capture.run_one_cycle(&token).unwrap(), Cycle::Finished));
        drop(capture);
        assert_eq!(device.driver().count(|c| matches!(c, Command::ReadBlock { .. })), 0);
        assert!(device.driver().count(|c| *c == Command::IsReady) >= 1);
    }

    #[test]
    fn test_invalid_trigger_rejected_before_device() {
        let mut device = device(SimulatedDriver::new());
        let before = device.driver().commands().len();
        let mut trigger = AdvancedTrigger::single_channel(Channel::A, 1500.0);
        trigger.conditions[1] = crate::trigger::ConditionState::True;
        assert!(matches!(Capture::configure(&mut device, Mode::AdvancedTriggered(trigger), &config()),
            Err(Error::TriggerConfig(_))));
        assert_eq!(device.driver().commands().len(), before);
    }

    #[test]
    fn test_run_block_failure() {
        let mut device = device(SimulatedDriver::new().fail_on("ps6000RunBlock"));
        let mut capture = Capture::configure(&mut device, Mode::Immediate, &config()).unwrap();
        assert!(matches!(capture.run_one_cycle(&CancellationToken::new()),
            Err(Error::DeviceCommandFailed { command: "ps6000RunBlock", .. })));
    }

    #[test]
    fn test_ets() {
        let mut device = device(SimulatedDriver::new());
        let mut capture = Capture::configure(&mut device, Mode::Ets, &config()).unwrap();
        let batch = batch(capture.run_one_cycle(&CancellationToken::new()).unwrap());
        assert_eq!((batch.interval, batch.unit), (25, TimeUnit::Picoseconds));
        capture.teardown().unwrap();
        drop(capture);
        let driver = device.driver();
        assert_eq!(driver.count(|c| *c == Command::SetEts {
            mode: EtsMode::Fast, cycles: 60, interleave: 4 }), 1);
        assert!(matches!(driver.commands().last(), Some(Command::SetEts { mode: EtsMode::Off, .. })));
        let trigger = driver.commands().iter().find_map(|c| match c {
            Command::SetSimpleTrigger(Some(codes)) => Some(*codes),
            _ => None
        }).unwrap();
        assert_eq!(trigger.source, 0);
        assert_eq!(trigger.threshold, 9830);
        assert_eq!(trigger.delay, -10);
    }

    #[test]
    fn test_streaming_sweeps() {
        let mut device = device(SimulatedDriver::new().with_streaming_chunk(400));
        let token = CancellationToken::new();
        let mut capture = Capture::configure(&mut device, Mode::Streaming, &config()).unwrap();
        assert_eq!(capture.state(), CaptureState::Collecting);
        let first = batch(capture.run_one_cycle(&token).unwrap());
        assert!(first.new_sweep);
        assert_eq!(first.count, 400);
        assert_eq!((first.interval, first.unit), (10, TimeUnit::Microseconds));
        let second = batch(capture.run_one_cycle(&token).unwrap());
        assert!(!second.new_sweep);
        assert_eq!(second.count, 100);
        let third = batch(capture.run_one_cycle(&token).unwrap());
        assert!(third.new_sweep);
        token.cancel();
        assert!(matches!(capture.run_one_cycle(&token).unwrap(), Cycle::Cancelled));
        drop(capture);
        let parameters = device.driver().commands().iter().find_map(|c| match c {
            Command::RunStreaming(parameters) => Some(*parameters),
            _ => None
        }).unwrap();
        assert_eq!(parameters.interval, 10);
        assert_eq!(parameters.ratio_mode, RatioMode::None);
        assert!(!parameters.auto_stop);
        assert_eq!(device.driver().count(|c| matches!(c,
            Command::GetStreamingValues { samples: 100 })), 1);
    }

    #[test]
    fn test_streaming_keeps_samples_across_sweeps() {
        let signal = Signal::Sine { amplitude: 16383, period: 100.0 };
        let mut device = device(SimulatedDriver::new().with_signal(signal).with_streaming_chunk(400));
        let token = CancellationToken::new();
        let mut capture = Capture::configure(&mut device, Mode::Streaming, &config()).unwrap();
        let mut received = Vec::new();
        let mut sweeps = 0;
        for _ in 0..5 {
            let batch = batch(capture.run_one_cycle(&token).unwrap());
            sweeps += batch.new_sweep as usize;
            received.extend_from_slice(batch.samples(Channel::A).unwrap());
        }
        // 400 produced per pull, pulled as 400, 100 | 500 | 500 | 500
        assert_eq!(sweeps, 4);
        assert_eq!(received.len(), 2000);
        let expected: Vec<i16> = (0..2000).map(|index| signal.sample(0, index)).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_fast_streaming() {
        let mut device = device(SimulatedDriver::new().with_streaming_chunk(25_000));
        let token = CancellationToken::new();
        let mut capture = Capture::configure(&mut device, Mode::FastStreaming, &config()).unwrap();
        let batch = batch(capture.run_one_cycle(&token).unwrap());
        assert_eq!(batch.count, 100_000);
        assert_eq!((batch.interval, batch.unit), (10, TimeUnit::Microseconds));
        assert_eq!(batch.trigger_at, None);
        assert_eq!(capture.state(), CaptureState::Done);
        assert!(matches!(capture.run_one_cycle(&token).unwrap(), Cycle::Finished));
        drop(capture);
        let driver = device.driver();
        assert_eq!(driver.count(|c| *c == Command::GetStreamingLatestValues), 4);
        let names: Vec<_> = driver.commands().iter().rev().take(3).map(Command::name).collect();
        assert_eq!(names, ["ps6000Stop", "ps6000GetValues", "ps6000Stop"]);
        let parameters = driver.commands().iter().find_map(|c| match c {
            Command::RunStreaming(parameters) => Some(*parameters),
            _ => None
        }).unwrap();
        assert_eq!(parameters.aggregation, 100);
        assert_eq!(parameters.overview_buffer_size, 30_000);
        assert_eq!(parameters.max_post_trigger_samples, 100_000);
        assert!(parameters.auto_stop);
    }

    #[test]
    fn test_fast_streaming_cancelled_still_reads() {
        // one sample per callback never reaches auto-stop in this test
        let mut device = device(SimulatedDriver::new().with_streaming_chunk(1));
        let token = CancellationToken::new();
        let mut capture = Capture::configure(&mut device, Mode::FastStreaming, &config()).unwrap();
        let canceller = token.clone();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let batch = batch(capture.run_one_cycle(&token).unwrap());
        thread.join().unwrap();
        assert!(batch.count < 100_000);
        assert_eq!(capture.state(), CaptureState::Done);
    }

    #[test]
    fn test_fast_streaming_triggered_exports() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("data.csv");
        let mut device = device(SimulatedDriver::new().with_streaming_chunk(50_000));
        device.set_channel_enabled(2, false).unwrap();
        device.set_channel_enabled(3, false).unwrap();
        let config = AcquisitionConfiguration { export_path: Some(path.clone()), ..config() };
        let trigger = AdvancedTrigger::single_channel(Channel::A, 1500.0);
        let mut capture = Capture::configure(&mut device, Mode::FastStreamingTriggered(trigger),
            &config).unwrap();
        let batch = batch(capture.run_one_cycle(&CancellationToken::new()).unwrap());
        assert_eq!(batch.trigger_at, Some(0));
        assert!(batch.samples(Channel::C).is_none());
        drop(capture);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 100_001);
        assert!(contents.starts_with("time,raw_A,value_A,raw_B,value_B\n"));
    }

    #[test]
    fn test_drop_stops_device() {
        let mut device = device(SimulatedDriver::new());
        let capture = Capture::configure(&mut device, Mode::Streaming, &config()).unwrap();
        drop(capture);
        assert_eq!(device.driver().commands().last(), Some(&Command::Stop));
    }
}

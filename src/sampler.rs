use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, sleep};

use crate::Result;
use crate::capture::{Capture, Cycle, Mode, SampleBatch};
use crate::config::AcquisitionConfiguration;
use crate::device::Device;
use crate::sys::Driver;
use crate::trigger::Channel;
use crate::window::{DisplaySink, Windows};

/// Shared stop request for an acquisition loop. Observing it does not clear it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn display_batch<D: Driver>(capture: &Capture<'_, D>, batch: &SampleBatch, windows: &mut Windows,
        sink: &mut dyn DisplaySink) -> Result<()> {
    let device = capture.device();
    let times = batch.times();
    let mut values = Vec::with_capacity(batch.count);
    for channel in Channel::ALL {
        let samples = match batch.samples(channel) {
            Some(samples) => samples,
            None => continue,
        };
        let range = device.configuration().channels[channel.index()].range;
        values.clear();
        device.calibration().convert_to_volts(samples, range, &mut values);
        windows.push(channel, &times[..samples.len()], &values, sink)?;
    }
    Ok(())
}

fn acquire<D: Driver>(capture: &mut Capture<'_, D>, config: &AcquisitionConfiguration,
        token: &CancellationToken, sink: &mut dyn DisplaySink) -> Result<()> {
    let mut windows = Windows::new(capture.device().configuration().enabled_mask(),
        capture.window_samples(), config.frame_time());
    log::debug!("sampler: window of {} samples over {} s",
        capture.window_samples(), config.frame_time());
    loop {
        if token.is_cancelled() {
            log::debug!("sampler: cancelled");
            break
        }
        let batch = match capture.run_one_cycle(token)? {
            Cycle::Batch(batch) => batch,
            Cycle::Cancelled => {
                log::debug!("sampler: cancelled during cycle");
                break
            }
            Cycle::Finished => {
                log::debug!("sampler: done");
                break
            }
        };
        if batch.new_sweep {
            windows.reset_all();
        }
        if !batch.overflow.is_empty() {
            log::warn!("sampler: input over range on {:?}", batch.overflow);
        }
        display_batch(capture, &batch, &mut windows, sink)?;
        sleep(config.cycle_delay);
    }
    Ok(())
}

/// Run `mode` on `device` until cancelled or finished, showing every batch on `sink`.
///
/// The device is left stopped whether the loop ends normally or with an error.
pub fn run_acquisition<D: Driver>(device: &mut Device<D>, mode: Mode,
        config: &AcquisitionConfiguration, token: &CancellationToken,
        sink: &mut dyn DisplaySink) -> Result<()> {
    let mut capture = match Capture::configure(device, mode, config) {
        Ok(capture) => capture,
        Err(error) if error.is_input_error() => {
            log::warn!("sampler: rejected {:?}: {}", mode, error);
            return Err(error)
        }
        Err(error) => {
            log::error!("sampler: cannot configure {:?}: {}", mode, error);
            return Err(error)
        }
    };
    let result = acquire(&mut capture, config, token, sink);
    if let Err(error) = &result {
        log::error!("sampler: acquisition failed: {}", error);
    }
    let teardown = capture.teardown();
    match (result, teardown) {
        (Err(error), Err(teardown_error)) => {
            log::warn!("sampler: teardown failed: {}", teardown_error);
            Err(error)
        }
        (Err(error), _) | (Ok(()), Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// Acquisition loop on its own thread.
#[derive(Debug)]
pub struct Sampler {
    mode: Mode,
    config: AcquisitionConfiguration,
    token: CancellationToken,
}

impl Sampler {
    pub fn new(mode: Mode, config: AcquisitionConfiguration) -> Sampler {
        Sampler { mode, config, token: CancellationToken::new() }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn run<D, S>(self, mut device: Device<D>, mut sink: S) -> JoinHandle<Result<()>>
            where D: Driver + Send + 'static, S: DisplaySink + Send + 'static {
        std::thread::spawn(move || {
            log::info!("sampler: starting {:?} on {}", self.mode, device.info().device_name);
            run_acquisition(&mut device, self.mode, &self.config, &self.token, &mut sink)?;
            device.close()
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::Error;
    use crate::sys::sim::{Command, Signal, SimulatedDriver};
    use crate::trigger::{AdvancedTrigger, ConditionState};
    use crate::window::ChannelSink;

    fn config() -> AcquisitionConfiguration {
        AcquisitionConfiguration {
            poll_interval: Duration::from_millis(1),
            cycle_delay: Duration::from_millis(0),
            ..Default::default()
        }
    }

    fn channel_a_only(driver: SimulatedDriver) -> Device<SimulatedDriver> {
        let mut device = Device::open(driver).unwrap();
        for channel in 1..4 {
            device.set_channel_enabled(channel, false).unwrap();
        }
        device
    }

    #[test]
    fn test_constant_input_in_volts() {
        let device = channel_a_only(SimulatedDriver::new().with_signal(Signal::Constant(16383)));
        let (sender, receiver) = mpsc::channel();
        let sampler = Sampler::new(Mode::Immediate, config());
        let token = sampler.token();
        let thread = sampler.run(device, ChannelSink::new(sender));
        let trace = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        token.cancel();
        thread.join().unwrap().unwrap();
        assert_eq!(trace.channel, 1);
        assert_eq!(trace.values.len(), 1024);
        assert!(trace.values.iter().all(|value| (value - 2.4998).abs() < 1e-3), "{:?}",
            &trace.values[..4]);
        assert_eq!(trace.times[0], 0.0);
        assert!(trace.times.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(receiver.iter().all(|trace| trace.channel == 1));
    }

    #[test]
    fn test_streaming_sweeps_restart_window() {
        let mut device = channel_a_only(SimulatedDriver::new());
        let token = CancellationToken::new();
        let mut counts = Vec::new();
        let mut sink = |channel: usize, _: &[f64], _: &[f64], count: usize| {
            assert_eq!(channel, 1);
            counts.push(count);
            if counts.len() == 3 {
                token.cancel();
            }
        };
        run_acquisition(&mut device, Mode::Streaming, &config(), &token.clone(), &mut sink)
            .unwrap();
        assert_eq!(counts, [250, 500, 500]);
        assert_eq!(device.driver().commands().last(), Some(&Command::Stop));
    }

    #[test]
    fn test_cancelled_before_start() {
        let mut device = channel_a_only(SimulatedDriver::new());
        let token = CancellationToken::new();
        token.cancel();
        let mut calls = 0;
        let mut sink = |_: usize, _: &[f64], _: &[f64], _: usize| calls += 1;
        run_acquisition(&mut device, Mode::Immediate, &config(), &token, &mut sink).unwrap();
        assert_eq!(calls, 0);
        assert!(token.is_cancelled());
        assert_eq!(device.driver().count(|c| matches!(c, Command::RunBlock { .. })), 0);
        assert_eq!(device.driver().count(|c| *c == Command::Stop), 1);
    }

    #[test]
    fn test_advanced_trigger() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("block.csv");
        let mut device = channel_a_only(SimulatedDriver::new());
        let token = CancellationToken::new();
        let config = AcquisitionConfiguration { export_path: Some(path.clone()), ..config() };
        let trigger = AdvancedTrigger::single_channel(Channel::A, 1500.0);
        let mut sink = |_: usize, _: &[f64], values: &[f64], count: usize| {
            assert_eq!(values.len(), count);
            token.cancel();
        };
        run_acquisition(&mut device, Mode::AdvancedTriggered(trigger), &config, &token.clone(),
            &mut sink).unwrap();
        assert_eq!(device.driver().count(|c| matches!(c, Command::SetAdvancedTrigger(_))), 1);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("time,raw_A,value_A\n"));
        assert_eq!(contents.lines().count(), 1025);
    }

    #[test]
    fn test_rejected_trigger() {
        let mut device = channel_a_only(SimulatedDriver::new());
        let mut trigger = AdvancedTrigger::single_channel(Channel::B, 1500.0);
        trigger.conditions[0] = ConditionState::True;
        let mut sink = |_: usize, _: &[f64], _: &[f64], _: usize| panic!("no data expected");
        let result = run_acquisition(&mut device, Mode::AdvancedTriggered(trigger), &config(),
            &CancellationToken::new(), &mut sink);
        assert!(matches!(result, Err(Error::TriggerConfig(_))));
        assert!(result.unwrap_err().is_input_error());
        assert_eq!(device.driver().count(|c| matches!(c, Command::RunBlock { .. })), 0);
    }

    #[test]
    fn test_failure_stops_session() {
        let mut device = channel_a_only(SimulatedDriver::new().fail_on("ps6000GetValues"));
        let mut calls = 0;
        let mut sink = |_: usize, _: &[f64], _: &[f64], _: usize| calls += 1;
        let result = run_acquisition(&mut device, Mode::Immediate, &config(),
            &CancellationToken::new(), &mut sink);
        assert!(matches!(result,
            Err(Error::DeviceCommandFailed { command: "ps6000GetValues", .. })));
        assert_eq!(calls, 0);
        assert_eq!(device.driver().commands().last(), Some(&Command::Stop));
    }

    #[test]
    fn test_sampler_closes_device() {
        let device = channel_a_only(SimulatedDriver::new().with_ready_after(u32::MAX));
        let sampler = Sampler::new(Mode::Immediate, config());
        let token = sampler.token();
        let thread = sampler.run(device, |_: usize, _: &[f64], _: &[f64], _: usize| ());
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(thread.join().unwrap().is_ok());
    }
}

use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::{Duration, Instant};

use ps6000::{AcquisitionConfiguration, ChannelSink, Driver, Error, Mode, Sampler, Session};
use ps6000::{SimulatedDriver, WaveType};

const RUN_TIME: Duration = Duration::from_secs(2);

fn parse_mode(name: &str) -> Option<Mode> {
    match name {
        "immediate"      => Some(Mode::Immediate),
        "ets"            => Some(Mode::Ets),
        "streaming"      => Some(Mode::Streaming),
        "fast-streaming" => Some(Mode::FastStreaming),
        _ => None
    }
}

fn run<D: Driver + Send + 'static>(mut device: Session<D>, mode: Mode) -> ps6000::Result<()> {
    let info = device.info().clone();
    log::info!("capture: {} serial {} with {} channels",
        info.device_name, info.serial, info.channel_count);
    if let Err(error) = device.set_sig_gen(WaveType::Sine, 1000.0) {
        log::warn!("capture: no signal generator: {}", error);
    }

    let (sender, receiver) = channel();
    let sampler = Sampler::new(mode, AcquisitionConfiguration::default());
    let token = sampler.token();
    let thread = sampler.run(device, ChannelSink::new(sender));

    let started = Instant::now();
    while started.elapsed() < RUN_TIME {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(trace) => {
                let (min, max) = trace.values.iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY),
                        |(min, max), &value| (min.min(value), max.max(value)));
                log::info!("capture: channel {}: {} samples, {:.3} V .. {:.3} V",
                    trace.channel, trace.values.len(), min, max);
            }
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    token.cancel();
    thread.join().map_err(|_| Error::Other("sampler thread panicked".into()))?
}

fn main() -> ps6000::Result<()> {
    env_logger::init();

    let mode = match std::env::args().nth(1) {
        None => Mode::Immediate,
        Some(name) => parse_mode(&name).ok_or_else(||
            Error::Other(format!("unknown mode {:?}", name).into()))?,
    };
    match ps6000::Device::new() {
        Ok(device) => run(device, mode),
        Err(Error::NotFound) => {
            log::warn!("capture: no device found, using the simulator");
            run(Session::open(SimulatedDriver::new())?, mode)
        }
        Err(error) => Err(error),
    }
}

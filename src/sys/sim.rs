//! A software instrument implementing [`Driver`], used when no hardware is attached and by tests.

use std::f64::consts::PI;

use crate::{Error, Result};
use crate::calibration::{FULL_SCALE_CODE, TimeUnit, VoltageRange};
use crate::config::{CHANNEL_COUNT, Coupling, Termination};
use super::*;

const STATUS_INVALID_HANDLE: u32 = 0x0C;
const STATUS_INVALID_PARAMETER: u32 = 0x0D;
const STATUS_NOT_RESPONDING: u32 = 0x07;

/// A driver call as observed by [`SimulatedDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenUnit,
    CloseUnit,
    UnitInfo(UnitInfo),
    SetChannel {
        channel: usize,
        enabled: bool,
        coupling: Coupling,
        termination: Termination,
        range: VoltageRange,
    },
    SetEts { mode: EtsMode, cycles: i16, interleave: i16 },
    SetSimpleTrigger(Option<SimpleTriggerCodes>),
    SetAdvancedTrigger(AdvancedTriggerCodes),
    GetTimebase { index: u32, samples: u32 },
    RunBlock { pre_trigger_samples: u32, post_trigger_samples: u32, timebase: u32 },
    IsReady,
    Stop,
    ReadBlock { samples: usize },
    RunStreaming(StreamingParameters),
    GetStreamingValues { samples: usize },
    GetStreamingLatestValues,
    GetStreamingValuesNoAggregation { samples: usize },
    SetSigGenBuiltIn { wave: WaveType, frequency: f64, peak_to_peak_uv: u32 },
}

impl Command {
    /// Name of the driver entry point this command corresponds to.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenUnit => "ps6000OpenUnit",
            Self::CloseUnit => "ps6000CloseUnit",
            Self::UnitInfo(_) => "ps6000GetUnitInfo",
            Self::SetChannel { .. } => "ps6000SetChannel",
            Self::SetEts { .. } => "ps6000SetEts",
            Self::SetSimpleTrigger(_) => "ps6000SetSimpleTrigger",
            Self::SetAdvancedTrigger(_) => "ps6000SetTriggerChannelProperties",
            Self::GetTimebase { .. } => "ps6000GetTimebase2",
            Self::RunBlock { .. } => "ps6000RunBlock",
            Self::IsReady => "ps6000IsReady",
            Self::Stop => "ps6000Stop",
            Self::ReadBlock { .. } => "ps6000GetValues",
            Self::RunStreaming(_) => "ps6000RunStreaming",
            Self::GetStreamingValues { .. } |
            Self::GetStreamingLatestValues => "ps6000GetStreamingLatestValues",
            Self::GetStreamingValuesNoAggregation { .. } => "ps6000GetValues",
            Self::SetSigGenBuiltIn { .. } => "ps6000SetSigGenBuiltIn",
        }
    }
}

/// Waveform produced on every enabled channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    /// Channels are a quarter period apart.
    Sine { amplitude: i16, period: f64 },
    Constant(i16),
}

impl Signal {
    pub(crate) fn sample(&self, channel: usize, index: u64) -> i16 {
        match *self {
            Signal::Sine { amplitude, period } => {
                let phase = 2.0 * PI * (index as f64 / period) + channel as f64 * PI / 2.0;
                (phase.sin() * amplitude as f64).round() as i16
            }
            Signal::Constant(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Streaming {
    parameters: StreamingParameters,
    collected: u64,
    // produced by the device but not yet pulled
    pending: u64,
    stopped: bool,
}

#[derive(Debug)]
pub struct SimulatedDriver {
    variant: String,
    serial: String,
    signal: Signal,
    // explicit table, or the ps6000 timebase formula when absent
    timebases: Option<Vec<Option<(u64, TimeUnit)>>>,
    max_samples: u32,
    ready_after_polls: u32,
    streaming_chunk: usize,
    ets_sample_time_ps: i32,
    failures: Vec<(&'static str, u32)>,
    open_failure: Option<u32>,
    commands: Vec<Command>,
    handle: Option<Handle>,
    enabled: [bool; CHANNEL_COUNT],
    trigger_armed: bool,
    pending_block: Option<usize>,
    polls: u32,
    sample_index: u64,
    streaming: Option<Streaming>,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        SimulatedDriver {
            variant: "6403B".to_owned(),
            serial: "SIM0001/001".to_owned(),
            signal: Signal::Sine { amplitude: 16383, period: 100.0 },
            timebases: None,
            max_samples: 1 << 25,
            ready_after_polls: 1,
            streaming_chunk: 250,
            ets_sample_time_ps: 25,
            failures: Vec::new(),
            open_failure: None,
            commands: Vec::new(),
            handle: None,
            enabled: [true; CHANNEL_COUNT],
            trigger_armed: false,
            pending_block: None,
            polls: 0,
            sample_index: 0,
            streaming: None,
        }
    }
}

impl SimulatedDriver {
    pub fn new() -> SimulatedDriver {
        Default::default()
    }

    pub fn with_variant(mut self, variant: &str) -> Self {
        self.variant = variant.to_owned();
        self
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    /// Replace the timebase formula with a table; `None` entries and indices past the end are
    /// reported as invalid.
    pub fn with_timebases(mut self, timebases: Vec<Option<(u64, TimeUnit)>>) -> Self {
        self.timebases = Some(timebases);
        self
    }

    pub fn with_max_samples(mut self, max_samples: u32) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// Number of `is_ready` polls before a block capture completes; `u32::MAX` never completes.
    pub fn with_ready_after(mut self, polls: u32) -> Self {
        self.ready_after_polls = polls;
        self
    }

    /// Samples produced per streaming pull or callback. A pull takes at most the samples it asks
    /// for; the rest wait for the next pull.
    pub fn with_streaming_chunk(mut self, samples: usize) -> Self {
        self.streaming_chunk = samples;
        self
    }

    /// Make every call to driver entry point `name` fail.
    pub fn fail_on(self, name: &'static str) -> Self {
        self.fail_with(name, STATUS_NOT_RESPONDING)
    }

    /// Make every call to driver entry point `name` fail with `status`.
    pub fn fail_with(mut self, name: &'static str, status: u32) -> Self {
        self.failures.push((name, status));
        self
    }

    /// Make `open_unit` fail with `status`.
    pub fn fail_open(mut self, status: u32) -> Self {
        self.open_failure = Some(status);
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|command| predicate(command)).count()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn record(&mut self, handle: Option<Handle>, command: Command) -> Result<()> {
        log::trace!("sim: {:?}", command);
        let name = command.name();
        self.commands.push(command);
        if let Some(handle) = handle {
            if self.handle != Some(handle) {
                return Err(Error::DeviceCommandFailed { command: name, status: STATUS_INVALID_HANDLE })
            }
        }
        if let Some(&(_, status)) = self.failures.iter().find(|(failing, _)| *failing == name) {
            return Err(Error::DeviceCommandFailed { command: name, status })
        }
        Ok(())
    }

    fn timebase(&self, index: u32) -> Option<(u64, TimeUnit)> {
        match &self.timebases {
            Some(table) => table.get(index as usize).copied().flatten(),
            // 5 GS/s divided by powers of two, then 6.4 ns steps
            None if index < 5 => Some((200 << index, TimeUnit::Picoseconds)),
            None => Some((6400 * (index as u64 - 4), TimeUnit::Picoseconds)),
        }
    }

    fn generate(&mut self, buffers: &mut SampleBuffers, count: usize) -> Overflow {
        let mut overflow = Overflow::empty();
        for (channel, buffer) in buffers.channels.iter_mut().enumerate() {
            if let Some(buffer) = buffer {
                buffer.clear();
                buffer.extend((0..count as u64)
                    .map(|offset| self.signal.sample(channel, self.sample_index + offset)));
                if buffer.iter().any(|&code| code as i32 >= FULL_SCALE_CODE ||
                                             -(code as i32) >= FULL_SCALE_CODE) {
                    overflow |= Overflow::from_bits_truncate(1 << channel);
                }
            }
        }
        self.sample_index += count as u64;
        overflow
    }

    fn streaming_state(&mut self, command: &'static str) -> Result<&mut Streaming> {
        self.streaming.as_mut()
            .ok_or(Error::DeviceCommandFailed { command, status: STATUS_INVALID_PARAMETER })
    }
}

impl Driver for SimulatedDriver {
    fn open_unit(&mut self) -> Result<Handle> {
        self.record(None, Command::OpenUnit)?;
        if let Some(status) = self.open_failure {
            return Err(Error::DeviceOpenFailed(status))
        }
        let handle = Handle(1);
        self.handle = Some(handle);
        Ok(handle)
    }

    fn close_unit(&mut self, handle: Handle) -> Result<()> {
        self.record(Some(handle), Command::CloseUnit)?;
        self.handle = None;
        Ok(())
    }

    fn unit_info(&mut self, handle: Handle, info: UnitInfo) -> Result<String> {
        self.record(Some(handle), Command::UnitInfo(info))?;
        Ok(match info {
            UnitInfo::VariantInfo => self.variant.clone(),
            UnitInfo::BatchAndSerial => self.serial.clone(),
            _ => String::new(),
        })
    }

    fn set_channel(&mut self, handle: Handle, channel: usize, enabled: bool, coupling: Coupling,
            termination: Termination, range: VoltageRange) -> Result<()> {
        self.record(Some(handle),
            Command::SetChannel { channel, enabled, coupling, termination, range })?;
        match self.enabled.get_mut(channel) {
            Some(slot) => *slot = enabled,
            None => return Err(Error::DeviceCommandFailed {
                command: "ps6000SetChannel", status: STATUS_INVALID_PARAMETER }),
        }
        Ok(())
    }

    fn set_ets(&mut self, handle: Handle, mode: EtsMode, cycles: i16, interleave: i16)
            -> Result<i32> {
        self.record(Some(handle), Command::SetEts { mode, cycles, interleave })?;
        Ok(if mode == EtsMode::Off { 0 } else { self.ets_sample_time_ps })
    }

    fn set_simple_trigger(&mut self, handle: Handle, trigger: Option<&SimpleTriggerCodes>)
            -> Result<()> {
        self.record(Some(handle), Command::SetSimpleTrigger(trigger.copied()))?;
        self.trigger_armed = trigger.is_some();
        Ok(())
    }

    fn set_advanced_trigger(&mut self, handle: Handle, trigger: &AdvancedTriggerCodes)
            -> Result<()> {
        self.record(Some(handle), Command::SetAdvancedTrigger(*trigger))?;
        self.trigger_armed = true;
        Ok(())
    }

    fn get_timebase(&mut self, handle: Handle, index: u32, samples: u32, _oversample: i16)
            -> Result<Option<TimebaseInfo>> {
        self.record(Some(handle), Command::GetTimebase { index, samples })?;
        if samples > self.max_samples {
            return Ok(None)
        }
        Ok(self.timebase(index).map(|(interval, unit)|
            TimebaseInfo { interval, unit, max_samples: self.max_samples }))
    }

    fn run_block(&mut self, handle: Handle, pre_trigger_samples: u32, post_trigger_samples: u32,
            timebase: u32, _oversample: i16) -> Result<i32> {
        self.record(Some(handle),
            Command::RunBlock { pre_trigger_samples, post_trigger_samples, timebase })?;
        self.pending_block = Some((pre_trigger_samples + post_trigger_samples) as usize);
        self.polls = 0;
        Ok(0)
    }

    fn is_ready(&mut self, handle: Handle) -> Result<bool> {
        self.record(Some(handle), Command::IsReady)?;
        self.polls = self.polls.saturating_add(1);
        Ok(self.pending_block.is_some() && self.polls >= self.ready_after_polls)
    }

    fn stop(&mut self, handle: Handle) -> Result<()> {
        self.record(Some(handle), Command::Stop)?;
        if let Some(streaming) = &mut self.streaming {
            streaming.stopped = true;
        }
        Ok(())
    }

    fn read_block(&mut self, handle: Handle, buffers: &mut SampleBuffers, samples: usize)
            -> Result<ReadInfo> {
        self.record(Some(handle), Command::ReadBlock { samples })?;
        let captured = self.pending_block.take().ok_or(Error::DeviceCommandFailed {
            command: "ps6000GetValues", status: STATUS_INVALID_PARAMETER })?;
        let count = captured.min(samples);
        let overflow = self.generate(buffers, count);
        Ok(ReadInfo { count, overflow })
    }

    fn run_streaming(&mut self, handle: Handle, enabled: [bool; CHANNEL_COUNT],
            parameters: &StreamingParameters) -> Result<u32> {
        self.record(Some(handle), Command::RunStreaming(*parameters))?;
        self.enabled = enabled;
        self.streaming = Some(Streaming {
            parameters: *parameters,
            collected: 0,
            pending: 0,
            stopped: false,
        });
        Ok(parameters.interval)
    }

    fn get_streaming_values(&mut self, handle: Handle, buffers: &mut SampleBuffers,
            samples: usize) -> Result<ReadInfo> {
        self.record(Some(handle), Command::GetStreamingValues { samples })?;
        let chunk = self.streaming_chunk;
        let streaming = self.streaming_state("ps6000GetStreamingLatestValues")?;
        if !streaming.stopped {
            streaming.pending += chunk as u64;
        }
        let count = streaming.pending.min(samples as u64);
        streaming.pending -= count;
        streaming.collected += count;
        let count = count as usize;
        let overflow = self.generate(buffers, count);
        Ok(ReadInfo { count, overflow })
    }

    fn get_streaming_latest_values(&mut self, handle: Handle, progress: &StreamingProgress)
            -> Result<()> {
        self.record(Some(handle), Command::GetStreamingLatestValues)?;
        let chunk = self.streaming_chunk as u64;
        let trigger_at = self.trigger_armed.then_some(0);
        let streaming = self.streaming_state("ps6000GetStreamingLatestValues")?;
        if streaming.stopped {
            return Ok(())
        }
        let limit = streaming.parameters.max_pre_trigger_samples as u64 +
                    streaming.parameters.max_post_trigger_samples as u64;
        let count = if streaming.parameters.auto_stop {
            chunk.min(limit - streaming.collected.min(limit))
        } else {
            chunk
        };
        streaming.collected += count;
        let auto_stop = streaming.parameters.auto_stop && streaming.collected >= limit;
        if auto_stop {
            streaming.stopped = true;
        }
        progress.record(count, auto_stop, trigger_at);
        Ok(())
    }

    fn get_streaming_values_no_aggregation(&mut self, handle: Handle,
            buffers: &mut SampleBuffers, samples: usize) -> Result<ReadInfo> {
        self.record(Some(handle), Command::GetStreamingValuesNoAggregation { samples })?;
        let collected = self.streaming_state("ps6000GetValues")?.collected;
        let count = (collected.min(samples as u64)) as usize;
        self.sample_index = 0;
        let overflow = self.generate(buffers, count);
        self.streaming = None;
        Ok(ReadInfo { count, overflow })
    }

    fn set_sig_gen_built_in(&mut self, handle: Handle, wave: WaveType, frequency: f64,
            peak_to_peak_uv: u32) -> Result<()> {
        self.record(Some(handle), Command::SetSigGenBuiltIn { wave, frequency, peak_to_peak_uv })
    }
}

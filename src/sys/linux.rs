use std::ffi::{c_void, CStr};
use std::ptr;
use libc::c_char;

use crate::{Error, Result};
use crate::calibration::{TimeUnit, VoltageRange};
use crate::config::{CHANNEL_COUNT, Coupling, Termination};
use super::*;

type PicoStatus = u32;

const PICO_OK: PicoStatus = 0x00;
const PICO_NOT_FOUND: PicoStatus = 0x03;
const PICO_INVALID_TIMEBASE: PicoStatus = 0x0E;
const PICO_TOO_MANY_SAMPLES: PicoStatus = 0x1D;

const LIBRARY_NAMES: [&str; 3] = [
    "libps6000.so\0",
    "libps6000.so.2\0",
    "/opt/picoscope/lib/libps6000.so\0",
];

type StreamingReady = unsafe extern "C" fn(
    handle: i16, samples: u32, start_index: u32, overflow: i16,
    trigger_at: u32, triggered: i16, auto_stop: i16, parameter: *mut c_void);

#[repr(C)]
struct TriggerConditions {
    channel_a: i32,
    channel_b: i32,
    channel_c: i32,
    channel_d: i32,
    external: i32,
    aux: i32,
    pulse_width_qualifier: i32,
}

// The driver header declares its structures with 1-byte packing.
#[repr(C, packed)]
struct TriggerChannelProperties {
    threshold_upper: i16,
    hysteresis_upper: u16,
    threshold_lower: i16,
    hysteresis_lower: u16,
    channel: i32,
    threshold_mode: i32,
}

#[repr(C)]
struct PwqConditions {
    channel_a: i32,
    channel_b: i32,
    channel_c: i32,
    channel_d: i32,
    external: i32,
    aux: i32,
}

#[derive(Debug)]
struct Library(*mut c_void);

impl Library {
    fn open() -> Result<Library> {
        for name in LIBRARY_NAMES {
            // SAFETY: `name` is NUL-terminated.
            let handle = unsafe { libc::dlopen(name.as_ptr() as *const c_char, libc::RTLD_NOW) };
            if !handle.is_null() {
                log::debug!("loaded driver library {}", name.trim_end_matches('\0'));
                return Ok(Library(handle))
            }
            // SAFETY: `dlerror` returns either NULL or a NUL-terminated string.
            let reason = unsafe {
                let message = libc::dlerror();
                if message.is_null() {
                    "unknown error".into()
                } else {
                    CStr::from_ptr(message).to_string_lossy()
                }
            };
            log::trace!("dlopen({}) failed: {}", name.trim_end_matches('\0'), reason);
        }
        Err(Error::NotFound)
    }

    /// # Safety
    /// `T` must be a function pointer type matching the C declaration of `name`, and `name`
    /// must be NUL-terminated.
    unsafe fn symbol<T: Copy>(&self, name: &str) -> Result<T> {
        assert_eq!(std::mem::size_of::<T>(), std::mem::size_of::<*mut c_void>());
        let address = libc::dlsym(self.0, name.as_ptr() as *const c_char);
        if address.is_null() {
            log::warn!("driver library lacks {}", name.trim_end_matches('\0'));
            Err(Error::NotFound)
        } else {
            Ok(std::mem::transmute_copy(&address))
        }
    }
}

// SAFETY: The driver library may be called from any thread, one call at a time.
unsafe impl Send for Library {}

impl Drop for Library {
    fn drop(&mut self) {
        // SAFETY: Opened in `Self::open`; no function pointers outlive the owning driver.
        unsafe {
            if libc::dlclose(self.0) != 0 {
                log::warn!("error unloading driver library");
            }
        }
    }
}

macro_rules! driver_api {
    { $( fn $name:ident = $symbol:literal ( $( $arg:ty ),* ); )* } => {
        struct Api {
            $( $name: unsafe extern "C" fn( $( $arg ),* ) -> PicoStatus, )*
        }

        impl Api {
            fn load(library: &Library) -> Result<Api> {
                // SAFETY: The signatures below follow `ps6000Api.h`.
                unsafe {
                    Ok(Api { $( $name: library.symbol(concat!($symbol, "\0"))?, )* })
                }
            }
        }
    }
}

driver_api! {
    fn open_unit = "ps6000OpenUnit"(*mut i16, *mut i8);
    fn close_unit = "ps6000CloseUnit"(i16);
    fn get_unit_info = "ps6000GetUnitInfo"(i16, *mut i8, i16, *mut i16, u32);
    fn set_channel = "ps6000SetChannel"(i16, i32, i16, i32, i32, f32, i32);
    fn set_ets = "ps6000SetEts"(i16, i32, i16, i16, *mut i32);
    fn set_simple_trigger = "ps6000SetSimpleTrigger"(i16, i16, i32, i16, i32, u32, i16);
    fn set_trigger_channel_conditions =
        "ps6000SetTriggerChannelConditions"(i16, *mut TriggerConditions, i16);
    fn set_trigger_channel_directions =
        "ps6000SetTriggerChannelDirections"(i16, i32, i32, i32, i32, i32, i32);
    fn set_trigger_channel_properties =
        "ps6000SetTriggerChannelProperties"(i16, *mut TriggerChannelProperties, i16, i16, i32);
    fn set_trigger_delay = "ps6000SetTriggerDelay"(i16, u32);
    fn set_pulse_width_qualifier =
        "ps6000SetPulseWidthQualifier"(i16, *mut PwqConditions, i16, i32, u32, u32, i32);
    fn get_timebase2 = "ps6000GetTimebase2"(i16, u32, u32, *mut f32, i16, *mut u32, u32);
    fn run_block = "ps6000RunBlock"(i16, u32, u32, u32, i16, *mut i32, u32, *mut c_void, *mut c_void);
    fn is_ready = "ps6000IsReady"(i16, *mut i16);
    fn stop = "ps6000Stop"(i16);
    fn set_data_buffer = "ps6000SetDataBuffer"(i16, i32, *mut i16, u32, i32);
    fn set_data_buffers = "ps6000SetDataBuffers"(i16, i32, *mut i16, *mut i16, u32, i32);
    fn get_values = "ps6000GetValues"(i16, u32, *mut u32, u32, i32, u32, *mut i16);
    fn run_streaming = "ps6000RunStreaming"(i16, *mut u32, i32, u32, u32, i16, u32, i32, u32);
    fn get_streaming_latest_values =
        "ps6000GetStreamingLatestValues"(i16, StreamingReady, *mut c_void);
    fn set_sig_gen_built_in = "ps6000SetSigGenBuiltIn"(
        i16, i32, u32, i16, f32, f32, f32, f32, i32, i32, u32, u32, i32, i32, i16);
}

fn check(command: &'static str, status: PicoStatus) -> Result<()> {
    log::trace!("{}() = {:#x}", command, status);
    if status == PICO_OK {
        Ok(())
    } else {
        Err(Error::DeviceCommandFailed { command, status })
    }
}

// Streaming data lands in driver-owned storage; it must not move while streaming is active.
// Samples reported by the driver but not yet handed out wait in `pending`.
#[derive(Debug, Default)]
struct StreamingStorage {
    max: [Option<Box<[i16]>>; CHANNEL_COUNT],
    min: [Option<Box<[i16]>>; CHANNEL_COUNT],
    pending: [Vec<i16>; CHANNEL_COUNT],
    pending_overflow: i16,
}

impl StreamingStorage {
    fn pending_samples(&self) -> usize {
        self.max.iter().zip(self.pending.iter())
            .filter(|(storage, _)| storage.is_some())
            .map(|(_, pending)| pending.len())
            .min()
            .unwrap_or(0)
    }
}

unsafe extern "C" fn chunk_ready(_handle: i16, samples: u32, start_index: u32, overflow: i16,
        _trigger_at: u32, _triggered: i16, _auto_stop: i16, parameter: *mut c_void) {
    // SAFETY: `parameter` is the `StreamingStorage` passed to `get_streaming_latest_values`,
    // which outlives the call that invokes this callback. The driver does not write the
    // reported range while the callback runs.
    let storage = &mut *(parameter as *mut StreamingStorage);
    let start = start_index as usize;
    for (max, pending) in storage.max.iter().zip(storage.pending.iter_mut()) {
        if let Some(max) = max {
            let end = (start + samples as usize).min(max.len());
            pending.extend_from_slice(&max[start.min(end)..end]);
        }
    }
    storage.pending_overflow |= overflow;
}

unsafe extern "C" fn progress_ready(_handle: i16, samples: u32, _start_index: u32,
        _overflow: i16, trigger_at: u32, triggered: i16, auto_stop: i16, parameter: *mut c_void) {
    // SAFETY: `parameter` is the `StreamingProgress` passed to `get_streaming_latest_values`.
    let progress = &*(parameter as *const StreamingProgress);
    progress.record(samples as u64, auto_stop != 0, (triggered != 0).then_some(trigger_at));
}

pub struct Ps6000DriverImpl {
    api: Api,
    streaming: StreamingStorage,
    // Dropped last: `api` points into the library.
    _library: Library,
}

impl std::fmt::Debug for Ps6000DriverImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Ps6000DriverImpl").finish_non_exhaustive()
    }
}

impl Ps6000DriverImpl {
    pub fn new() -> Result<Ps6000DriverImpl> {
        let library = Library::open()?;
        let api = Api::load(&library)?;
        Ok(Ps6000DriverImpl { api, streaming: Default::default(), _library: library })
    }

    fn read_values(&mut self, handle: Handle, command: &'static str,
            buffers: &mut SampleBuffers, samples: usize) -> Result<ReadInfo> {
        for (channel, buffer) in buffers.channels.iter_mut().enumerate() {
            if let Some(buffer) = buffer {
                buffer.clear();
                buffer.resize(samples, 0);
                // SAFETY: `buffer` holds `samples` values and is only written by the
                // `get_values` call below.
                check("ps6000SetDataBuffer", unsafe {
                    (self.api.set_data_buffer)(handle.0, channel as i32, buffer.as_mut_ptr(),
                        samples as u32, RatioMode::None as i32)
                })?;
            }
        }
        let mut count = samples as u32;
        let mut overflow = 0i16;
        check(command, unsafe {
            (self.api.get_values)(handle.0, 0, &mut count, 1, RatioMode::None as i32, 0,
                &mut overflow)
        })?;
        for buffer in buffers.channels.iter_mut().flatten() {
            buffer.truncate(count as usize);
        }
        Ok(ReadInfo {
            count: count as usize,
            overflow: Overflow::from_bits_truncate(overflow as u16),
        })
    }
}

impl Driver for Ps6000DriverImpl {
    fn open_unit(&mut self) -> Result<Handle> {
        let mut handle = 0i16;
        let status = unsafe { (self.api.open_unit)(&mut handle, ptr::null_mut()) };
        log::debug!("ps6000OpenUnit() = {:#x}, handle {}", status, handle);
        match status {
            PICO_OK if handle > 0 => Ok(Handle(handle)),
            PICO_OK | PICO_NOT_FOUND => Err(Error::NotFound),
            _ => Err(Error::DeviceOpenFailed(status)),
        }
    }

    fn close_unit(&mut self, handle: Handle) -> Result<()> {
        check("ps6000CloseUnit", unsafe { (self.api.close_unit)(handle.0) })
    }

    fn unit_info(&mut self, handle: Handle, info: UnitInfo) -> Result<String> {
        let mut line = [0i8; 32];
        let mut required = 0i16;
        check("ps6000GetUnitInfo", unsafe {
            (self.api.get_unit_info)(handle.0, line.as_mut_ptr(), line.len() as i16,
                &mut required, info as u32)
        })?;
        let bytes: &[u8] = bytemuck::cast_slice(&line[..]);
        let value = match CStr::from_bytes_until_nul(bytes) {
            Ok(value) => value.to_string_lossy().into_owned(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        };
        log::debug!("unit_info({:?}) = {:?}", info, value);
        Ok(value)
    }

    fn set_channel(&mut self, handle: Handle, channel: usize, enabled: bool, coupling: Coupling,
            termination: Termination, range: VoltageRange) -> Result<()> {
        check("ps6000SetChannel", unsafe {
            (self.api.set_channel)(handle.0, channel as i32, enabled as i16,
                coupling.ps6000_code(termination), range.ps6000_code(), 0.0, 0)
        })
    }

    fn set_ets(&mut self, handle: Handle, mode: EtsMode, cycles: i16, interleave: i16)
            -> Result<i32> {
        let mut sample_time_ps = 0i32;
        check("ps6000SetEts", unsafe {
            (self.api.set_ets)(handle.0, mode as i32, cycles, interleave, &mut sample_time_ps)
        })?;
        Ok(sample_time_ps)
    }

    fn set_simple_trigger(&mut self, handle: Handle, trigger: Option<&SimpleTriggerCodes>)
            -> Result<()> {
        let status = match trigger {
            None => unsafe {
                (self.api.set_simple_trigger)(handle.0, 0, 0, 0, 2, 0, 0)
            },
            Some(trigger) => unsafe {
                // pre-trigger offsets are applied to the capture itself in `run_block`
                (self.api.set_simple_trigger)(handle.0, 1, trigger.source, trigger.threshold,
                    trigger.direction, trigger.delay.max(0) as u32, trigger.auto_trigger_ms)
            },
        };
        check("ps6000SetSimpleTrigger", status)
    }

    fn set_advanced_trigger(&mut self, handle: Handle, trigger: &AdvancedTriggerCodes)
            -> Result<()> {
        let [channel_a, channel_b, channel_c, channel_d] = trigger.conditions;
        let mut conditions = TriggerConditions {
            channel_a, channel_b, channel_c, channel_d,
            external: 0,
            aux: 0,
            pulse_width_qualifier: if trigger.pulse_width.is_some() { 1 } else { 0 },
        };
        check("ps6000SetTriggerChannelConditions", unsafe {
            (self.api.set_trigger_channel_conditions)(handle.0, &mut conditions, 1)
        })?;
        let [direction_a, direction_b, direction_c, direction_d] = trigger.directions;
        check("ps6000SetTriggerChannelDirections", unsafe {
            (self.api.set_trigger_channel_directions)(handle.0,
                direction_a, direction_b, direction_c, direction_d, 2, 2)
        })?;
        let mut properties = TriggerChannelProperties {
            threshold_upper: trigger.properties.threshold_upper,
            hysteresis_upper: trigger.properties.hysteresis_upper,
            threshold_lower: trigger.properties.threshold_lower,
            hysteresis_lower: trigger.properties.hysteresis_lower,
            channel: trigger.properties.channel,
            threshold_mode: trigger.properties.mode,
        };
        check("ps6000SetTriggerChannelProperties", unsafe {
            (self.api.set_trigger_channel_properties)(handle.0, &mut properties, 1, 0,
                trigger.auto_trigger_ms)
        })?;
        if let Some(pulse_width) = &trigger.pulse_width {
            let [channel_a, channel_b, channel_c, channel_d] = pulse_width.conditions;
            let mut conditions = PwqConditions {
                channel_a, channel_b, channel_c, channel_d, external: 0, aux: 0
            };
            check("ps6000SetPulseWidthQualifier", unsafe {
                (self.api.set_pulse_width_qualifier)(handle.0, &mut conditions, 1,
                    pulse_width.direction, pulse_width.lower, pulse_width.upper, pulse_width.kind)
            })?;
        }
        check("ps6000SetTriggerDelay", unsafe {
            (self.api.set_trigger_delay)(handle.0, trigger.delay.max(0) as u32)
        })
    }

    fn get_timebase(&mut self, handle: Handle, index: u32, samples: u32, oversample: i16)
            -> Result<Option<TimebaseInfo>> {
        let mut interval_ns = 0f32;
        let mut max_samples = 0u32;
        let status = unsafe {
            (self.api.get_timebase2)(handle.0, index, samples, &mut interval_ns, oversample,
                &mut max_samples, 0)
        };
        log::trace!("ps6000GetTimebase2({}, {}) = {:#x}, {} ns, {} samples",
            index, samples, status, interval_ns, max_samples);
        match status {
            PICO_INVALID_TIMEBASE | PICO_TOO_MANY_SAMPLES => return Ok(None),
            status => check("ps6000GetTimebase2", status)?,
        }
        let interval = (interval_ns as f64 * 1000.0).round() as u64;
        if interval == 0 || max_samples == 0 {
            return Ok(None)
        }
        Ok(Some(TimebaseInfo { interval, unit: TimeUnit::Picoseconds, max_samples }))
    }

    fn run_block(&mut self, handle: Handle, pre_trigger_samples: u32, post_trigger_samples: u32,
            timebase: u32, oversample: i16) -> Result<i32> {
        let mut time_indisposed_ms = 0i32;
        check("ps6000RunBlock", unsafe {
            (self.api.run_block)(handle.0, pre_trigger_samples, post_trigger_samples, timebase,
                oversample, &mut time_indisposed_ms, 0, ptr::null_mut(), ptr::null_mut())
        })?;
        Ok(time_indisposed_ms)
    }

    fn is_ready(&mut self, handle: Handle) -> Result<bool> {
        let mut ready = 0i16;
        check("ps6000IsReady", unsafe { (self.api.is_ready)(handle.0, &mut ready) })?;
        Ok(ready != 0)
    }

    fn stop(&mut self, handle: Handle) -> Result<()> {
        check("ps6000Stop", unsafe { (self.api.stop)(handle.0) })
    }

    fn read_block(&mut self, handle: Handle, buffers: &mut SampleBuffers, samples: usize)
            -> Result<ReadInfo> {
        self.read_values(handle, "ps6000GetValues", buffers, samples)
    }

    fn run_streaming(&mut self, handle: Handle, enabled: [bool; CHANNEL_COUNT],
            parameters: &StreamingParameters) -> Result<u32> {
        let size = parameters.overview_buffer_size as usize;
        self.streaming = Default::default();
        for channel in (0..CHANNEL_COUNT).filter(|&channel| enabled[channel]) {
            let mut max = vec![0i16; size].into_boxed_slice();
            match parameters.ratio_mode {
                RatioMode::None => check("ps6000SetDataBuffer", unsafe {
                    (self.api.set_data_buffer)(handle.0, channel as i32, max.as_mut_ptr(),
                        size as u32, RatioMode::None as i32)
                })?,
                RatioMode::Aggregate => {
                    let mut min = vec![0i16; size].into_boxed_slice();
                    check("ps6000SetDataBuffers", unsafe {
                        (self.api.set_data_buffers)(handle.0, channel as i32, max.as_mut_ptr(),
                            min.as_mut_ptr(), size as u32, RatioMode::Aggregate as i32)
                    })?;
                    self.streaming.min[channel] = Some(min);
                }
            }
            self.streaming.max[channel] = Some(max);
        }
        let mut interval = parameters.interval;
        check("ps6000RunStreaming", unsafe {
            (self.api.run_streaming)(handle.0, &mut interval, parameters.unit.ps6000_code(),
                parameters.max_pre_trigger_samples, parameters.max_post_trigger_samples,
                parameters.auto_stop as i16, parameters.aggregation,
                parameters.ratio_mode as i32, parameters.overview_buffer_size)
        })?;
        Ok(interval)
    }

    fn get_streaming_values(&mut self, handle: Handle, buffers: &mut SampleBuffers,
            samples: usize) -> Result<ReadInfo> {
        check("ps6000GetStreamingLatestValues", unsafe {
            (self.api.get_streaming_latest_values)(handle.0, chunk_ready,
                &mut self.streaming as *mut StreamingStorage as *mut c_void)
        })?;
        let count = self.streaming.pending_samples().min(samples);
        for (buffer, pending) in buffers.channels.iter_mut().zip(self.streaming.pending.iter_mut()) {
            if let Some(buffer) = buffer {
                buffer.clear();
                buffer.extend(pending.drain(..count.min(pending.len())));
            }
        }
        log::trace!("get_streaming_values({}) = {}, {} pending",
            samples, count, self.streaming.pending_samples());
        let overflow = std::mem::take(&mut self.streaming.pending_overflow);
        Ok(ReadInfo {
            count,
            overflow: Overflow::from_bits_truncate(overflow as u16),
        })
    }

    fn get_streaming_latest_values(&mut self, handle: Handle, progress: &StreamingProgress)
            -> Result<()> {
        check("ps6000GetStreamingLatestValues", unsafe {
            (self.api.get_streaming_latest_values)(handle.0, progress_ready,
                progress as *const StreamingProgress as *mut c_void)
        })
    }

    fn get_streaming_values_no_aggregation(&mut self, handle: Handle,
            buffers: &mut SampleBuffers, samples: usize) -> Result<ReadInfo> {
        let info = self.read_values(handle, "ps6000GetValues", buffers, samples)?;
        self.streaming = Default::default();
        Ok(info)
    }

    fn set_sig_gen_built_in(&mut self, handle: Handle, wave: WaveType, frequency: f64,
            peak_to_peak_uv: u32) -> Result<()> {
        check("ps6000SetSigGenBuiltIn", unsafe {
            (self.api.set_sig_gen_built_in)(handle.0, 0, peak_to_peak_uv, wave as i16,
                frequency as f32, frequency as f32, 0.0, 0.0, 0, 0, 0, 0, 0, 0, 0)
        })
    }
}

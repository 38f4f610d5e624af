//! Rolling display windows fed by the acquisition loop.

use std::sync::mpsc::Sender;

use crate::{Error, Result};
use crate::config::CHANNEL_COUNT;
use crate::trigger::Channel;

/// Consumer of display traces.
///
/// Called once per channel after every pushed batch; implementations must copy or enqueue the
/// data without blocking.
pub trait DisplaySink {
    /// `channel` is 1-based.
    fn set_data(&mut self, channel: usize, times: &[f64], values: &[f64], count: usize);
}

impl<F: FnMut(usize, &[f64], &[f64], usize)> DisplaySink for F {
    fn set_data(&mut self, channel: usize, times: &[f64], values: &[f64], count: usize) {
        self(channel, times, values, count)
    }
}

/// One flushed display trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// 1-based.
    pub channel: usize,
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

/// Forwards traces to another thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Trace>,
}

impl ChannelSink {
    pub fn new(sender: Sender<Trace>) -> ChannelSink {
        ChannelSink { sender }
    }
}

impl DisplaySink for ChannelSink {
    fn set_data(&mut self, channel: usize, times: &[f64], values: &[f64], count: usize) {
        let trace = Trace {
            channel,
            times: times[..count].to_vec(),
            values: values[..count].to_vec(),
        };
        if self.sender.send(trace).is_err() {
            log::trace!("window: display receiver is gone");
        }
    }
}

/// Samples of one channel for the current sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBuffer {
    times: Vec<f64>,
    values: Vec<f64>,
    write_index: usize,
    time_offset: f64,
}

impl WindowBuffer {
    pub fn new(capacity: usize) -> WindowBuffer {
        WindowBuffer {
            times: vec![0.0; capacity],
            values: vec![0.0; capacity],
            write_index: 0,
            time_offset: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.times.len()
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    pub fn time_offset(&self) -> f64 {
        self.time_offset
    }

    pub fn times(&self) -> &[f64] {
        &self.times[..self.write_index]
    }

    pub fn values(&self) -> &[f64] {
        &self.values[..self.write_index]
    }

    /// Append samples at `times` (seconds from the start of the batch), shifted by the time
    /// offset of the sweep. Samples beyond the capacity are dropped. Returns the number written.
    pub fn write(&mut self, times: &[f64], values: &[f64]) -> usize {
        let count = times.len().min(values.len()).min(self.capacity() - self.write_index);
        let range = self.write_index..self.write_index + count;
        let offset = self.time_offset;
        for (slot, &time) in self.times[range.clone()].iter_mut().zip(times) {
            *slot = time + offset;
        }
        self.values[range].copy_from_slice(&values[..count]);
        self.write_index += count;
        count
    }

    /// End of a batch: restart the sweep if the window is full or covers `frame_time`,
    /// otherwise continue the next batch from the last written time.
    pub fn settle(&mut self, frame_time: f64) -> bool {
        let last_time = match self.write_index {
            0 => return false,
            index => self.times[index - 1],
        };
        if self.write_index >= self.capacity() || last_time > frame_time {
            self.reset();
            true
        } else {
            self.time_offset = last_time;
            false
        }
    }

    pub fn reset(&mut self) {
        self.times.fill(0.0);
        self.values.fill(0.0);
        self.write_index = 0;
        self.time_offset = 0.0;
    }

    pub fn flush_to_sink(&self, channel: Channel, sink: &mut dyn DisplaySink) {
        sink.set_data(channel.index() + 1, self.times(), self.values(), self.write_index);
    }

    /// Write a batch, show it, then restart the sweep if it is complete.
    pub fn push(&mut self, channel: Channel, times: &[f64], values: &[f64], frame_time: f64,
            sink: &mut dyn DisplaySink) {
        self.write(times, values);
        self.flush_to_sink(channel, sink);
        if self.settle(frame_time) {
            log::trace!("window: channel {} sweep restarted", channel.letter());
        }
    }
}

/// Window buffers of the enabled channels.
#[derive(Debug, Clone)]
pub struct Windows {
    buffers: [Option<WindowBuffer>; CHANNEL_COUNT],
    frame_time: f64,
}

impl Windows {
    pub fn new(enabled: [bool; CHANNEL_COUNT], capacity: usize, frame_time: f64) -> Windows {
        Windows {
            buffers: enabled.map(|enabled| enabled.then(|| WindowBuffer::new(capacity))),
            frame_time,
        }
    }

    pub fn get(&self, channel: Channel) -> Option<&WindowBuffer> {
        self.buffers[channel.index()].as_ref()
    }

    pub fn push(&mut self, channel: Channel, times: &[f64], values: &[f64],
            sink: &mut dyn DisplaySink) -> Result<()> {
        let frame_time = self.frame_time;
        let buffer = self.buffers[channel.index()].as_mut()
            .ok_or(Error::InvalidChannelIndex(channel.index()))?;
        buffer.push(channel, times, values, frame_time, sink);
        Ok(())
    }

    pub fn reset_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.reset();
        }
    }

    pub fn flush_all(&self, sink: &mut dyn DisplaySink) {
        for (channel, buffer) in Channel::ALL.iter().zip(self.buffers.iter()) {
            if let Some(buffer) = buffer {
                buffer.flush_to_sink(*channel, sink);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::mpsc;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Vec<(usize, Vec<f64>, Vec<f64>, usize)>,
    }

    impl DisplaySink for Recorder {
        fn set_data(&mut self, channel: usize, times: &[f64], values: &[f64], count: usize) {
            self.calls.push((channel, times.to_vec(), values.to_vec(), count));
        }
    }

    fn ramp(count: usize, step: f64) -> Vec<f64> {
        (0..count).map(|index| index as f64 * step).collect()
    }

    #[test]
    fn test_full_window_flushes_once_then_resets() {
        let mut buffer = WindowBuffer::new(500);
        let mut sink = Recorder::default();
        let values = vec![2.4998; 500];
        buffer.push(Channel::A, &ramp(500, 1e-6), &values, 1.0, &mut sink);
        assert_eq!(sink.calls.len(), 1);
        assert_eq!(sink.calls[0].0, 1);
        assert_eq!(sink.calls[0].3, 500);
        assert_eq!(sink.calls[0].2, values);
        assert_eq!(buffer.write_index(), 0);
        assert_eq!(buffer.time_offset(), 0.0);
        assert!(buffer.values.iter().all(|&value| value == 0.0));
    }

    #[test]
    fn test_write_index_grows_to_capacity() {
        let mut buffer = WindowBuffer::new(100);
        let mut sink = Recorder::default();
        let mut expected = 0;
        for count in [30, 30, 30] {
            buffer.push(Channel::B, &ramp(count, 1e-6), &vec![0.5; count], 1.0, &mut sink);
            expected = (expected + count).min(100);
            assert_eq!(buffer.write_index(), expected);
        }
        // only 10 of these fit; the window then restarts
        buffer.push(Channel::B, &ramp(30, 1e-6), &vec![0.5; 30], 1.0, &mut sink);
        assert_eq!(sink.calls.last().unwrap().3, 100);
        assert_eq!(buffer.write_index(), 0);
        buffer.push(Channel::B, &ramp(30, 1e-6), &vec![0.5; 30], 1.0, &mut sink);
        assert_eq!(buffer.write_index(), 30);
    }

    #[test]
    fn test_time_offset_continues_sweep() {
        let mut buffer = WindowBuffer::new(100);
        let mut sink = Recorder::default();
        buffer.push(Channel::A, &ramp(10, 1.0), &[1.0; 10], 1000.0, &mut sink);
        assert_eq!(buffer.time_offset(), 9.0);
        buffer.push(Channel::A, &ramp(10, 1.0), &[1.0; 10], 1000.0, &mut sink);
        assert_eq!(buffer.times()[10], 9.0);
        assert_eq!(buffer.times()[19], 18.0);
        assert_eq!(buffer.time_offset(), 18.0);
    }

    #[test]
    fn test_frame_time_resets() {
        let mut buffer = WindowBuffer::new(1000);
        let mut sink = Recorder::default();
        buffer.push(Channel::A, &ramp(10, 1.0), &[1.0; 10], 5.0, &mut sink);
        assert_eq!(sink.calls[0].3, 10);
        assert_eq!(buffer.write_index(), 0);
        assert_eq!(buffer.time_offset(), 0.0);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut buffer = WindowBuffer::new(100);
        let mut sink = Recorder::default();
        buffer.push(Channel::C, &ramp(40, 1e-3), &[0.25; 40], 1.0, &mut sink);
        buffer.flush_to_sink(Channel::C, &mut sink);
        buffer.flush_to_sink(Channel::C, &mut sink);
        assert_eq!(sink.calls[1], sink.calls[2]);
        assert_eq!(sink.calls[1].0, 3);
        assert_eq!(sink.calls[1].3, 40);
        // after a reset as well
        buffer.push(Channel::C, &ramp(60, 1e-3), &[0.25; 60], 1.0, &mut sink);
        buffer.flush_to_sink(Channel::C, &mut sink);
        buffer.flush_to_sink(Channel::C, &mut sink);
        assert_eq!(sink.calls[4], sink.calls[5]);
        assert_eq!(sink.calls[4].3, 0);
    }

    #[test]
    fn test_windows_disabled_channel() {
        let mut windows = Windows::new([true, false, true, false], 10, 1.0);
        let mut sink = |_: usize, _: &[f64], _: &[f64], _: usize| ();
        windows.push(Channel::A, &[0.0], &[1.0], &mut sink).unwrap();
        assert!(matches!(windows.push(Channel::B, &[0.0], &[1.0], &mut sink),
            Err(Error::InvalidChannelIndex(1))));
        assert_eq!(windows.get(Channel::A).unwrap().write_index(), 1);
        windows.reset_all();
        assert_eq!(windows.get(Channel::A).unwrap().write_index(), 0);
        assert!(windows.get(Channel::D).is_none());
    }

    #[test]
    fn test_channel_sink() {
        let (sender, receiver) = mpsc::channel();
        let mut sink = ChannelSink::new(sender);
        let windows = {
            let mut windows = Windows::new([false, true, false, false], 10, 1.0);
            windows.push(Channel::B, &[0.0, 0.1], &[1.0, 2.0], &mut sink).unwrap();
            windows
        };
        windows.flush_all(&mut sink);
        let first = receiver.recv().unwrap();
        assert_eq!(first, Trace { channel: 2, times: vec![0.0, 0.1], values: vec![1.0, 2.0] });
        assert_eq!(receiver.recv().unwrap(), first);
        drop(receiver);
        windows.flush_all(&mut sink);
    }
}

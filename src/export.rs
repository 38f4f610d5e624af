//! CSV export of captured blocks.
//!
//! One row per sample: the time in seconds followed by the raw code and the value in millivolts
//! of every channel present in the batch.

use std::path::Path;

use crate::Result;
use crate::capture::SampleBatch;
use crate::device::Device;
use crate::sys::Driver;
use crate::trigger::Channel;

pub fn write_block<D: Driver>(path: &Path, batch: &SampleBatch, device: &Device<D>) -> Result<()> {
    let columns: Vec<(Channel, &[i16])> = Channel::ALL.iter()
        .filter_map(|&channel| batch.samples(channel).map(|samples| (channel, samples)))
        .collect();
    let mut writer = csv::Writer::from_path(path)?;

    let mut record = vec!["time".to_owned()];
    for (channel, _) in &columns {
        record.push(format!("raw_{}", channel.letter()));
        record.push(format!("value_{}", channel.letter()));
    }
    writer.write_record(&record)?;

    let multiplier = batch.unit.multiplier();
    let calibration = device.calibration();
    let rows = columns.iter().map(|(_, samples)| samples.len()).min().unwrap_or(0);
    for index in 0..rows {
        record.clear();
        record.push((batch.tick(index) as f64 * multiplier).to_string());
        for (channel, samples) in &columns {
            let range = device.configuration().channels[channel.index()].range;
            record.push(samples[index].to_string());
            record.push(calibration.adc_to_physical(samples[index], range).to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    log::trace!("write_block({}) = {} rows", path.display(), rows);
    Ok(())
}

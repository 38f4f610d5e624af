//! Conversion between raw ADC codes and physical quantities.

use wide::f64x4;

use crate::{Error, Result};

/// Code reported by the ADC for a full-scale positive input.
pub const FULL_SCALE_CODE: i32 = 32767;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum VoltageRange {
    Mv10,
    Mv20,
    Mv50,
    Mv100,
    Mv200,
    Mv500,
    V1,
    V2,
    #[default]
    V5,
    V10,
    V20,
    V50,
}

// Full-scale values in millivolts, indexed by `VoltageRange as usize`.
const RANGE_TABLE_MV: [u32; 12] = [
    10, 20, 50, 100, 200, 500, 1_000, 2_000, 5_000, 10_000, 20_000, 50_000
];

impl VoltageRange {
    pub const ALL: [VoltageRange; 12] = [
        Self::Mv10, Self::Mv20, Self::Mv50, Self::Mv100, Self::Mv200, Self::Mv500,
        Self::V1, Self::V2, Self::V5, Self::V10, Self::V20, Self::V50,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<VoltageRange> {
        Self::ALL.get(index).copied()
    }

    pub fn millivolts(self) -> u32 {
        RANGE_TABLE_MV[self.index()]
    }

    pub fn volts(self) -> f64 {
        self.millivolts() as f64 / 1000.0
    }

    pub(crate) fn ps6000_code(self) -> i32 {
        self.index() as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeUnit {
    Femtoseconds = 0,
    Picoseconds  = 1,
    Nanoseconds  = 2,
    Microseconds = 3,
    Milliseconds = 4,
    Seconds      = 5,
}

impl TimeUnit {
    /// Decode a time unit reported by the driver.
    ///
    /// A well-formed driver never reports anything outside of `0..=5`; an unknown tag means
    /// the driver and this crate disagree about the wire format.
    pub fn from_raw(tag: i32) -> Result<TimeUnit> {
        match tag {
            0 => Ok(Self::Femtoseconds),
            1 => Ok(Self::Picoseconds),
            2 => Ok(Self::Nanoseconds),
            3 => Ok(Self::Microseconds),
            4 => Ok(Self::Milliseconds),
            5 => Ok(Self::Seconds),
            _ => Err(Error::InvalidUnit(tag)),
        }
    }

    /// Seconds per tick.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Femtoseconds => 1e-15,
            Self::Picoseconds  => 1e-12,
            Self::Nanoseconds  => 1e-9,
            Self::Microseconds => 1e-6,
            Self::Milliseconds => 1e-3,
            Self::Seconds      => 1.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Femtoseconds => "fs",
            Self::Picoseconds  => "ps",
            Self::Nanoseconds  => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds      => "s",
        }
    }

    pub(crate) fn ps6000_code(self) -> i32 {
        self as i32
    }
}

pub fn time_unit_multiplier(tag: i32) -> Result<f64> {
    Ok(TimeUnit::from_raw(tag)?.multiplier())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// When cleared, raw codes are passed through unscaled.
    pub scale_to_physical: bool,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration { scale_to_physical: true }
    }
}

impl Calibration {
    /// Convert a raw code to millivolts.
    pub fn adc_to_physical(&self, raw_code: i16, range: VoltageRange) -> f64 {
        if self.scale_to_physical {
            raw_code as f64 * range.millivolts() as f64 / FULL_SCALE_CODE as f64
        } else {
            raw_code as f64
        }
    }

    /// Convert millivolts to the nearest raw code, saturating at full scale.
    pub fn physical_to_adc(&self, millivolts: f64, range: VoltageRange) -> i16 {
        let code = (millivolts * FULL_SCALE_CODE as f64 / range.millivolts() as f64).round();
        if code.is_nan() {
            return 0
        }
        code.clamp(-FULL_SCALE_CODE as f64, FULL_SCALE_CODE as f64) as i16
    }

    /// Convert a batch of raw codes to volts, appending them to `values`.
    pub fn convert_to_volts(&self, raw_codes: &[i16], range: VoltageRange, values: &mut Vec<f64>) {
        let scale = if self.scale_to_physical {
            range.millivolts() as f64 / FULL_SCALE_CODE as f64 * 1e-3
        } else {
            1.0
        };
        values.reserve(raw_codes.len());
        let scale4 = f64x4::splat(scale);
        let mut chunks = raw_codes.chunks_exact(4);
        for chunk in &mut chunks {
            let codes = f64x4::from([
                chunk[0] as f64, chunk[1] as f64, chunk[2] as f64, chunk[3] as f64
            ]);
            values.extend_from_slice(&(codes * scale4).to_array());
        }
        values.extend(chunks.remainder().iter().map(|&code| code as f64 * scale));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_range_table_strictly_increasing() {
        for pair in RANGE_TABLE_MV.windows(2) {
            assert!(pair[0] < pair[1], "{:?}", pair);
        }
        assert_eq!(VoltageRange::ALL.len(), RANGE_TABLE_MV.len());
        for (index, range) in VoltageRange::ALL.iter().enumerate() {
            assert_eq!(range.index(), index);
            assert_eq!(VoltageRange::from_index(index), Some(*range));
        }
        assert_eq!(VoltageRange::from_index(12), None);
    }

    #[test]
    fn test_adc_to_physical_5v() {
        let cal = Calibration::default();
        let mv = cal.adc_to_physical(16383, VoltageRange::V5);
        assert!((mv - 2499.8).abs() < 0.2, "{}", mv);
        assert_eq!(cal.adc_to_physical(32767, VoltageRange::V5), 5000.0);
        assert_eq!(cal.adc_to_physical(-32767, VoltageRange::V5), -5000.0);
        assert_eq!(cal.adc_to_physical(0, VoltageRange::V5), 0.0);
    }

    #[test]
    fn test_pass_through() {
        let cal = Calibration { scale_to_physical: false };
        assert_eq!(cal.adc_to_physical(1234, VoltageRange::Mv100), 1234.0);
        let mut values = Vec::new();
        cal.convert_to_volts(&[1, -2, 3, -4, 5], VoltageRange::V1, &mut values);
        assert_eq!(values, [1.0, -2.0, 3.0, -4.0, 5.0]);
    }

    #[test]
    fn test_round_trip_within_one_code() {
        let cal = Calibration::default();
        for &range in VoltageRange::ALL.iter() {
            let full_scale = range.millivolts() as f64;
            let one_code = full_scale / FULL_SCALE_CODE as f64;
            for step in -20..=20 {
                let mv = full_scale * step as f64 / 20.0;
                let back = cal.adc_to_physical(cal.physical_to_adc(mv, range), range);
                assert!((back - mv).abs() <= one_code, "{:?} {} -> {}", range, mv, back);
            }
        }
    }

    #[test]
    fn test_physical_to_adc_rounds_and_saturates() {
        let cal = Calibration::default();
        // 1 code at 5 V is ~0.1526 mV
        assert_eq!(cal.physical_to_adc(0.1, VoltageRange::V5), 1);
        assert_eq!(cal.physical_to_adc(0.05, VoltageRange::V5), 0);
        assert_eq!(cal.physical_to_adc(-0.1, VoltageRange::V5), -1);
        assert_eq!(cal.physical_to_adc(1e9, VoltageRange::V5), 32767);
        assert_eq!(cal.physical_to_adc(-1e9, VoltageRange::V5), -32767);
        assert_eq!(cal.physical_to_adc(f64::NAN, VoltageRange::V5), 0);
    }

    #[test]
    fn test_convert_to_volts_matches_scalar() {
        let cal = Calibration::default();
        let codes = [0, 16383, -16383, 32767, -32767, 100, -100];
        let mut values = vec![42.0];
        cal.convert_to_volts(&codes, VoltageRange::V2, &mut values);
        assert_eq!(values.len(), codes.len() + 1);
        assert_eq!(values[0], 42.0);
        for (&code, &value) in codes.iter().zip(values[1..].iter()) {
            let expected = cal.adc_to_physical(code, VoltageRange::V2) * 1e-3;
            assert!((expected - value).abs() < 1e-12, "{} {} {}", code, expected, value);
        }
    }

    #[test]
    fn test_time_units() {
        assert_eq!(TimeUnit::from_raw(2).unwrap(), TimeUnit::Nanoseconds);
        assert_eq!(time_unit_multiplier(3).unwrap(), 1e-6);
        assert_eq!(time_unit_multiplier(5).unwrap(), 1.0);
        assert!(matches!(TimeUnit::from_raw(6), Err(Error::InvalidUnit(6))));
        assert!(matches!(time_unit_multiplier(-1), Err(Error::InvalidUnit(-1))));
    }
}

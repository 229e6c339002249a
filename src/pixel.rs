//! Pixel coordinates, trim configuration and calibration results.

use bitflags::bitflags;
use log::warn;
use serde::Deserialize;

/// Number of pixel columns on a read-out chip
pub const ROC_NUMCOLS: u8 = 52;

/// Number of pixel rows on a read-out chip
pub const ROC_NUMROWS: u8 = 80;

/// Trim value applied to every pixel without an explicit override
pub const DEFAULT_TRIM: i16 = 15;

/// A single pixel, identified by its ROC and its position on that ROC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelCoord {
    pub roc_id: u8,
    pub column: u8,
    pub row: u8,
}

impl PixelCoord {
    pub fn new(roc_id: u8, column: u8, row: u8) -> Self {
        PixelCoord { roc_id, column, row }
    }

    /// Decodes a readout address as returned by the calibration calls,
    /// `column << 8 | row`, for the given ROC.
    pub fn from_address(roc_id: u8, address: u32) -> Self {
        PixelCoord {
            roc_id,
            column: ((address >> 8) & 0xff) as u8,
            row: (address & 0xff) as u8,
        }
    }

    /// Position of this pixel in a column-major dense trim array
    pub fn trim_index(&self) -> usize {
        self.column as usize * ROC_NUMROWS as usize + self.row as usize
    }

    /// Whether the coordinate lies on the supported chip geometry
    pub fn is_valid(&self) -> bool {
        self.column < ROC_NUMCOLS && self.row < ROC_NUMROWS
    }
}

/// A sparse trim override for one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TrimOverride {
    pub column: u8,
    pub row: u8,
    pub trim: u8,
}

/// Builds the dense per-pixel trim array for one ROC.
///
/// Every pixel starts at [`DEFAULT_TRIM`]. Overrides outside the chip
/// geometry are skipped. Duplicate overrides for one pixel are a caller
/// error: the later one wins but a warning is logged.
pub fn materialize_trims(overrides: &[TrimOverride]) -> Vec<i16> {
    let size = ROC_NUMCOLS as usize * ROC_NUMROWS as usize;
    let mut trims = vec![DEFAULT_TRIM; size];
    let mut seen = vec![false; size];

    for o in overrides {
        let coord = PixelCoord::new(0, o.column, o.row);
        if !coord.is_valid() {
            warn!("Ignoring trim for pixel {},{} outside the chip", o.column, o.row);
            continue;
        }

        let position = coord.trim_index();
        if seen[position] {
            warn!("Pixel {},{} trimmed more than once", o.column, o.row);
        }
        seen[position] = true;
        trims[position] = o.trim as i16;
    }

    trims
}

/// One pixel of a calibration result, holding either a hit count or a
/// pulse height sum depending on the [`ReadoutValue`] requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub roc_id: u8,
    pub column: u8,
    pub row: u8,
    pub value: i32,
}

impl Pixel {
    pub fn new(coord: PixelCoord, value: i32) -> Self {
        Pixel {
            roc_id: coord.roc_id,
            column: coord.column,
            row: coord.row,
            value,
        }
    }

    pub fn coord(&self) -> PixelCoord {
        PixelCoord::new(self.roc_id, self.column, self.row)
    }
}

/// All pixels read back for one point of a scan
pub type ScanPoint = Vec<Pixel>;

/// Scan points in the order the device produced them
pub type CalibrationResult = Vec<ScanPoint>;

/// Which accumulated quantity a calibration run reports per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadoutValue {
    /// Number of readouts, used for efficiency measurements
    Efficiency,
    /// Sum of the pulse heights, used for pulse height averaging
    #[default]
    PulseHeightSum,
}

bitflags! {
    /// Legacy integer flag word used by older test parameter files.
    pub struct CalibrateFlags: u32 {
        const USE_CALS = 0x0002;
        const GET_EFFICIENCY = 0x1000;
    }
}

/// Options for a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrateOptions {
    /// Number of calibrate triggers sent per pixel and scan point
    pub triggers: i16,
    /// Quantity reported in [`Pixel::value`]
    pub value: ReadoutValue,
    /// Inject through the sensor pad instead of the calibrate capacitor
    pub use_cals: bool,
}

impl CalibrateOptions {
    pub fn new(triggers: i16, value: ReadoutValue) -> Self {
        CalibrateOptions {
            triggers,
            value,
            use_cals: false,
        }
    }

    /// Builds options from a legacy flag word.
    pub fn from_flags(flags: u32, triggers: i16) -> Self {
        let flags = CalibrateFlags::from_bits_truncate(flags);
        CalibrateOptions {
            triggers,
            value: if flags.contains(CalibrateFlags::GET_EFFICIENCY) {
                ReadoutValue::Efficiency
            } else {
                ReadoutValue::PulseHeightSum
            },
            use_cals: flags.contains(CalibrateFlags::USE_CALS),
        }
    }

    /// Picks the reported quantity out of a readout count and pulse height sum
    pub(crate) fn select(&self, readouts: i16, ph_sum: i32) -> i32 {
        match self.value {
            ReadoutValue::Efficiency => readouts as i32,
            ReadoutValue::PulseHeightSum => ph_sum,
        }
    }
}

impl Default for CalibrateOptions {
    fn default() -> Self {
        CalibrateOptions::new(10, ReadoutValue::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_materialization_single_override() {
        let trims = materialize_trims(&[TrimOverride { column: 3, row: 5, trim: 7 }]);
        assert_eq!(trims.len(), 52 * 80);
        for (i, t) in trims.iter().enumerate() {
            if i == 3 * 80 + 5 {
                assert_eq!(*t, 7);
            } else {
                assert_eq!(*t, 15);
            }
        }
    }

    #[test]
    fn trim_materialization_is_order_independent() {
        let a = TrimOverride { column: 0, row: 0, trim: 1 };
        let b = TrimOverride { column: 51, row: 79, trim: 2 };
        let c = TrimOverride { column: 10, row: 40, trim: 0 };
        assert_eq!(materialize_trims(&[a, b, c]), materialize_trims(&[c, a, b]));
        let trims = materialize_trims(&[a, b, c]);
        assert_eq!(trims[0], 1);
        assert_eq!(trims[52 * 80 - 1], 2);
        assert_eq!(trims[10 * 80 + 40], 0);
    }

    #[test]
    fn out_of_range_override_is_ignored() {
        let trims = materialize_trims(&[TrimOverride { column: 52, row: 0, trim: 3 }]);
        assert!(trims.iter().all(|t| *t == DEFAULT_TRIM));
    }

    #[test]
    fn address_decoding() {
        let coord = PixelCoord::from_address(4, 0x0a22);
        assert_eq!(coord, PixelCoord::new(4, 10, 34));
    }

    #[test]
    fn legacy_flags() {
        let opts = CalibrateOptions::from_flags(0x1002, 5);
        assert_eq!(opts.value, ReadoutValue::Efficiency);
        assert!(opts.use_cals);
        assert_eq!(opts.triggers, 5);

        let opts = CalibrateOptions::from_flags(0, 5);
        assert_eq!(opts.value, ReadoutValue::PulseHeightSum);
        assert!(!opts.use_cals);
        assert_eq!(opts.select(3, 900), 900);
    }
}

//! Pixel masks, trims, column enables and calibrate bits.
//!
//! Every operation selects the ROC first, the DTB remembers the last
//! selected ROC for all following calls.

use log::debug;

use super::Hal;
use crate::commands::{RocChipMask, RocClrCal, RocColEnable, RocI2cAddr, RocPixCal, RocPixMask, RocPixTrim, TrimChip};
use crate::devices::DeviceSession;
use crate::errors::DeviceError;
use crate::pixel::{materialize_trims, CalibrateOptions, TrimOverride, ROC_NUMCOLS};

impl<D: DeviceSession> Hal<D> {
    /// Masks a whole ROC, or unmasks it and loads its trims.
    ///
    /// Unmasking trims every pixel in one batch call. Pixels without an
    /// override get the default trim.
    pub fn set_roc_mask(&mut self, roc: u8, masked: bool, overrides: &[TrimOverride]) -> Result<(), DeviceError> {
        self.testboard.send_command(RocI2cAddr(roc))?;

        if masked {
            debug!("Masking ROC {roc}");
            return self.testboard.send_command(RocChipMask);
        }

        debug!("Updating mask bits & trim values of ROC {roc}");
        let trims = materialize_trims(overrides);

        for col in 0..ROC_NUMCOLS {
            self.testboard.send_command(RocColEnable(col, true))?;
        }

        self.testboard.send_command(TrimChip(trims))
    }

    /// Masks a single pixel, or unmasks it with the given trim
    pub fn set_pixel_mask(&mut self, roc: u8, column: u8, row: u8, masked: bool, trim: u8) -> Result<(), DeviceError> {
        self.testboard.send_command(RocI2cAddr(roc))?;

        if masked {
            debug!("Masking pixel {column},{row} on ROC {roc}");
            self.testboard.send_command(RocPixMask(column, row))
        } else {
            debug!("Trimming pixel {column},{row} ({trim})");
            self.testboard.send_command(RocPixTrim(column, row, trim))
        }
    }

    pub fn set_column_enable(&mut self, roc: u8, column: u8, enable: bool) -> Result<(), DeviceError> {
        self.testboard.send_command(RocI2cAddr(roc))?;

        debug!("Setting Column {column} enable bit to {enable}");
        self.testboard.send_command(RocColEnable(column, enable))
    }

    /// Arms the calibrate injection of one pixel
    pub fn set_calibrate(&mut self, roc: u8, column: u8, row: u8, options: &CalibrateOptions) -> Result<(), DeviceError> {
        self.testboard.send_command(RocI2cAddr(roc))?;
        self.testboard.send_command(RocPixCal(column, row, options.use_cals))
    }

    /// Disarms the calibrate injection of every pixel on a ROC
    pub fn clear_calibrate(&mut self, roc: u8) -> Result<(), DeviceError> {
        self.testboard.send_command(RocI2cAddr(roc))?;

        debug!("Clearing calibrate signal for ROC {roc}");
        self.testboard.send_command(RocClrCal)
    }
}

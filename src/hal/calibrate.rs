//! Calibration runs executed on the DTB.
//!
//! Each run selects the ROC, issues a single calibration call and reshapes
//! the returned counters into scan points. Scan points keep the order the
//! DTB produced them in.

use log::debug;

use super::Hal;
use crate::commands::{CalibrateDacDacScan, CalibrateDacScan, CalibrateMap, CalibratePixel, RocI2cAddr};
use crate::devices::DeviceSession;
use crate::errors::DeviceError;
use crate::pixel::{CalibrateOptions, CalibrationResult, Pixel, PixelCoord, ReadoutValue};

/// Exclusive upper bound covering every value of an 8 bit DAC
pub const DAC_RANGE_END: u16 = 256;

/// A DAC to sweep.
///
/// The firmware always sweeps from 0 up to `max` (exclusive); `min` is
/// carried along but not applied. `max` may be at most [`DAC_RANGE_END`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DacRange {
    pub register: u8,
    pub min: u16,
    pub max: u16,
}

impl DacRange {
    pub fn new(register: u8, min: u16, max: u16) -> Self {
        DacRange { register, min, max }
    }

    /// Number of points the firmware produces for this DAC
    pub fn points(&self) -> usize {
        self.max as usize
    }

    /// The upper bound as the firmware takes it
    fn wire_max(&self) -> Result<i16, DeviceError> {
        if self.max > DAC_RANGE_END {
            return Err(DeviceError::InvalidArgument(format!(
                "DAC {} scan bound {} exceeds {DAC_RANGE_END}",
                self.register, self.max
            )));
        }
        Ok(self.max as i16)
    }
}

fn log_value(options: &CalibrateOptions) {
    match options.value {
        ReadoutValue::Efficiency => debug!("Returning nReadouts for efficiency measurement."),
        ReadoutValue::PulseHeightSum => debug!("Returning PHsum for pulse height averaging."),
    }
}

impl<D: DeviceSession> Hal<D> {
    /// Pulses every pixel of a ROC, returning one scan point with one
    /// entry per responding pixel.
    ///
    /// Counter arrays of different lengths are a data integrity fault: it
    /// is logged and an empty result is returned.
    pub fn calibrate_map(&mut self, roc: u8, options: &CalibrateOptions) -> Result<CalibrationResult, DeviceError> {
        debug!("Called RocCalibrateMap, running {} triggers.", options.triggers);

        self.testboard.send_command(RocI2cAddr(roc))?;
        let response = self.testboard.send_request(CalibrateMap {
            triggers: options.triggers,
        })?;
        debug!("Function returns: {}", response.status);

        let (n, p, a) = (
            response.readouts.len(),
            response.ph_sums.len(),
            response.addresses.len(),
        );
        debug!("Data size: nReadouts {n}, PHsum {p}, address {a}");

        if n != p || n != a {
            critical!("Data size not as expected!");
            return Ok(Vec::new());
        }
        log_value(options);

        let point = response
            .addresses
            .iter()
            .zip(response.readouts.iter().zip(&response.ph_sums))
            .map(|(&addr, (&readouts, &ph_sum))| {
                Pixel::new(PixelCoord::from_address(roc, addr), options.select(readouts, ph_sum))
            })
            .collect();

        Ok(vec![point])
    }

    /// Pulses a single pixel
    pub fn calibrate_pixel(
        &mut self,
        roc: u8,
        column: u8,
        row: u8,
        options: &CalibrateOptions,
    ) -> Result<CalibrationResult, DeviceError> {
        debug!("Called PixelCalibrateMap, running {} triggers.", options.triggers);

        self.testboard.send_command(RocI2cAddr(roc))?;
        let response = self.testboard.send_request(CalibratePixel {
            triggers: options.triggers,
            column: column as i16,
            row: row as i16,
        })?;
        debug!("Function returns: {}", response.status);
        log_value(options);

        let value = options.select(response.readouts, response.ph_sum);
        Ok(vec![vec![Pixel::new(PixelCoord::new(roc, column, row), value)]])
    }

    /// Sweeps one DAC on a single pixel, one scan point per DAC value
    pub fn calibrate_dac_scan(
        &mut self,
        roc: u8,
        column: u8,
        row: u8,
        dac: DacRange,
        options: &CalibrateOptions,
    ) -> Result<CalibrationResult, DeviceError> {
        debug!("Called PixelCalibrateDacScan, running {} triggers.", options.triggers);
        debug!("Scanning DAC {} from {} to {}", dac.register, dac.min, dac.max);

        let dac_max = dac.wire_max()?;
        self.testboard.send_command(RocI2cAddr(roc))?;
        let response = self.testboard.send_request(CalibrateDacScan {
            triggers: options.triggers,
            column: column as i16,
            row: row as i16,
            dac_reg: i16::from(dac.register),
            dac_max,
        })?;
        debug!("Function returns: {}", response.status);
        debug!(
            "Data size: nReadouts {}, PHsum {}",
            response.readouts.len(),
            response.ph_sums.len()
        );

        let points = dac.points();
        if response.readouts.len() < points || response.ph_sums.len() < points {
            critical!("Data size not as expected!");
            return Ok(Vec::new());
        }

        let coord = PixelCoord::new(roc, column, row);
        let result: CalibrationResult = (0..points)
            .map(|i| vec![Pixel::new(coord, options.select(response.readouts[i], response.ph_sums[i]))])
            .collect();

        debug!("Result has size {}", result.len());
        Ok(result)
    }

    /// Sweeps two DACs on a single pixel.
    ///
    /// The first DAC is the outer loop, point `i * dac2.max + j` holds the
    /// pixel for first DAC value `i` and second DAC value `j`.
    pub fn calibrate_dac_dac_scan(
        &mut self,
        roc: u8,
        column: u8,
        row: u8,
        dac1: DacRange,
        dac2: DacRange,
        options: &CalibrateOptions,
    ) -> Result<CalibrationResult, DeviceError> {
        debug!("Called PixelCalibrateDacDacScan, running {} triggers.", options.triggers);
        debug!(
            "Scanning field DAC {} {}-{}, DAC {} {}-{}",
            dac1.register, dac1.min, dac1.max, dac2.register, dac2.min, dac2.max
        );

        let (dac1_max, dac2_max) = (dac1.wire_max()?, dac2.wire_max()?);
        self.testboard.send_command(RocI2cAddr(roc))?;
        let response = self.testboard.send_request(CalibrateDacDacScan {
            triggers: options.triggers,
            column: column as i16,
            row: row as i16,
            dac1_reg: i16::from(dac1.register),
            dac1_max,
            dac2_reg: i16::from(dac2.register),
            dac2_max,
        })?;
        debug!("Function returns: {}", response.status);

        let (outer, inner) = (dac1.points(), dac2.points());
        let points = outer * inner;
        if response.readouts.len() < points || response.ph_sums.len() < points {
            critical!("Data size not as expected!");
            return Ok(Vec::new());
        }

        let coord = PixelCoord::new(roc, column, row);
        let mut result = CalibrationResult::with_capacity(points);
        for i in 0..outer {
            for j in 0..inner {
                let k = i * inner + j;
                let value = options.select(response.readouts[k], response.ph_sums[k]);
                result.push(vec![Pixel::new(coord, value)]);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CalibrateScanResponse;
    use crate::devices::SimulatedDevice;
    use crate::hal::CompatibilityMode;

    fn hal() -> Hal<SimulatedDevice> {
        Hal::from_device(SimulatedDevice::default(), CompatibilityMode::Lenient).unwrap()
    }

    #[test]
    fn pixel_value_follows_options() {
        let mut hal = hal();
        let eff = CalibrateOptions::new(12, ReadoutValue::Efficiency);
        let result = hal.calibrate_pixel(0, 5, 7, &eff).unwrap();
        assert_eq!(result, vec![vec![Pixel::new(PixelCoord::new(0, 5, 7), 12)]]);

        let ph = CalibrateOptions::new(12, ReadoutValue::PulseHeightSum);
        let result = hal.calibrate_pixel(0, 5, 7, &ph).unwrap();
        assert_eq!(result[0][0].value, 12 * (5 + 7));
    }

    #[test]
    fn short_scan_response_is_empty() {
        let mut hal = hal();
        hal.device_mut().set_scan_response(Some(CalibrateScanResponse {
            status: 0,
            readouts: vec![1, 2],
            ph_sums: vec![1, 2],
        }));
        let result = hal
            .calibrate_dac_scan(0, 1, 1, DacRange::new(25, 0, 4), &CalibrateOptions::default())
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn full_dac_range() {
        let mut hal = hal();
        let result = hal
            .calibrate_dac_scan(0, 1, 1, DacRange::new(25, 0, DAC_RANGE_END), &CalibrateOptions::default())
            .unwrap();
        assert_eq!(result.len(), 256);
    }

    #[test]
    fn oversized_dac_bound_is_rejected() {
        let mut hal = hal();
        hal.device_mut().clear_log();
        let options = CalibrateOptions::default();

        let result = hal.calibrate_dac_scan(0, 1, 1, DacRange::new(25, 0, 40000), &options);
        assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));

        let result = hal.calibrate_dac_dac_scan(
            0,
            1,
            1,
            DacRange::new(25, 0, 4),
            DacRange::new(12, 0, 257),
            &options,
        );
        assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));

        // Nothing reached the board
        assert!(hal.device().executed().is_empty());
        assert_eq!(hal.device().queued(), 0);
    }

    #[test]
    fn triggers_reach_the_board_unchanged() {
        let mut hal = hal();
        hal.device_mut().clear_log();
        hal.calibrate_map(0, &CalibrateOptions::new(i16::MAX, ReadoutValue::Efficiency))
            .unwrap();
        let map = &hal.device().executed()[1];
        assert_eq!(map.name, "CalibrateMap");
        assert_eq!(map.args, i16::MAX.to_le_bytes().to_vec());
    }

    #[test]
    fn dac_min_is_not_applied() {
        let mut hal = hal();
        let result = hal
            .calibrate_dac_scan(0, 1, 1, DacRange::new(25, 2, 5), &CalibrateOptions::default())
            .unwrap();
        assert_eq!(result.len(), 5);
        assert_eq!(result[0][0].value, 0);
    }
}

//! Implements the firmware side calibration runs.
//!
//! All of these act on the ROC selected by the last `roc_I2cAddr` call.

use serde::{Deserialize, Serialize};

use super::{encode, Command};

/// Pulses every pixel of the ROC `triggers` times
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct CalibrateMap {
    pub triggers: i16,
}

/// Per pixel readout counters, in the order the DTB produced them
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrateMapResponse {
    pub status: i32,
    pub readouts: Vec<i16>,
    pub ph_sums: Vec<i32>,
    pub addresses: Vec<u32>,
}

impl Command for CalibrateMap {
    type Response = CalibrateMapResponse;

    fn name(&self) -> &'static str {
        "CalibrateMap"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(self)
    }
}

/// Pulses a single pixel `triggers` times
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct CalibratePixel {
    pub triggers: i16,
    pub column: i16,
    pub row: i16,
}

/// Counters of a single pixel
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibratePixelResponse {
    pub status: i32,
    pub readouts: i16,
    pub ph_sum: i32,
}

impl Command for CalibratePixel {
    type Response = CalibratePixelResponse;

    fn name(&self) -> &'static str {
        "CalibratePixel"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(self)
    }
}

/// Counters of a DAC scan, one entry per scan step
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrateScanResponse {
    pub status: i32,
    pub readouts: Vec<i16>,
    pub ph_sums: Vec<i32>,
}

/// Sweeps a DAC from 0 to `dac_max` (exclusive) on a single pixel
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct CalibrateDacScan {
    pub triggers: i16,
    pub column: i16,
    pub row: i16,
    pub dac_reg: i16,
    pub dac_max: i16,
}

impl Command for CalibrateDacScan {
    type Response = CalibrateScanResponse;

    fn name(&self) -> &'static str {
        "CalibrateDacScan"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(self)
    }
}

/// Sweeps two DACs on a single pixel, the first one in the outer loop
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct CalibrateDacDacScan {
    pub triggers: i16,
    pub column: i16,
    pub row: i16,
    pub dac1_reg: i16,
    pub dac1_max: i16,
    pub dac2_reg: i16,
    pub dac2_max: i16,
}

impl Command for CalibrateDacDacScan {
    type Response = CalibrateScanResponse;

    fn name(&self) -> &'static str {
        "CalibrateDacDacScan"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(self)
    }
}

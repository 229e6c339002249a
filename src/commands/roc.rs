//! Implements calls addressing read-out chips and token bit managers.
//!
//! Every `roc_*` call acts on the ROC selected by the last [`RocI2cAddr`].

use super::{encode, Command};

/// Selects the ROC that subsequent ROC calls act on
#[derive(Copy, Clone, Debug)]
pub struct RocI2cAddr(pub u8);

impl Command for RocI2cAddr {
    type Response = ();

    fn name(&self) -> &'static str {
        "roc_I2cAddr"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Writes a DAC register.
///
/// # Members
///
/// * `0` - The DAC id
/// * `1` - The DAC value
#[derive(Copy, Clone, Debug)]
pub struct RocSetDac(pub u8, pub u8);

impl Command for RocSetDac {
    type Response = ();

    fn name(&self) -> &'static str {
        "roc_SetDAC"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&(self.0, self.1))
    }
}

/// Masks every pixel of the ROC and detaches all double columns
#[derive(Copy, Clone, Debug)]
pub struct RocChipMask;

impl Command for RocChipMask {
    type Response = ();

    fn name(&self) -> &'static str {
        "roc_Chip_Mask"
    }
}

/// Enables or disables readout of a column
#[derive(Copy, Clone, Debug)]
pub struct RocColEnable(pub u8, pub bool);

impl Command for RocColEnable {
    type Response = ();

    fn name(&self) -> &'static str {
        "roc_Col_Enable"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&(self.0, self.1))
    }
}

/// Masks a single pixel (column, row)
#[derive(Copy, Clone, Debug)]
pub struct RocPixMask(pub u8, pub u8);

impl Command for RocPixMask {
    type Response = ();

    fn name(&self) -> &'static str {
        "roc_Pix_Mask"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&(self.0, self.1))
    }
}

/// Unmasks a single pixel (column, row) and sets its trim value
#[derive(Copy, Clone, Debug)]
pub struct RocPixTrim(pub u8, pub u8, pub u8);

impl Command for RocPixTrim {
    type Response = ();

    fn name(&self) -> &'static str {
        "roc_Pix_Trim"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&(self.0, self.1, self.2))
    }
}

/// Arms the calibrate injection of a pixel (column, row, use sensor pad)
#[derive(Copy, Clone, Debug)]
pub struct RocPixCal(pub u8, pub u8, pub bool);

impl Command for RocPixCal {
    type Response = ();

    fn name(&self) -> &'static str {
        "roc_Pix_Cal"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&(self.0, self.1, self.2))
    }
}

/// Clears the calibrate injection of every pixel
#[derive(Copy, Clone, Debug)]
pub struct RocClrCal;

impl Command for RocClrCal {
    type Response = ();

    fn name(&self) -> &'static str {
        "roc_ClrCal"
    }
}

/// Trims every pixel of the ROC in one call.
///
/// The vector holds one trim value per pixel, indexed `column * 80 + row`.
#[derive(Clone, Debug)]
pub struct TrimChip(pub Vec<i16>);

impl Command for TrimChip {
    type Response = ();

    fn name(&self) -> &'static str {
        "TrimChip"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Switches the TBM on or off
#[derive(Copy, Clone, Debug)]
pub struct TbmEnable(pub bool);

impl Command for TbmEnable {
    type Response = ();

    fn name(&self) -> &'static str {
        "tbm_Enable"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Selects the module hub address
#[derive(Copy, Clone, Debug)]
pub struct ModAddr(pub u8);

impl Command for ModAddr {
    type Response = ();

    fn name(&self) -> &'static str {
        "mod_Addr"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Writes a TBM register on both TBM cores (register, value)
#[derive(Copy, Clone, Debug)]
pub struct TbmSet(pub u8, pub u8);

impl Command for TbmSet {
    type Response = ();

    fn name(&self) -> &'static str {
        "tbm_Set"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&(self.0, self.1))
    }
}

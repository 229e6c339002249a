//! Implements calls for the DUT supplies and power switches

use super::{encode, Command};

/// One of the four regulated DUT supply quantities
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Supply {
    /// Analog voltage, in mV
    Va,
    /// Digital voltage, in mV
    Vd,
    /// Analog current limit, in 100 µA
    Ia,
    /// Digital current limit, in 100 µA
    Id,
}

/// Sets a supply register to a raw device value.
///
/// # Members
///
/// * `0` - The supply to program
/// * `1` - The value in device units
#[derive(Copy, Clone, Debug)]
pub struct SetSupply(pub Supply, pub u16);

impl Command for SetSupply {
    type Response = ();

    fn name(&self) -> &'static str {
        match self.0 {
            Supply::Va => "_SetVA",
            Supply::Vd => "_SetVD",
            Supply::Ia => "_SetIA",
            Supply::Id => "_SetID",
        }
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        // The supply is part of the call name
        encode(&self.1)
    }
}

/// Measures a supply, returning the raw device value
#[derive(Copy, Clone, Debug)]
pub struct GetSupply(pub Supply);

impl Command for GetSupply {
    type Response = u16;

    fn name(&self) -> &'static str {
        match self.0 {
            Supply::Va => "_GetVA",
            Supply::Vd => "_GetVD",
            Supply::Ia => "_GetIA",
            Supply::Id => "_GetID",
        }
    }
}

/// The power relays of the DTB
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Switch {
    PowerOn,
    PowerOff,
    HvOn,
    HvOff,
}

/// Flips one of the power relays
#[derive(Copy, Clone, Debug)]
pub struct PowerSwitch(pub Switch);

impl Command for PowerSwitch {
    type Response = ();

    fn name(&self) -> &'static str {
        match self.0 {
            Switch::PowerOn => "Pon",
            Switch::PowerOff => "Poff",
            Switch::HvOn => "HVon",
            Switch::HvOff => "HVoff",
        }
    }
}

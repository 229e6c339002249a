//! Conversions between host-facing volts/amps and DTB register units.
//!
//! Conversions towards the device truncate, exactly like the firmware tools
//! always did. No rounding is applied.

/// Device units per volt
pub const VOLTAGE_SCALE: f64 = 1000.0;

/// Device units per ampere
pub const CURRENT_SCALE: f64 = 10000.0;

/// Converts volts to the DTB's millivolt register value.
pub fn volts_to_device(volts: f64) -> u16 {
    (volts * VOLTAGE_SCALE) as u16
}

/// Converts a millivolt register value back to volts.
pub fn device_to_volts(value: u16) -> f64 {
    value as f64 / VOLTAGE_SCALE
}

/// Converts amperes to the DTB's 100 µA register value.
pub fn amps_to_device(amps: f64) -> u16 {
    (amps * CURRENT_SCALE) as u16
}

/// Converts a 100 µA register value back to amperes.
pub fn device_to_amps(value: u16) -> f64 {
    value as f64 / CURRENT_SCALE
}

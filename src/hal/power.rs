//! DUT supplies, power switches and probe outputs

use std::thread::sleep;
use std::time::Duration;

use log::debug;

use super::Hal;
use crate::commands::{GetSupply, PowerSwitch, ProbeChannel, SetSupply, SignalProbe, Supply, Switch, UDelay};
use crate::devices::DeviceSession;
use crate::errors::DeviceError;
use crate::units::{amps_to_device, device_to_amps, device_to_volts, volts_to_device};

/// Time the DUT power switch needs to settle
pub const POWER_SETTLE: Duration = Duration::from_millis(300);

/// Time the high voltage relais needs to settle
pub const HV_SETTLE: Duration = Duration::from_millis(400);

impl<D: DeviceSession> Hal<D> {
    /// Turns on DUT power and waits for it to settle
    pub fn pon(&mut self) -> Result<(), DeviceError> {
        debug!("Powering up testboard DUT connection...");
        self.testboard.send_command(PowerSwitch(Switch::PowerOn))?;
        self.testboard.flush()?;
        sleep(POWER_SETTLE);
        Ok(())
    }

    pub fn poff(&mut self) -> Result<(), DeviceError> {
        self.testboard.send_command(PowerSwitch(Switch::PowerOff))?;
        self.testboard.flush()
    }

    /// Turns on the sensor bias and waits for the relais
    pub fn hv_on(&mut self) -> Result<(), DeviceError> {
        debug!("Turning on High Voltage for sensor bias...");
        self.testboard.send_command(PowerSwitch(Switch::HvOn))?;
        self.testboard.flush()?;
        sleep(HV_SETTLE);
        Ok(())
    }

    pub fn hv_off(&mut self) -> Result<(), DeviceError> {
        self.testboard.send_command(PowerSwitch(Switch::HvOff))?;
        self.testboard.flush()
    }

    /// Sets the analog supply voltage in V
    pub fn set_tb_va(&mut self, va: f64) -> Result<(), DeviceError> {
        debug!("Set DTB analog output voltage to VA = {va}V");
        self.testboard.send_command(SetSupply(Supply::Va, volts_to_device(va)))
    }

    /// Sets the digital supply voltage in V
    pub fn set_tb_vd(&mut self, vd: f64) -> Result<(), DeviceError> {
        debug!("Set DTB digital output voltage to VD = {vd}V");
        self.testboard.send_command(SetSupply(Supply::Vd, volts_to_device(vd)))
    }

    /// Sets the analog current limit in A
    pub fn set_tb_ia(&mut self, ia: f64) -> Result<(), DeviceError> {
        debug!("Set DTB analog current limit to IA = {ia}A");
        self.testboard.send_command(SetSupply(Supply::Ia, amps_to_device(ia)))
    }

    /// Sets the digital current limit in A
    pub fn set_tb_id(&mut self, id: f64) -> Result<(), DeviceError> {
        debug!("Set DTB digital current limit to ID = {id}A");
        self.testboard.send_command(SetSupply(Supply::Id, amps_to_device(id)))
    }

    /// Measured analog voltage in V
    pub fn get_tb_va(&mut self) -> Result<f64, DeviceError> {
        Ok(device_to_volts(self.testboard.send_request(GetSupply(Supply::Va))?))
    }

    /// Measured digital voltage in V
    pub fn get_tb_vd(&mut self) -> Result<f64, DeviceError> {
        Ok(device_to_volts(self.testboard.send_request(GetSupply(Supply::Vd))?))
    }

    /// Measured analog current in A
    pub fn get_tb_ia(&mut self) -> Result<f64, DeviceError> {
        Ok(device_to_amps(self.testboard.send_request(GetSupply(Supply::Ia))?))
    }

    /// Measured digital current in A
    pub fn get_tb_id(&mut self) -> Result<f64, DeviceError> {
        Ok(device_to_amps(self.testboard.send_request(GetSupply(Supply::Id))?))
    }

    /// Routes a signal to one of the probe outputs
    pub fn signal_probe(&mut self, probe: ProbeChannel, signal: u8) -> Result<(), DeviceError> {
        debug!("Probe {probe:?} shows signal {signal}");
        self.testboard.send_command(SignalProbe(probe, signal))?;
        self.testboard.send_command(UDelay(100))?;
        self.testboard.flush()
    }
}

//! Programs supplies, signal delays, the pattern generator, TBMs and ROC DACs.

use std::collections::BTreeMap;

use log::debug;
use serde::Deserialize;

use super::Hal;
use crate::commands::{
    DaqSelectDeser160, ModAddr, PgSetCmd, RocI2cAddr, RocSetDac, SigSetDelay, SigSetLevel, TbmEnable,
    TbmSet,
};
use crate::devices::DeviceSession;
use crate::errors::DeviceError;

/// Clock signal
pub const SIG_CLK: u8 = 0;
/// Control signal
pub const SIG_CTR: u8 = 1;
/// I2C data signal
pub const SIG_SDA: u8 = 2;
/// Token in signal
pub const SIG_TIN: u8 = 3;
/// Not a delay line: selects the phase of the 160 MHz deserializer
pub const SIG_DESER160PHASE: u8 = 4;

/// Level every delayed signal is driven at
pub const SIG_LEVEL_MAX: u8 = 15;

/// One pattern generator step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PgEntry {
    /// Signals emitted at this step
    pub pattern: u16,
    /// Clock cycles until the next step, 0 ends the program
    pub delay: u8,
}

impl PgEntry {
    pub fn new(pattern: u16, delay: u8) -> Self {
        PgEntry { pattern, delay }
    }

    /// The word stored in pattern generator memory
    pub fn command(&self) -> u16 {
        self.pattern | self.delay as u16
    }
}

impl<D: DeviceSession> Hal<D> {
    /// Configures the board for operation.
    ///
    /// Sets the supplies, every signal delay and the pattern generator
    /// program. The session only counts as initialized once all of that
    /// went through.
    pub fn initialize(
        &mut self,
        sig_delays: &BTreeMap<u8, u8>,
        pg_setup: &[PgEntry],
        va: f64,
        vd: f64,
        ia: f64,
        id: f64,
    ) -> Result<(), DeviceError> {
        self.set_tb_va(va)?;
        self.set_tb_vd(vd)?;
        self.set_tb_ia(ia)?;
        self.set_tb_id(id)?;
        self.testboard.flush()?;
        debug!("Voltages/current limits set.");

        for (&signal, &value) in sig_delays {
            if signal == SIG_DESER160PHASE {
                debug!("Set DTB deser160 phase to value {value}");
                self.testboard.send_command(DaqSelectDeser160(value))?;
            } else {
                debug!("Set DTB delay {signal} to value {value}");
                self.testboard.send_command(SigSetDelay(signal, value as u16))?;
                self.testboard.send_command(SigSetLevel(signal, SIG_LEVEL_MAX))?;
            }
        }
        self.testboard.flush()?;
        debug!("Testboard delays set.");

        self.setup_pattern_generator(pg_setup)?;

        self.initialized = true;
        Ok(())
    }

    /// Writes the pattern generator program to consecutive addresses.
    ///
    /// The entries must already be in execution order. The generator stops
    /// at the first zero delay, so memory past the program is left alone.
    pub fn setup_pattern_generator(&mut self, pg_setup: &[PgEntry]) -> Result<(), DeviceError> {
        for (addr, entry) in pg_setup.iter().enumerate() {
            let cmd = entry.command();
            debug!(
                "Setting PG cmd {cmd:#x} (addr {addr} pat {:#x} del {})",
                entry.pattern, entry.delay
            );
            self.testboard.send_command(PgSetCmd(addr as u16, cmd))?;
        }
        self.testboard.flush()
    }

    /// Programs the DACs of one ROC
    pub fn init_roc(&mut self, roc: u8, dacs: &BTreeMap<u8, u8>) -> Result<(), DeviceError> {
        debug!("Setting DAC vector for ROC {roc}.");
        self.roc_set_dacs(roc, dacs)
    }

    /// Sets a batch of DACs on one ROC, then flushes
    pub fn roc_set_dacs(&mut self, roc: u8, dacs: &BTreeMap<u8, u8>) -> Result<(), DeviceError> {
        for (&dac, &value) in dacs {
            self.roc_set_dac(roc, dac, value)?;
        }
        self.testboard.flush()
    }

    /// Queues a single DAC write
    pub fn roc_set_dac(&mut self, roc: u8, dac: u8, value: u8) -> Result<(), DeviceError> {
        self.testboard.send_command(RocI2cAddr(roc))?;
        debug!("Set DAC{dac} to {value}");
        self.testboard.send_command(RocSetDac(dac, value))
    }

    /// Switches the TBM on and programs its registers
    pub fn init_tbm(&mut self, tbm: u8, regs: &BTreeMap<u8, u8>) -> Result<(), DeviceError> {
        self.testboard.send_command(TbmEnable(true))?;
        self.testboard.send_command(ModAddr(self.hub_address))?;
        self.testboard.flush()?;

        debug!("Setting register vector for TBM {tbm}.");
        self.tbm_set_regs(tbm, regs)
    }

    /// Sets a batch of TBM registers, then flushes
    pub fn tbm_set_regs(&mut self, tbm: u8, regs: &BTreeMap<u8, u8>) -> Result<(), DeviceError> {
        for (&reg, &value) in regs {
            self.tbm_set_reg(tbm, reg, value)?;
        }
        self.testboard.flush()
    }

    /// Queues a TBM register write for both TBM cores
    pub fn tbm_set_reg(&mut self, _tbm: u8, reg: u8, value: u8) -> Result<(), DeviceError> {
        self.testboard.send_command(ModAddr(self.hub_address))?;

        debug!("Set Reg{reg:x} to {value:x} for both TBM cores.");
        debug!("Core 1: register {:x} = {value:x}", 0xE0 | reg);
        debug!("Core 2: register {:x} = {value:x}", 0xF0 | reg);
        self.testboard.send_command(TbmSet(reg, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::SimulatedDevice;
    use crate::hal::CompatibilityMode;

    fn hal() -> Hal<SimulatedDevice> {
        let mut hal = Hal::from_device(SimulatedDevice::default(), CompatibilityMode::Lenient).unwrap();
        hal.device_mut().clear_log();
        hal
    }

    #[test]
    fn initialize_programs_everything() {
        let mut hal = hal();
        let delays = BTreeMap::from([(SIG_CLK, 4), (SIG_SDA, 19), (SIG_DESER160PHASE, 5)]);
        let pg = [PgEntry::new(0x0800, 25), PgEntry::new(0x0400, 16), PgEntry::new(0x0200, 0)];

        hal.initialize(&delays, &pg, 1.8, 2.5, 1.19, 1.1).unwrap();
        assert!(hal.status());

        let dev = hal.device();
        assert_eq!(dev.delay(SIG_CLK), Some(4));
        assert_eq!(dev.level(SIG_SDA), Some(15));
        // The phase selector never reaches the delay registers
        assert_eq!(dev.delay(SIG_DESER160PHASE), None);
        assert_eq!(
            dev.deserializer(),
            Some(crate::devices::simulated::Deserializer::Deser160 { phase: 5 })
        );
        assert_eq!(dev.pattern_generator(), vec![(0, 0x0819), (1, 0x0410), (2, 0x0200)]);
    }

    #[test]
    fn failed_initialize_leaves_session_uninitialized() {
        let mut hal = hal();
        hal.device_mut().fail_on(Some("Pg_SetCmd"));
        let result = hal.initialize(&BTreeMap::new(), &[PgEntry::new(0x0100, 0)], 1.8, 2.5, 1.0, 1.0);
        assert!(result.is_err());
        assert!(!hal.status());
    }

    #[test]
    fn every_dac_selects_the_roc() {
        let mut hal = hal();
        hal.init_roc(3, &BTreeMap::from([(1, 8), (2, 140)])).unwrap();
        assert_eq!(
            hal.device().executed_names(),
            vec!["roc_I2cAddr", "roc_SetDAC", "roc_I2cAddr", "roc_SetDAC"]
        );
        assert_eq!(hal.device().dac(3, 2), Some(140));
    }

    #[test]
    fn tbm_registers_use_the_hub_address() {
        let mut hal = hal();
        hal.set_hub_address(5);
        hal.init_tbm(0, &BTreeMap::from([(0x04, 0x80)])).unwrap();
        let dev = hal.device();
        assert!(dev.is_tbm_enabled());
        assert_eq!(dev.hub_address(), 5);
        assert_eq!(dev.tbm_reg(0x04), Some(0x80));
    }
}

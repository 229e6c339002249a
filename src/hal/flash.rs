//! Firmware upgrades over the DTB's upgrade calls.

use std::io::BufRead;
use std::thread::sleep;
use std::time::Duration;

use log::info;

use super::Hal;
use crate::commands::{UpgradeData, UpgradeError, UpgradeErrorMsg, UpgradeExec, UpgradeGetVersion, UpgradeStart};
use crate::devices::DeviceSession;
use crate::errors::DeviceError;

/// The only upgrade protocol version this host speaks
pub const UPGRADE_VERSION: u16 = 0x0100;

/// Pause between the end of the download and the flash write
const FLASH_WRITE_DELAY: Duration = Duration::from_millis(200);

impl<D: DeviceSession> Hal<D> {
    /// Writes a new firmware image to the DTB.
    ///
    /// Every non-empty line of the flash file is one record. Once this
    /// returns the DTB is writing its flash and has to be power cycled
    /// after its LEDs went off.
    pub fn flash_testboard<R: BufRead>(&mut self, flash_file: R) -> Result<(), DeviceError> {
        let version = self.testboard.send_request(UpgradeGetVersion)?;
        if version != UPGRADE_VERSION {
            critical!("ERROR UPGRADE: Could not upgrade this DTB version!");
            return Err(DeviceError::Upgrade(format!(
                "unsupported upgrade version {version:#06x}"
            )));
        }

        info!("Staring DTB firmware upgrade...");
        if self.testboard.send_request(UpgradeStart(UPGRADE_VERSION))? != 0 {
            return Err(self.upgrade_failure());
        }

        info!("Download running... ");
        let mut records: u16 = 0;
        for line in flash_file.lines() {
            let record = match line {
                Ok(l) => l,
                Err(e) => {
                    critical!("UPGRADE: Error reading file.");
                    return Err(e.into());
                }
            };
            if record.is_empty() {
                continue;
            }

            records = records.wrapping_add(1);
            if self.testboard.send_request(UpgradeData(record))? != 0 {
                return Err(self.upgrade_failure());
            }
        }

        if self.testboard.send_request(UpgradeError)? != 0 {
            return Err(self.upgrade_failure());
        }

        info!("DTB download complete.");
        sleep(FLASH_WRITE_DELAY);
        info!("FLASH write start (LED 1..4 on)");
        info!("DO NOT INTERUPT DTB POWER !");
        info!("Wait till LEDs goes off.");
        info!("Power-cycle the DTB.");

        self.testboard.send_command(UpgradeExec(records))?;
        self.testboard.flush()
    }

    /// Fetches the DTB's description of the last upgrade error
    fn upgrade_failure(&mut self) -> DeviceError {
        let msg = match self.testboard.send_request(UpgradeErrorMsg) {
            Ok(msg) => msg,
            Err(e) => format!("no error message available ({e})"),
        };
        critical!("UPGRADE: {msg}");
        DeviceError::Upgrade(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::SimulatedDevice;
    use crate::hal::CompatibilityMode;
    use std::io::Cursor;

    fn hal() -> Hal<SimulatedDevice> {
        Hal::from_device(SimulatedDevice::default(), CompatibilityMode::Lenient).unwrap()
    }

    #[test]
    fn records_skip_empty_lines() {
        let mut hal = hal();
        let file = ":020000040000FA\n\n:10000000000000000000000000000000000000F0\n:00000001FF\n";
        hal.flash_testboard(Cursor::new(file)).unwrap();
        assert_eq!(hal.device().upgrade_records().len(), 3);
        assert_eq!(hal.device().upgrade_exec(), Some(3));
    }

    #[test]
    fn bad_record_reports_the_dtb_message() {
        let mut hal = hal();
        let result = hal.flash_testboard(Cursor::new(":00000001FF\ngarbage\n"));
        match result {
            Err(DeviceError::Upgrade(msg)) => assert_eq!(msg, "invalid record 2"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(hal.device().upgrade_exec(), None);
    }

    #[test]
    fn other_versions_are_refused() {
        let mut hal = hal();
        hal.device_mut().set_upgrade_version(0x0200);
        let result = hal.flash_testboard(Cursor::new(":00000001FF\n"));
        assert!(matches!(result, Err(DeviceError::Upgrade(_))));
        assert!(!hal.device().executed_names().contains(&"UpgradeStart"));
    }
}

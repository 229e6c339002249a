//! The hardware abstraction layer over one DTB session.
//!
//! A [`Hal`] owns the connection to a single board. Every operation on the
//! board goes through it: power, configuration, masks, data acquisition,
//! calibration scans and firmware upgrades. The session can run on top of
//! any [`DeviceSession`], so the same code drives a real board over USB and
//! the in-memory [`SimulatedDevice`](crate::devices::SimulatedDevice).

use log::{debug, info, warn};

use crate::commands::{GetBoardId, GetInfo, Init, PowerSwitch, Switch, Welcome};
use crate::devices::{open_dtb, DeviceSession, UsbDevice};
use crate::errors::DeviceError;
use crate::testboard::Testboard;

/// Logs a message of critical severity.
///
/// `log` has no tier above error, so critical messages are errors with a
/// fixed prefix that filters can match on.
macro_rules! critical {
    ($($arg:tt)+) => {
        log::error!("CRITICAL: {}", format_args!($($arg)+))
    };
}

mod calibrate;
mod compat;
mod configure;
mod daq;
mod flash;
mod mask;
mod power;

pub use calibrate::{DacRange, DAC_RANGE_END};
pub use compat::{CallMismatch, CompatibilityMode, CompatibilityReport};
pub use configure::{PgEntry, SIG_CLK, SIG_CTR, SIG_DESER160PHASE, SIG_LEVEL_MAX, SIG_SDA, SIG_TIN};
pub use daq::{ChannelState, DaqReadout, DAQ_BUFFER_SIZE, DAQ_MAX_TRANSFER};
pub use flash::UPGRADE_VERSION;
pub use power::{HV_SETTLE, POWER_SETTLE};

/// Hub address of the TBM on current modules
pub const DEFAULT_HUB_ADDRESS: u8 = 31;

/// One open DTB session
pub struct Hal<D: DeviceSession = UsbDevice> {
    testboard: Testboard<D>,
    initialized: bool,
    closed: bool,
    hub_address: u8,
    channels: [ChannelState; 2],
}

impl Hal<UsbDevice> {
    /// Finds a DTB over USB and opens a session with it.
    ///
    /// Without a name the only attached board is used.
    pub fn open(name: Option<&str>, mode: CompatibilityMode) -> Result<Self, DeviceError> {
        let device = match open_dtb(name) {
            Ok(d) => d,
            Err(e) => {
                critical!("DTB: could not open port to device: {e}");
                if let DeviceError::SerialportError(_) = e {
                    critical!("Make sure you have permission to access USB devices.");
                }
                return Err(e);
            }
        };

        Hal::from_device(device, mode)
    }
}

impl<D: DeviceSession> Hal<D> {
    /// Starts a session on an already open device.
    ///
    /// Prints the board information, checks the call tables of host and
    /// firmware against each other, blinks the welcome LEDs and resets the
    /// board. In strict mode any call table mismatch closes the device and
    /// fails with [`DeviceError::Incompatible`].
    pub fn from_device(device: D, mode: CompatibilityMode) -> Result<Self, DeviceError> {
        let mut hal = Hal {
            testboard: Testboard::new(device),
            initialized: false,
            closed: false,
            hub_address: DEFAULT_HUB_ADDRESS,
            channels: [ChannelState::Closed; 2],
        };
        info!("Connection to board {} opened.", hal.testboard.name());

        if let Err(e) = hal.handshake(mode) {
            critical!("DTB software version could not be identified, please update!");
            // The transport may already be gone, the handshake error is the one to report
            let _ = hal.testboard.close();
            hal.closed = true;
            critical!("Connection to board {} has been cancelled.", hal.testboard.name());
            return Err(e);
        }

        hal.testboard.send_command(Init)?;
        hal.testboard.flush()?;
        Ok(hal)
    }

    fn handshake(&mut self, mode: CompatibilityMode) -> Result<(), DeviceError> {
        self.print_info()?;

        let report = self.check_compatibility()?;
        if mode == CompatibilityMode::Strict && !report.mismatches.is_empty() {
            return Err(DeviceError::Incompatible(report.mismatches.len()));
        }

        self.testboard.send_command(Welcome)?;
        self.testboard.flush()
    }

    /// Logs the version information reported by the board
    pub fn print_info(&mut self) -> Result<String, DeviceError> {
        let info = self.testboard.send_request(GetInfo)?;
        info!(
            "DTB startup information\n--- DTB info------------------------------------------\n{}------------------------------------------------------",
            info
        );
        Ok(info)
    }

    /// Whether the board has been configured with [`Hal::initialize`].
    ///
    /// Logs an error every time it is checked on an unconfigured board.
    /// Nothing else stops operations on an unconfigured board.
    pub fn status(&self) -> bool {
        if !self.initialized {
            log::error!("Testboard not initialized yet!");
        }
        self.initialized
    }

    /// Turns off high voltage and DUT power and closes the connection.
    ///
    /// Closing twice is a no-op. Also runs when the session is dropped.
    pub fn close(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.testboard.send_command(PowerSwitch(Switch::HvOff))?;
        self.testboard.send_command(PowerSwitch(Switch::PowerOff))?;

        let id = self.testboard.send_request(GetBoardId)?;
        info!("Connection to board {id} closed.");
        self.testboard.close()
    }

    /// Sets the hub address used to reach the TBM
    pub fn set_hub_address(&mut self, address: u8) {
        debug!("Using hub address {address}");
        self.hub_address = address;
    }

    pub fn hub_address(&self) -> u8 {
        self.hub_address
    }

    /// Name of the connected board
    pub fn name(&self) -> &str {
        self.testboard.name()
    }

    /// The underlying device, e.g. to inspect a simulated board
    pub fn device(&self) -> &D {
        self.testboard.device()
    }

    pub fn device_mut(&mut self) -> &mut D {
        self.testboard.device_mut()
    }

    /// Transmits every queued call
    pub fn flush(&mut self) -> Result<(), DeviceError> {
        self.testboard.flush()
    }
}

impl<D: DeviceSession> Drop for Hal<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to shut down {} cleanly: {e}", self.testboard.name());
        }
    }
}

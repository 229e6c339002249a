//! A typed proxy over a DTB session.

use log::trace;

use crate::commands::Command;
use crate::devices::DeviceSession;
use crate::errors::DeviceError;

/// The representation of a connected DTB
pub struct Testboard<D: DeviceSession> {
    device: D,
}

impl<D: DeviceSession> Testboard<D> {
    pub fn new(device: D) -> Self {
        Testboard { device }
    }

    /// Queues a command. It only reaches the board on the next flush
    /// or the next request.
    pub fn send_command<C: Command<Response = ()>>(&mut self, command: C) -> Result<(), DeviceError> {
        let name = command.name();
        trace!("{name}");
        self.device.send(name, &command.encode_request()?)
    }

    /// Sends a command and recieves its response
    pub fn send_request<C: Command>(&mut self, command: C) -> Result<C::Response, DeviceError> {
        let name = command.name();
        trace!("{name} ?");

        // Everything queued before goes out first
        let payload = self.device.request(name, &command.encode_request()?)?;

        Ok(C::decode_response(payload)?)
    }

    /// Transmits every queued command
    pub fn flush(&mut self) -> Result<(), DeviceError> {
        self.device.flush()
    }

    /// Closes the underlying session
    pub fn close(&mut self) -> Result<(), DeviceError> {
        self.device.close()
    }

    pub fn name(&self) -> &str {
        self.device.name()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_inner(self) -> D {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{GetBoardId, GetSupply, PowerSwitch, SetSupply, Supply, Switch};
    use crate::devices::SimulatedDevice;

    #[test]
    fn commands_are_queued_until_a_request() {
        let mut tb = Testboard::new(SimulatedDevice::default());
        tb.send_command(SetSupply(Supply::Vd, 2500)).unwrap();
        tb.send_command(PowerSwitch(Switch::PowerOn)).unwrap();
        assert!(tb.device().executed().is_empty());

        assert_eq!(tb.send_request(GetSupply(Supply::Vd)).unwrap(), 2500);
        assert_eq!(tb.device().executed_names(), vec!["_SetVD", "Pon", "_GetVD"]);
    }

    #[test]
    fn board_id() {
        let mut tb = Testboard::new(SimulatedDevice::default());
        assert_eq!(tb.send_request(GetBoardId).unwrap(), 42);
        assert_eq!(tb.name(), "DTB_SIMULATED");
    }
}

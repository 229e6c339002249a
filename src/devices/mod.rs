//! Implements discovering, opening, and talking to DTBs connected over USB.

use log::{debug, info};
use serialport::{SerialPortInfo, SerialPortType};

use crate::errors::DeviceError;

pub mod simulated;
pub mod usb;

pub use simulated::SimulatedDevice;
pub use usb::UsbDevice;

/// The default timeout for a DTB connection in seconds
pub const SERIAL_TIMEOUT_SECONDS: u64 = 5;

/// The default timeout for a DTB connection in nanoseconds
pub const SERIAL_TIMEOUT_NS: u32 = 0;

/// Every DTB reports a USB serial number starting with this prefix
pub const DTB_NAME_PREFIX: &str = "DTB_";

/// An open connection to a DTB's RPC interface.
///
/// Calls without a return value are queued and only go out on [`flush`].
/// Calls with a return value flush the queue first, so everything issued
/// before them has executed by the time their result arrives.
///
/// [`flush`]: DeviceSession::flush
pub trait DeviceSession {
    /// Queues a call whose result is not needed
    fn send(&mut self, call: &str, args: &[u8]) -> Result<(), DeviceError>;

    /// Flushes the queue, executes the call and waits for its result
    fn request(&mut self, call: &str, args: &[u8]) -> Result<Vec<u8>, DeviceError>;

    /// Transmits every queued call
    fn flush(&mut self) -> Result<(), DeviceError>;

    /// Closes the connection. Later calls fail with [`DeviceError::Closed`].
    fn close(&mut self) -> Result<(), DeviceError>;

    /// The name of the connected board
    fn name(&self) -> &str;
}

/// The information of a DTB serial port
#[derive(Clone, Debug)]
pub struct DtbPort {
    /// The board name, e.g. `DTB_WRE3TS`
    pub name: String,
    pub port_info: SerialPortInfo,
}

/// Finds all DTBs connected to the computer over usb.
pub fn find_dtbs() -> Result<Vec<DtbPort>, DeviceError> {
    // Get all available serial ports
    let ports = serialport::available_ports()?;
    debug!("Found {} serial ports", ports.len());

    Ok(filter_dtb_ports(ports))
}

/// Keeps the USB ports that carry a DTB serial number
fn filter_dtb_ports(ports: Vec<SerialPortInfo>) -> Vec<DtbPort> {
    let mut dtbs = Vec::new();

    for port in ports {
        // If it is not a USB port, ignore it.
        let serial = match &port.port_type {
            SerialPortType::UsbPort(info) => info.serial_number.clone(),
            _ => continue,
        };

        match serial {
            Some(name) if name.starts_with(DTB_NAME_PREFIX) => {
                dtbs.push(DtbPort { name, port_info: port })
            }
            _ => continue,
        }
    }

    dtbs
}

/// Picks the DTB to connect to.
///
/// With a name the matching board is returned. Without one, the only
/// connected board is returned; several boards need an explicit name.
pub fn select_dtb(dtbs: Vec<DtbPort>, name: Option<&str>) -> Result<DtbPort, DeviceError> {
    if dtbs.is_empty() {
        return Err(DeviceError::NoDevice);
    }

    match name {
        Some(name) => dtbs
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| DeviceError::DeviceNotFound(name.to_string())),
        None if dtbs.len() == 1 => Ok(dtbs.into_iter().next().ok_or(DeviceError::NoDevice)?),
        None => {
            for d in &dtbs {
                info!("Connected DTB {} on {}", d.name, d.port_info.port_name);
            }
            Err(DeviceError::AmbiguousDevice(
                dtbs.into_iter().map(|d| d.name).collect(),
            ))
        }
    }
}

/// Finds and opens a DTB over USB
pub fn open_dtb(name: Option<&str>) -> Result<UsbDevice, DeviceError> {
    let dtb = select_dtb(find_dtbs()?, name)?;
    UsbDevice::open(&dtb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn usb_port(port_name: &str, serial: Option<&str>) -> SerialPortInfo {
        SerialPortInfo {
            port_name: port_name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x0403,
                pid: 0x6014,
                serial_number: serial.map(str::to_string),
                manufacturer: None,
                product: None,
            }),
        }
    }

    #[test]
    fn only_dtb_serials_are_kept() {
        let ports = vec![
            usb_port("/dev/ttyUSB0", Some("DTB_WRE3TS")),
            usb_port("/dev/ttyUSB1", Some("FT232R")),
            usb_port("/dev/ttyUSB2", None),
            SerialPortInfo {
                port_name: "/dev/ttyS0".to_string(),
                port_type: SerialPortType::Unknown,
            },
        ];
        let dtbs = filter_dtb_ports(ports);
        assert_eq!(dtbs.len(), 1);
        assert_eq!(dtbs[0].name, "DTB_WRE3TS");
    }

    #[test]
    fn selection() {
        let dtbs = filter_dtb_ports(vec![
            usb_port("/dev/ttyUSB0", Some("DTB_A")),
            usb_port("/dev/ttyUSB1", Some("DTB_B")),
        ]);

        assert!(matches!(
            select_dtb(dtbs.clone(), None),
            Err(DeviceError::AmbiguousDevice(names)) if names.len() == 2
        ));
        assert_eq!(select_dtb(dtbs.clone(), Some("DTB_B")).unwrap().name, "DTB_B");
        assert!(matches!(
            select_dtb(dtbs, Some("DTB_C")),
            Err(DeviceError::DeviceNotFound(_))
        ));
        assert!(matches!(select_dtb(Vec::new(), None), Err(DeviceError::NoDevice)));
    }
}

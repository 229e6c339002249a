//! A DTB connected over its USB serial interface. This module does not have async support.
//!
//! Every call is sent as a frame
//!
//! ```text
//! A5 5A | call id (u16 LE) | payload length (u32 LE) | payload | CRC16 (BE)
//! ```
//!
//! and every return value comes back as the same layout behind a `5A A5`
//! header. The call id is the position of the call in
//! [`HOST_CALLS`](crate::commands::HOST_CALLS).

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use log::{debug, trace};
use serialport::SerialPort;

use super::{DeviceSession, DtbPort, SERIAL_TIMEOUT_NS, SERIAL_TIMEOUT_SECONDS};
use crate::checks::FrameChecks;
use crate::commands::call_id;
use crate::errors::{DecodeError, DeviceError};

/// Header of a host->DTB frame
pub const REQUEST_HEADER: [u8; 2] = [0xA5, 0x5A];

/// Header of a DTB->host frame
pub const RESPONSE_HEADER: [u8; 2] = [0x5A, 0xA5];

/// Largest payload accepted in a response frame
pub const MAX_PAYLOAD: u32 = 4 * 1024 * 1024;

/// The DTB's USB interface, with the queue of calls not yet transmitted
pub struct UsbDevice<T: Read + Write = Box<dyn SerialPort>> {
    name: String,
    port: Option<T>,
    tx_buffer: Vec<u8>,
    timeout: Duration,
    checks: FrameChecks,
}

impl UsbDevice {
    /// Opens the serial port of a discovered DTB
    pub fn open(dtb: &DtbPort) -> Result<Self, DeviceError> {
        debug!("Opening {} on {}", dtb.name, dtb.port_info.port_name);

        let port = serialport::new(&dtb.port_info.port_name, 115200)
            .parity(serialport::Parity::None)
            .timeout(Duration::new(SERIAL_TIMEOUT_SECONDS, SERIAL_TIMEOUT_NS))
            .stop_bits(serialport::StopBits::One)
            .open()?;

        Ok(UsbDevice::new(&dtb.name, port))
    }
}

impl<T: Read + Write> UsbDevice<T> {
    /// Wraps an already open stream
    pub fn new(name: &str, port: T) -> Self {
        UsbDevice {
            name: name.to_string(),
            port: Some(port),
            tx_buffer: Vec::new(),
            timeout: Duration::new(SERIAL_TIMEOUT_SECONDS, SERIAL_TIMEOUT_NS),
            checks: FrameChecks::ALL,
        }
    }

    /// Changes which checks are run on response frames
    pub fn set_checks(&mut self, checks: FrameChecks) {
        self.checks = checks;
    }

    /// Changes how long to wait for a response header
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Number of bytes queued but not yet transmitted
    pub fn queued_bytes(&self) -> usize {
        self.tx_buffer.len()
    }

    fn port(&mut self) -> Result<&mut T, DeviceError> {
        self.port.as_mut().ok_or(DeviceError::Closed)
    }

    /// Recieves the response frame for a call
    fn response_for(&mut self, id: u16) -> Result<Vec<u8>, DeviceError> {
        let (timeout, checks) = (self.timeout, self.checks);
        let port = self.port()?;
        Ok(decode_response(port, id, timeout, checks)?)
    }
}

/// Encodes a call into a request frame
pub fn encode_request(id: u16, args: &[u8]) -> Vec<u8> {
    let mut packet = Vec::from(REQUEST_HEADER);
    packet.extend(id.to_le_bytes());
    packet.extend((args.len() as u32).to_le_bytes());
    packet.extend(args);

    // The CRC goes at the end, upper byte first
    let checksum = crc::Crc::<u16>::new(&crate::DTB_CRC16).checksum(&packet);
    packet.extend(checksum.to_be_bytes());
    packet
}

/// Reads one response frame from a stream and returns its payload
pub fn decode_response<R: Read>(
    stream: &mut R,
    expected_id: u16,
    timeout: Duration,
    checks: FrameChecks,
) -> Result<Vec<u8>, DecodeError> {
    // The header needs to be recieved within the timeout
    let countdown = Instant::now() + timeout;
    let mut header_index = 0;

    // Match the header byte by byte, starting over on any unexpected byte
    while header_index < RESPONSE_HEADER.len() {
        if Instant::now() > countdown {
            return Err(DecodeError::HeaderTimeout);
        }

        let mut b = [0u8; 1];
        stream.read_exact(&mut b)?;

        if b[0] == RESPONSE_HEADER[header_index] {
            header_index += 1;
        } else if b[0] == RESPONSE_HEADER[0] {
            header_index = 1;
        } else {
            header_index = 0;
        }
    }

    let mut packet = Vec::from(RESPONSE_HEADER);

    // Call id and payload length
    let mut b = [0u8; 6];
    stream.read_exact(&mut b)?;
    packet.extend_from_slice(&b);
    let id = u16::from_le_bytes([b[0], b[1]]);
    let length = u32::from_le_bytes([b[2], b[3], b[4], b[5]]);

    if checks.contains(FrameChecks::LENGTH) && length > MAX_PAYLOAD {
        return Err(DecodeError::PacketLengthError);
    }

    // DO NOT CHANGE THIS TO READ. read_exact is required to not lose data.
    let mut payload = vec![0u8; length as usize];
    stream.read_exact(&mut payload)?;
    packet.extend(&payload);

    let mut crc = [0u8; 2];
    stream.read_exact(&mut crc)?;

    if checks.contains(FrameChecks::CRC) {
        packet.extend(crc);
        if crc::Crc::<u16>::new(&crate::DTB_CRC16).checksum(&packet) != 0 {
            return Err(DecodeError::CrcError);
        }
    }

    if checks.contains(FrameChecks::CALL_ID) && id != expected_id {
        return Err(DecodeError::ExpectedCall(expected_id, id));
    }

    Ok(payload)
}

fn lookup(call: &str) -> Result<u16, DeviceError> {
    call_id(call).ok_or_else(|| DeviceError::UnknownCall(call.to_string()))
}

impl<T: Read + Write> DeviceSession for UsbDevice<T> {
    fn send(&mut self, call: &str, args: &[u8]) -> Result<(), DeviceError> {
        self.port()?;
        let id = lookup(call)?;
        trace!("Queueing {call} ({} bytes)", args.len());
        self.tx_buffer.extend(encode_request(id, args));
        Ok(())
    }

    fn request(&mut self, call: &str, args: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let id = lookup(call)?;
        trace!("Requesting {call} ({} bytes)", args.len());
        self.tx_buffer.extend(encode_request(id, args));
        self.flush()?;

        let payload = self.response_for(id)?;
        trace!("Response to {call} ({} bytes)", payload.len());
        Ok(payload)
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        let data = std::mem::take(&mut self.tx_buffer);
        let port = self.port()?;
        if !data.is_empty() {
            port.write_all(&data)?;
        }
        port.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.port.is_some() {
            let result = self.flush();
            self.port = None;
            result
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A stream that records writes and replays a canned input
    struct Loopback {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
        flushes: usize,
    }

    impl Loopback {
        fn new(input: Vec<u8>) -> Self {
            Loopback {
                input: Cursor::new(input),
                written: Vec::new(),
                flushes: 0,
            }
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn response_frame(id: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = Vec::from(RESPONSE_HEADER);
        packet.extend(id.to_le_bytes());
        packet.extend((payload.len() as u32).to_le_bytes());
        packet.extend(payload);
        let checksum = crc::Crc::<u16>::new(&crate::DTB_CRC16).checksum(&packet);
        packet.extend(checksum.to_be_bytes());
        packet
    }

    #[test]
    fn request_frame_layout() {
        let frame = encode_request(0x0102, &[9, 8]);
        assert_eq!(&frame[..8], &[0xA5, 0x5A, 0x02, 0x01, 2, 0, 0, 0]);
        assert_eq!(&frame[8..10], &[9, 8]);
        assert_eq!(frame.len(), 12);
        assert_eq!(crc::Crc::<u16>::new(&crate::DTB_CRC16).checksum(&frame), 0);
    }

    #[test]
    fn response_skips_garbage_before_header() {
        let mut input = vec![0x00, 0x5A, 0x13];
        input.extend(response_frame(3, &[1, 2, 3]));
        let payload = decode_response(
            &mut Cursor::new(input),
            3,
            Duration::from_secs(1),
            FrameChecks::ALL,
        )
        .unwrap();
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[test]
    fn corrupted_response_fails_crc() {
        let mut frame = response_frame(3, &[1, 2, 3]);
        frame[9] ^= 0xff;
        let result = decode_response(
            &mut Cursor::new(frame.clone()),
            3,
            Duration::from_secs(1),
            FrameChecks::ALL,
        );
        assert!(matches!(result, Err(DecodeError::CrcError)));

        let unchecked = decode_response(
            &mut Cursor::new(frame),
            3,
            Duration::from_secs(1),
            FrameChecks::NONE,
        );
        assert!(unchecked.is_ok());
    }

    #[test]
    fn response_for_wrong_call() {
        let result = decode_response(
            &mut Cursor::new(response_frame(4, &[])),
            3,
            Duration::from_secs(1),
            FrameChecks::ALL,
        );
        assert!(matches!(result, Err(DecodeError::ExpectedCall(3, 4))));
    }

    #[test]
    fn queued_calls_only_go_out_on_flush() {
        let id = call_id("GetBoardId").unwrap();
        let mut dev = UsbDevice::new("DTB_TEST", Loopback::new(response_frame(id, &[7, 0])));

        dev.send("Pon", &[]).unwrap();
        dev.send("uDelay", &[100, 0]).unwrap();
        assert!(dev.port.as_ref().unwrap().written.is_empty());
        assert!(dev.queued_bytes() > 0);

        let payload = dev.request("GetBoardId", &[]).unwrap();
        assert_eq!(payload, vec![7, 0]);
        assert_eq!(dev.queued_bytes(), 0);
        assert_eq!(dev.port.as_ref().unwrap().flushes, 1);

        let written = &dev.port.as_ref().unwrap().written;
        let pon = encode_request(call_id("Pon").unwrap(), &[]);
        assert_eq!(&written[..pon.len()], pon.as_slice());
    }

    #[test]
    fn unknown_call_is_rejected() {
        let mut dev = UsbDevice::new("DTB_TEST", Loopback::new(Vec::new()));
        assert!(matches!(
            dev.send("NoSuchCall", &[]),
            Err(DeviceError::UnknownCall(_))
        ));
    }

    #[test]
    fn closed_device_fails() {
        let mut dev = UsbDevice::new("DTB_TEST", Loopback::new(Vec::new()));
        dev.close().unwrap();
        assert!(matches!(dev.send("Pon", &[]), Err(DeviceError::Closed)));
        assert!(matches!(dev.flush(), Err(DeviceError::Closed)));
    }
}

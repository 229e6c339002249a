//! Compares the call table of the DTB firmware against the host's.

use log::{debug, error};
use serde::Deserialize;

use super::Hal;
use crate::commands::{GetRpcCallCount, GetRpcCallName, HOST_CALLS};
use crate::devices::DeviceSession;
use crate::errors::DeviceError;
use crate::hash::hash_call_table;

/// What to do when the firmware call table differs from the host's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityMode {
    /// Log every mismatch and carry on
    #[default]
    Lenient,
    /// Refuse to open the session
    Strict,
}

/// A call id whose name differs between firmware and host.
///
/// A call that only exists on one side has an empty name on the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMismatch {
    pub id: usize,
    pub device: String,
    pub host: String,
}

/// The outcome of a compatibility check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityReport {
    pub host_hash: u32,
    /// The firmware does not report a hash yet, this is always 0
    pub device_hash: u32,
    pub host_count: usize,
    pub device_count: usize,
    pub mismatches: Vec<CallMismatch>,
}

impl CompatibilityReport {
    pub fn is_compatible(&self) -> bool {
        self.host_count == self.device_count && self.mismatches.is_empty()
    }
}

/// Lists every id where the two call tables disagree
pub fn compare_call_tables<S: AsRef<str>, H: AsRef<str>>(device: &[S], host: &[H]) -> Vec<CallMismatch> {
    let mut mismatches = Vec::new();

    for id in 0..device.len().max(host.len()) {
        let device_name = device.get(id).map(|s| s.as_ref()).unwrap_or("");
        let host_name = host.get(id).map(|s| s.as_ref()).unwrap_or("");

        if device_name != host_name {
            mismatches.push(CallMismatch {
                id,
                device: device_name.to_string(),
                host: host_name.to_string(),
            });
        }
    }

    mismatches
}

impl<D: DeviceSession> Hal<D> {
    /// Checks whether host and firmware agree on the call table.
    ///
    /// The names are only fetched one by one when the call counts differ.
    /// Mismatches are logged but never fail the check.
    pub fn check_compatibility(&mut self) -> Result<CompatibilityReport, DeviceError> {
        debug!("Hashing Host RPC command list.");
        let host_hash = hash_call_table(HOST_CALLS);
        debug!("Host Hash: {host_hash}");

        // The firmware has no call to report its hash
        let device_hash = 0;
        debug!("DTB Hash: {device_hash}");

        let device_count = self.testboard.send_request(GetRpcCallCount)?.max(0) as usize;
        let host_count = HOST_CALLS.len();

        let mut report = CompatibilityReport {
            host_hash,
            device_hash,
            host_count,
            device_count,
            mismatches: Vec::new(),
        };

        if device_count == host_count {
            return Ok(report);
        }

        error!("RPC Call count of DTB and host do not match:");
        error!("   {device_count} DTB RPC calls vs. {host_count} host RPC calls defined!");

        let mut device_names = Vec::with_capacity(device_count);
        for id in 0..device_count {
            match self.testboard.send_request(GetRpcCallName(id as i32))? {
                Some(name) => device_names.push(name),
                None => {
                    error!("Error in fetching DTB RPC call name.");
                    device_names.push(String::new());
                }
            }
        }

        report.mismatches = compare_call_tables(&device_names[..], HOST_CALLS);
        for m in &report.mismatches {
            error!("ID {}: (DTB) \"{}\" != (Host) \"{}\"", m.id, m.device, m.host);
        }
        error!("Please update your DTB with the correct flash file!");

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tables_have_no_mismatches() {
        assert!(compare_call_tables(HOST_CALLS, HOST_CALLS).is_empty());
    }

    #[test]
    fn missing_calls_compare_as_empty() {
        let device = ["A", "B"];
        let host = ["A", "C", "D"];
        let m = compare_call_tables(&device[..], &host[..]);
        assert_eq!(
            m,
            vec![
                CallMismatch { id: 1, device: "B".into(), host: "C".into() },
                CallMismatch { id: 2, device: "".into(), host: "D".into() },
            ]
        );
    }
}

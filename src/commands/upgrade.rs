//! Implements the firmware upgrade calls

use super::{encode, Command};

/// Returns the upgrade protocol version the DTB speaks
#[derive(Copy, Clone, Debug)]
pub struct UpgradeGetVersion;

impl Command for UpgradeGetVersion {
    type Response = u16;

    fn name(&self) -> &'static str {
        "UpgradeGetVersion"
    }
}

/// Prepares an upgrade, returns a non-zero code on failure
#[derive(Copy, Clone, Debug)]
pub struct UpgradeStart(pub u16);

impl Command for UpgradeStart {
    type Response = u8;

    fn name(&self) -> &'static str {
        "UpgradeStart"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Sends one record of the flash file, returns a non-zero code on failure
#[derive(Clone, Debug)]
pub struct UpgradeData(pub String);

impl Command for UpgradeData {
    type Response = u8;

    fn name(&self) -> &'static str {
        "UpgradeData"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Returns the accumulated upgrade error code
#[derive(Copy, Clone, Debug)]
pub struct UpgradeError;

impl Command for UpgradeError {
    type Response = u8;

    fn name(&self) -> &'static str {
        "UpgradeError"
    }
}

/// Returns the message describing the last upgrade error
#[derive(Copy, Clone, Debug)]
pub struct UpgradeErrorMsg;

impl Command for UpgradeErrorMsg {
    type Response = String;

    fn name(&self) -> &'static str {
        "UpgradeErrorMsg"
    }
}

/// Writes the downloaded records into flash
#[derive(Copy, Clone, Debug)]
pub struct UpgradeExec(pub u16);

impl Command for UpgradeExec {
    type Response = ();

    fn name(&self) -> &'static str {
        "UpgradeExec"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

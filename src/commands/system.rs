//! Implements calls that deal directly with the DTB itself

use super::{decode, encode, Command};
use crate::errors::DecodeError;

/// Asks the DTB how many calls its firmware call table holds
#[derive(Copy, Clone, Debug)]
pub struct GetRpcCallCount;

impl Command for GetRpcCallCount {
    type Response = i32;

    fn name(&self) -> &'static str {
        "GetRpcCallCount"
    }
}

/// Fetches the name of the call with the given id from the DTB call table.
///
/// # Members
///
/// * `0` - The call id
///
/// The response is `None` if the DTB could not provide the name.
#[derive(Copy, Clone, Debug)]
pub struct GetRpcCallName(pub i32);

impl Command for GetRpcCallName {
    type Response = Option<String>;

    fn name(&self) -> &'static str {
        "GetRpcCallName"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }

    fn decode_response(payload: Vec<u8>) -> Result<Self::Response, DecodeError> {
        // The DTB always sends a name, even when it has none to give
        let (ok, name): (bool, String) = decode(&payload)?;
        Ok(if ok { Some(name) } else { None })
    }
}

/// Reads the multi-line startup information string of the DTB
#[derive(Copy, Clone, Debug)]
pub struct GetInfo;

impl Command for GetInfo {
    type Response = String;

    fn name(&self) -> &'static str {
        "GetInfo"
    }
}

/// Reads the board id
#[derive(Copy, Clone, Debug)]
pub struct GetBoardId;

impl Command for GetBoardId {
    type Response = u16;

    fn name(&self) -> &'static str {
        "GetBoardId"
    }
}

/// Blinks the LEDs of the DTB
#[derive(Copy, Clone, Debug)]
pub struct Welcome;

impl Command for Welcome {
    type Response = ();

    fn name(&self) -> &'static str {
        "Welcome"
    }
}

/// Resets the DTB to its power-up defaults
#[derive(Copy, Clone, Debug)]
pub struct Init;

impl Command for Init {
    type Response = ();

    fn name(&self) -> &'static str {
        "Init"
    }
}

/// Makes the DTB wait the given number of microseconds before executing the
/// next queued call.
#[derive(Copy, Clone, Debug)]
pub struct UDelay(pub u16);

impl Command for UDelay {
    type Response = ();

    fn name(&self) -> &'static str {
        "uDelay"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

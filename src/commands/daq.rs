//! Implements calls for the data acquisition channels

use serde::{Deserialize, Serialize};

use super::{encode, Command};

/// Allocates the buffer of a DAQ channel.
///
/// Returns the number of words the DTB actually allocated.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct DaqOpen {
    pub buffer_size: u32,
    pub channel: u8,
}

impl Command for DaqOpen {
    type Response = u32;

    fn name(&self) -> &'static str {
        "Daq_Open"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(self)
    }
}

/// Frees the buffer of a DAQ channel, discarding its data
#[derive(Copy, Clone, Debug)]
pub struct DaqClose(pub u8);

impl Command for DaqClose {
    type Response = ();

    fn name(&self) -> &'static str {
        "Daq_Close"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Starts recording on a DAQ channel
#[derive(Copy, Clone, Debug)]
pub struct DaqStart(pub u8);

impl Command for DaqStart {
    type Response = ();

    fn name(&self) -> &'static str {
        "Daq_Start"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Stops recording on a DAQ channel. Buffered data is kept.
#[derive(Copy, Clone, Debug)]
pub struct DaqStop(pub u8);

impl Command for DaqStop {
    type Response = ();

    fn name(&self) -> &'static str {
        "Daq_Stop"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Selects the 160 MHz deserializer with the given phase
#[derive(Copy, Clone, Debug)]
pub struct DaqSelectDeser160(pub u8);

impl Command for DaqSelectDeser160 {
    type Response = ();

    fn name(&self) -> &'static str {
        "Daq_Select_Deser160"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Selects the 400 MHz deserializer used with TBM modules
#[derive(Copy, Clone, Debug)]
pub struct DaqSelectDeser400;

impl Command for DaqSelectDeser400 {
    type Response = ();

    fn name(&self) -> &'static str {
        "Daq_Select_Deser400"
    }
}

/// Returns the number of words waiting in a DAQ channel
#[derive(Copy, Clone, Debug)]
pub struct DaqGetSize(pub u8);

impl Command for DaqGetSize {
    type Response = u32;

    fn name(&self) -> &'static str {
        "Daq_GetSize"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.0)
    }
}

/// Reads up to `block_size` words from a DAQ channel
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct DaqRead {
    pub block_size: u32,
    pub channel: u8,
}

/// The words read from a channel and what is still left in its buffer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaqReadResponse {
    pub status: u8,
    pub data: Vec<u16>,
    pub remaining: u32,
}

impl Command for DaqRead {
    type Response = DaqReadResponse;

    fn name(&self) -> &'static str {
        "Daq_Read"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(self)
    }
}

// Module that contains all calls that can be sent to the DTB

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::DecodeError;

mod system;
pub use system::{GetBoardId, GetInfo, GetRpcCallCount, GetRpcCallName, Init, UDelay, Welcome};

mod power;
pub use power::{GetSupply, PowerSwitch, SetSupply, Supply, Switch};

mod signal;
pub use signal::{PgSetCmd, PgSingle, ProbeChannel, SigSetDelay, SigSetLevel, SignalProbe};

mod roc;
pub use roc::{
    ModAddr, RocChipMask, RocClrCal, RocColEnable, RocI2cAddr, RocPixCal, RocPixMask, RocPixTrim,
    RocSetDac, TbmEnable, TbmSet, TrimChip,
};

mod daq;
pub use daq::{
    DaqClose, DaqGetSize, DaqOpen, DaqRead, DaqReadResponse, DaqSelectDeser160,
    DaqSelectDeser400, DaqStart, DaqStop,
};

mod calibrate;
pub use calibrate::{
    CalibrateDacDacScan, CalibrateDacScan, CalibrateMap, CalibrateMapResponse, CalibratePixel,
    CalibratePixelResponse, CalibrateScanResponse,
};

mod upgrade;
pub use upgrade::{
    UpgradeData, UpgradeError, UpgradeErrorMsg, UpgradeExec, UpgradeGetVersion, UpgradeStart,
};

/// A command trait that every DTB call implements
pub trait Command {
    type Response: DeserializeOwned;

    /// Name of the call in the DTB call table
    fn name(&self) -> &'static str;

    /// Encodes the host->DTB argument payload. Calls without arguments
    /// send an empty payload.
    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Decodes the payload of a DTB->host return value
    fn decode_response(payload: Vec<u8>) -> Result<Self::Response, DecodeError> {
        decode(&payload)
    }
}

/// Fixed width little endian integers, sequences prefixed with a `u64` length
fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// Encodes call arguments or return values
pub fn encode<T: Serialize + ?Sized>(value: &T) -> bincode::Result<Vec<u8>> {
    wire_options().serialize(value)
}

/// Decodes a payload, which must be consumed completely
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, DecodeError> {
    Ok(wire_options().deserialize(payload)?)
}

/// Every call known to the host, in call table order.
///
/// The position of a name in this table is its call id on the wire. The DTB
/// firmware advertises its own table, which is compared against this one when
/// a session is opened.
pub const HOST_CALLS: &[&str] = &[
    "GetRpcCallCount",
    "GetRpcCallName",
    "GetInfo",
    "GetBoardId",
    "Welcome",
    "Init",
    "uDelay",
    "_SetVA",
    "_SetVD",
    "_SetIA",
    "_SetID",
    "_GetVA",
    "_GetVD",
    "_GetIA",
    "_GetID",
    "Pon",
    "Poff",
    "HVon",
    "HVoff",
    "Sig_SetDelay",
    "Sig_SetLevel",
    "SignalProbeD1",
    "SignalProbeD2",
    "SignalProbeA1",
    "SignalProbeA2",
    "Pg_SetCmd",
    "Pg_Single",
    "roc_I2cAddr",
    "roc_SetDAC",
    "roc_Chip_Mask",
    "roc_Col_Enable",
    "roc_Pix_Mask",
    "roc_Pix_Trim",
    "roc_Pix_Cal",
    "roc_ClrCal",
    "TrimChip",
    "tbm_Enable",
    "mod_Addr",
    "tbm_Set",
    "Daq_Open",
    "Daq_Close",
    "Daq_Start",
    "Daq_Stop",
    "Daq_Select_Deser160",
    "Daq_Select_Deser400",
    "Daq_GetSize",
    "Daq_Read",
    "CalibrateMap",
    "CalibratePixel",
    "CalibrateDacScan",
    "CalibrateDacDacScan",
    "UpgradeGetVersion",
    "UpgradeStart",
    "UpgradeData",
    "UpgradeError",
    "UpgradeErrorMsg",
    "UpgradeExec",
];

/// Looks up the call id of a call name
pub fn call_id(name: &str) -> Option<u16> {
    HOST_CALLS.iter().position(|c| *c == name).map(|i| i as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_table_has_unique_names() {
        for (i, name) in HOST_CALLS.iter().enumerate() {
            assert_eq!(call_id(name), Some(i as u16), "duplicate call {name}");
        }
    }

    #[test]
    fn arguments_are_little_endian() {
        let payload = DaqOpen {
            buffer_size: 0x0102_0304,
            channel: 1,
        }
        .encode_request()
        .unwrap();
        assert_eq!(payload, vec![4, 3, 2, 1, 1]);
        assert_eq!(SigSetDelay(3, 0x0a22).encode_request().unwrap(), vec![3, 0x22, 0x0a]);
        assert!(PgSingle.encode_request().unwrap().is_empty());
    }

    #[test]
    fn vectors_carry_their_length() {
        let payload = TrimChip(vec![15, -1]).encode_request().unwrap();
        assert_eq!(payload, vec![2, 0, 0, 0, 0, 0, 0, 0, 15, 0, 0xff, 0xff]);
    }

    #[test]
    fn short_payload_is_an_error() {
        assert!(matches!(
            GetBoardId::decode_response(vec![1]),
            Err(DecodeError::Payload(_))
        ));
        // A vector announcing more elements than the payload holds
        let mut payload = encode(&(0i32, 1000u64)).unwrap();
        payload.extend([1, 0]);
        assert!(CalibrateDacScan::decode_response(payload).is_err());
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        assert!(GetBoardId::decode_response(vec![1, 0, 0]).is_err());
        assert_eq!(GetBoardId::decode_response(vec![42, 0]).unwrap(), 42);
    }

    #[test]
    fn every_command_is_in_the_call_table() {
        let names = [
            GetRpcCallName(0).name(),
            SetSupply(Supply::Vd, 0).name(),
            GetSupply(Supply::Ia).name(),
            PowerSwitch(Switch::HvOff).name(),
            SignalProbe(ProbeChannel::A2, 0).name(),
            DaqRead { block_size: 0, channel: 0 }.name(),
            CalibrateDacDacScan::default().name(),
            UpgradeExec(0).name(),
        ];
        for name in names {
            assert!(call_id(name).is_some(), "{name} missing");
        }
    }
}

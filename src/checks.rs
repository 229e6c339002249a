/// Frame decoding checks
use bitflags::bitflags;

bitflags! {
    /// These flags determine what checks the USB transport will perform
    /// on a received response frame.
    pub struct FrameChecks: u8 {
        const NONE = 0b00000000;
        const CALL_ID = 0b00000001;
        const CRC = 0b00000010;
        const LENGTH = 0b00000100;
        const ALL = Self::CALL_ID.bits | Self::CRC.bits | Self::LENGTH.bits;
    }
}

impl Default for FrameChecks {
    fn default() -> Self {
        FrameChecks::ALL
    }
}

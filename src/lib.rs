pub mod checks;
pub mod commands;
pub mod config;
pub mod devices;
pub mod errors;
pub mod hal;
pub mod hash;
pub mod pixel;
pub mod testboard;
pub mod units;

use crc::Algorithm;

/// The DTB uses CRC16/XMODEM as the CRC16.
pub const DTB_CRC16: Algorithm<u16> = crc::CRC_16_XMODEM;

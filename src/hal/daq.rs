//! Data acquisition sessions on the DTB's two DAQ channels.
//!
//! Channel 0 always carries the ROC data. Channel 1 is only used when the
//! module has TBMs and carries the data of the second TBM core.

use log::{debug, warn};

use super::Hal;
use crate::commands::{
    DaqClose, DaqGetSize, DaqOpen, DaqRead, DaqSelectDeser160, DaqSelectDeser400, DaqStart, DaqStop, PgSingle,
    UDelay,
};
use crate::devices::DeviceSession;
use crate::errors::DeviceError;

/// Words allocated per channel when a session starts
pub const DAQ_BUFFER_SIZE: u32 = 50_000_000;

/// Largest number of words moved by a single `Daq_Read`
pub const DAQ_MAX_TRANSFER: u32 = 0x8000;

/// Device side delay after each trigger, in µs
const TRIGGER_DELAY_US: u16 = 20;

/// Device side delay around channel start, in µs
const START_DELAY_US: u16 = 100;

/// The host's view of a DAQ channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Open,
    Running,
    Stopped,
}

/// Data read from the DAQ channels.
///
/// `remaining` counts the words still buffered on the DTB, e.g. data that
/// arrived while reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaqReadout {
    pub data: Vec<u16>,
    pub remaining: u32,
}

fn channels_for(tbms: u8) -> &'static [u8] {
    if tbms > 0 {
        &[0, 1]
    } else {
        &[0]
    }
}

impl<D: DeviceSession> Hal<D> {
    /// The state of a DAQ channel as tracked by the host, `None` for
    /// channels the DTB does not have
    pub fn daq_state(&self, channel: u8) -> Option<ChannelState> {
        self.channels.get(channel as usize).copied()
    }

    fn daq_expect(&self, channel: u8, operation: &str, expected: &[ChannelState]) {
        let state = self.channels[channel as usize];
        if !expected.contains(&state) {
            warn!("DAQ {operation} on channel {channel} while it is {state:?}");
        }
    }

    /// Opens and starts the DAQ channels.
    ///
    /// With TBMs both channels record through the 400 MHz deserializer,
    /// otherwise only channel 0 through the 160 MHz one at the given phase.
    /// Channel 1 is started before channel 0.
    pub fn daq_start(&mut self, deser160_phase: u8, tbms: u8) -> Result<(), DeviceError> {
        debug!("Starting new DAQ session.");
        let channels = channels_for(tbms);

        for &ch in channels {
            self.daq_expect(ch, "start", &[ChannelState::Closed]);
            let allocated = self.testboard.send_request(DaqOpen {
                buffer_size: DAQ_BUFFER_SIZE,
                channel: ch,
            })?;
            debug!("Allocated buffer size, Channel {ch}: {allocated}");
            if allocated < DAQ_BUFFER_SIZE {
                warn!("Channel {ch} only got a buffer of {allocated} words");
            }
            self.channels[ch as usize] = ChannelState::Open;
        }

        if tbms > 0 {
            debug!("Enabling Deserializer400 for data acquisition.");
            self.testboard.send_command(DaqSelectDeser400)?;
        } else {
            debug!("Enabling Deserializer160 for data acquisition. Phase: {deser160_phase}");
            self.testboard.send_command(DaqSelectDeser160(deser160_phase))?;
        }
        self.testboard.send_command(UDelay(START_DELAY_US))?;

        for &ch in channels.iter().rev() {
            self.testboard.send_command(DaqStart(ch))?;
        }
        self.testboard.send_command(UDelay(START_DELAY_US))?;
        self.testboard.flush()?;

        for &ch in channels {
            self.channels[ch as usize] = ChannelState::Running;
        }
        Ok(())
    }

    /// Runs the pattern generator `n` times
    pub fn daq_trigger(&mut self, n: u32) -> Result<(), DeviceError> {
        debug!("Triggering {n}x");
        self.daq_expect(0, "trigger", &[ChannelState::Running]);

        for _ in 0..n {
            self.testboard.send_command(PgSingle)?;
            self.testboard.send_command(UDelay(TRIGGER_DELAY_US))?;
        }
        self.testboard.flush()
    }

    /// Stops recording. The buffered data stays available for reading.
    pub fn daq_stop(&mut self, tbms: u8) -> Result<(), DeviceError> {
        for &ch in channels_for(tbms).iter().rev() {
            self.daq_expect(ch, "stop", &[ChannelState::Running, ChannelState::Stopped]);
            self.testboard.send_command(DaqStop(ch))?;
            self.channels[ch as usize] = ChannelState::Stopped;
        }
        debug!("Stopped DAQ session. Data still in buffers.");
        Ok(())
    }

    /// Reads all buffered data, channel 1 appended after channel 0
    pub fn daq_read(&mut self, tbms: u8) -> Result<DaqReadout, DeviceError> {
        let channels = channels_for(tbms);

        let mut sizes = Vec::with_capacity(channels.len());
        for &ch in channels {
            self.daq_expect(ch, "read", &[ChannelState::Running, ChannelState::Stopped]);
            let size = self.testboard.send_request(DaqGetSize(ch))?;
            debug!("Available data in channel {ch}: {size}");
            sizes.push(size);
        }

        let mut readout = DaqReadout::default();
        for (&ch, &size) in channels.iter().zip(&sizes) {
            let (data, remaining) = self.daq_read_channel(ch, size)?;
            debug!(
                "Read {} data words in channel {ch}, {remaining} words remaining in buffer.",
                data.len()
            );
            readout.data.extend(data);
            readout.remaining += remaining;
        }

        Ok(readout)
    }

    /// Reads `size` words from one channel in transfers of at most
    /// [`DAQ_MAX_TRANSFER`] words
    fn daq_read_channel(&mut self, channel: u8, size: u32) -> Result<(Vec<u16>, u32), DeviceError> {
        let mut data = Vec::with_capacity(size as usize);
        let mut wanted = size;
        let mut remaining;

        loop {
            let block = wanted.min(DAQ_MAX_TRANSFER);
            let response = self.testboard.send_request(DaqRead {
                block_size: block,
                channel,
            })?;
            debug!("Function returns: {}", response.status);

            let got = response.data.len() as u32;
            data.extend(response.data);
            remaining = response.remaining;
            wanted = wanted.saturating_sub(got);

            // The DTB may hand out less than asked for, only an empty block ends early
            if wanted == 0 || got == 0 {
                break;
            }
        }

        Ok((data, remaining))
    }

    /// Closes the channels, discarding all buffered data
    pub fn daq_reset(&mut self, tbms: u8) -> Result<(), DeviceError> {
        debug!("Closing DAQ session, deleting data buffers.");
        for &ch in channels_for(tbms).iter().rev() {
            self.testboard.send_command(DaqClose(ch))?;
            self.channels[ch as usize] = ChannelState::Closed;
        }
        Ok(())
    }
}

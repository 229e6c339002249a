//! Implements calls for signal timing, probes and the pattern generator

use super::{encode, Command};

/// Sets the delay of a DTB output signal.
///
/// # Members
///
/// * `0` - The signal id
/// * `1` - The delay in DTB delay steps
#[derive(Copy, Clone, Debug)]
pub struct SigSetDelay(pub u8, pub u16);

impl Command for SigSetDelay {
    type Response = ();

    fn name(&self) -> &'static str {
        "Sig_SetDelay"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&(self.0, self.1))
    }
}

/// Sets the output level of a DTB signal
#[derive(Copy, Clone, Debug)]
pub struct SigSetLevel(pub u8, pub u8);

impl Command for SigSetLevel {
    type Response = ();

    fn name(&self) -> &'static str {
        "Sig_SetLevel"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&(self.0, self.1))
    }
}

/// The four probe outputs on the DTB front panel
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProbeChannel {
    D1,
    D2,
    A1,
    A2,
}

/// Routes an internal signal to a probe output
#[derive(Copy, Clone, Debug)]
pub struct SignalProbe(pub ProbeChannel, pub u8);

impl Command for SignalProbe {
    type Response = ();

    fn name(&self) -> &'static str {
        match self.0 {
            ProbeChannel::D1 => "SignalProbeD1",
            ProbeChannel::D2 => "SignalProbeD2",
            ProbeChannel::A1 => "SignalProbeA1",
            ProbeChannel::A2 => "SignalProbeA2",
        }
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&self.1)
    }
}

/// Writes one pattern generator word.
///
/// # Members
///
/// * `0` - The pattern generator address
/// * `1` - The combined word, pattern bits OR'd with the delay
#[derive(Copy, Clone, Debug)]
pub struct PgSetCmd(pub u16, pub u16);

impl Command for PgSetCmd {
    type Response = ();

    fn name(&self) -> &'static str {
        "Pg_SetCmd"
    }

    fn encode_request(&self) -> bincode::Result<Vec<u8>> {
        encode(&(self.0, self.1))
    }
}

/// Runs the pattern generator program once
#[derive(Copy, Clone, Debug)]
pub struct PgSingle;

impl Command for PgSingle {
    type Response = ();

    fn name(&self) -> &'static str {
        "Pg_Single"
    }
}

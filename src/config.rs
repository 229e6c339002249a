//! Board configuration files.
//!
//! A configuration describes one DUT setup: supplies, signal delays, the
//! pattern generator program, the TBMs and the ROCs.
//!
//! ```toml
//! va = 1.8
//! vd = 2.5
//! ia = 1.19
//! id = 1.10
//! deser160_phase = 4
//!
//! [sig_delays]
//! 0 = 4       # clk
//! 1 = 4       # ctr
//! 2 = 19      # sda
//! 3 = 9       # tin
//!
//! [[pg_setup]]
//! pattern = 0x0800
//! delay = 25
//!
//! [[pg_setup]]
//! pattern = 0x0100
//! delay = 0
//!
//! [[rocs]]
//! i2c = 0
//! dacs = { 1 = 8, 2 = 140, 0xfe = 255 }
//! trims = [{ column = 3, row = 5, trim = 7 }]
//! ```
//!
//! Register maps use TOML keys, so ids are written as decimal or `0x` hex
//! strings. TOML tables carry no key order, so there is no "later" entry to
//! win when two keys name the same register (`10` and `0x0a`): such a file
//! is rejected. Maps built in code keep the usual last write wins.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, warn};
use serde::Deserialize;

use crate::devices::DeviceSession;
use crate::errors::DeviceError;
use crate::hal::{CompatibilityMode, Hal, PgEntry, DEFAULT_HUB_ADDRESS};
use crate::pixel::TrimOverride;

/// Register ids as written in the file
type RawRegisters = BTreeMap<String, u8>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBoardConfig {
    va: f64,
    vd: f64,
    ia: f64,
    id: f64,
    #[serde(default)]
    sig_delays: RawRegisters,
    #[serde(default)]
    pg_setup: Vec<PgEntry>,
    #[serde(default = "default_hub_address")]
    hub_address: u8,
    #[serde(default)]
    deser160_phase: u8,
    #[serde(default)]
    tbms: Vec<RawTbmConfig>,
    #[serde(default)]
    rocs: Vec<RawRocConfig>,
    #[serde(default)]
    compatibility: CompatibilityMode,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTbmConfig {
    #[serde(default)]
    regs: RawRegisters,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRocConfig {
    i2c: u8,
    #[serde(default)]
    dacs: RawRegisters,
    #[serde(default)]
    trims: Vec<TrimOverride>,
    #[serde(default)]
    masked: bool,
}

fn default_hub_address() -> u8 {
    DEFAULT_HUB_ADDRESS
}

/// Configuration of one TBM
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TbmConfig {
    pub regs: BTreeMap<u8, u8>,
}

/// Configuration of one ROC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RocConfig {
    /// I2C address of the ROC
    pub i2c: u8,
    pub dacs: BTreeMap<u8, u8>,
    /// Pixels trimmed away from the default trim
    pub trims: Vec<TrimOverride>,
    pub masked: bool,
}

/// A complete board configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BoardConfig {
    /// Analog supply in V
    pub va: f64,
    /// Digital supply in V
    pub vd: f64,
    /// Analog current limit in A
    pub ia: f64,
    /// Digital current limit in A
    pub id: f64,
    pub sig_delays: BTreeMap<u8, u8>,
    pub pg_setup: Vec<PgEntry>,
    pub hub_address: u8,
    pub deser160_phase: u8,
    pub tbms: Vec<TbmConfig>,
    pub rocs: Vec<RocConfig>,
    pub compatibility: CompatibilityMode,
}

/// Parses a register id, either decimal or `0x` prefixed hex
fn parse_register(key: &str) -> Result<u8, DeviceError> {
    let key = key.trim();
    let parsed = match key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => key.parse(),
    };
    parsed.map_err(|_| DeviceError::Config(format!("invalid register id '{key}'")))
}

fn parse_registers(raw: RawRegisters) -> Result<BTreeMap<u8, u8>, DeviceError> {
    let mut keys: BTreeMap<u8, String> = BTreeMap::new();
    let mut regs = BTreeMap::new();
    for (key, value) in raw {
        let id = parse_register(&key)?;
        if let Some(first) = keys.get(&id) {
            return Err(DeviceError::Config(format!(
                "register {id:#04x} is set as both '{first}' and '{key}'"
            )));
        }
        keys.insert(id, key);
        regs.insert(id, value);
    }
    Ok(regs)
}

impl BoardConfig {
    /// Reads and validates a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        debug!("Reading board configuration {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }

    /// Parses and validates a configuration
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, DeviceError> {
        let raw: RawBoardConfig =
            toml::from_str(text).map_err(|e| DeviceError::Config(e.to_string()))?;

        let config = BoardConfig {
            va: raw.va,
            vd: raw.vd,
            ia: raw.ia,
            id: raw.id,
            sig_delays: parse_registers(raw.sig_delays)?,
            pg_setup: raw.pg_setup,
            hub_address: raw.hub_address,
            deser160_phase: raw.deser160_phase,
            tbms: raw
                .tbms
                .into_iter()
                .map(|t| Ok(TbmConfig { regs: parse_registers(t.regs)? }))
                .collect::<Result<_, DeviceError>>()?,
            rocs: raw
                .rocs
                .into_iter()
                .map(|r| {
                    Ok(RocConfig {
                        i2c: r.i2c,
                        dacs: parse_registers(r.dacs)?,
                        trims: r.trims,
                        masked: r.masked,
                    })
                })
                .collect::<Result<_, DeviceError>>()?,
            compatibility: raw.compatibility,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the hardware cannot take.
    ///
    /// A pattern generator program without a final zero delay only warns,
    /// the generator then runs on into whatever memory holds.
    pub fn validate(&self) -> Result<(), DeviceError> {
        for (name, value) in [("va", self.va), ("vd", self.vd), ("ia", self.ia), ("id", self.id)] {
            if !value.is_finite() || value < 0.0 {
                return Err(DeviceError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        match self.pg_setup.last() {
            None => warn!("Pattern generator program is empty"),
            Some(last) if last.delay != 0 => {
                warn!("Pattern generator program does not end with a zero delay")
            }
            _ => (),
        }

        let mut seen = Vec::new();
        for roc in &self.rocs {
            if seen.contains(&roc.i2c) {
                return Err(DeviceError::Config(format!(
                    "ROC address {} configured more than once",
                    roc.i2c
                )));
            }
            seen.push(roc.i2c);
        }

        Ok(())
    }

    /// The number of TBMs, which decides the DAQ channels used
    pub fn tbm_count(&self) -> u8 {
        self.tbms.len().min(u8::MAX as usize) as u8
    }
}

impl<D: DeviceSession> Hal<D> {
    /// Programs a whole board configuration.
    ///
    /// Runs [`Hal::initialize`], then sets up the TBMs, the ROC DACs and
    /// finally the ROC masks and trims.
    pub fn apply_config(&mut self, config: &BoardConfig) -> Result<(), DeviceError> {
        self.initialize(
            &config.sig_delays,
            &config.pg_setup,
            config.va,
            config.vd,
            config.ia,
            config.id,
        )?;

        self.set_hub_address(config.hub_address);
        for (i, tbm) in config.tbms.iter().enumerate() {
            self.init_tbm(i as u8, &tbm.regs)?;
        }

        for roc in &config.rocs {
            self.init_roc(roc.i2c, &roc.dacs)?;
        }

        for roc in &config.rocs {
            self.set_roc_mask(roc.i2c, roc.masked, &roc.trims)?;
        }
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "va = 1.8\nvd = 2.5\nia = 1.19\nid = 1.1\n";

    #[test]
    fn defaults() {
        let config = BoardConfig::from_str(MINIMAL).unwrap();
        assert_eq!(config.hub_address, 31);
        assert_eq!(config.compatibility, CompatibilityMode::Lenient);
        assert!(config.rocs.is_empty());
        assert_eq!(config.tbm_count(), 0);
    }

    #[test]
    fn register_ids_in_decimal_and_hex() {
        let text = format!("{MINIMAL}[[rocs]]\ni2c = 0\ndacs = {{ 1 = 8, \"0xfe\" = 255 }}\n");
        let config = BoardConfig::from_str(&text).unwrap();
        assert_eq!(config.rocs[0].dacs, BTreeMap::from([(1, 8), (0xfe, 255)]));
    }

    #[test]
    fn duplicate_registers_are_rejected() {
        let text = format!("{MINIMAL}[sig_delays]\n10 = 1\n0x0a = 2\n");
        match BoardConfig::from_str(&text) {
            Err(DeviceError::Config(msg)) => {
                assert!(msg.contains("'0x0a'") && msg.contains("'10'"), "{msg}");
            }
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_rocs_are_rejected() {
        let text = format!("{MINIMAL}[[rocs]]\ni2c = 1\n[[rocs]]\ni2c = 1\n");
        assert!(matches!(BoardConfig::from_str(&text), Err(DeviceError::Config(_))));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let text = format!("{MINIMAL}vdd = 3.3\n");
        assert!(matches!(BoardConfig::from_str(&text), Err(DeviceError::Config(_))));
    }

    #[test]
    fn strict_compatibility() {
        let text = format!("compatibility = \"strict\"\n{MINIMAL}");
        let config = BoardConfig::from_str(&text).unwrap();
        assert_eq!(config.compatibility, CompatibilityMode::Strict);
    }
}

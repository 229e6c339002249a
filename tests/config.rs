use std::io::Write;

use dtb_hal::config::BoardConfig;
use dtb_hal::devices::SimulatedDevice;
use dtb_hal::errors::DeviceError;
use dtb_hal::hal::{CompatibilityMode, Hal, SIG_DESER160PHASE};

const MODULE: &str = r#"
va = 1.8
vd = 2.5
ia = 1.19
id = 1.1
hub_address = 7
deser160_phase = 4

[sig_delays]
0 = 4
2 = 19
4 = 3

[[pg_setup]]
pattern = 0x0800
delay = 25

[[pg_setup]]
pattern = 0x0400
delay = 16

[[pg_setup]]
pattern = 0x0200
delay = 0

[[tbms]]
regs = { 0x00 = 0x01, "0x04" = 0x80 }

[[rocs]]
i2c = 0
dacs = { 1 = 8, 2 = 140, 25 = 100 }
trims = [{ column = 3, row = 5, trim = 7 }]

[[rocs]]
i2c = 1
masked = true
"#;

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn load_from_file() {
    let file = write_config(MODULE);
    let config = BoardConfig::from_file(file.path()).unwrap();

    assert_eq!(config.hub_address, 7);
    assert_eq!(config.pg_setup.len(), 3);
    assert_eq!(config.tbm_count(), 1);
    assert_eq!(config.tbms[0].regs.get(&0x04), Some(&0x80));
    assert_eq!(config.rocs.len(), 2);
    assert!(config.rocs[1].masked);
    assert_eq!(config.sig_delays.get(&SIG_DESER160PHASE), Some(&3));
}

#[test]
fn missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = BoardConfig::from_file(dir.path().join("nothing.toml"));
    assert!(matches!(result, Err(DeviceError::IoError(_))));
}

#[test]
fn malformed_file() {
    let file = write_config("va = \"high\"\n");
    assert!(matches!(
        BoardConfig::from_file(file.path()),
        Err(DeviceError::Config(_))
    ));
}

#[test]
fn apply_programs_the_board() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = BoardConfig::from_str(MODULE).unwrap();
    let mut hal = Hal::from_device(SimulatedDevice::default(), CompatibilityMode::Lenient).unwrap();
    assert!(!hal.status());

    hal.apply_config(&config).unwrap();
    assert!(hal.status());

    let dev = hal.device();
    assert_eq!(dev.pattern_generator(), vec![(0, 0x0819), (1, 0x0410), (2, 0x0200)]);
    assert_eq!(dev.delay(0), Some(4));
    assert_eq!(dev.hub_address(), 7);
    assert_eq!(dev.tbm_reg(0x04), Some(0x80));
    assert_eq!(dev.dac(0, 2), Some(140));
    assert_eq!(dev.trims(0).unwrap()[3 * 80 + 5], 7);
    assert!(dev.is_roc_masked(1));
    assert!(!dev.is_roc_masked(0));
    assert_eq!(dev.queued(), 0);
}

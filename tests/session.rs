use dtb_hal::commands::HOST_CALLS;
use dtb_hal::devices::SimulatedDevice;
use dtb_hal::errors::DeviceError;
use dtb_hal::hal::{CompatibilityMode, Hal};
use dtb_hal::hash::hash_call_table;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn matching_firmware_is_compatible() {
    init_logger();
    let mut hal = Hal::from_device(SimulatedDevice::default(), CompatibilityMode::Strict).unwrap();

    let report = hal.check_compatibility().unwrap();
    assert!(report.is_compatible());
    assert!(report.mismatches.is_empty());
    assert_eq!(report.host_count, HOST_CALLS.len());
    assert_eq!(report.host_hash, hash_call_table(HOST_CALLS));
    assert_eq!(report.device_hash, 0);
}

#[test]
fn stale_firmware_is_tolerated_by_default() {
    init_logger();
    let mut dev = SimulatedDevice::default();
    let mut table: Vec<String> = HOST_CALLS.iter().map(|c| c.to_string()).collect();
    table[4] = "Welcome_v2".to_string();
    table.pop();
    dev.set_call_table(table);

    let mut hal = Hal::from_device(dev, CompatibilityMode::Lenient).unwrap();
    let report = hal.check_compatibility().unwrap();
    assert!(!report.is_compatible());

    let ids: Vec<usize> = report.mismatches.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![4, HOST_CALLS.len() - 1]);
    assert_eq!(report.mismatches[1].device, "");
    assert_eq!(report.mismatches[1].host, "UpgradeExec");

    // The session is still usable
    hal.pon().unwrap();
    assert!(hal.device().is_powered());
}

#[test]
fn names_are_only_compared_when_counts_differ() {
    init_logger();
    let mut dev = SimulatedDevice::default();
    let mut table: Vec<String> = HOST_CALLS.iter().map(|c| c.to_string()).collect();
    table.swap(7, 8);
    dev.set_call_table(table);

    let mut hal = Hal::from_device(dev, CompatibilityMode::Strict).unwrap();
    let report = hal.check_compatibility().unwrap();
    assert!(report.mismatches.is_empty());
    assert!(!hal.device().executed_names().contains(&"GetRpcCallName"));
}

#[test]
fn strict_mode_closes_the_device() {
    init_logger();
    let mut dev = SimulatedDevice::default();
    dev.set_call_table(vec!["GetRpcCallCount".to_string(), "GetRpcCallName".to_string()]);

    match Hal::from_device(dev, CompatibilityMode::Strict) {
        Err(DeviceError::Incompatible(n)) => assert_eq!(n, HOST_CALLS.len() - 2),
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("incompatible firmware accepted"),
    }
}

#[test]
fn full_power_cycle() {
    init_logger();
    let mut hal = Hal::from_device(SimulatedDevice::default(), CompatibilityMode::Lenient).unwrap();
    hal.set_tb_vd(2.5).unwrap();
    hal.pon().unwrap();
    hal.hv_on().unwrap();
    assert!(hal.device().is_hv_on());
    assert!((hal.get_tb_vd().unwrap() - 2.5).abs() < 1e-9);

    hal.close().unwrap();
    assert!(!hal.device().is_hv_on());
    assert!(!hal.device().is_powered());
    assert!(matches!(hal.pon(), Err(DeviceError::Closed)));
}

use devscan::app::{add_scanners, Backends};
use devscan::cli::{OutputFormat, TransportArg};
use devscan::config::Config;
use devscan::error::ExitCode;
use devscan::output::{write_report, ConsoleSink};
use devscan::progress::ScanProgress;
use devscan::session::ScanSession;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const FIXTURE: &str = r#"
[bluetooth]
delay_ms = 2

[[bluetooth.classic]]
address = "00:11:22:33:44:55"
name = "Headset"
rssi = -58

[[bluetooth.classic]]
event = "renamed"
address = "00:11:22:33:44:55"
name = "Headset Pro"

[[bluetooth.le]]
address = "C0:FF:EE:00:00:01"
name = "Tag"
rssi = -71

[[bluetooth.known]]
address = "00:AA:00:AA:00:AA"
name = "Paired Glove"

[[usb]]
device_path = "/dev/bus/usb/001/004"
vendor_id = 0x04D8
product_id = 0x000A
product_name = "Sensor Board"
"#;

fn config_for(fixture: &Path) -> Config {
    let mut config = Config {
        fixture: Some(fixture.to_path_buf()),
        ..Config::default()
    };
    config.le.duration_ms = 100;
    config
}

fn scan(config: &Config) -> devscan::output::ScanReport {
    let backends = Backends::from_config(config).unwrap();
    let sink = Arc::new(ConsoleSink::new(ScanProgress::new(true, false), false));
    let session = add_scanners(ScanSession::builder(), config, &backends)
        .listen(sink.clone())
        .build();
    assert!(session.start());
    assert!(session.wait_finished(Some(Duration::from_secs(5))));
    drop(session);
    sink.finish(false)
}

#[test]
fn test_fixture_scan_report() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("devices.toml");
    fs::write(&path, FIXTURE).unwrap();

    let report = scan(&config_for(&path));

    assert!(report.completed);
    assert_eq!(report.devices.len(), 3);
    assert!(report.failures.is_empty());
    assert_eq!(report.exit_code(), ExitCode::Success);

    let headset = report
        .devices
        .iter()
        .find(|d| d.identifier == "00:11:22:33:44:55")
        .unwrap();
    assert_eq!(headset.name, "Headset Pro");
    assert_eq!(headset.transport, "classic");

    let board = report.devices.iter().find(|d| d.transport == "usb").unwrap();
    assert_eq!(board.description, "Sensor Board (vendor=0x04D8, product=0x000A)");
}

#[test]
fn test_fixture_known_devices() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("devices.toml");
    fs::write(&path, FIXTURE).unwrap();

    let mut config = config_for(&path);
    config.transports = vec![TransportArg::Known];
    config.known_devices = vec![devscan::scanner::KnownDevice::classic("00:AA:00:AA:00:AA")];

    let report = scan(&config);
    assert_eq!(report.devices.len(), 1);
    assert_eq!(report.devices[0].name, "Paired Glove");
}

#[test]
fn test_json_fixture_with_disabled_radio() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("devices.json");
    fs::write(
        &path,
        r#"{
  "bluetooth": { "enabled": false },
  "usb": [
    { "device_path": "/dev/bus/usb/003/001", "vendor_id": 1, "product_id": 2,
      "product_name": null, "manufacturer": null }
  ]
}"#,
    )
    .unwrap();

    let report = scan(&config_for(&path));

    assert!(report.completed);
    assert_eq!(report.devices.len(), 1);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.exit_code(), ExitCode::PartialSuccess);

    let mut out = Vec::new();
    write_report(&report, OutputFormat::Json, &mut out).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["exit_code"], 3);
    assert_eq!(value["failures"].as_array().unwrap().len(), 2);
}

#[test]
fn test_empty_fixture_finds_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.toml");
    fs::write(&path, "").unwrap();

    let report = scan(&config_for(&path));
    assert!(report.completed);
    assert!(report.devices.is_empty());
    assert_eq!(report.exit_code(), ExitCode::NoDevices);

    let mut out = Vec::new();
    write_report(&report, OutputFormat::Csv, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
}

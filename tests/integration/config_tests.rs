use clap::Parser;
use devscan::cli::{Cli, Commands, TransportArg};
use devscan::config::{suggest_key, Config};
use devscan::scanner::{ProductFilter, ScanMode};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(
        config.transports,
        vec![TransportArg::Classic, TransportArg::Le, TransportArg::Usb]
    );
    assert_eq!(config.timeout_ms, 30_000);
    assert_eq!(config.grace_ms, 2_000);
    assert_eq!(config.le.duration_ms, 3_000);
    assert!(config.known_devices.is_empty());
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("DEVSCAN_GRACE_MS", "750");
    // Use double underscore for nesting
    std::env::set_var("DEVSCAN_LE__DURATION_MS", "9000");

    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("DEVSCAN_").split("__"));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.grace_ms, 750);
    assert_eq!(config.le.duration_ms, 9_000);

    std::env::remove_var("DEVSCAN_GRACE_MS");
    std::env::remove_var("DEVSCAN_LE__DURATION_MS");
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
transports = ["le", "known"]
timeout_ms = 0

[le]
duration_ms = 5000
mode = "balanced"
filters = [{ name = "Glove" }]

[usb]
sysfs_root = "/tmp/usb"
supported_products = [{ vendor_id = 0x04D8, product_id = 0x000A }, { vendor_id = 0x1234 }]

[[known_devices]]
address = "00:11:22:33:44:55"

[[known_devices]]
address = "C0:FF:EE:00:00:01"
low_energy = true
"#;
    fs::write(&config_path, toml_content).unwrap();

    let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&config_path));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.transports, vec![TransportArg::Le, TransportArg::Known]);
    assert_eq!(config.timeout(), None);
    assert_eq!(config.le.settings().duration, Duration::from_secs(5));
    assert_eq!(config.le.mode, ScanMode::Balanced);
    assert_eq!(config.le.filters[0].name.as_deref(), Some("Glove"));
    assert_eq!(config.usb.sysfs_root.to_str(), Some("/tmp/usb"));
    assert_eq!(
        config.usb.product_filters(),
        Some(vec![
            ProductFilter::product(0x04d8, 0x000a),
            ProductFilter::vendor(0x1234)
        ])
    );
    assert_eq!(config.known_devices.len(), 2);
    assert!(!config.known_devices[0].low_energy);
    assert!(config.known_devices[1].low_energy);
    // Untouched keys keep their defaults
    assert_eq!(config.grace_ms, 2_000);
}

#[test]
fn test_config_load_explicit_missing_file() {
    let err = Config::load(Some(std::path::Path::new("/nonexistent/devscan.toml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
fn test_config_load_invalid_value() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "transports = [\"wifi\"]\n").unwrap();

    assert!(Config::load(Some(&config_path)).is_err());
}

#[test]
fn test_cli_overrides_config() {
    let cli = Cli::try_parse_from([
        "devscan",
        "scan",
        "--transport",
        "usb",
        "--timeout",
        "1500ms",
        "--grace",
        "0",
        "--le-duration",
        "10s",
        "--usb-product",
        "0x04d8",
    ])
    .unwrap();
    let Commands::Scan(args) = cli.command else {
        panic!("Expected Scan command");
    };

    let mut config = Config::default();
    config.apply_scan_args(&args);

    assert_eq!(config.transports, vec![TransportArg::Usb]);
    assert_eq!(config.timeout_ms, 1_500);
    assert_eq!(config.grace(), Duration::ZERO);
    assert_eq!(config.le.duration_ms, 10_000);
    assert_eq!(config.usb.supported_products, vec![ProductFilter::vendor(0x04d8)]);
}

#[test]
fn test_cli_without_flags_keeps_config() {
    let cli = Cli::try_parse_from(["devscan", "scan"]).unwrap();
    let Commands::Scan(args) = cli.command else {
        panic!("Expected Scan command");
    };

    let mut config = Config {
        transports: vec![TransportArg::Known],
        timeout_ms: 10,
        ..Config::default()
    };
    config.apply_scan_args(&args);

    assert_eq!(config.transports, vec![TransportArg::Known]);
    assert_eq!(config.timeout_ms, 10);
}

#[test]
fn test_key_suggestions() {
    assert_eq!(suggest_key("timeout"), Some("timeout_ms"));
    assert_eq!(suggest_key("known_device"), Some("known_devices"));
    assert_eq!(suggest_key("colour"), None);
}

//! Application configuration.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. The TOML config file (`--config PATH`, or `devscan/config.toml` in the
//!    platform config directory)
//! 3. `DEVSCAN_*` environment variables, `__` separating nested keys
//!    (`DEVSCAN_LE__DURATION_MS=5000`)
//! 4. Command-line flags
//!
//! ```toml
//! transports = ["classic", "le", "usb"]
//! timeout_ms = 30000
//!
//! [le]
//! duration_ms = 5000
//! mode = "balanced"
//!
//! [usb]
//! supported_products = [{ vendor_id = 0x04D8, product_id = 0x000A }]
//!
//! [[known_devices]]
//! address = "00:11:22:33:44:55"
//! ```

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::sysfs::DEFAULT_SYSFS_ROOT;
use crate::cli::{ScanArgs, TransportArg};
use crate::scanner::{KnownDevice, LeScanFilter, LeScanSettings, ProductFilter, ScanMode};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "DEVSCAN_";

/// Top-level keys understood in the config file.
pub const KNOWN_KEYS: &[&str] = &[
    "transports",
    "timeout_ms",
    "grace_ms",
    "fixture",
    "le",
    "usb",
    "known_devices",
];

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transports scanned when none are given on the command line.
    pub transports: Vec<TransportArg>,
    /// Stop scanning after this many milliseconds; 0 waits for the scanners.
    pub timeout_ms: u64,
    /// Time stopped scanners get to report their finish.
    pub grace_ms: u64,
    /// Fixture replayed instead of hardware.
    pub fixture: Option<PathBuf>,
    /// Bluetooth LE settings.
    pub le: LeConfig,
    /// USB settings.
    pub usb: UsbConfig,
    /// Addresses resolved by the known-device transport.
    pub known_devices: Vec<KnownDevice>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transports: vec![TransportArg::Classic, TransportArg::Le, TransportArg::Usb],
            timeout_ms: 30_000,
            grace_ms: 2_000,
            fixture: None,
            le: LeConfig::default(),
            usb: UsbConfig::default(),
            known_devices: Vec::new(),
        }
    }
}

/// Bluetooth LE settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeConfig {
    /// Length of one scan in milliseconds.
    pub duration_ms: u64,
    /// Radio duty cycle.
    pub mode: ScanMode,
    /// Advertiser filters; empty accepts everything.
    pub filters: Vec<LeScanFilter>,
}

impl Default for LeConfig {
    fn default() -> Self {
        let settings = LeScanSettings::default();
        Self {
            duration_ms: settings.duration.as_millis() as u64,
            mode: settings.mode,
            filters: settings.filters,
        }
    }
}

impl LeConfig {
    /// Scanner settings for this configuration.
    #[must_use]
    pub fn settings(&self) -> LeScanSettings {
        LeScanSettings {
            mode: self.mode,
            duration: Duration::from_millis(self.duration_ms),
            filters: self.filters.clone(),
        }
    }
}

/// USB settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbConfig {
    /// Where attached devices are read from.
    pub sysfs_root: PathBuf,
    /// Products to report; empty reports every device.
    pub supported_products: Vec<ProductFilter>,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            supported_products: Vec::new(),
        }
    }
}

impl UsbConfig {
    /// Product filters as the scanner takes them.
    #[must_use]
    pub fn product_filters(&self) -> Option<Vec<ProductFilter>> {
        (!self.supported_products.is_empty()).then(|| self.supported_products.clone())
    }
}

impl Config {
    /// Load defaults, the config file and the environment.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => Self::default_path().filter(|p| p.exists()),
        };

        if let Some(file) = &file {
            warn_unknown_keys(file);
        }

        Self::figment(file.as_deref())
            .extract()
            .context("Failed to load configuration")
    }

    /// The layered provider chain, without command-line overrides.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Default platform-specific config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "devscan", "devscan")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply command-line flags on top of the loaded configuration.
    pub fn apply_scan_args(&mut self, args: &ScanArgs) {
        if !args.transports.is_empty() {
            self.transports = args.transports.clone();
        }
        if let Some(fixture) = &args.fixture {
            self.fixture = Some(fixture.clone());
        }
        if let Some(timeout) = args.timeout {
            self.timeout_ms = timeout.as_millis() as u64;
        }
        if let Some(grace) = args.grace {
            self.grace_ms = grace.as_millis() as u64;
        }
        if let Some(duration) = args.le_duration {
            self.le.duration_ms = duration.as_millis() as u64;
        }
        if !args.usb_products.is_empty() {
            self.usb.supported_products = args.usb_products.clone();
        }
    }

    /// Scan timeout, `None` when disabled.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Grace period after a stop.
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Selected transports without repeats, in first-mention order.
    #[must_use]
    pub fn selected_transports(&self) -> Vec<TransportArg> {
        let mut selected = Vec::new();
        for transport in &self.transports {
            if !selected.contains(transport) {
                selected.push(*transport);
            }
        }
        selected
    }

    /// Render as a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// An unrecognised top-level key and the closest known key, if any is close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKey {
    /// The key as written.
    pub key: String,
    /// Suggested replacement.
    pub suggestion: Option<&'static str>,
}

/// Find top-level keys of a TOML document that are not config keys.
pub fn unknown_keys(content: &str) -> Result<Vec<UnknownKey>> {
    let table: toml::Table = toml::from_str(content).context("Failed to parse config file")?;
    Ok(table
        .keys()
        .filter(|key| !KNOWN_KEYS.contains(&key.as_str()))
        .map(|key| UnknownKey {
            key: key.clone(),
            suggestion: suggest_key(key),
        })
        .collect())
}

/// Closest known key by Jaro-Winkler similarity.
#[must_use]
pub fn suggest_key(key: &str) -> Option<&'static str> {
    KNOWN_KEYS
        .iter()
        .map(|known| (*known, strsim::jaro_winkler(key, known)))
        .filter(|(_, score)| *score > 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(known, _)| known)
}

fn warn_unknown_keys(path: &Path) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    match unknown_keys(&content) {
        Ok(unknown) => {
            for entry in unknown {
                match entry.suggestion {
                    Some(suggestion) => log::warn!(
                        "Unknown config key '{}' in {}, did you mean '{}'?",
                        entry.key,
                        path.display(),
                        suggestion
                    ),
                    None => log::warn!("Unknown config key '{}' in {}", entry.key, path.display()),
                }
            }
        }
        Err(e) => log::debug!("Skipping config key check: {:#}", e),
    }
}

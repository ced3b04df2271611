//! Device fixtures for the simulated backends.
//!
//! A fixture describes what a simulated radio and USB bus will report. It is
//! read from TOML, or from JSON when the file has a `.json` extension.
//!
//! ```toml
//! [bluetooth]
//! enabled = true
//! delay_ms = 50
//!
//! [[bluetooth.classic]]
//! address = "00:11:22:33:44:55"
//! name = "Headset"
//! rssi = -58
//!
//! [[bluetooth.classic]]
//! event = "renamed"
//! address = "00:11:22:33:44:55"
//! name = "Headset Pro"
//!
//! [[bluetooth.le]]
//! address = "C0:FF:EE:00:00:01"
//! name = "Tag"
//! rssi = -71
//!
//! [[usb]]
//! device_path = "/dev/bus/usb/001/004"
//! vendor_id = 0x04D8
//! product_id = 0x000A
//! product_name = "Sensor Board"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::device::DeviceType;
use crate::scanner::{AdapterEvent, RemoteDevice, UsbDeviceInfo};

/// Everything the simulated backends report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// Simulated Bluetooth radio.
    #[serde(default)]
    pub bluetooth: BluetoothFixture,
    /// Attached USB devices.
    #[serde(default)]
    pub usb: Vec<UsbDeviceInfo>,
}

impl Fixture {
    /// Load a fixture file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file: {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON fixture: {}", path.display()))
        } else {
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse TOML fixture: {}", path.display()))
        }
    }

    /// Parse a TOML fixture document.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

fn default_true() -> bool {
    true
}

fn default_device_type() -> DeviceType {
    DeviceType::Classic
}

/// Simulated Bluetooth radio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BluetoothFixture {
    /// Whether the host has a radio at all.
    #[serde(default = "default_true")]
    pub supported: bool,
    /// Whether the radio is switched on.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether LE scanning is available.
    #[serde(default = "default_true")]
    pub low_energy: bool,
    /// Delay before each replayed event, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    /// Classic inquiry broadcasts, in order.
    #[serde(default)]
    pub classic: Vec<ClassicStep>,
    /// LE advertisements, in order.
    #[serde(default)]
    pub le: Vec<LeStep>,
    /// Raw failure code to abort LE scans with once the advertisements are
    /// replayed.
    #[serde(default)]
    pub le_failure: Option<i32>,
    /// Devices resolvable by address.
    #[serde(default)]
    pub known: Vec<KnownStep>,
}

impl Default for BluetoothFixture {
    fn default() -> Self {
        Self {
            supported: true,
            enabled: true,
            low_energy: true,
            delay_ms: 0,
            classic: Vec::new(),
            le: Vec::new(),
            le_failure: None,
            known: Vec::new(),
        }
    }
}

/// Kind of classic broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassicEvent {
    /// Device found by the inquiry.
    #[default]
    Found,
    /// Device name resolved or changed.
    Renamed,
}

/// One classic inquiry broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassicStep {
    /// Broadcast kind.
    #[serde(default)]
    pub event: ClassicEvent,
    /// Hardware address.
    pub address: String,
    /// Name, if resolved.
    #[serde(default)]
    pub name: Option<String>,
    /// Signal strength.
    #[serde(default)]
    pub rssi: Option<i16>,
    /// Radio class.
    #[serde(default = "default_device_type")]
    pub device_type: DeviceType,
}

impl ClassicStep {
    /// A found broadcast for a classic device.
    #[must_use]
    pub fn found(address: &str, name: Option<&str>, rssi: Option<i16>) -> Self {
        Self {
            event: ClassicEvent::Found,
            address: address.to_string(),
            name: name.map(str::to_string),
            rssi,
            device_type: DeviceType::Classic,
        }
    }

    /// A name change for a classic device.
    #[must_use]
    pub fn renamed(address: &str, name: &str) -> Self {
        Self {
            event: ClassicEvent::Renamed,
            address: address.to_string(),
            name: Some(name.to_string()),
            rssi: None,
            device_type: DeviceType::Classic,
        }
    }

    /// The broadcast the adapter delivers for this step.
    #[must_use]
    pub fn to_event(&self) -> AdapterEvent {
        let device = RemoteDevice::new(&self.address, self.name.as_deref(), self.device_type);
        match self.event {
            ClassicEvent::Found => AdapterEvent::DeviceFound {
                device,
                rssi: self.rssi,
            },
            ClassicEvent::Renamed => AdapterEvent::NameChanged { device },
        }
    }
}

/// One LE advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeStep {
    /// Hardware address.
    pub address: String,
    /// Advertised name.
    #[serde(default)]
    pub name: Option<String>,
    /// Signal strength.
    pub rssi: i16,
}

impl LeStep {
    /// An advertisement.
    #[must_use]
    pub fn result(address: &str, name: Option<&str>, rssi: i16) -> Self {
        Self {
            address: address.to_string(),
            name: name.map(str::to_string),
            rssi,
        }
    }

    /// The advertiser as the adapter sees it.
    #[must_use]
    pub fn device(&self) -> RemoteDevice {
        RemoteDevice::new(&self.address, self.name.as_deref(), DeviceType::LowEnergy)
    }
}

/// A device resolvable by address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownStep {
    /// Hardware address.
    pub address: String,
    /// Cached name.
    #[serde(default)]
    pub name: Option<String>,
    /// Radio class.
    #[serde(default = "default_device_type")]
    pub device_type: DeviceType,
}

impl KnownStep {
    /// A classic device with an optional cached name.
    #[must_use]
    pub fn new(address: &str, name: Option<&str>) -> Self {
        Self {
            address: address.to_string(),
            name: name.map(str::to_string),
            device_type: DeviceType::Classic,
        }
    }
}

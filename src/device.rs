//! Discovered device records.
//!
//! A [`ScannedDevice`] is the identity and display metadata for one device
//! reported by a scanner. Transport-specific data lives in a
//! [`TransportPayload`] behind an `Arc`, so records can be cloned through the
//! coordinator and handed to sinks without copying the payload.
//!
//! # Example
//!
//! ```
//! use devscan::device::{DeviceType, ScannedDevice};
//!
//! let mut device = ScannedDevice::bluetooth("AA:BB:CC:DD:EE:FF", "Glove", DeviceType::Classic);
//! assert_eq!(device.description(), "Glove (AA:BB:CC:DD:EE:FF)");
//!
//! device.set_rssi(Some(-61));
//! assert_eq!(device.description(), "Glove (AA:BB:CC:DD:EE:FF, -61 dBm)");
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discovery mechanism a device was found through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Classic Bluetooth inquiry.
    Classic,
    /// Bluetooth Low Energy advertisement scanning.
    LowEnergy,
    /// Attached USB peripherals.
    Usb,
}

impl TransportKind {
    /// Short machine-readable name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::LowEnergy => "le",
            Self::Usb => "usb",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic => write!(f, "Bluetooth"),
            Self::LowEnergy => write!(f, "Bluetooth LE"),
            Self::Usb => write!(f, "USB"),
        }
    }
}

/// Radio class reported by a Bluetooth adapter for a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// BR/EDR only.
    Classic,
    /// Low energy only.
    LowEnergy,
    /// Both BR/EDR and LE.
    Dual,
    /// The stack did not report a type.
    #[default]
    Unknown,
}

/// Data carried for a Bluetooth device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothInfo {
    /// Hardware address as reported by the adapter.
    pub address: String,
    /// Last received signal strength, if known.
    pub rssi: Option<i16>,
    /// Whether the device was found through LE scanning.
    pub low_energy: bool,
    /// Radio class reported by the adapter.
    pub device_type: DeviceType,
}

/// Data carried for a USB peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbInfo {
    /// Device node path, e.g. `/dev/bus/usb/001/004`.
    pub device_path: String,
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
    /// Product string descriptor, if readable.
    pub product_name: Option<String>,
    /// Manufacturer string descriptor, if readable.
    pub manufacturer: Option<String>,
}

/// Transport-specific payload attached to a [`ScannedDevice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportPayload {
    /// Classic or LE radio device.
    Bluetooth(BluetoothInfo),
    /// Wired peripheral.
    Usb(UsbInfo),
}

/// Identity and display metadata for one discovered device.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedDevice {
    identifier: String,
    name: String,
    description: String,
    transport: TransportKind,
    payload: Arc<TransportPayload>,
    discovered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ScannedDevice {
    /// Create a record from its parts. The description is derived.
    #[must_use]
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        transport: TransportKind,
        payload: TransportPayload,
    ) -> Self {
        let now = Utc::now();
        let mut device = Self {
            identifier: identifier.into(),
            name: name.into(),
            description: String::new(),
            transport,
            payload: Arc::new(payload),
            discovered_at: now,
            updated_at: now,
        };
        device.refresh_description();
        device
    }

    /// Create a classic Bluetooth record keyed by its address.
    #[must_use]
    pub fn bluetooth(address: &str, name: impl Into<String>, device_type: DeviceType) -> Self {
        Self::new(
            address,
            name,
            TransportKind::Classic,
            TransportPayload::Bluetooth(BluetoothInfo {
                address: address.to_string(),
                rssi: None,
                low_energy: false,
                device_type,
            }),
        )
    }

    /// Create a Bluetooth LE record keyed by its address.
    #[must_use]
    pub fn bluetooth_le(address: &str, name: impl Into<String>, rssi: Option<i16>) -> Self {
        Self::new(
            address,
            name,
            TransportKind::LowEnergy,
            TransportPayload::Bluetooth(BluetoothInfo {
                address: address.to_string(),
                rssi,
                low_energy: true,
                device_type: DeviceType::LowEnergy,
            }),
        )
    }

    /// Create a USB record keyed by its device node path.
    ///
    /// The product name is used as the label, falling back to the path.
    #[must_use]
    pub fn usb(info: UsbInfo) -> Self {
        let name = info
            .product_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&info.device_path)
            .to_string();
        Self::new(
            info.device_path.clone(),
            name,
            TransportKind::Usb,
            TransportPayload::Usb(info),
        )
    }

    /// Stable identifier within the transport's address space.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Human-readable label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derived display string.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Transport the device was found through.
    #[must_use]
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Transport-specific payload.
    #[must_use]
    pub fn payload(&self) -> &TransportPayload {
        &self.payload
    }

    /// Shared handle to the payload.
    #[must_use]
    pub fn payload_handle(&self) -> Arc<TransportPayload> {
        Arc::clone(&self.payload)
    }

    /// Bluetooth payload, if this is a radio device.
    #[must_use]
    pub fn bluetooth_info(&self) -> Option<&BluetoothInfo> {
        match self.payload.as_ref() {
            TransportPayload::Bluetooth(info) => Some(info),
            TransportPayload::Usb(_) => None,
        }
    }

    /// USB payload, if this is a wired device.
    #[must_use]
    pub fn usb_info(&self) -> Option<&UsbInfo> {
        match self.payload.as_ref() {
            TransportPayload::Usb(info) => Some(info),
            TransportPayload::Bluetooth(_) => None,
        }
    }

    /// Signal strength for radio devices.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.bluetooth_info().and_then(|info| info.rssi)
    }

    /// When the device was first seen in this run.
    #[must_use]
    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    /// When the record last changed.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Update the label and recompute the description.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    /// Update the signal strength and recompute the description.
    ///
    /// Has no effect on wired devices.
    pub fn set_rssi(&mut self, rssi: Option<i16>) {
        if let TransportPayload::Bluetooth(info) = Arc::make_mut(&mut self.payload) {
            info.rssi = rssi;
            self.touch();
        }
    }

    /// Fold a newer report for the same device into this record.
    ///
    /// Name, payload and description come from `newer`; the first-seen
    /// timestamp is kept.
    pub fn merge_from(&mut self, newer: ScannedDevice) {
        debug_assert_eq!(self.identifier, newer.identifier);
        self.name = newer.name;
        self.payload = newer.payload;
        self.transport = newer.transport;
        self.updated_at = newer.updated_at.max(self.updated_at);
        self.refresh_description();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.refresh_description();
    }

    fn refresh_description(&mut self) {
        self.description = match self.payload.as_ref() {
            TransportPayload::Bluetooth(info) => match info.rssi {
                Some(rssi) => format!("{} ({}, {} dBm)", self.name, info.address, rssi),
                None => format!("{} ({})", self.name, info.address),
            },
            TransportPayload::Usb(info) => format!(
                "{} (vendor={}, product={})",
                self.name,
                short_to_hex(info.vendor_id),
                short_to_hex(info.product_id)
            ),
        };
    }
}

impl fmt::Display for ScannedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Format a 16-bit id as `0xABCD`.
#[must_use]
pub fn short_to_hex(value: u16) -> String {
    format!("0x{value:04X}")
}

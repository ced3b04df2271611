//! Bluetooth adapter handle.
//!
//! Scanners never look up a radio themselves; they are handed an
//! `Arc<dyn BluetoothAdapter>` at construction. The trait mirrors what a
//! platform stack offers: an availability check, classic inquiry with
//! broadcast-style callbacks, LE scanning with result callbacks, and lookup of
//! a remote device by address.
//!
//! Callbacks may be invoked from any thread the adapter owns.

use std::sync::Arc;

use crate::device::DeviceType;

use super::ble::LeScanSettings;
use super::{LeScanFailure, ScanError};

/// Whether the radio can be used right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Present and switched on.
    Ready,
    /// No radio on this device.
    Unsupported,
    /// Radio present but switched off.
    Disabled,
}

/// A remote device as seen by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDevice {
    /// Hardware address.
    pub address: String,
    /// Advertised or cached name; `None` until the stack has resolved it.
    pub name: Option<String>,
    /// Radio class.
    pub device_type: DeviceType,
}

impl RemoteDevice {
    /// Create a remote device record.
    #[must_use]
    pub fn new(address: impl Into<String>, name: Option<&str>, device_type: DeviceType) -> Self {
        Self {
            address: address.into(),
            name: name.map(str::to_string),
            device_type,
        }
    }

    /// The name, if present and non-blank.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

/// Classic discovery broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// Inquiry found a device.
    DeviceFound {
        /// The device
        device: RemoteDevice,
        /// Signal strength, if the stack reported one
        rssi: Option<i16>,
    },
    /// A device's name was resolved or changed.
    NameChanged {
        /// The device with its new name
        device: RemoteDevice,
    },
    /// Inquiry ended, either naturally or after a cancel.
    DiscoveryFinished,
}

/// LE scan callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeEvent {
    /// One advertisement.
    Result {
        /// Advertising device
        device: RemoteDevice,
        /// Signal strength
        rssi: i16,
    },
    /// Batched advertisements.
    Batch(Vec<(RemoteDevice, i16)>),
    /// The stack aborted the scan.
    Failed(LeScanFailure),
}

/// Callback receiving classic discovery broadcasts.
pub type DiscoveryCallback = Arc<dyn Fn(AdapterEvent) + Send + Sync>;

/// Callback receiving LE scan results.
pub type LeScanCallback = Arc<dyn Fn(LeEvent) + Send + Sync>;

/// Handle to a Bluetooth radio.
pub trait BluetoothAdapter: Send + Sync {
    /// Check whether the radio can be used.
    fn availability(&self) -> Availability;

    /// Whether LE scanning is supported.
    fn supports_low_energy(&self) -> bool;

    /// Whether a classic inquiry is running.
    fn is_discovering(&self) -> bool;

    /// Start a classic inquiry.
    ///
    /// Once started, the adapter must eventually deliver
    /// [`AdapterEvent::DiscoveryFinished`], including after
    /// [`BluetoothAdapter::cancel_discovery`].
    fn start_discovery(&self, callback: DiscoveryCallback) -> Result<(), ScanError>;

    /// Cancel a running inquiry.
    fn cancel_discovery(&self);

    /// Start LE scanning with `settings`.
    fn start_le_scan(&self, settings: &LeScanSettings, callback: LeScanCallback)
        -> Result<(), ScanError>;

    /// Stop LE scanning. No callbacks are delivered afterwards.
    fn stop_le_scan(&self);

    /// Resolve a device by address without scanning.
    fn remote_device(&self, address: &str) -> Result<RemoteDevice, ScanError>;
}

/// Translate an availability result into the error a scanner reports.
pub(crate) fn availability_error(
    availability: Availability,
    transport: crate::device::TransportKind,
) -> Option<ScanError> {
    match availability {
        Availability::Ready => None,
        Availability::Unsupported => Some(ScanError::Unsupported { transport }),
        Availability::Disabled => Some(ScanError::Disabled { transport }),
    }
}

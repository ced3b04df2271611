//! Scanner for a fixed list of known Bluetooth devices.
//!
//! Instead of running an inquiry, each configured address is resolved through
//! [`BluetoothAdapter::remote_device`]. Useful for devices that were paired or
//! seen before and should be offered again without waiting for a scan.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::device::{ScannedDevice, TransportKind};

use super::adapter::{availability_error, BluetoothAdapter};
use super::lifecycle::{Lifecycle, RunToken};
use super::{ScanError, ScanListener, Scanner};

/// A device address to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDevice {
    /// Hardware address.
    pub address: String,
    /// Report the device as an LE device.
    #[serde(default)]
    pub low_energy: bool,
}

impl KnownDevice {
    /// A classic device at `address`.
    #[must_use]
    pub fn classic(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            low_energy: false,
        }
    }

    /// An LE device at `address`.
    #[must_use]
    pub fn low_energy(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            low_energy: true,
        }
    }
}

/// Resolves known addresses through the adapter.
pub struct KnownDeviceScanner {
    name: String,
    adapter: Arc<dyn BluetoothAdapter>,
    devices: Arc<[KnownDevice]>,
    lifecycle: Arc<Lifecycle>,
    cancelled: Arc<AtomicBool>,
}

impl KnownDeviceScanner {
    /// Create a scanner resolving `devices` on `adapter`.
    #[must_use]
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, devices: Vec<KnownDevice>) -> Self {
        Self {
            name: "known-devices".to_string(),
            adapter,
            devices: Arc::from(devices),
            lifecycle: Arc::new(Lifecycle::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the name used in logs and failure reports.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The configured addresses.
    #[must_use]
    pub fn devices(&self) -> &[KnownDevice] {
        &self.devices
    }
}

impl Scanner for KnownDeviceScanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Classic
    }

    fn start(&self, listener: ScanListener) {
        let Some(token) = self.lifecycle.begin(listener) else {
            log::warn!("{}: start ignored, lookups are in progress", self.name);
            return;
        };
        self.cancelled.store(false, Ordering::SeqCst);

        if let Some(error) = availability_error(self.adapter.availability(), TransportKind::Classic)
        {
            log::warn!("{}: {}", self.name, error);
            self.lifecycle.finish(token, Some(error));
            return;
        }

        let pass = Resolution {
            name: self.name.clone(),
            adapter: Arc::clone(&self.adapter),
            devices: Arc::clone(&self.devices),
            lifecycle: Arc::clone(&self.lifecycle),
            cancelled: Arc::clone(&self.cancelled),
            token,
        };
        let spawned = thread::Builder::new()
            .name("devscan-known".to_string())
            .spawn(move || pass.run());

        if let Err(e) = spawned {
            self.lifecycle.finish(
                token,
                Some(ScanError::DeviceLookup {
                    address: String::new(),
                    message: format!("failed to spawn lookup thread: {e}"),
                }),
            );
        }
    }

    fn stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.lifecycle.is_finished()
    }
}

struct Resolution {
    name: String,
    adapter: Arc<dyn BluetoothAdapter>,
    devices: Arc<[KnownDevice]>,
    lifecycle: Arc<Lifecycle>,
    cancelled: Arc<AtomicBool>,
    token: RunToken,
}

impl Resolution {
    fn run(self) {
        for known in self.devices.iter() {
            if self.cancelled.load(Ordering::SeqCst) {
                log::debug!("{}: cancelled, skipping remaining lookups", self.name);
                break;
            }

            let remote = match self.adapter.remote_device(&known.address) {
                Ok(remote) => remote,
                Err(error) => {
                    log::warn!("{}: {}", self.name, error);
                    self.lifecycle.finish(self.token, Some(error));
                    return;
                }
            };
            let Some(name) = remote.label() else {
                log::debug!("Known device {} has no name, skipping", known.address);
                continue;
            };

            let record = if known.low_energy {
                ScannedDevice::bluetooth_le(&remote.address, name, None)
            } else {
                ScannedDevice::bluetooth(&remote.address, name, remote.device_type)
            };
            log::info!("Known device resolved. {}", record.description());
            if !self.lifecycle.emit(self.token, |l| l.discovered(record)) {
                return;
            }
        }

        self.lifecycle.finish(self.token, None);
    }
}

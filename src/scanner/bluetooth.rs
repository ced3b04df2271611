//! Classic Bluetooth inquiry scanner.
//!
//! Starts an inquiry on the injected adapter and translates its broadcasts:
//! a found device becomes a discovery, a resolved name becomes a change, and
//! the end of the inquiry finishes the run. Only classic (or untyped) devices
//! are reported; LE-only and dual-mode devices belong to the LE scanner.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::device::{DeviceType, ScannedDevice, TransportKind};

use super::adapter::{availability_error, AdapterEvent, BluetoothAdapter, DiscoveryCallback, RemoteDevice};
use super::lifecycle::{Lifecycle, RunToken};
use super::{ScanListener, Scanner};

/// Scanner for classic Bluetooth devices.
pub struct BluetoothScanner {
    name: String,
    shared: Arc<Shared>,
}

struct Shared {
    adapter: Arc<dyn BluetoothAdapter>,
    lifecycle: Lifecycle,
    devices: Mutex<HashMap<String, ScannedDevice>>,
}

impl BluetoothScanner {
    /// Create a scanner on `adapter`.
    #[must_use]
    pub fn new(adapter: Arc<dyn BluetoothAdapter>) -> Self {
        Self {
            name: "bluetooth".to_string(),
            shared: Arc::new(Shared {
                adapter,
                lifecycle: Lifecycle::new(),
                devices: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Override the name used in logs and failure reports.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Scanner for BluetoothScanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Classic
    }

    fn start(&self, listener: ScanListener) {
        let Some(token) = self.shared.lifecycle.begin(listener) else {
            log::warn!("{}: start ignored, discovery is in progress", self.name);
            return;
        };
        self.shared.devices().clear();

        let adapter = &self.shared.adapter;
        if let Some(error) = availability_error(adapter.availability(), TransportKind::Classic) {
            log::warn!("{}: {}", self.name, error);
            self.shared.lifecycle.finish(token, Some(error));
            return;
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let callback: DiscoveryCallback = Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_adapter_event(token, event);
            }
        });

        match adapter.start_discovery(callback) {
            Ok(()) => log::debug!("{}: discovery started", self.name),
            Err(error) => {
                log::warn!("{}: failed to start discovery: {}", self.name, error);
                self.shared.lifecycle.finish(token, Some(error));
            }
        }
    }

    fn stop(&self) {
        // The adapter answers a cancel with DiscoveryFinished, which ends the run.
        if self.shared.lifecycle.is_scanning() && self.shared.adapter.is_discovering() {
            log::debug!("{}: cancelling discovery", self.name);
            self.shared.adapter.cancel_discovery();
        }
    }

    fn is_finished(&self) -> bool {
        self.shared.lifecycle.is_finished()
    }
}

impl Shared {
    fn devices(&self) -> std::sync::MutexGuard<'_, HashMap<String, ScannedDevice>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_adapter_event(&self, token: RunToken, event: AdapterEvent) {
        if self.lifecycle.current() != Some(token) {
            log::trace!("Ignoring discovery broadcast for an ended run: {:?}", event);
            return;
        }

        match event {
            AdapterEvent::DeviceFound { device, rssi } => {
                let Some(record) = self.add_or_update(&device, rssi) else {
                    return;
                };
                log::info!(
                    "Bluetooth device found. name={}, address={}, rssi={:?}",
                    record.name(),
                    device.address,
                    rssi
                );
                self.lifecycle.emit(token, |l| l.discovered(record));
            }
            AdapterEvent::NameChanged { device } => {
                let Some(record) = self.add_or_update(&device, None) else {
                    return;
                };
                log::info!(
                    "Bluetooth device name changed. name={}, address={}",
                    record.name(),
                    device.address
                );
                self.lifecycle.emit(token, |l| l.changed(record));
            }
            AdapterEvent::DiscoveryFinished => {
                if self.lifecycle.finish(token, None) {
                    log::debug!("Bluetooth discovery finished");
                }
            }
        }
    }

    /// Fold a broadcast into this run's records.
    ///
    /// Returns `None` for devices this scanner does not report.
    fn add_or_update(&self, device: &RemoteDevice, rssi: Option<i16>) -> Option<ScannedDevice> {
        if matches!(device.device_type, DeviceType::LowEnergy | DeviceType::Dual) {
            log::debug!(
                "Only classic bluetooth devices are accepted, skipping {} ({:?})",
                device.address,
                device.device_type
            );
            return None;
        }
        let Some(name) = device.label() else {
            log::debug!("The name of bluetooth device {} is not set, skipping", device.address);
            return None;
        };

        let mut devices = self.devices();
        let record = devices
            .entry(device.address.clone())
            .and_modify(|existing| existing.set_name(name))
            .or_insert_with(|| ScannedDevice::bluetooth(&device.address, name, device.device_type));
        if rssi.is_some() {
            record.set_rssi(rssi);
        }
        Some(record.clone())
    }
}

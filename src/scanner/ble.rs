//! Bluetooth LE advertisement scanner.
//!
//! LE scanning has no natural end, so every run is bounded by
//! [`LeScanSettings::duration`]: a timer thread stops the scan when it elapses.
//! An explicit [`Scanner::stop`] ends the run early and disarms the timer.

use std::collections::HashSet;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{ScannedDevice, TransportKind};

use super::adapter::{availability_error, BluetoothAdapter, LeEvent, LeScanCallback, RemoteDevice};
use super::lifecycle::{Lifecycle, RunToken};
use super::{ScanError, ScanListener, Scanner};

/// Default bound on one LE scan.
pub const DEFAULT_LE_SCAN_DURATION: Duration = Duration::from_millis(3000);

/// Power/latency trade-off requested from the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Lowest duty cycle.
    LowPower,
    /// Middle ground.
    Balanced,
    /// Scan continuously.
    #[default]
    LowLatency,
}

/// Restricts which advertisers are reported. Unset fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeScanFilter {
    /// Exact advertised name.
    #[serde(default)]
    pub name: Option<String>,
    /// Exact hardware address (case-insensitive).
    #[serde(default)]
    pub address: Option<String>,
}

impl LeScanFilter {
    /// Whether `device` passes this filter.
    #[must_use]
    pub fn matches(&self, device: &RemoteDevice) -> bool {
        let name_ok = self
            .name
            .as_deref()
            .is_none_or(|wanted| device.name.as_deref() == Some(wanted));
        let address_ok = self
            .address
            .as_deref()
            .is_none_or(|wanted| wanted.eq_ignore_ascii_case(&device.address));
        name_ok && address_ok
    }
}

/// Settings for one LE scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeScanSettings {
    /// Radio duty cycle.
    pub mode: ScanMode,
    /// How long a run lasts before it stops itself.
    pub duration: Duration,
    /// Advertiser filters; empty accepts everything, otherwise any match.
    pub filters: Vec<LeScanFilter>,
}

impl Default for LeScanSettings {
    fn default() -> Self {
        Self {
            mode: ScanMode::default(),
            duration: DEFAULT_LE_SCAN_DURATION,
            filters: Vec::new(),
        }
    }
}

impl LeScanSettings {
    /// Set the scan mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the run duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Add an advertiser filter.
    #[must_use]
    pub fn with_filter(mut self, filter: LeScanFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Whether `device` passes the configured filters.
    #[must_use]
    pub fn accepts(&self, device: &RemoteDevice) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f.matches(device))
    }
}

/// Scanner for Bluetooth LE advertisers.
pub struct BluetoothLeScanner {
    name: String,
    shared: Arc<Shared>,
}

struct Shared {
    adapter: Arc<dyn BluetoothAdapter>,
    settings: LeScanSettings,
    lifecycle: Lifecycle,
    seen: Mutex<HashSet<String>>,
    timer: Mutex<Option<Sender<()>>>,
}

impl BluetoothLeScanner {
    /// Create a scanner on `adapter` with `settings`.
    #[must_use]
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, settings: LeScanSettings) -> Self {
        Self {
            name: "bluetooth-le".to_string(),
            shared: Arc::new(Shared {
                adapter,
                settings,
                lifecycle: Lifecycle::new(),
                seen: Mutex::new(HashSet::new()),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Override the name used in logs and failure reports.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Settings this scanner runs with.
    #[must_use]
    pub fn settings(&self) -> &LeScanSettings {
        &self.shared.settings
    }

    fn arm_timer(&self, token: RunToken) {
        let (tx, rx) = mpsc::channel::<()>();
        *self.shared.timer() = Some(tx);

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let duration = self.shared.settings.duration;
        let spawned = thread::Builder::new()
            .name("devscan-le-timer".to_string())
            .spawn(move || {
                // A message or a dropped sender means the run already stopped.
                if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(duration) {
                    if let Some(shared) = weak.upgrade() {
                        log::debug!("LE scan duration of {:?} elapsed", duration);
                        shared.stop_run(token);
                    }
                }
            });

        if let Err(e) = spawned {
            log::error!("{}: failed to spawn scan timer, stopping now: {}", self.name, e);
            self.shared.stop_run(token);
        }
    }
}

impl Scanner for BluetoothLeScanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> TransportKind {
        TransportKind::LowEnergy
    }

    fn start(&self, listener: ScanListener) {
        let Some(token) = self.shared.lifecycle.begin(listener) else {
            log::error!("{}: start ignored, scanning is in progress", self.name);
            return;
        };
        self.shared.seen().clear();

        let adapter = &self.shared.adapter;
        if let Some(error) = availability_error(adapter.availability(), TransportKind::LowEnergy)
        {
            log::warn!("{}: {}", self.name, error);
            self.shared.lifecycle.finish(token, Some(error));
            return;
        }
        if !adapter.supports_low_energy() {
            let error = ScanError::Unsupported {
                transport: TransportKind::LowEnergy,
            };
            log::warn!("{}: {}", self.name, error);
            self.shared.lifecycle.finish(token, Some(error));
            return;
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let callback: LeScanCallback = Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_le_event(token, event);
            }
        });

        if let Err(error) = adapter.start_le_scan(&self.shared.settings, callback) {
            log::warn!("{}: failed to start LE scan: {}", self.name, error);
            self.shared.lifecycle.finish(token, Some(error));
            return;
        }
        // A stop that raced the start has already finished the run.
        if self.shared.lifecycle.current() != Some(token) {
            log::debug!("{}: stopped while the LE scan was starting", self.name);
            adapter.stop_le_scan();
            return;
        }
        log::debug!(
            "{}: LE scan started ({:?}, {:?})",
            self.name,
            self.shared.settings.mode,
            self.shared.settings.duration
        );
        self.arm_timer(token);
    }

    fn stop(&self) {
        match self.shared.lifecycle.current() {
            Some(token) => self.shared.stop_run(token),
            None => log::debug!("{}: stop ignored, not scanning", self.name),
        }
    }

    fn is_finished(&self) -> bool {
        self.shared.lifecycle.is_finished()
    }
}

impl Shared {
    fn seen(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timer(&self) -> MutexGuard<'_, Option<Sender<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn disarm_timer(&self) {
        if let Some(tx) = self.timer().take() {
            let _ = tx.send(());
        }
    }

    fn stop_run(&self, token: RunToken) {
        if self.lifecycle.current() != Some(token) {
            return;
        }
        self.disarm_timer();
        self.adapter.stop_le_scan();
        self.lifecycle.finish(token, None);
    }

    fn on_le_event(&self, token: RunToken, event: LeEvent) {
        match event {
            LeEvent::Result { device, rssi } => self.on_result(token, &device, rssi),
            LeEvent::Batch(results) => {
                for (device, rssi) in &results {
                    self.on_result(token, device, *rssi);
                }
            }
            LeEvent::Failed(code) => {
                log::error!("Bluetooth LE scan failed! errorCode={}", code);
                if self.lifecycle.current() == Some(token) {
                    self.disarm_timer();
                    self.lifecycle.finish(
                        token,
                        Some(ScanError::ScanFailed {
                            transport: TransportKind::LowEnergy,
                            code,
                        }),
                    );
                }
            }
        }
    }

    fn on_result(&self, token: RunToken, device: &RemoteDevice, rssi: i16) {
        let Some(name) = device.label() else {
            log::debug!(
                "The name of scanned BLE device is not set, skipping {}",
                device.address
            );
            return;
        };
        if !self.settings.accepts(device) {
            log::trace!("BLE device {} rejected by scan filters", device.address);
            return;
        }
        if self.lifecycle.current() != Some(token) || !self.seen().insert(device.address.clone()) {
            return;
        }

        log::info!(
            "Bluetooth LE device is scanned. name={}, address={}, rssi={}",
            name,
            device.address,
            rssi
        );
        let record = ScannedDevice::bluetooth_le(&device.address, name, Some(rssi));
        self.lifecycle.emit(token, |l| l.discovered(record));
    }
}

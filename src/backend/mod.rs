//! Hardware handles the scanners can be built on.
//!
//! The crate never talks to a radio itself. The host supplies the handles:
//!
//! - [`NoAdapter`]: a host without Bluetooth
//! - [`SimulatedAdapter`] and [`SimulatedUsbHost`]: replay a [`fixture::Fixture`]
//! - [`sysfs::SysfsUsbHost`]: attached USB devices from Linux sysfs

pub mod fixture;
pub mod sysfs;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::device::TransportKind;
use crate::scanner::adapter::{availability_error, DiscoveryCallback, LeScanCallback};
use crate::scanner::{
    AdapterEvent, Availability, BluetoothAdapter, LeEvent, LeScanFailure, LeScanSettings,
    RemoteDevice, ScanError, UsbDeviceInfo, UsbHost,
};

use fixture::BluetoothFixture;

pub use sysfs::SysfsUsbHost;

/// Adapter for hosts without a Bluetooth radio.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdapter;

impl BluetoothAdapter for NoAdapter {
    fn availability(&self) -> Availability {
        Availability::Unsupported
    }

    fn supports_low_energy(&self) -> bool {
        false
    }

    fn is_discovering(&self) -> bool {
        false
    }

    fn start_discovery(&self, _callback: DiscoveryCallback) -> Result<(), ScanError> {
        Err(ScanError::Unsupported {
            transport: TransportKind::Classic,
        })
    }

    fn cancel_discovery(&self) {}

    fn start_le_scan(
        &self,
        _settings: &LeScanSettings,
        _callback: LeScanCallback,
    ) -> Result<(), ScanError> {
        Err(ScanError::Unsupported {
            transport: TransportKind::LowEnergy,
        })
    }

    fn stop_le_scan(&self) {}

    fn remote_device(&self, _address: &str) -> Result<RemoteDevice, ScanError> {
        Err(ScanError::Unsupported {
            transport: TransportKind::Classic,
        })
    }
}

/// Adapter replaying a [`BluetoothFixture`].
///
/// Inquiries play the classic broadcasts on a background thread and end with
/// a discovery-finished broadcast, also after a cancel. LE scans play the
/// advertisements accepted by the scan filters, optionally abort with the
/// fixture's failure code, and otherwise stay open until stopped.
#[derive(Debug)]
pub struct SimulatedAdapter {
    fixture: Arc<BluetoothFixture>,
    discovering: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    le_run: Arc<AtomicU64>,
    le_active: Arc<AtomicBool>,
}

impl SimulatedAdapter {
    /// Create an adapter replaying `fixture`.
    #[must_use]
    pub fn new(fixture: BluetoothFixture) -> Self {
        Self {
            fixture: Arc::new(fixture),
            discovering: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
            le_run: Arc::new(AtomicU64::new(0)),
            le_active: Arc::new(AtomicBool::new(false)),
        }
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.fixture.delay_ms)
    }

    fn check(&self, transport: TransportKind) -> Result<(), ScanError> {
        match availability_error(self.availability(), transport) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn spawn_failed(transport: TransportKind, e: &std::io::Error) -> ScanError {
    ScanError::Enumeration {
        transport,
        message: format!("failed to spawn simulator thread: {e}"),
    }
}

impl BluetoothAdapter for SimulatedAdapter {
    fn availability(&self) -> Availability {
        if !self.fixture.supported {
            Availability::Unsupported
        } else if !self.fixture.enabled {
            Availability::Disabled
        } else {
            Availability::Ready
        }
    }

    fn supports_low_energy(&self) -> bool {
        self.fixture.supported && self.fixture.low_energy
    }

    fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    fn start_discovery(&self, callback: DiscoveryCallback) -> Result<(), ScanError> {
        self.check(TransportKind::Classic)?;
        self.cancelled.store(false, Ordering::SeqCst);
        self.discovering.store(true, Ordering::SeqCst);

        let fixture = Arc::clone(&self.fixture);
        let discovering = Arc::clone(&self.discovering);
        let cancelled = Arc::clone(&self.cancelled);
        let delay = self.delay();
        let spawned = thread::Builder::new()
            .name("devscan-sim-inquiry".to_string())
            .spawn(move || {
                for step in &fixture.classic {
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }
                    callback(step.to_event());
                }
                discovering.store(false, Ordering::SeqCst);
                callback(AdapterEvent::DiscoveryFinished);
            });

        spawned.map(|_| ()).map_err(|e| {
            self.discovering.store(false, Ordering::SeqCst);
            spawn_failed(TransportKind::Classic, &e)
        })
    }

    fn cancel_discovery(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn start_le_scan(
        &self,
        settings: &LeScanSettings,
        callback: LeScanCallback,
    ) -> Result<(), ScanError> {
        self.check(TransportKind::LowEnergy)?;
        if !self.supports_low_energy() {
            return Err(ScanError::Unsupported {
                transport: TransportKind::LowEnergy,
            });
        }
        if self.le_active.swap(true, Ordering::SeqCst) {
            return Err(ScanError::ScanFailed {
                transport: TransportKind::LowEnergy,
                code: LeScanFailure::AlreadyStarted,
            });
        }
        let run = self.le_run.fetch_add(1, Ordering::SeqCst) + 1;

        let fixture = Arc::clone(&self.fixture);
        let le_run = Arc::clone(&self.le_run);
        let le_active = Arc::clone(&self.le_active);
        let aborted = Arc::clone(&self.le_active);
        let settings = settings.clone();
        let delay = self.delay();
        let live = move || le_active.load(Ordering::SeqCst) && le_run.load(Ordering::SeqCst) == run;
        let spawned = thread::Builder::new()
            .name("devscan-sim-le".to_string())
            .spawn(move || {
                for step in &fixture.le {
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    if !live() {
                        return;
                    }
                    let device = step.device();
                    if settings.accepts(&device) {
                        callback(LeEvent::Result {
                            device,
                            rssi: step.rssi,
                        });
                    }
                }
                if let Some(code) = fixture.le_failure {
                    if live() {
                        aborted.store(false, Ordering::SeqCst);
                        callback(LeEvent::Failed(LeScanFailure::from_code(code)));
                    }
                }
            });

        spawned.map(|_| ()).map_err(|e| {
            self.le_active.store(false, Ordering::SeqCst);
            spawn_failed(TransportKind::LowEnergy, &e)
        })
    }

    fn stop_le_scan(&self) {
        self.le_active.store(false, Ordering::SeqCst);
    }

    fn remote_device(&self, address: &str) -> Result<RemoteDevice, ScanError> {
        self.check(TransportKind::Classic)?;
        self.fixture
            .known
            .iter()
            .find(|known| known.address.eq_ignore_ascii_case(address))
            .map(|known| RemoteDevice::new(&known.address, known.name.as_deref(), known.device_type))
            .ok_or_else(|| ScanError::DeviceLookup {
                address: address.to_string(),
                message: "device is not known to the adapter".to_string(),
            })
    }
}

/// USB host listing a fixed set of devices.
#[derive(Debug, Clone, Default)]
pub struct SimulatedUsbHost {
    devices: Vec<UsbDeviceInfo>,
    error: Option<String>,
}

impl SimulatedUsbHost {
    /// A host with `devices` attached.
    #[must_use]
    pub fn new(devices: Vec<UsbDeviceInfo>) -> Self {
        Self {
            devices,
            error: None,
        }
    }

    /// A host whose enumeration fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            devices: Vec::new(),
            error: Some(message.into()),
        }
    }
}

impl UsbHost for SimulatedUsbHost {
    fn devices(&self) -> Result<Vec<UsbDeviceInfo>, ScanError> {
        match &self.error {
            Some(message) => Err(ScanError::Enumeration {
                transport: TransportKind::Usb,
                message: message.clone(),
            }),
            None => Ok(self.devices.clone()),
        }
    }
}

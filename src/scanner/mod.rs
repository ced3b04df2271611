//! Scanner contract and the bundled transport scanners.
//!
//! Every discovery backend implements [`Scanner`]. A scanner is started with a
//! [`ScanListener`], reports devices through it while it runs, and always ends
//! a run with exactly one finish notification, preceded by a failure when the
//! transport could not be used.
//!
//! # Architecture
//!
//! - [`lifecycle`]: shared `Idle -> Scanning -> Finished` state machine
//! - [`adapter`]: injected Bluetooth adapter handle and its callback events
//! - [`bluetooth`]: classic Bluetooth inquiry
//! - [`ble`]: Bluetooth LE advertisement scanning with a duration bound
//! - [`usb`]: attached USB peripheral enumeration
//! - [`known`]: resolution of a fixed list of known Bluetooth addresses
//! - [`scripted`]: replays a scripted event sequence
//!
//! # Example
//!
//! ```
//! use devscan::device::{DeviceType, ScannedDevice};
//! use devscan::scanner::scripted::{ScriptedScanner, Step};
//! use devscan::scanner::{ScanEvent, ScanListener, Scanner};
//! use std::sync::mpsc;
//!
//! let scanner = ScriptedScanner::new("demo", vec![
//!     Step::Discover(ScannedDevice::bluetooth("AA:BB", "Glove", DeviceType::Classic)),
//!     Step::Finish,
//! ]);
//!
//! let (tx, rx) = mpsc::channel();
//! scanner.start(ScanListener::new(move |event| {
//!     let _ = tx.send(event);
//! }));
//!
//! assert!(matches!(rx.recv().unwrap(), ScanEvent::Discovered(_)));
//! assert!(matches!(rx.recv().unwrap(), ScanEvent::Finished));
//! assert!(scanner.is_finished());
//! ```

pub mod adapter;
pub mod ble;
pub mod bluetooth;
pub mod known;
pub mod lifecycle;
pub mod scripted;
pub mod usb;

use std::fmt;
use std::sync::Arc;

use crate::device::{ScannedDevice, TransportKind};

pub use adapter::{AdapterEvent, Availability, BluetoothAdapter, LeEvent, RemoteDevice};
pub use ble::{BluetoothLeScanner, LeScanFilter, LeScanSettings, ScanMode};
pub use bluetooth::BluetoothScanner;
pub use known::{KnownDevice, KnownDeviceScanner};
pub use lifecycle::{Lifecycle, ScanState};
pub use usb::{ProductFilter, UsbDeviceInfo, UsbHost, UsbScanner};

/// Position of a scanner within its session, in construction order.
pub type ScannerId = usize;

/// A discovery backend for one transport.
///
/// Implementations run their discovery asynchronously and report through the
/// listener passed to [`Scanner::start`]. The contract every implementation
/// must honour:
///
/// - `start` eventually produces discovery/change events followed by one
///   finish, or a failure followed by one finish.
/// - No discovery events are emitted after finish.
/// - `stop` is best-effort, may be called any number of times in any state,
///   and never suppresses the finish.
/// - `is_finished` returns `true` from the moment the finish is delivered.
/// - Devices without a resolvable name are not reported.
pub trait Scanner: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Transport this scanner discovers on.
    fn transport(&self) -> TransportKind;

    /// Begin a discovery run reporting to `listener`.
    fn start(&self, listener: ScanListener);

    /// Request an early end of the current run.
    fn stop(&self);

    /// Whether the current run has delivered its finish.
    fn is_finished(&self) -> bool;
}

/// One notification from a scanner.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A device was found.
    Discovered(ScannedDevice),
    /// A known device's metadata changed.
    Changed(ScannedDevice),
    /// The transport reported an error.
    Failed(ScanError),
    /// The scanner finished its run.
    Finished,
}

/// Handle a scanner reports through during one run.
///
/// Cheap to clone; clones feed the same destination. Once the run it belongs to
/// has ended, reports are silently discarded.
#[derive(Clone)]
pub struct ScanListener {
    emit: Arc<dyn Fn(ScanEvent) + Send + Sync>,
}

impl ScanListener {
    /// Create a listener that hands every event to `emit`.
    ///
    /// `emit` must not call back into the scanner that owns the listener.
    pub fn new<F>(emit: F) -> Self
    where
        F: Fn(ScanEvent) + Send + Sync + 'static,
    {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// Report a newly found device.
    ///
    /// Devices with a blank name are dropped here.
    pub fn discovered(&self, device: ScannedDevice) {
        if has_label(&device) {
            (self.emit)(ScanEvent::Discovered(device));
        }
    }

    /// Report updated metadata for a device.
    ///
    /// Devices with a blank name are dropped here.
    pub fn changed(&self, device: ScannedDevice) {
        if has_label(&device) {
            (self.emit)(ScanEvent::Changed(device));
        }
    }

    /// Report a transport failure.
    pub fn failed(&self, error: ScanError) {
        (self.emit)(ScanEvent::Failed(error));
    }

    /// Report the end of the run.
    pub fn finished(&self) {
        (self.emit)(ScanEvent::Finished);
    }
}

impl fmt::Debug for ScanListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanListener").finish_non_exhaustive()
    }
}

fn has_label(device: &ScannedDevice) -> bool {
    if device.name().trim().is_empty() {
        log::debug!(
            "Dropping {} device {} without a name",
            device.transport(),
            device.identifier()
        );
        false
    } else {
        true
    }
}

/// Failure codes an LE scan can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeScanFailure {
    /// A scan with the same settings is already running.
    AlreadyStarted,
    /// The stack could not register the scanning application.
    ApplicationRegistrationFailed,
    /// The requested scan feature is not supported.
    FeatureUnsupported,
    /// Internal stack error.
    InternalError,
    /// Code the stack reported but that is not known here.
    Unknown(i32),
}

impl LeScanFailure {
    /// Map a raw stack error code.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::AlreadyStarted,
            2 => Self::ApplicationRegistrationFailed,
            3 => Self::InternalError,
            4 => Self::FeatureUnsupported,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for LeScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "SCAN_FAILED_ALREADY_STARTED"),
            Self::ApplicationRegistrationFailed => {
                write!(f, "SCAN_FAILED_APPLICATION_REGISTRATION_FAILED")
            }
            Self::FeatureUnsupported => write!(f, "SCAN_FAILED_FEATURE_UNSUPPORTED"),
            Self::InternalError => write!(f, "SCAN_FAILED_INTERNAL_ERROR"),
            Self::Unknown(code) => write!(f, "UNKNOWN ({code})"),
        }
    }
}

/// Errors a transport can report.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The device has no hardware for the transport.
    #[error("{transport} is not supported by the device")]
    Unsupported {
        /// Transport that is missing
        transport: TransportKind,
    },

    /// The hardware exists but is switched off.
    #[error("{transport} adapter is not enabled")]
    Disabled {
        /// Transport that is disabled
        transport: TransportKind,
    },

    /// The process lacks a permission the transport needs.
    #[error("Permission denied for {transport}: {detail}")]
    PermissionDenied {
        /// Transport that was refused
        transport: TransportKind,
        /// What was refused
        detail: String,
    },

    /// The radio stack aborted a running scan.
    #[error("{transport} scan failed: {code}")]
    ScanFailed {
        /// Transport whose scan failed
        transport: TransportKind,
        /// Failure code from the stack
        code: LeScanFailure,
    },

    /// Listing attached devices failed.
    #[error("{transport} enumeration failed: {message}")]
    Enumeration {
        /// Transport being enumerated
        transport: TransportKind,
        /// Underlying error text
        message: String,
    },

    /// A known device could not be resolved.
    #[error("Failed to look up device {address}: {message}")]
    DeviceLookup {
        /// Address that was looked up
        address: String,
        /// Underlying error text
        message: String,
    },
}

impl ScanError {
    /// Whether the transport could not be used at all.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unsupported { .. } | Self::Disabled { .. } | Self::PermissionDenied { .. }
        )
    }
}

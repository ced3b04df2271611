//! Scan session coordinator.
//!
//! A [`ScanSession`] owns an ordered list of scanners and turns their
//! independent event streams into one stream for an [`EventSink`]:
//!
//! * **Fan-out**: `start` starts every scanner with its own listener.
//! * **Fan-in**: all listeners feed a per-run channel drained by a dispatcher
//!   thread, so the sink sees one serialized stream.
//! * **Deduplication**: devices are keyed by scanner and identifier; a repeated
//!   discovery refreshes the stored record without reaching the sink, and a
//!   change for an unseen device is reported as a discovery.
//! * **Join**: once every scanner reported its finish, the sink receives exactly
//!   one `on_session_finished`, after everything else of that run.
//!
//! # Architecture
//!
//! * [`registry`]: per-run device map.
//! * [`sink`]: the caller-side [`EventSink`] contract and a recording sink.
//! * `dispatch`: the per-run dispatcher and the shared run flag.
//!
//! # Example
//!
//! ```
//! use devscan::device::{DeviceType, ScannedDevice};
//! use devscan::scanner::scripted::{ScriptedScanner, Step};
//! use devscan::session::{RecordingSink, ScanSession};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let sink = Arc::new(RecordingSink::new());
//! let session = ScanSession::builder()
//!     .scanner(Arc::new(ScriptedScanner::new("demo", vec![
//!         Step::Discover(ScannedDevice::bluetooth("AA:BB", "Glove", DeviceType::Classic)),
//!         Step::Finish,
//!     ])))
//!     .listen(sink.clone())
//!     .build();
//!
//! assert!(session.start());
//! assert!(session.wait_finished(Some(Duration::from_secs(5))));
//! assert_eq!(sink.discovered().len(), 1);
//! assert_eq!(sink.finished_count(), 1);
//! ```

mod dispatch;
pub mod registry;
pub mod sink;

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::scanner::{
    BluetoothAdapter, BluetoothLeScanner, BluetoothScanner, KnownDevice, KnownDeviceScanner,
    LeScanSettings, ProductFilter, ScanListener, Scanner, UsbHost, UsbScanner,
};

use dispatch::{Dispatcher, Envelope, RunState};

pub use registry::{DeviceKey, DeviceRegistry};
pub use sink::{EventSink, RecordingSink, ScanFailure, SinkEvent};

/// Why a run could not be started.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A run is already in progress.
    #[error("A scan is already in progress")]
    AlreadyScanning,

    /// No sink was configured.
    #[error("No event sink is configured for the scan session")]
    NoSink,

    /// The dispatcher thread could not be created.
    #[error("Failed to start the event dispatcher: {0}")]
    Dispatcher(#[source] std::io::Error),
}

/// Coordinates a fixed set of scanners.
pub struct ScanSession {
    scanners: Arc<[Arc<dyn Scanner>]>,
    sink: Mutex<Option<Arc<dyn EventSink>>>,
    state: Arc<RunState>,
    control: Mutex<Option<Sender<Envelope>>>,
}

impl ScanSession {
    /// Start configuring a session.
    #[must_use]
    pub fn builder() -> ScanSessionBuilder {
        ScanSessionBuilder::default()
    }

    /// The scanners, in the order they were added.
    #[must_use]
    pub fn scanners(&self) -> &[Arc<dyn Scanner>] {
        &self.scanners
    }

    fn sink(&self) -> MutexGuard<'_, Option<Arc<dyn EventSink>>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn control(&self) -> MutexGuard<'_, Option<Sender<Envelope>>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the sink. Only allowed while no run is in progress.
    pub fn set_sink(&self, sink: Arc<dyn EventSink>) -> Result<(), SessionError> {
        if self.state.is_scanning() {
            return Err(SessionError::AlreadyScanning);
        }
        *self.sink() = Some(sink);
        Ok(())
    }

    /// Start a run, returning `false` if it could not be started.
    ///
    /// See [`ScanSession::try_start`] for the reasons.
    pub fn start(&self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Scan not started: {}", e);
                false
            }
        }
    }

    /// Start a run.
    ///
    /// Fails without side effects if a run is in progress or no sink is set.
    /// Otherwise every scanner is started, in order, with a listener feeding
    /// this run's dispatcher. With no scanners the run finishes immediately.
    pub fn try_start(&self) -> Result<(), SessionError> {
        if self.state.is_scanning() {
            return Err(SessionError::AlreadyScanning);
        }
        let sink = self.sink().clone().ok_or(SessionError::NoSink)?;
        let run = self.state.begin().ok_or(SessionError::AlreadyScanning)?;

        let (tx, rx) = mpsc::channel();
        let dispatcher = Dispatcher::new(
            run,
            rx,
            sink,
            Arc::clone(&self.scanners),
            Arc::clone(&self.state),
        );
        if let Err(e) = thread::Builder::new()
            .name("devscan-dispatch".to_string())
            .spawn(move || dispatcher.run())
        {
            self.state.rollback(run);
            return Err(SessionError::Dispatcher(e));
        }
        *self.control() = Some(tx.clone());

        log::debug!("Starting scan run {} with {} scanner(s)", run, self.scanners.len());
        for (id, scanner) in self.scanners.iter().enumerate() {
            let tx = tx.clone();
            let listener = ScanListener::new(move |event| {
                let _ = tx.send(Envelope::Event(id, event));
            });
            log::debug!("Starting {} ({})", scanner.name(), scanner.transport());
            scanner.start(listener);
        }
        Ok(())
    }

    /// Ask every scanner to end early.
    ///
    /// Safe to call at any time. The run still ends through the scanners'
    /// finish reports.
    pub fn stop(&self) {
        for scanner in self.scanners.iter() {
            scanner.stop();
        }
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.state.is_scanning()
    }

    /// Block until the current run delivered `on_session_finished`.
    ///
    /// Returns `true` immediately when nothing is in flight and `false` if
    /// `timeout` elapsed first.
    pub fn wait_finished(&self, timeout: Option<Duration>) -> bool {
        self.state.wait_finished(timeout)
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if let Some(control) = self.control().take() {
            if self.state.is_scanning() {
                log::debug!("Scan session dropped while scanning, abandoning the run");
            }
            let _ = control.send(Envelope::Abandon);
        }
        self.stop();
    }
}

/// Builder for [`ScanSession`].
#[derive(Default)]
pub struct ScanSessionBuilder {
    scanners: Vec<Arc<dyn Scanner>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl ScanSessionBuilder {
    /// Add a scanner.
    #[must_use]
    pub fn scanner(mut self, scanner: Arc<dyn Scanner>) -> Self {
        self.scanners.push(scanner);
        self
    }

    /// Add a classic Bluetooth scanner on `adapter`.
    #[must_use]
    pub fn bluetooth(self, adapter: Arc<dyn BluetoothAdapter>) -> Self {
        self.scanner(Arc::new(BluetoothScanner::new(adapter)))
    }

    /// Add a Bluetooth LE scanner on `adapter`.
    #[must_use]
    pub fn bluetooth_le(self, adapter: Arc<dyn BluetoothAdapter>, settings: LeScanSettings) -> Self {
        self.scanner(Arc::new(BluetoothLeScanner::new(adapter, settings)))
    }

    /// Add a USB scanner on `host`, limited to `supported_products` if given.
    #[must_use]
    pub fn usb(self, host: Arc<dyn UsbHost>, supported_products: Option<Vec<ProductFilter>>) -> Self {
        self.scanner(Arc::new(UsbScanner::new(host, supported_products)))
    }

    /// Add a scanner resolving `devices` on `adapter`.
    #[must_use]
    pub fn known_devices(self, adapter: Arc<dyn BluetoothAdapter>, devices: Vec<KnownDevice>) -> Self {
        self.scanner(Arc::new(KnownDeviceScanner::new(adapter, devices)))
    }

    /// Set the sink.
    #[must_use]
    pub fn listen(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Number of scanners added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    /// Whether no scanner was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }

    /// Finish configuration.
    #[must_use]
    pub fn build(self) -> ScanSession {
        ScanSession {
            scanners: Arc::from(self.scanners),
            sink: Mutex::new(self.sink),
            state: Arc::new(RunState::default()),
            control: Mutex::new(None),
        }
    }
}

//! Terminal event sink.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use super::text::{changed_line, discovered_line, failure_line};
use super::ScanReport;
use crate::device::ScannedDevice;
use crate::progress::ScanProgress;
use crate::session::{EventSink, ScanFailure};

/// Sink used by the command-line scan.
///
/// Every event goes into a [`ScanReport`]. With live output on, events are
/// also printed above the progress spinner as they arrive.
#[derive(Debug)]
pub struct ConsoleSink {
    report: Mutex<ScanReport>,
    progress: ScanProgress,
    live: bool,
}

impl ConsoleSink {
    /// Create a sink starting its report now.
    #[must_use]
    pub fn new(progress: ScanProgress, live: bool) -> Self {
        Self {
            report: Mutex::new(ScanReport::new(Utc::now())),
            progress,
            live,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScanReport> {
        self.report.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn show(&self, line: String, report: &ScanReport) {
        if self.live {
            self.progress.println(&line);
        }
        self.progress.update(report.devices.len(), report.failures.len());
    }

    /// Whether the session told this sink it finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lock().completed
    }

    /// The spinner, for status messages while stopping.
    #[must_use]
    pub fn progress(&self) -> &ScanProgress {
        &self.progress
    }

    /// Close and return the report.
    ///
    /// `completed` stays as the session reported it.
    #[must_use]
    pub fn finish(&self, interrupted: bool) -> ScanReport {
        let mut report = self.lock();
        let completed = report.completed;
        report.finish(Utc::now(), completed, interrupted);
        self.progress.finish(&format!(
            "Scanned: {} device(s), {} failure(s)",
            report.devices.len(),
            report.failures.len()
        ));
        report.clone()
    }
}

impl EventSink for ConsoleSink {
    fn on_device_discovered(&self, device: &ScannedDevice) {
        log::debug!("Discovered {} via {}", device.identifier(), device.transport());
        let mut report = self.lock();
        report.record_discovered(device);
        self.show(discovered_line(device), &report);
    }

    fn on_device_changed(&self, device: &ScannedDevice) {
        log::trace!("Changed {} via {}", device.identifier(), device.transport());
        let mut report = self.lock();
        report.record_changed(device);
        self.show(changed_line(device), &report);
    }

    fn on_failure(&self, failure: &ScanFailure) {
        log::warn!("Scanner {}", failure);
        let mut report = self.lock();
        report.record_failure(failure);
        self.show(failure_line(failure), &report);
    }

    fn on_session_finished(&self) {
        log::debug!("All scanners finished");
        let mut report = self.lock();
        report.completed = true;
        self.progress.set_message("All transports finished");
    }
}

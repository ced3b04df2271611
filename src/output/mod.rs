//! Scan result reporting.
//!
//! [`ConsoleSink`] listens to a running session, prints devices as they
//! appear and collects everything into a [`ScanReport`]. Once the session is
//! over the report is rendered in one of three formats:
//! - text for people
//! - JSON for automation and scripting
//! - CSV for spreadsheet import
//!
//! # Example
//!
//! ```
//! use devscan::device::{DeviceType, ScannedDevice};
//! use devscan::output::{ScanReport, TextOutput};
//!
//! let mut report = ScanReport::new(chrono::Utc::now());
//! report.record_discovered(&ScannedDevice::bluetooth("AA:BB", "Glove", DeviceType::Classic));
//!
//! let mut out = Vec::new();
//! TextOutput::new(&report).write_to(&mut out).unwrap();
//! assert!(String::from_utf8(out).unwrap().contains("Glove (AA:BB)"));
//! ```

pub mod csv;
pub mod json;
pub mod sink;
pub mod text;

use std::io;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::cli::OutputFormat;
use crate::device::{short_to_hex, ScannedDevice, TransportKind};
use crate::error::ExitCode;
use crate::session::ScanFailure;

pub use csv::CsvOutput;
pub use json::JsonOutput;
pub use sink::ConsoleSink;
pub use text::TextOutput;

/// Errors that can occur while writing a report.
#[derive(Debug, Error)]
pub enum OutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    /// Error during JSON serialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One reported device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDevice {
    /// Transport short name (`classic`, `le`, `usb`).
    pub transport: String,
    /// Address or device node path.
    pub identifier: String,
    /// Display label.
    pub name: String,
    /// Full description line.
    pub description: String,
    /// Last signal strength for radio devices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
    /// USB vendor id as `0xABCD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    /// USB product id as `0xABCD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// When the device was first seen (RFC 3339).
    pub discovered_at: String,
    /// When its record last changed (RFC 3339).
    pub updated_at: String,
}

impl ReportDevice {
    /// Snapshot a device record.
    #[must_use]
    pub fn from_device(device: &ScannedDevice) -> Self {
        let usb = device.usb_info();
        Self {
            transport: device.transport().as_str().to_string(),
            identifier: device.identifier().to_string(),
            name: device.name().to_string(),
            description: device.description().to_string(),
            rssi: device.rssi(),
            vendor_id: usb.map(|info| short_to_hex(info.vendor_id)),
            product_id: usb.map(|info| short_to_hex(info.product_id)),
            discovered_at: device.discovered_at().to_rfc3339(),
            updated_at: device.updated_at().to_rfc3339(),
        }
    }

    fn is_same_device(&self, device: &ScannedDevice) -> bool {
        self.identifier == device.identifier() && self.transport == device.transport().as_str()
    }
}

/// One scanner failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportFailure {
    /// Scanner name.
    pub scanner: String,
    /// Transport short name.
    pub transport: String,
    /// Error message.
    pub error: String,
}

impl ReportFailure {
    /// Snapshot a session failure.
    #[must_use]
    pub fn from_failure(failure: &ScanFailure) -> Self {
        Self {
            scanner: failure.scanner.clone(),
            transport: failure.transport.as_str().to_string(),
            error: failure.error.to_string(),
        }
    }
}

/// Everything a scan reported, plus how it ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    /// Devices in the order they were first reported.
    pub devices: Vec<ReportDevice>,
    /// Failures in the order they were reported.
    pub failures: Vec<ReportFailure>,
    /// When scanning started.
    pub started_at: DateTime<Utc>,
    /// When the session finished or was abandoned.
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock scan time in milliseconds.
    pub duration_ms: u64,
    /// Whether every scanner reported its finish.
    pub completed: bool,
    /// Whether the user interrupted the scan.
    pub interrupted: bool,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DS000")
    pub exit_code_name: String,
}

impl ScanReport {
    /// Start an empty report.
    #[must_use]
    pub fn new(started_at: DateTime<Utc>) -> Self {
        let exit_code = ExitCode::for_scan(0, 0);
        Self {
            devices: Vec::new(),
            failures: Vec::new(),
            started_at,
            finished_at: None,
            duration_ms: 0,
            completed: false,
            interrupted: false,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }

    /// Add a newly discovered device.
    pub fn record_discovered(&mut self, device: &ScannedDevice) {
        self.devices.push(ReportDevice::from_device(device));
        self.refresh_exit_code();
    }

    /// Replace the entry of a changed device, or add it when unseen.
    pub fn record_changed(&mut self, device: &ScannedDevice) {
        let snapshot = ReportDevice::from_device(device);
        match self.devices.iter_mut().rev().find(|d| d.is_same_device(device)) {
            Some(existing) => {
                // Keep the first-seen time of the entry being replaced.
                let discovered_at = std::mem::take(&mut existing.discovered_at);
                *existing = ReportDevice {
                    discovered_at,
                    ..snapshot
                };
            }
            None => self.devices.push(snapshot),
        }
        self.refresh_exit_code();
    }

    /// Add a failure.
    pub fn record_failure(&mut self, failure: &ScanFailure) {
        self.failures.push(ReportFailure::from_failure(failure));
        self.refresh_exit_code();
    }

    /// Close the report.
    pub fn finish(&mut self, finished_at: DateTime<Utc>, completed: bool, interrupted: bool) {
        self.finished_at = Some(finished_at);
        self.duration_ms = (finished_at - self.started_at).num_milliseconds().max(0) as u64;
        self.completed = completed;
        self.interrupted = interrupted;
        self.refresh_exit_code();
    }

    /// Exit code this report maps to.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.interrupted {
            ExitCode::Interrupted
        } else {
            ExitCode::for_scan(self.devices.len(), self.failures.len())
        }
    }

    /// Number of devices of one transport.
    #[must_use]
    pub fn count_for(&self, transport: TransportKind) -> usize {
        self.devices
            .iter()
            .filter(|d| d.transport == transport.as_str())
            .count()
    }

    fn refresh_exit_code(&mut self) {
        let code = self.exit_code();
        self.exit_code = code.as_i32();
        self.exit_code_name = code.code_prefix().to_string();
    }
}

/// Write `report` in `format`.
///
/// # Errors
///
/// Returns `OutputError` if serialization or writing fails.
pub fn write_report<W: io::Write>(
    report: &ScanReport,
    format: OutputFormat,
    writer: W,
) -> Result<(), OutputError> {
    match format {
        OutputFormat::Text => TextOutput::new(report).write_to(writer),
        OutputFormat::Json => JsonOutput::new(report).write_to(writer),
        OutputFormat::Csv => CsvOutput::new(report).write_to(writer),
    }
}

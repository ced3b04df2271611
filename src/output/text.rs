//! Human-readable output.
//!
//! Live lines are printed while the session runs; [`TextOutput`] prints the
//! summary afterwards, devices grouped by transport.

use std::io::Write;

use yansi::Paint;

use super::{OutputError, ReportDevice, ScanReport};
use crate::device::{ScannedDevice, TransportKind};
use crate::session::ScanFailure;

const TRANSPORT_ORDER: [TransportKind; 3] = [
    TransportKind::Classic,
    TransportKind::LowEnergy,
    TransportKind::Usb,
];

/// Line printed when a device is first seen.
#[must_use]
pub fn discovered_line(device: &ScannedDevice) -> String {
    format!(
        "{} {:<12} {}",
        "+".green().bold(),
        device.transport().to_string(),
        device.description()
    )
}

/// Line printed when a device's metadata changes.
#[must_use]
pub fn changed_line(device: &ScannedDevice) -> String {
    format!(
        "{} {:<12} {}",
        "~".yellow(),
        device.transport().to_string(),
        device.description()
    )
}

/// Line printed when a scanner fails.
#[must_use]
pub fn failure_line(failure: &ScanFailure) -> String {
    format!("{} {}", "!".red().bold(), failure.to_string().red())
}

/// Summary formatter.
pub struct TextOutput<'a> {
    report: &'a ScanReport,
}

impl<'a> TextOutput<'a> {
    /// Create a new text formatter.
    #[must_use]
    pub fn new(report: &'a ScanReport) -> Self {
        Self { report }
    }

    /// Write the summary.
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if writing fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), OutputError> {
        let report = self.report;
        let seconds = report.duration_ms as f64 / 1000.0;

        if report.devices.is_empty() {
            writeln!(writer, "{} ({seconds:.2}s)", "No devices found".bold())?;
        } else {
            writeln!(
                writer,
                "{} ({seconds:.2}s)",
                format!("Found {} device(s)", report.devices.len()).bold()
            )?;
        }

        for transport in TRANSPORT_ORDER {
            let devices: Vec<&ReportDevice> = report
                .devices
                .iter()
                .filter(|d| d.transport == transport.as_str())
                .collect();
            if devices.is_empty() {
                continue;
            }
            writeln!(writer)?;
            writeln!(writer, "{}", transport.to_string().cyan().bold())?;
            for device in devices {
                writeln!(writer, "  {}", device.description)?;
            }
        }

        if !report.failures.is_empty() {
            writeln!(writer)?;
            writeln!(
                writer,
                "{}",
                format!("{} failure(s):", report.failures.len()).red().bold()
            )?;
            for failure in &report.failures {
                writeln!(writer, "  {}: {}", failure.scanner, failure.error)?;
            }
        }

        if report.interrupted {
            writeln!(writer)?;
            writeln!(writer, "{}", "Scan interrupted".yellow())?;
        } else if report.finished_at.is_some() && !report.completed {
            writeln!(writer)?;
            writeln!(
                writer,
                "{}",
                "Scan stopped before every transport finished".yellow()
            )?;
        }

        writer.flush()?;
        Ok(())
    }
}

//! CSV output formatter for scan reports.
//!
//! One row is generated for each device. Failures are not part of the CSV;
//! they go to the log and decide the exit code.
//!
//! # Columns
//!
//! - `transport`: `classic`, `le` or `usb`
//! - `identifier`: Bluetooth address or USB device node
//! - `name`: Display label
//! - `rssi`: Signal strength in dBm (empty for USB)
//! - `vendor_id` / `product_id`: USB ids as `0xABCD` (empty for Bluetooth)
//! - `discovered_at`: First seen (RFC 3339)

use std::io;

use serde::Serialize;

use super::{OutputError, ScanReport};

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    transport: &'a str,
    identifier: &'a str,
    name: &'a str,
    rssi: Option<i16>,
    vendor_id: Option<&'a str>,
    product_id: Option<&'a str>,
    discovered_at: &'a str,
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    report: &'a ScanReport,
}

impl<'a> CsvOutput<'a> {
    /// Create a new CSV output formatter.
    #[must_use]
    pub fn new(report: &'a ScanReport) -> Self {
        Self { report }
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), OutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        if self.report.devices.is_empty() {
            csv_writer.write_record([
                "transport",
                "identifier",
                "name",
                "rssi",
                "vendor_id",
                "product_id",
                "discovered_at",
            ])?;
        }

        for device in &self.report.devices {
            csv_writer.serialize(CsvRow {
                transport: &device.transport,
                identifier: &device.identifier,
                name: &device.name,
                rssi: device.rssi,
                vendor_id: device.vendor_id.as_deref(),
                product_id: device.product_id.as_deref(),
                discovered_at: &device.discovered_at,
            })?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, OutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

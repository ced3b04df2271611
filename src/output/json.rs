//! JSON output formatter for scan reports.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "devices": [
//!     {
//!       "transport": "le",
//!       "identifier": "AA:BB:CC:DD:EE:FF",
//!       "name": "Tag",
//!       "description": "Tag (AA:BB:CC:DD:EE:FF, -61 dBm)",
//!       "rssi": -61,
//!       "discovered_at": "2024-01-01T12:00:00+00:00",
//!       "updated_at": "2024-01-01T12:00:01+00:00"
//!     }
//!   ],
//!   "failures": [
//!     { "scanner": "usb", "transport": "usb", "error": "USB enumeration failed: ..." }
//!   ],
//!   "started_at": "2024-01-01T12:00:00Z",
//!   "finished_at": "2024-01-01T12:00:03Z",
//!   "duration_ms": 3012,
//!   "completed": true,
//!   "interrupted": false,
//!   "exit_code": 3,
//!   "exit_code_name": "DS003"
//! }
//! ```

use std::io::Write;

use super::{OutputError, ScanReport};

/// JSON output formatter.
pub struct JsonOutput<'a> {
    report: &'a ScanReport,
}

impl<'a> JsonOutput<'a> {
    /// Create a new JSON output formatter.
    #[must_use]
    pub fn new(report: &'a ScanReport) -> Self {
        Self { report }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self.report)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    ///
    /// ```
    /// use devscan::output::{JsonOutput, ScanReport};
    ///
    /// let report = ScanReport::new(chrono::Utc::now());
    /// let json = JsonOutput::new(&report).to_json_pretty().unwrap();
    /// assert!(json.contains("\"exit_code_name\": \"DS002\""));
    /// ```
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self.report)
    }

    /// Write pretty JSON and a trailing newline to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), OutputError> {
        serde_json::to_writer_pretty(&mut writer, self.report)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

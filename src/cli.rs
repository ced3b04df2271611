//! Command-line interface definitions for devscan.
//!
//! Global options (verbosity, color, config file, error format) apply to
//! every subcommand.
//!
//! # Example
//!
//! ```bash
//! # Scan every configured transport and print devices as they appear
//! devscan scan
//!
//! # Only Bluetooth LE, for five seconds, as JSON
//! devscan scan --transport le --le-duration 5s --output json
//!
//! # Only one USB product
//! devscan scan --transport usb --usb-product 04d8:000a
//!
//! # Replay a fixture instead of real hardware
//! devscan -v scan --fixture devices.toml
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::scanner::ProductFilter;

/// Discover nearby Bluetooth, Bluetooth LE and USB devices.
///
/// All selected transports are scanned at the same time and reported as one
/// stream of devices.
#[derive(Debug, Parser)]
#[command(name = "devscan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors and the final report
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for devices
    Scan(ScanArgs),
    /// Show the effective configuration
    Config(ConfigArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Transport to scan (can be specified multiple times; default from config)
    #[arg(short, long = "transport", value_enum, value_name = "TRANSPORT")]
    pub transports: Vec<TransportArg>,

    /// Replay devices from a fixture file instead of using hardware
    #[arg(long, value_name = "PATH")]
    pub fixture: Option<PathBuf>,

    /// Stop scanning after this long (e.g., 30s, 2m; 0 waits for the scanners)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// How long stopped scanners get to report their finish
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub grace: Option<Duration>,

    /// How long one Bluetooth LE scan runs
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub le_duration: Option<Duration>,

    /// Only report this USB product (VID or VID:PID in hex; can be repeated)
    #[arg(long = "usb-product", value_name = "VID[:PID]", value_parser = parse_product_filter)]
    pub usb_products: Vec<ProductFilter>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Screen-reader friendly progress output
    #[arg(long)]
    pub accessible: bool,
}

/// Arguments for the config subcommand.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Print the default config file location instead
    #[arg(long)]
    pub path: bool,
}

/// Transport selectable on the command line and in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportArg {
    /// Classic Bluetooth inquiry
    Classic,
    /// Bluetooth Low Energy scan
    Le,
    /// Attached USB devices
    Usb,
    /// Configured known Bluetooth devices
    Known,
}

impl std::fmt::Display for TransportArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportArg::Classic => write!(f, "classic"),
            TransportArg::Le => write!(f, "le"),
            TransportArg::Usb => write!(f, "usb"),
            TransportArg::Known => write!(f, "known"),
        }
    }
}

/// Output format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Live lines plus a summary
    Text,
    /// JSON report for scripting
    Json,
    /// CSV rows for spreadsheets
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Parse a human-readable duration.
///
/// Supports suffixes `ms`, `s`, `m` and `h`, case-insensitive. A bare number
/// is taken as seconds.
///
/// ```
/// use devscan::cli::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// ```
///
/// # Errors
///
/// Returns an error for empty input, a malformed or negative number, or an
/// unknown suffix.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_lowercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let millis_per_unit: f64 = match suffix.as_str() {
        "ms" => 1.0,
        "" | "s" | "sec" => 1_000.0,
        "m" | "min" => 60_000.0,
        "h" => 3_600_000.0,
        _ => return Err(format!("Unknown duration suffix: '{suffix}'")),
    };

    Ok(Duration::from_millis((num * millis_per_unit).round() as u64))
}

/// Parse a USB product filter: `VID` or `VID:PID`, hexadecimal.
///
/// ```
/// use devscan::cli::parse_product_filter;
///
/// let filter = parse_product_filter("04d8:000a").unwrap();
/// assert_eq!(filter.vendor_id, 0x04d8);
/// assert_eq!(filter.product_id, Some(0x000a));
/// ```
///
/// # Errors
///
/// Returns an error if either id is missing or not a 16-bit hex number.
pub fn parse_product_filter(s: &str) -> Result<ProductFilter, String> {
    s.parse()
}

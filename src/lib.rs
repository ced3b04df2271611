//! devscan - unified device discovery
//!
//! Scans classic Bluetooth, Bluetooth LE and USB at the same time and merges
//! what every transport finds into one de-duplicated stream of devices.
//!
//! The core is transport-agnostic:
//! - [`scanner::Scanner`] is one discovery backend with a start/stop
//!   lifecycle reporting to a listener.
//! - [`session::ScanSession`] starts a set of scanners together, removes
//!   duplicate reports and tells an [`session::EventSink`] exactly once when
//!   every scanner has finished.
//!
//! The concrete scanners talk to hardware through the
//! [`scanner::BluetoothAdapter`] and [`scanner::UsbHost`] traits; [`backend`]
//! provides a sysfs USB host and simulated devices replayed from fixture files.

pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod session;
pub mod signal;

pub use app::run_app;

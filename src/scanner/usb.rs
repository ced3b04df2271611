//! USB peripheral scanner.
//!
//! Enumerates the devices attached to an injected [`UsbHost`] on a worker
//! thread, keeps the ones matching the configured product filters, and
//! finishes once the listing has been walked (or a stop was requested).

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::device::{short_to_hex, ScannedDevice, TransportKind, UsbInfo};

use super::lifecycle::{Lifecycle, RunToken};
use super::{ScanError, ScanListener, Scanner};

/// One attached USB device as listed by the host.
pub type UsbDeviceInfo = UsbInfo;

/// Source of attached USB devices.
pub trait UsbHost: Send + Sync {
    /// List the currently attached devices.
    fn devices(&self) -> Result<Vec<UsbDeviceInfo>, ScanError>;
}

/// Accepts devices of one vendor, optionally a single product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    /// Vendor id to accept.
    pub vendor_id: u16,
    /// Product id to accept; `None` accepts every product of the vendor.
    #[serde(default)]
    pub product_id: Option<u16>,
}

impl ProductFilter {
    /// Accept every product of `vendor_id`.
    #[must_use]
    pub fn vendor(vendor_id: u16) -> Self {
        Self {
            vendor_id,
            product_id: None,
        }
    }

    /// Accept exactly one product.
    #[must_use]
    pub fn product(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id: Some(product_id),
        }
    }

    /// Whether `device` passes this filter.
    #[must_use]
    pub fn matches(&self, device: &UsbDeviceInfo) -> bool {
        self.vendor_id == device.vendor_id
            && self.product_id.is_none_or(|p| p == device.product_id)
    }
}

impl fmt::Display for ProductFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.product_id {
            Some(product) => write!(f, "{:04x}:{:04x}", self.vendor_id, product),
            None => write!(f, "{:04x}", self.vendor_id),
        }
    }
}

impl FromStr for ProductFilter {
    type Err = String;

    /// Parse `VID` or `VID:PID`, hexadecimal with an optional `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn hex(part: &str) -> Result<u16, String> {
            let part = part.trim();
            let digits = part
                .strip_prefix("0x")
                .or_else(|| part.strip_prefix("0X"))
                .unwrap_or(part);
            if digits.is_empty() {
                return Err("Missing hexadecimal id".to_string());
            }
            u16::from_str_radix(digits, 16).map_err(|_| format!("Invalid hexadecimal id: '{part}'"))
        }

        match s.split_once(':') {
            Some((vendor, product)) => Ok(Self::product(hex(vendor)?, hex(product)?)),
            None => Ok(Self::vendor(hex(s)?)),
        }
    }
}

/// Scanner for attached USB peripherals.
pub struct UsbScanner {
    name: String,
    host: Arc<dyn UsbHost>,
    supported_products: Option<Arc<[ProductFilter]>>,
    lifecycle: Arc<Lifecycle>,
    stopped: Arc<AtomicBool>,
}

impl UsbScanner {
    /// Create a scanner on `host`.
    ///
    /// With `supported_products == None` every device is reported; otherwise
    /// only devices matching at least one filter.
    #[must_use]
    pub fn new(host: Arc<dyn UsbHost>, supported_products: Option<Vec<ProductFilter>>) -> Self {
        Self {
            name: "usb".to_string(),
            host,
            supported_products: supported_products.map(Arc::from),
            lifecycle: Arc::new(Lifecycle::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the name used in logs and failure reports.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Whether `device` passes `filters`.
#[must_use]
pub fn is_supported_product(filters: Option<&[ProductFilter]>, device: &UsbDeviceInfo) -> bool {
    match filters {
        None => true,
        Some(filters) => filters.iter().any(|f| f.matches(device)),
    }
}

impl Scanner for UsbScanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Usb
    }

    fn start(&self, listener: ScanListener) {
        let Some(token) = self.lifecycle.begin(listener) else {
            log::warn!("{}: start ignored, enumeration is in progress", self.name);
            return;
        };
        self.stopped.store(false, Ordering::SeqCst);

        let worker = Enumeration {
            name: self.name.clone(),
            host: Arc::clone(&self.host),
            filters: self.supported_products.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            stopped: Arc::clone(&self.stopped),
            token,
        };
        let spawned = thread::Builder::new()
            .name("devscan-usb".to_string())
            .spawn(move || worker.run());

        if let Err(e) = spawned {
            self.lifecycle.finish(
                token,
                Some(ScanError::Enumeration {
                    transport: TransportKind::Usb,
                    message: format!("failed to spawn enumeration thread: {e}"),
                }),
            );
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.lifecycle.is_finished()
    }
}

struct Enumeration {
    name: String,
    host: Arc<dyn UsbHost>,
    filters: Option<Arc<[ProductFilter]>>,
    lifecycle: Arc<Lifecycle>,
    stopped: Arc<AtomicBool>,
    token: RunToken,
}

impl Enumeration {
    fn run(self) {
        let devices = match self.host.devices() {
            Ok(devices) => devices,
            Err(error) => {
                log::warn!("{}: {}", self.name, error);
                self.lifecycle.finish(self.token, Some(error));
                return;
            }
        };
        log::debug!("{}: {} attached device(s)", self.name, devices.len());

        for device in devices {
            if self.stopped.load(Ordering::SeqCst) {
                log::debug!("{}: stop requested, ending enumeration", self.name);
                break;
            }
            if !is_supported_product(self.filters.as_deref(), &device) {
                log::trace!(
                    "{}: skipping unsupported product vendor={}, product={}",
                    self.name,
                    short_to_hex(device.vendor_id),
                    short_to_hex(device.product_id)
                );
                continue;
            }

            let record = ScannedDevice::usb(device);
            log::info!("USB device found. {}", record.description());
            if !self.lifecycle.emit(self.token, |l| l.discovered(record)) {
                return;
            }
        }

        self.lifecycle.finish(self.token, None);
    }
}

//! USB enumeration from Linux sysfs.
//!
//! Each attached device has a directory under `/sys/bus/usb/devices` holding
//! its descriptor fields as text files. Interface entries (`1-1:1.0`) are
//! skipped; root hubs and devices are reported with the usbfs node path
//! `/dev/bus/usb/BBB/DDD` as their identifier.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::device::TransportKind;
use crate::scanner::{ScanError, UsbDeviceInfo, UsbHost};

/// Default sysfs location of USB devices.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/bus/usb/devices";

/// [`UsbHost`] backed by a sysfs tree.
#[derive(Debug, Clone)]
pub struct SysfsUsbHost {
    root: PathBuf,
}

impl Default for SysfsUsbHost {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl SysfsUsbHost {
    /// Read devices below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory devices are read from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    let value = fs::read_to_string(dir.join(name)).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn read_hex(dir: &Path, name: &str) -> Option<u16> {
    u16::from_str_radix(&read_attr(dir, name)?, 16).ok()
}

fn read_dec(dir: &Path, name: &str) -> Option<u16> {
    read_attr(dir, name)?.parse().ok()
}

/// Parse one sysfs device directory.
///
/// Returns `None` for entries that are not devices or lack descriptor fields.
pub fn read_device(dir: &Path) -> Option<UsbDeviceInfo> {
    let entry = dir.file_name()?.to_string_lossy();
    if entry.contains(':') {
        return None;
    }

    let vendor_id = read_hex(dir, "idVendor")?;
    let product_id = read_hex(dir, "idProduct")?;
    let bus = read_dec(dir, "busnum")?;
    let dev = read_dec(dir, "devnum")?;

    Some(UsbDeviceInfo {
        device_path: format!("/dev/bus/usb/{bus:03}/{dev:03}"),
        vendor_id,
        product_id,
        product_name: read_attr(dir, "product"),
        manufacturer: read_attr(dir, "manufacturer"),
    })
}

impl UsbHost for SysfsUsbHost {
    fn devices(&self) -> Result<Vec<UsbDeviceInfo>, ScanError> {
        let entries = fs::read_dir(&self.root).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => ScanError::PermissionDenied {
                transport: TransportKind::Usb,
                detail: format!("cannot read {}", self.root.display()),
            },
            io::ErrorKind::NotFound => ScanError::Unsupported {
                transport: TransportKind::Usb,
            },
            _ => ScanError::Enumeration {
                transport: TransportKind::Usb,
                message: format!("{}: {}", self.root.display(), e),
            },
        })?;

        let mut devices: Vec<UsbDeviceInfo> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => read_device(&entry.path()),
                Err(e) => {
                    log::debug!("Skipping unreadable sysfs entry: {}", e);
                    None
                }
            })
            .collect();
        devices.sort_by(|a, b| a.device_path.cmp(&b.device_path));
        Ok(devices)
    }
}

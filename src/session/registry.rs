//! Per-run device identity map.

use std::collections::HashMap;

use crate::device::ScannedDevice;
use crate::scanner::ScannerId;

/// Identity of a device within one run: the scanner that reported it and the
/// identifier it reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    /// Reporting scanner.
    pub scanner: ScannerId,
    /// Identifier within that scanner's address space.
    pub identifier: String,
}

impl DeviceKey {
    /// Build a key.
    #[must_use]
    pub fn new(scanner: ScannerId, identifier: impl Into<String>) -> Self {
        Self {
            scanner,
            identifier: identifier.into(),
        }
    }

    /// Key of `device` as reported by `scanner`.
    #[must_use]
    pub fn for_device(scanner: ScannerId, device: &ScannedDevice) -> Self {
        Self::new(scanner, device.identifier())
    }
}

/// Last-known record of every device seen in a run.
///
/// Iteration follows insertion order.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    index: HashMap<DeviceKey, usize>,
    entries: Vec<(DeviceKey, ScannedDevice)>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored record for `key`.
    #[must_use]
    pub fn get(&self, key: &DeviceKey) -> Option<&ScannedDevice> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    /// Whether `key` has a record.
    #[must_use]
    pub fn contains(&self, key: &DeviceKey) -> bool {
        self.index.contains_key(key)
    }

    /// Insert `device`, or merge it into the existing record for `key`.
    pub fn upsert(&mut self, key: DeviceKey, device: ScannedDevice) -> &ScannedDevice {
        let slot = match self.index.get(&key) {
            Some(&slot) => {
                self.entries[slot].1.merge_from(device);
                slot
            }
            None => {
                let slot = self.entries.len();
                self.index.insert(key.clone(), slot);
                self.entries.push((key, device));
                slot
            }
        };
        &self.entries[slot].1
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
    }

    /// Number of distinct devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no device was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceKey, &ScannedDevice)> {
        self.entries.iter().map(|(k, d)| (k, d))
    }
}

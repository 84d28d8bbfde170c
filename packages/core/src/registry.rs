//! Bounded set of the devices the daemon currently manages.

use std::ffi::OsStr;
use std::path::PathBuf;

use crate::device::DeviceKind;

/// A device the daemon has taken responsibility for.
///
/// The record owns the hotplug handle it was created from; dropping the
/// record releases it.
#[derive(Debug)]
pub struct DeviceRecord<D> {
    pub devnode: String,
    pub kind: DeviceKind,
    pub filesystem: String,
    pub mountpoint: PathBuf,
    handle: D,
}

impl<D> DeviceRecord<D> {
    pub fn new(
        devnode: impl Into<String>,
        kind: DeviceKind,
        filesystem: impl Into<String>,
        mountpoint: impl Into<PathBuf>,
        handle: D,
    ) -> Self {
        Self {
            devnode: devnode.into(),
            kind,
            filesystem: filesystem.into(),
            mountpoint: mountpoint.into(),
            handle,
        }
    }

    /// The hotplug device this record was created from.
    pub fn handle(&self) -> &D {
        &self.handle
    }

    /// Whether `key` names this record, by device node or mountpoint.
    /// Both are compared as plain strings.
    pub fn matches(&self, key: &str) -> bool {
        self.devnode == key || self.mountpoint.as_os_str() == OsStr::new(key)
    }
}

/// Why a record could not be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    Full,
    Duplicate,
}

/// Fixed-capacity table of device records.
///
/// Device nodes are unique. Lookups accept either the device node or the
/// mountpoint.
#[derive(Debug)]
pub struct Registry<D> {
    records: Vec<DeviceRecord<D>>,
    capacity: usize,
}

impl<D> Registry<D> {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds a record. On failure the table is left untouched and the record
    /// is dropped.
    pub fn register(&mut self, record: DeviceRecord<D>) -> Result<&DeviceRecord<D>, RegisterError> {
        if self.records.iter().any(|r| r.devnode == record.devnode) {
            return Err(RegisterError::Duplicate);
        }
        if self.records.len() >= self.capacity {
            return Err(RegisterError::Full);
        }

        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    /// Finds a record by device node or mountpoint.
    pub fn find(&self, key: &str) -> Option<&DeviceRecord<D>> {
        self.records.iter().find(|r| r.matches(key))
    }

    /// Removes the record with the given device node and hands it back.
    pub fn remove(&mut self, devnode: &str) -> Option<DeviceRecord<D>> {
        let index = self.records.iter().position(|r| r.devnode == devnode)?;
        Some(self.records.remove(index))
    }

    /// Device nodes of every record, in registration order.
    pub fn devnodes(&self) -> Vec<String> {
        self.records.iter().map(|r| r.devnode.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord<D>> {
        self.records.iter()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

//! Hotplug device abstraction.
//!
//! The lifecycle code only needs a handful of udev properties, so it works
//! against the [`BlockDevice`] trait instead of `udev::Device` directly.

use std::ffi::OsStr;

/// udev property holding the filesystem type.
pub const ID_FS_TYPE: &str = "ID_FS_TYPE";
/// udev property holding the filesystem UUID.
pub const ID_FS_UUID: &str = "ID_FS_UUID";
/// udev property holding the filesystem label.
pub const ID_FS_LABEL: &str = "ID_FS_LABEL";
/// udev property set when a volume carries something blkid recognised.
pub const ID_FS_USAGE: &str = "ID_FS_USAGE";
/// udev property holding the drive serial.
pub const ID_SERIAL: &str = "ID_SERIAL";
/// udev property holding the drive type (`cd`, `floppy`, `disk`...).
pub const ID_TYPE: &str = "ID_TYPE";
/// udev property set when an optical drive has a disc inserted.
pub const ID_CDROM_MEDIA: &str = "ID_CDROM_MEDIA";
/// udev property listing the symlinks pointing at the node.
pub const DEVLINKS: &str = "DEVLINKS";

/// Prefix of device-mapper nodes, whose names are not stable.
const DM_PREFIX: &str = "/dev/dm-";

/// Filesystem types that are never mounted. Swap is not a filesystem, and
/// LVM/LUKS containers produce their own events for what they contain.
pub const IGNORED_FILESYSTEMS: &[&str] = &["swap", "LVM2_member", "crypto_LUKS"];

/// A block device as reported by the hotplug source.
pub trait BlockDevice {
    /// Device node path, e.g. `/dev/sdb1`.
    fn devnode(&self) -> Option<&str>;

    /// Kernel device type (`partition`, `disk`...).
    fn devtype(&self) -> Option<&str>;

    /// Value of a udev property.
    fn property(&self, key: &str) -> Option<&str>;

    /// Alternate symlink paths for the node.
    fn devlinks(&self) -> Vec<String> {
        self.property(DEVLINKS)
            .map(|links| links.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn fs_type(&self) -> Option<&str> {
        self.property(ID_FS_TYPE)
    }

    fn fs_uuid(&self) -> Option<&str> {
        self.property(ID_FS_UUID)
    }

    fn fs_label(&self) -> Option<&str> {
        self.property(ID_FS_LABEL)
    }

    fn serial(&self) -> Option<&str> {
        self.property(ID_SERIAL)
    }
}

impl BlockDevice for udev::Device {
    fn devnode(&self) -> Option<&str> {
        udev::Device::devnode(self).and_then(|path| path.to_str())
    }

    fn devtype(&self) -> Option<&str> {
        udev::Device::devtype(self).and_then(os_str_to_str)
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.property_value(key).and_then(os_str_to_str)
    }
}

fn os_str_to_str(value: &OsStr) -> Option<&str> {
    value.to_str()
}

/// What kind of device a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Partitions, whole disks and floppies.
    Volume,
    /// CD/DVD/BD drives. Always mounted read-only.
    OpticalDisc,
}

impl DeviceKind {
    /// Classifies a device from its type metadata.
    ///
    /// Returns `None` for anything that is neither a volume nor an optical
    /// drive.
    pub fn classify(device: &impl BlockDevice) -> Option<Self> {
        let id_type = device.property(ID_TYPE);

        if id_type == Some("cd") {
            return Some(DeviceKind::OpticalDisc);
        }

        match (device.devtype(), id_type) {
            (Some("partition" | "disk"), _) | (_, Some("floppy")) => Some(DeviceKind::Volume),
            _ => None,
        }
    }

    /// Whether there is something to mount on the device.
    pub fn has_media(self, device: &impl BlockDevice) -> bool {
        match self {
            DeviceKind::Volume => device.property(ID_FS_USAGE).is_some(),
            DeviceKind::OpticalDisc => device.property(ID_CDROM_MEDIA).is_some(),
        }
    }

    pub fn is_read_only(self) -> bool {
        self == DeviceKind::OpticalDisc
    }
}

/// Whether a node is a device-mapper node.
pub fn is_device_mapper(devnode: &str) -> bool {
    devnode.starts_with(DM_PREFIX)
}

/// Whether a filesystem type must never be mounted.
pub fn is_ignored_filesystem(fstype: &str) -> bool {
    IGNORED_FILESYSTEMS.contains(&fstype)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// In-memory device for driving the lifecycle in tests.
    ///
    /// Counts live clones of itself so tests can check that a record's handle
    /// is released.
    #[derive(Debug)]
    pub struct FakeDevice {
        pub devnode: Option<String>,
        pub devtype: Option<String>,
        pub properties: HashMap<String, String>,
        pub live: Rc<Cell<usize>>,
    }

    impl FakeDevice {
        pub fn new(devnode: &str, devtype: &str) -> Self {
            let live = Rc::new(Cell::new(1));
            Self {
                devnode: Some(devnode.to_string()),
                devtype: Some(devtype.to_string()),
                properties: HashMap::new(),
                live,
            }
        }

        /// A partition with a filesystem on it.
        pub fn partition(devnode: &str, fstype: &str) -> Self {
            Self::new(devnode, "partition")
                .with(ID_FS_TYPE, fstype)
                .with(ID_FS_USAGE, "filesystem")
        }

        pub fn with(mut self, key: &str, value: &str) -> Self {
            self.properties.insert(key.to_string(), value.to_string());
            self
        }

        pub fn without(mut self, key: &str) -> Self {
            self.properties.remove(key);
            self
        }
    }

    impl Clone for FakeDevice {
        fn clone(&self) -> Self {
            self.live.set(self.live.get() + 1);
            Self {
                devnode: self.devnode.clone(),
                devtype: self.devtype.clone(),
                properties: self.properties.clone(),
                live: Rc::clone(&self.live),
            }
        }
    }

    impl Drop for FakeDevice {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    impl BlockDevice for FakeDevice {
        fn devnode(&self) -> Option<&str> {
            self.devnode.as_deref()
        }

        fn devtype(&self) -> Option<&str> {
            self.devtype.as_deref()
        }

        fn property(&self, key: &str) -> Option<&str> {
            self.properties.get(key).map(String::as_str)
        }
    }
}

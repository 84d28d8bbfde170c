//! Mountpoint naming.
//!
//! Generated mountpoints live under the configured base directory and are
//! named after the filesystem label, falling back to the UUID and then the
//! drive serial. Name clashes are resolved by appending underscores.

use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::device::BlockDevice;

/// Longest path the namer will produce, including the base directory.
pub const MAX_MOUNTPOINT_LEN: usize = 4094;

/// Picks the name source for a device: label, then UUID, then serial.
pub fn name_source<'a>(
    label: Option<&'a str>,
    uuid: Option<&'a str>,
    serial: Option<&'a str>,
) -> Option<&'a str> {
    label.or(uuid).or(serial)
}

/// Replaces every space with an underscore.
pub fn sanitize(name: &str) -> String {
    name.replace(' ', "_")
}

/// Builds a free mountpoint path for `name` under `base`.
///
/// The sanitized name is appended to `base` as a string, so the result
/// stays under `base` whatever the name looks like. Returns `None` when
/// every candidate up to [`MAX_MOUNTPOINT_LEN`] is already taken.
pub fn free_mountpoint(base: &Path, name: &str) -> Option<PathBuf> {
    let mut candidate: OsString = base.as_os_str().to_owned();
    if !candidate.as_bytes().ends_with(b"/") {
        candidate.push("/");
    }
    candidate.push(sanitize(name));

    loop {
        if candidate.len() > MAX_MOUNTPOINT_LEN {
            return None;
        }
        if !Path::new(&candidate).exists() {
            return Some(PathBuf::from(candidate));
        }
        candidate.push("_");
    }
}

/// Builds a mountpoint path for a device with no fstab entry.
pub fn create_mountpoint(base: &Path, device: &impl BlockDevice) -> Option<PathBuf> {
    let name = name_source(device.fs_label(), device.fs_uuid(), device.serial())?;
    free_mountpoint(base, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeDevice;
    use crate::device::{ID_FS_LABEL, ID_FS_UUID, ID_SERIAL};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_name_priority() {
        assert_eq!(name_source(Some("L"), Some("U"), Some("S")), Some("L"));
        assert_eq!(name_source(None, Some("U"), Some("S")), Some("U"));
        assert_eq!(name_source(None, None, Some("S")), Some("S"));
        assert_eq!(name_source(None, None, None), None);
    }

    #[test]
    fn test_collision_appends_underscores() {
        let base = TempDir::new().unwrap();

        let first = free_mountpoint(base.path(), "My Disk").unwrap();
        assert_eq!(first, base.path().join("My_Disk"));

        fs::create_dir(&first).unwrap();
        let second = free_mountpoint(base.path(), "My Disk").unwrap();
        assert_eq!(second, base.path().join("My_Disk_"));

        fs::create_dir(&second).unwrap();
        let third = free_mountpoint(base.path(), "My Disk").unwrap();
        assert_eq!(third, base.path().join("My_Disk__"));
    }

    #[test]
    fn test_plain_base_string() {
        // Nothing is created under /mnt by this test, the name just must not
        // collide with anything that exists there.
        let path = free_mountpoint(Path::new("/mnt/"), "ldm test disk 8c1f").unwrap();
        assert_eq!(path, PathBuf::from("/mnt/ldm_test_disk_8c1f"));
    }

    #[test]
    fn test_absolute_name_stays_under_base() {
        let base = TempDir::new().unwrap();

        let path = free_mountpoint(base.path(), "/ldm_x").unwrap();
        assert!(path.starts_with(base.path()));
        assert_eq!(
            path.as_os_str(),
            format!("{}//ldm_x", base.path().display()).as_str()
        );
    }

    #[test]
    fn test_exhaustion() {
        let base = TempDir::new().unwrap();
        let long = "x".repeat(MAX_MOUNTPOINT_LEN);
        assert!(free_mountpoint(base.path(), &long).is_none());
    }

    #[test]
    fn test_create_mountpoint_from_device() {
        let base = TempDir::new().unwrap();

        let labelled = FakeDevice::partition("/dev/sdb1", "vfat")
            .with(ID_FS_LABEL, "USB STICK")
            .with(ID_FS_UUID, "1234-ABCD");
        assert_eq!(
            create_mountpoint(base.path(), &labelled),
            Some(base.path().join("USB_STICK"))
        );

        let serial_only =
            FakeDevice::partition("/dev/sdc1", "ext4").with(ID_SERIAL, "Kingston_123");
        assert_eq!(
            create_mountpoint(base.path(), &serial_only),
            Some(base.path().join("Kingston_123"))
        );

        let anonymous = FakeDevice::partition("/dev/sdd1", "ext4");
        assert_eq!(create_mountpoint(base.path(), &anonymous), None);
    }
}

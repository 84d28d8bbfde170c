//! Filesystem mount-option quirks.
//!
//! Filesystems without POSIX ownership need the owner passed as mount options
//! and want their filenames decoded as UTF-8. vfat has no permission bits at
//! all, so it also gets a fixed mask, and is flushed eagerly because USB
//! sticks get yanked without warning.

use bitflags::bitflags;

bitflags! {
    /// Mount-option requirements of a filesystem type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Quirks: u8 {
        /// Pass `uid=`/`gid=` at mount time instead of chowning afterwards.
        const OWNER_FIX = 1 << 0;
        /// Pass `utf8`.
        const UTF8_FLAG = 1 << 1;
        /// Pass `dmask=000,fmask=111`.
        const MASK = 1 << 2;
        /// Pass `flush`.
        const FLUSH = 1 << 3;
    }
}

const QUIRK_TABLE: &[(&str, Quirks)] = &[
    ("msdos", Quirks::OWNER_FIX.union(Quirks::UTF8_FLAG)),
    ("umsdos", Quirks::OWNER_FIX.union(Quirks::UTF8_FLAG)),
    ("vfat", Quirks::all()),
    ("exfat", Quirks::OWNER_FIX),
    ("ntfs", Quirks::OWNER_FIX.union(Quirks::UTF8_FLAG)),
    ("iso9660", Quirks::OWNER_FIX.union(Quirks::UTF8_FLAG)),
    ("udf", Quirks::OWNER_FIX),
];

impl Quirks {
    /// Looks up the quirks of a filesystem type (exact, case-sensitive).
    ///
    /// Unknown types have no quirks.
    pub fn for_filesystem(fstype: &str) -> Self {
        QUIRK_TABLE
            .iter()
            .find(|(name, _)| *name == fstype)
            .map(|(_, quirks)| *quirks)
            .unwrap_or_else(Quirks::empty)
    }

    /// Whether ownership has to be fixed with a chown after mounting.
    pub fn needs_chown(self) -> bool {
        !self.contains(Quirks::OWNER_FIX)
    }

    /// Builds the mount option string for these quirks.
    ///
    /// Clauses are collected first and joined once.
    pub fn mount_options(self, uid: u32, gid: u32) -> String {
        let mut clauses = Vec::new();

        if self.contains(Quirks::OWNER_FIX) {
            clauses.push(format!("uid={uid},gid={gid}"));
        }
        if self.contains(Quirks::UTF8_FLAG) {
            clauses.push("utf8".to_string());
        }
        if self.contains(Quirks::FLUSH) {
            clauses.push("flush".to_string());
        }
        if self.contains(Quirks::MASK) {
            clauses.push("dmask=000,fmask=111".to_string());
        }

        clauses.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vfat_has_every_quirk() {
        let quirks = Quirks::for_filesystem("vfat");
        assert_eq!(
            quirks,
            Quirks::OWNER_FIX | Quirks::UTF8_FLAG | Quirks::MASK | Quirks::FLUSH
        );
        assert!(!quirks.needs_chown());
    }

    #[test]
    fn test_unlisted_filesystem() {
        let quirks = Quirks::for_filesystem("ext4");
        assert!(quirks.is_empty());
        assert!(quirks.needs_chown());
        assert_eq!(quirks.mount_options(1000, 100), "");
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(Quirks::for_filesystem("VFAT").is_empty());
        assert_eq!(Quirks::for_filesystem("udf"), Quirks::OWNER_FIX);
        assert_eq!(Quirks::for_filesystem("exfat"), Quirks::OWNER_FIX);
        assert_eq!(
            Quirks::for_filesystem("iso9660"),
            Quirks::OWNER_FIX | Quirks::UTF8_FLAG
        );
    }

    #[test]
    fn test_mount_options() {
        assert_eq!(
            Quirks::for_filesystem("vfat").mount_options(1000, 100),
            "uid=1000,gid=100,utf8,flush,dmask=000,fmask=111"
        );
        assert_eq!(
            Quirks::for_filesystem("ntfs").mount_options(1000, 100),
            "uid=1000,gid=100,utf8"
        );
        assert_eq!(
            Quirks::for_filesystem("exfat").mount_options(0, 0),
            "uid=0,gid=0"
        );
    }
}

//! Mount operations module.
//!
//! Mounting goes through the [`MountExecutor`] trait so the lifecycle code
//! can be exercised without root. [`SystemMounter`] is the real thing, built
//! on mount(2)/umount(2).

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};
use nix::unistd::{Gid, Uid};

use crate::error::{IoResultExt, Result};

/// Everything needed to mount one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
    /// Comma separated filesystem options, possibly empty.
    pub options: String,
    pub read_only: bool,
}

/// Performs mounts and unmounts.
pub trait MountExecutor {
    fn mount(&mut self, request: &MountRequest) -> std::result::Result<(), Errno>;

    fn unmount(&mut self, target: &Path) -> std::result::Result<(), Errno>;
}

/// Mounts through the kernel directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMounter;

impl MountExecutor for SystemMounter {
    fn mount(&mut self, request: &MountRequest) -> std::result::Result<(), Errno> {
        let flags = if request.read_only {
            MsFlags::MS_RDONLY
        } else {
            MsFlags::empty()
        };
        let data = (!request.options.is_empty()).then_some(request.options.as_str());

        nix::mount::mount(
            Some(request.source.as_str()),
            request.target.as_path(),
            Some(request.fstype.as_str()),
            flags,
            data,
        )
    }

    fn unmount(&mut self, target: &Path) -> std::result::Result<(), Errno> {
        nix::mount::umount2(target, MntFlags::empty())
    }
}

/// Creates a mount point directory if it doesn't exist.
pub fn create_mount_point(path: &Path) -> Result<()> {
    if !path.exists() {
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(path)
            .mount_point_context(path)?;
    }
    Ok(())
}

/// Removes a mount point directory, ignoring failures.
///
/// The medium may already be gone or the directory may be an administrator
/// owned fstab target that is not empty; neither is worth reporting.
pub fn remove_mount_point(path: &Path) {
    if let Err(err) = std::fs::remove_dir(path) {
        log::debug!("unable to remove mount point {}: {err}", path.display());
    }
}

/// Hands a mounted filesystem over to the configured owner.
pub fn chown_mount_point(path: &Path, uid: u32, gid: u32) -> std::result::Result<(), Errno> {
    nix::unistd::chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
}

//! Daemon configuration.

use std::path::PathBuf;

/// Default base directory for generated mountpoints.
pub const MOUNT_BASE: &str = "/mnt/";

/// Default static mount table.
pub const FSTAB_PATH: &str = "/etc/fstab";

/// Default live mount table.
pub const MTAB_PATH: &str = "/proc/self/mounts";

/// Default PID lock file.
pub const LOCK_PATH: &str = "/run/ldm.pid";

/// Default command FIFO.
pub const FIFO_PATH: &str = "/run/ldm.fifo";

/// Maximum number of devices managed at once.
pub const MAX_DEVICES: usize = 20;

/// Runtime configuration shared by every component of the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Owner of mounted filesystems, and identity the hook runs as.
    pub uid: u32,
    /// Group of mounted filesystems, and group the hook runs as.
    pub gid: u32,
    /// Directory generated mountpoints are created in.
    pub mount_base: PathBuf,
    pub fstab_path: PathBuf,
    pub mtab_path: PathBuf,
    pub fifo_path: PathBuf,
    pub lock_path: PathBuf,
    /// Binary invoked as `<hook> mount|unmount <mountpoint>`.
    pub hook: Option<PathBuf>,
    /// Registry capacity.
    pub max_devices: usize,
}

impl DaemonConfig {
    /// Creates a config with default paths for the given owner.
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            mount_base: PathBuf::from(MOUNT_BASE),
            fstab_path: PathBuf::from(FSTAB_PATH),
            mtab_path: PathBuf::from(MTAB_PATH),
            fifo_path: PathBuf::from(FIFO_PATH),
            lock_path: PathBuf::from(LOCK_PATH),
            hook: None,
            max_devices: MAX_DEVICES,
        }
    }

    /// Sets the mountpoint base directory.
    pub fn with_mount_base(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_base = path.into();
        self
    }

    /// Sets the fstab path.
    pub fn with_fstab_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fstab_path = path.into();
        self
    }

    /// Sets the live mount table path.
    pub fn with_mtab_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mtab_path = path.into();
        self
    }

    /// Sets the mount/unmount hook binary.
    pub fn with_hook(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.hook = path.map(Into::into);
        self
    }

    /// Sets the registry capacity.
    pub fn with_max_devices(mut self, max: usize) -> Self {
        self.max_devices = max;
        self
    }
}

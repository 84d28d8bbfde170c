//! Unified error types for the ldm-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error` or `Errno`) appears in
//! different contexts.

use nix::errno::Errno;
use snafu::{ResultExt, Snafu};
use std::fmt;
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a hotplug device was not turned into a device record.
///
/// Callers treat every reason the same way; the distinction only shows up in
/// the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The fstab entry for the device carries `noauto`.
    NoAuto,
    /// The device has no device node.
    MissingDevnode,
    /// udev reported no filesystem on the device.
    MissingFilesystem,
    /// Swap, LVM and LUKS containers are never mounted.
    IgnoredFilesystem(String),
    /// Neither a volume nor an optical drive.
    UnsupportedKind,
    /// No medium in the drive, or no usable filesystem on the volume.
    NoMedia,
    /// No label, UUID or serial to build a name from, or every candidate
    /// name was taken.
    NoMountpointName,
    /// A record with the same device node is already registered.
    AlreadyRegistered,
    /// The registry is at capacity.
    RegistryFull,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoAuto => write!(f, "marked noauto in fstab"),
            Rejection::MissingDevnode => write!(f, "no device node"),
            Rejection::MissingFilesystem => write!(f, "no filesystem"),
            Rejection::IgnoredFilesystem(fs) => write!(f, "ignored filesystem type {fs}"),
            Rejection::UnsupportedKind => write!(f, "not a volume or optical drive"),
            Rejection::NoMedia => write!(f, "no media present"),
            Rejection::NoMountpointName => write!(f, "could not make up a mountpoint name"),
            Rejection::AlreadyRegistered => write!(f, "already registered"),
            Rejection::RegistryFull => write!(f, "device table is full"),
        }
    }
}

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Mount table file not found or cannot be read.
    #[snafu(display("failed to read mount table at {}", path.display()))]
    TableRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Mount table line could not be parsed.
    #[snafu(display("failed to parse {} line {line}", path.display()))]
    TableParse {
        path: PathBuf,
        line: usize,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    /// Malformed mount table entry.
    #[snafu(display("failed to parse mount table entry: {message}"))]
    EntryParse { message: String },

    /// The device was not actionable.
    #[snafu(display("ignoring {devnode}: {reason}"))]
    Rejected { devnode: String, reason: Rejection },

    /// Mount point creation failed.
    #[snafu(display("failed to create mount point at {}", path.display()))]
    MountPointCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Mount operation failed.
    #[snafu(display("error while mounting {devnode} on {}", target.display()))]
    Mount {
        devnode: String,
        target: PathBuf,
        source: Errno,
    },

    /// Unmount operation failed.
    #[snafu(display("error while unmounting {devnode} from {}", target.display()))]
    Unmount {
        devnode: String,
        target: PathBuf,
        source: Errno,
    },

    /// Post-mount ownership change failed.
    #[snafu(display("cannot chown {}", path.display()))]
    Chown { path: PathBuf, source: Errno },

    /// udev context, monitor or enumeration failure.
    #[snafu(display("udev error while {action}"))]
    Udev {
        action: String,
        source: std::io::Error,
    },

    /// inotify setup or read failure.
    #[snafu(display("inotify error on {}", path.display()))]
    Inotify { path: PathBuf, source: Errno },

    /// The wait-for-any primitive failed.
    #[snafu(display("poll failed"))]
    Poll { source: Errno },

    /// FIFO creation, open, read or write failure.
    #[snafu(display("fifo error on {}", path.display()))]
    Fifo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// PID lock file could not be written or removed.
    #[snafu(display("lock file error on {}", path.display()))]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Signal handler installation failed.
    #[snafu(display("cannot install signal handler"))]
    Signal { source: Errno },

    /// Detaching from the terminal failed.
    #[snafu(display("cannot daemonize"))]
    Daemonize { source: Errno },
}

impl Error {
    /// Returns true for the "device not actionable" outcome of creation.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Rejected { .. })
    }
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for mount table read errors.
    fn table_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for mount point creation errors.
    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for FIFO errors.
    fn fifo_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for lock file errors.
    fn lock_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for udev errors.
    fn udev_context(self, action: impl Into<String>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn table_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(TableReadSnafu { path: path.into() })
    }

    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountPointCreationSnafu { path: path.into() })
    }

    fn fifo_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(FifoSnafu { path: path.into() })
    }

    fn lock_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(LockSnafu { path: path.into() })
    }

    fn udev_context(self, action: impl Into<String>) -> Result<T> {
        self.context(UdevSnafu {
            action: action.into(),
        })
    }
}

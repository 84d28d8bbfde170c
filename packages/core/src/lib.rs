//! ldm-core: Core library for the lightweight device mounter.
//!
//! Watches udev for removable block devices, mounts them under a common
//! base directory (or wherever fstab says), hands ownership to a configured
//! user and runs an optional hook after every mount and unmount.
//!
//! # Modules
//!
//! - [`config`]: Daemon configuration and default paths
//! - [`device`]: Block device properties and classification
//! - [`fstab`]: fstab/mtab parsing and device resolution
//! - [`mountpoint`]: Mountpoint name generation
//! - [`quirks`]: Per-filesystem mount options
//! - [`registry`]: Bounded table of managed devices
//! - [`mount`]: mount(2)/umount(2) and mountpoint directories
//! - [`executor`]: Mount/unmount hook execution
//! - [`lifecycle`]: Create, mount, unmount, change and reconcile
//! - [`protocol`]: Command FIFO messages
//! - [`event_loop`]: The daemon main loop
//! - [`logging`]: Log backend setup
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use ldm_core::{DaemonConfig, event_loop};
//!
//! let config = DaemonConfig::new(1000, 100).with_hook(Some("/usr/local/bin/on-mount"));
//!
//! event_loop::create_fifo(&config.fifo_path).unwrap();
//! let fifo = event_loop::open_fifo_reader(&config.fifo_path).unwrap();
//! event_loop::run(config, fifo).unwrap();
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod event_loop;
pub mod executor;
pub mod fstab;
pub mod lifecycle;
pub mod logging;
pub mod mount;
pub mod mountpoint;
pub mod protocol;
pub mod quirks;
pub mod registry;

// Re-export commonly used types
pub use config::DaemonConfig;
pub use device::{BlockDevice, DeviceKind};
pub use error::{Error, Rejection, Result};
pub use fstab::{MountEntry, MountTable};
pub use lifecycle::Automounter;
pub use protocol::Command;
pub use quirks::Quirks;
pub use registry::{DeviceRecord, Registry};

//! Device lifecycle.
//!
//! [`Automounter`] owns everything the daemon knows: the registry of managed
//! devices and the fstab and live mount table snapshots. Every hotplug event,
//! table change and remove command ends up in one of its methods.
//!
//! A device moves through `unregistered -> registered -> mounted ->
//! unregistered`. Creation is all-or-nothing: a rejected device leaves no
//! record behind, and its handle is released on the way out.

use snafu::{IntoError, ResultExt};

use crate::config::DaemonConfig;
use crate::device::{self, BlockDevice, DeviceKind};
use crate::error::{ChownSnafu, Error, MountSnafu, Rejection, Result, UnmountSnafu};
use crate::executor::{HookAction, HookRunner};
use crate::fstab::{MountTable, NOAUTO};
use crate::mount::{self, MountExecutor, MountRequest};
use crate::mountpoint;
use crate::quirks::Quirks;
use crate::registry::{DeviceRecord, RegisterError, Registry};

/// The daemon state and the operations on it.
pub struct Automounter<D, M, H> {
    config: DaemonConfig,
    registry: Registry<D>,
    fstab: MountTable,
    mtab: MountTable,
    mounter: M,
    hook: H,
}

fn reject<T>(devnode: &str, reason: Rejection) -> Result<T> {
    Err(Error::Rejected {
        devnode: devnode.to_string(),
        reason,
    })
}

impl<D, M, H> Automounter<D, M, H>
where
    D: BlockDevice,
    M: MountExecutor,
    H: HookRunner,
{
    pub fn new(config: DaemonConfig, mounter: M, hook: H) -> Self {
        Self {
            registry: Registry::new(config.max_devices),
            config,
            fstab: MountTable::default(),
            mtab: MountTable::default(),
            mounter,
            hook,
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn mounter(&self) -> &M {
        &self.mounter
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn registry(&self) -> &Registry<D> {
        &self.registry
    }

    pub fn fstab(&self) -> &MountTable {
        &self.fstab
    }

    pub fn mtab(&self) -> &MountTable {
        &self.mtab
    }

    /// Swaps in a new fstab snapshot.
    pub fn replace_fstab(&mut self, table: MountTable) {
        self.fstab = table;
    }

    /// Swaps in a new live table snapshot. Call [`reconcile`](Self::reconcile)
    /// afterwards to act on it.
    pub fn replace_mtab(&mut self, table: MountTable) {
        self.mtab = table;
    }

    /// Reloads the fstab snapshot from disk.
    pub fn reload_fstab(&mut self) -> Result<()> {
        let table = MountTable::load(&self.config.fstab_path)?;
        log::debug!(
            "loaded {} entries from {}",
            table.len(),
            self.config.fstab_path.display()
        );
        self.replace_fstab(table);
        Ok(())
    }

    /// Reloads the live table snapshot from disk.
    pub fn reload_mtab(&mut self) -> Result<()> {
        let table = MountTable::load(&self.config.mtab_path)?;
        log::debug!(
            "loaded {} entries from {}",
            table.len(),
            self.config.mtab_path.display()
        );
        self.replace_mtab(table);
        Ok(())
    }

    /// Whether the live table shows the device as mounted.
    pub fn is_mounted(&self, device: &D) -> bool {
        self.mtab.contains_device(device)
    }

    /// Turns a hotplug device into a registered record.
    ///
    /// The mountpoint comes from the fstab entry for the device if there is
    /// one, otherwise it is made up from the device's label, UUID or serial.
    pub fn create(&mut self, device: D) -> Result<&DeviceRecord<D>> {
        let Some(devnode) = device.devnode().map(str::to_string) else {
            return reject("(no node)", Rejection::MissingDevnode);
        };

        if self.fstab.has_option(&device, NOAUTO) {
            return reject(&devnode, Rejection::NoAuto);
        }

        let filesystem = match device.fs_type() {
            None => return reject(&devnode, Rejection::MissingFilesystem),
            Some(fs) if device::is_ignored_filesystem(fs) => {
                return reject(&devnode, Rejection::IgnoredFilesystem(fs.to_string()));
            }
            Some(fs) => fs.to_string(),
        };

        let Some(kind) = DeviceKind::classify(&device) else {
            return reject(&devnode, Rejection::UnsupportedKind);
        };

        if !kind.has_media(&device) {
            return reject(&devnode, Rejection::NoMedia);
        }

        let mountpoint = match self.fstab.resolve_device(&device) {
            Some(entry) => entry.target.clone(),
            None => match mountpoint::create_mountpoint(&self.config.mount_base, &device) {
                Some(path) => path,
                None => {
                    log::error!("couldn't make up a mountpoint name for {devnode}");
                    return reject(&devnode, Rejection::NoMountpointName);
                }
            },
        };

        let record = DeviceRecord::new(devnode.clone(), kind, filesystem, mountpoint, device);
        match self.registry.register(record) {
            Ok(record) => Ok(record),
            Err(RegisterError::Duplicate) => reject(&devnode, Rejection::AlreadyRegistered),
            Err(RegisterError::Full) => reject(&devnode, Rejection::RegistryFull),
        }
    }

    /// Creates a record for the device and mounts it.
    pub fn mount(&mut self, device: D) -> Result<()> {
        let record = self.create(device)?;

        let devnode = record.devnode.clone();
        let target = record.mountpoint.clone();
        let fstype = record.filesystem.clone();
        let read_only = record.kind.is_read_only();

        let quirks = Quirks::for_filesystem(&fstype);
        let request = MountRequest {
            source: devnode.clone(),
            target: target.clone(),
            fstype,
            options: quirks.mount_options(self.config.uid, self.config.gid),
            read_only,
        };

        if let Err(err) = mount::create_mount_point(&target) {
            self.discard(&devnode);
            return Err(err);
        }

        if let Err(errno) = self.mounter.mount(&request) {
            self.discard(&devnode);
            return Err(MountSnafu { devnode, target }.into_error(errno));
        }

        if quirks.needs_chown()
            && let Err(errno) =
                mount::chown_mount_point(&target, self.config.uid, self.config.gid)
        {
            // The live table has not caught up with our own mount yet.
            if let Err(err) = self.mounter.unmount(&target) {
                log::error!("cannot roll back mount of {devnode}: {err}");
            }
            self.discard(&devnode);
            return Err(ChownSnafu { path: target }.into_error(errno));
        }

        log::info!("mounted {devnode} on {}", target.display());
        self.hook.run(HookAction::Mount, &target);

        Ok(())
    }

    /// Unmounts the registered device with the given node, if any.
    ///
    /// Returns `Ok(false)` when nothing is registered under `devnode`.
    pub fn unmount(&mut self, devnode: &str) -> Result<bool> {
        let Some(record) = self.registry.iter().find(|r| r.devnode == devnode) else {
            return Ok(false);
        };

        let target = record.mountpoint.clone();
        let mounted = self.mtab.contains_device(record.handle());

        if mounted {
            self.mounter
                .unmount(&target)
                .context(UnmountSnafu {
                    devnode,
                    target: target.clone(),
                })?;
        }

        mount::remove_mount_point(&target);
        self.hook.run(HookAction::Unmount, &target);

        // Dropping the record releases the device handle.
        self.registry.remove(devnode);
        log::info!("unmounted {devnode} from {}", target.display());

        Ok(true)
    }

    /// Unmounts the record created from the same node as `device`.
    pub fn unmount_device(&mut self, device: &D) -> Result<bool> {
        match device.devnode() {
            Some(devnode) => self.unmount(devnode),
            None => Ok(false),
        }
    }

    /// Handles a media change under a stable device node.
    ///
    /// Whatever was registered for the node is unmounted first, then the
    /// device is mounted afresh.
    pub fn change(&mut self, device: D) -> Result<()> {
        if let Some(devnode) = device.devnode()
            && self.registry.find(devnode).is_some()
        {
            let devnode = devnode.to_string();
            self.unmount(&devnode)?;
        }

        self.mount(device)
    }

    /// Drops every record the live table no longer shows as mounted.
    ///
    /// Returns how many records were dropped.
    pub fn reconcile(&mut self) -> usize {
        let stale: Vec<String> = self
            .registry
            .iter()
            .filter(|r| !self.mtab.contains_device(r.handle()))
            .map(|r| r.devnode.clone())
            .collect();

        let mut dropped = 0;
        for devnode in stale {
            log::info!("{devnode} was unmounted behind our back");
            match self.unmount(&devnode) {
                Ok(true) => dropped += 1,
                Ok(false) => {}
                Err(err) => log_result(Err(err)),
            }
        }
        dropped
    }

    /// Unmounts the device registered under `path`, which may be a device
    /// node or a mountpoint. A trailing slash is ignored.
    ///
    /// Returns `Ok(false)` when nothing matches.
    pub fn remove(&mut self, path: &str) -> Result<bool> {
        let key = path.strip_suffix('/').unwrap_or(path);

        let Some(devnode) = self.registry.find(key).map(|r| r.devnode.clone()) else {
            log::debug!("remove request for unknown path {key}");
            return Ok(false);
        };

        self.unmount(&devnode)
    }

    /// Mounts every present device the live table does not show as mounted.
    pub fn mount_present(&mut self, devices: impl IntoIterator<Item = D>) {
        for device in devices {
            if self.is_mounted(&device) {
                continue;
            }
            let result = self.mount(device);
            log_result(result);
        }
    }

    /// Unmounts every registered device and empties the registry.
    pub fn clear(&mut self) {
        for devnode in self.registry.devnodes() {
            if let Err(err) = self.unmount(&devnode) {
                log_result(Err(err));
            }
        }
        self.registry.clear();
    }

    /// Cleans up after a failed mount.
    fn discard(&mut self, devnode: &str) {
        if let Err(err) = self.unmount(devnode) {
            log_result(Err(err));
        }
    }
}

/// Logs the result of a lifecycle call. Rejections are routine and only
/// show up at debug level.
pub fn log_result(result: Result<()>) {
    match result {
        Ok(()) => {}
        Err(err) if err.is_rejection() => log::debug!("{err}"),
        Err(err) => match std::error::Error::source(&err) {
            Some(source) => log::error!("{err} ({source})"),
            None => log::error!("{err}"),
        },
    }
}

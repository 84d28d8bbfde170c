//! The daemon main loop.
//!
//! A single thread waits on four descriptors at once:
//!
//! - the udev monitor socket (block device add/remove/change),
//! - an inotify watch on fstab (closed after write),
//! - the live mount table (pollable, reports a change as an error/priority
//!   condition),
//! - the command FIFO.
//!
//! Every ready source is handled to completion before the next wait, mounts
//! and hooks included, so lifecycle transitions never overlap. SIGINT,
//! SIGTERM and SIGHUP stop the loop; the handler is installed without
//! `SA_RESTART` so a blocked `poll` returns.

use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, WatchDescriptor};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::stat::{Mode, umask};
use snafu::{IntoError, ResultExt};

use crate::config::DaemonConfig;
use crate::error::{InotifySnafu, IoResultExt, PollSnafu, Result, SignalSnafu};
use crate::executor::CommandHook;
use crate::lifecycle::{Automounter, log_result};
use crate::mount::SystemMounter;
use crate::protocol::Command;

static RUNNING: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_: nix::libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

/// Marks the daemon as running. Termination signals clear the mark.
fn arm() {
    RUNNING.store(true, Ordering::SeqCst);
}

/// Makes SIGINT, SIGTERM and SIGHUP stop the main loop.
pub fn install_signal_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );

    for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // SAFETY: the handler only stores to an atomic.
        unsafe { sigaction(signal, &action) }.context(SignalSnafu)?;
    }
    Ok(())
}

/// Replaces whatever is at `path` with a world-writable FIFO.
pub fn create_fifo(path: &Path) -> Result<()> {
    let _ = fs::remove_file(path);

    let old_mask = umask(Mode::empty());
    let created = nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o666));
    umask(old_mask);

    created.map_err(std::io::Error::from).fifo_context(path)
}

/// Opens the reading end of the command FIFO without waiting for a writer.
pub fn open_fifo_reader(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(nix::libc::O_NONBLOCK)
        .open(path)
        .fifo_context(path)
}

nix::ioctl_read_bad!(fionread, nix::libc::FIONREAD, nix::libc::c_int);

/// Number of bytes waiting to be read from `file`.
fn pending_bytes(file: &File) -> nix::Result<usize> {
    let mut pending: nix::libc::c_int = 0;
    // SAFETY: FIONREAD writes one c_int through the pointer.
    unsafe { fionread(file.as_raw_fd(), &mut pending) }?;
    Ok(usize::try_from(pending).unwrap_or(0))
}

/// All block devices currently known to udev.
fn present_devices() -> Result<Vec<udev::Device>> {
    let mut enumerator = udev::Enumerator::new().udev_context("creating an enumerator")?;
    enumerator
        .match_subsystem("block")
        .udev_context("filtering the enumerator")?;
    let devices = enumerator
        .scan_devices()
        .udev_context("scanning block devices")?;
    Ok(devices.collect())
}

/// Which sources a wait reported ready.
#[derive(Debug, Default, Clone, Copy)]
struct Ready {
    hotplug: bool,
    fstab: bool,
    mtab: bool,
    command: bool,
}

/// Owns the daemon state and every event source.
pub struct EventLoop {
    automounter: Automounter<udev::Device, SystemMounter, CommandHook>,
    monitor: udev::MonitorSocket,
    inotify: Inotify,
    fstab_watch: Option<WatchDescriptor>,
    mtab: File,
    fifo: File,
}

impl EventLoop {
    /// Sets up every event source. `fifo` is the already opened reading end
    /// of the command FIFO.
    pub fn new(config: DaemonConfig, fifo: File) -> Result<Self> {
        let monitor = udev::MonitorBuilder::new()
            .udev_context("creating a monitor")?
            .match_subsystem("block")
            .udev_context("setting the monitor filter")?
            .listen()
            .udev_context("enabling receiving")?;

        let inotify = Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC)
            .context(InotifySnafu {
                path: config.fstab_path.clone(),
            })?;

        let mtab = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(&config.mtab_path)
            .table_read_context(&config.mtab_path)?;

        let hook = CommandHook::new(config.hook.clone(), config.uid, config.gid);

        Ok(Self {
            automounter: Automounter::new(config, SystemMounter, hook),
            monitor,
            inotify,
            fstab_watch: None,
            mtab,
            fifo,
        })
    }

    /// Loads both tables, mounts whatever is already plugged in, and starts
    /// watching fstab.
    pub fn startup(&mut self) -> Result<()> {
        self.automounter.reload_fstab()?;
        self.automounter.reload_mtab()?;

        self.automounter.mount_present(present_devices()?);

        // Our own mounts changed the live table.
        self.automounter.reload_fstab()?;
        self.automounter.reload_mtab()?;

        let fstab_path = self.automounter.config().fstab_path.clone();
        let watch = self
            .inotify
            .add_watch(&fstab_path, AddWatchFlags::IN_CLOSE_WRITE)
            .context(InotifySnafu { path: fstab_path })?;
        self.fstab_watch = Some(watch);

        Ok(())
    }

    /// Runs until a termination signal arrives or a table reload fails.
    ///
    /// The running mark is set by [`run`] before start-up, so a signal that
    /// arrived during [`startup`](Self::startup) still ends the loop.
    pub fn run(&mut self) -> Result<()> {
        log::info!("entering the main loop");

        while RUNNING.load(Ordering::SeqCst) {
            let ready = match self.wait() {
                Ok(ready) => ready,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(PollSnafu.into_error(errno)),
            };

            if ready.hotplug {
                self.handle_hotplug();
            }
            if ready.fstab {
                self.handle_fstab_change()?;
            }
            if ready.mtab {
                self.handle_mtab_change()?;
            }
            if ready.command {
                self.handle_command()?;
            }
        }

        Ok(())
    }

    /// Unmounts everything and removes the FIFO.
    pub fn shutdown(mut self) {
        if let Some(watch) = self.fstab_watch.take() {
            if let Err(err) = self.inotify.rm_watch(watch) {
                log::debug!("cannot remove fstab watch: {err}");
            }
        }

        self.automounter.clear();

        let fifo_path = &self.automounter.config().fifo_path;
        if let Err(err) = fs::remove_file(fifo_path) {
            log::warn!("cannot remove {}: {err}", fifo_path.display());
        }
    }

    fn wait(&self) -> nix::Result<Ready> {
        // SAFETY: the monitor socket is owned by `self` and outlives `fds`.
        let monitor_fd = unsafe { BorrowedFd::borrow_raw(self.monitor.as_raw_fd()) };

        let mut fds = [
            PollFd::new(monitor_fd, PollFlags::POLLIN),
            PollFd::new(self.inotify.as_fd(), PollFlags::POLLIN),
            PollFd::new(self.mtab.as_fd(), PollFlags::POLLERR | PollFlags::POLLPRI),
            PollFd::new(self.fifo.as_fd(), PollFlags::POLLIN),
        ];

        poll(&mut fds, PollTimeout::NONE)?;

        let revents = |index: usize| fds[index].revents().unwrap_or(PollFlags::empty());
        Ok(Ready {
            hotplug: revents(0).contains(PollFlags::POLLIN),
            fstab: revents(1).contains(PollFlags::POLLIN),
            mtab: revents(2).intersects(PollFlags::POLLERR | PollFlags::POLLPRI),
            command: revents(3).intersects(PollFlags::POLLIN | PollFlags::POLLHUP),
        })
    }

    fn handle_hotplug(&mut self) {
        let Some(event) = self.monitor.iter().next() else {
            return;
        };
        let device = event.device();
        let action = device
            .action()
            .and_then(|action| action.to_str())
            .unwrap_or_default()
            .to_string();

        log::debug!("{action} event for {}", device.syspath().display());

        match action.as_str() {
            "add" => log_result(self.automounter.mount(device)),
            "remove" => log_result(self.automounter.unmount_device(&device).map(|_| ())),
            "change" => log_result(self.automounter.change(device)),
            _ => {}
        }
    }

    fn handle_fstab_change(&mut self) -> Result<()> {
        // Only the wakeup matters; drain the queue.
        match self.inotify.read_events() {
            Ok(_) | Err(Errno::EAGAIN) => {}
            Err(errno) => {
                return Err(InotifySnafu {
                    path: self.automounter.config().fstab_path.clone(),
                }
                .into_error(errno));
            }
        }

        log::debug!("fstab changed, reloading");
        self.automounter.reload_fstab()
    }

    fn handle_mtab_change(&mut self) -> Result<()> {
        self.automounter.reload_mtab()?;
        let dropped = self.automounter.reconcile();
        if dropped > 0 {
            log::debug!("reconciliation dropped {dropped} devices");
        }
        Ok(())
    }

    fn handle_command(&mut self) -> Result<()> {
        let fifo_path = self.automounter.config().fifo_path.clone();

        let pending = pending_bytes(&self.fifo)
            .map_err(std::io::Error::from)
            .fifo_context(&fifo_path)?;

        if pending > 0 {
            let mut message = vec![0u8; pending];
            self.fifo.read_exact(&mut message).fifo_context(&fifo_path)?;

            match Command::decode(&message) {
                Ok(Command::Remove(path)) => {
                    log::info!("remove requested for {path}");
                    log_result(self.automounter.remove(&path).map(|_| ()));
                }
                Err(err) => log::warn!("ignoring command: {err}"),
            }
        }

        // The writer closed its end; start over with a fresh reader.
        self.fifo = open_fifo_reader(&fifo_path)?;
        Ok(())
    }
}

/// Runs the daemon until it is told to stop, then cleans up.
///
/// Table reload failures end the loop with an error; cleanup still runs.
pub fn run(config: DaemonConfig, fifo: File) -> Result<()> {
    arm();
    install_signal_handlers()?;

    let mut event_loop = EventLoop::new(config, fifo)?;
    let result = event_loop.startup().and_then(|()| event_loop.run());
    event_loop.shutdown();

    result
}

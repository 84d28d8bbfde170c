//! ldm - Lightweight device mounter.
//!
//! Mounts removable media as it is plugged in and unmounts it when it goes
//! away. Run it as root with the user the mounts should belong to:
//!
//! ```text
//! ldm -d -u 1000 -g 100 -c /usr/local/bin/on-mount
//! ```
//!
//! `ldm -r <path>` asks a running instance to unmount a device by device node
//! or mountpoint.

mod client;
mod daemon;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use ldm_core::config::{FIFO_PATH, FSTAB_PATH, MOUNT_BASE};
use ldm_core::error::DaemonizeSnafu;
use ldm_core::{DaemonConfig, event_loop, logging};
use snafu::ResultExt;

use crate::daemon::PidLock;

/// Lightweight device mounter.
#[derive(Parser)]
#[command(name = "ldm", version)]
#[command(about = "Automatically mounts removable block devices", long_about = None)]
struct Cli {
    /// Run in the background. Log output goes to /dev/null; run in the
    /// foreground under a supervisor to keep it.
    #[arg(short, long)]
    daemon: bool,

    /// Ask the running daemon to unmount PATH (device node or mountpoint).
    #[arg(short, long, value_name = "PATH")]
    remove: Option<String>,

    /// Owner of the mounted filesystems.
    #[arg(short, long, required_unless_present = "remove")]
    uid: Option<u32>,

    /// Group of the mounted filesystems.
    #[arg(short, long, required_unless_present = "remove")]
    gid: Option<u32>,

    /// Program run as `<PATH> mount|unmount <mountpoint>`.
    #[arg(short, long, value_name = "PATH")]
    callback: Option<PathBuf>,

    /// Directory the mountpoints are created in.
    #[arg(short, long, value_name = "DIR", default_value = MOUNT_BASE)]
    mount_base: PathBuf,

    /// Static mount table.
    #[arg(long, value_name = "PATH", default_value = FSTAB_PATH)]
    fstab: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init("info");

    if let Some(target) = &cli.remove {
        return match client::send_remove(Path::new(FIFO_PATH), target) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("{e}: is ldm running?");
                ExitCode::FAILURE
            }
        };
    }

    // clap enforces both unless -r was given.
    let (Some(uid), Some(gid)) = (cli.uid, cli.gid) else {
        return ExitCode::FAILURE;
    };

    if !nix::unistd::getuid().is_root() {
        log::error!("ldm needs root privileges");
        return ExitCode::FAILURE;
    }

    let config = DaemonConfig::new(uid, gid)
        .with_mount_base(cli.mount_base)
        .with_fstab_path(cli.fstab)
        .with_hook(cli.callback);

    if PidLock::is_held(&config.lock_path) {
        println!("ldm is already running!");
        return ExitCode::SUCCESS;
    }

    match run(config, cli.daemon) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: DaemonConfig, background: bool) -> ldm_core::Result<()> {
    event_loop::create_fifo(&config.fifo_path)?;
    let fifo = event_loop::open_fifo_reader(&config.fifo_path)?;

    if background {
        if let Err(e) = daemon::daemonize().context(DaemonizeSnafu) {
            let _ = std::fs::remove_file(&config.fifo_path);
            return Err(e);
        }
    }

    let lock = PidLock::acquire(&config.lock_path)?;

    log::info!("ldm {} started", env!("CARGO_PKG_VERSION"));
    let result = event_loop::run(config, fifo);
    log::info!("terminating");

    lock.release();
    result
}

//! The `-r` client: asks a running daemon to unmount something.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use ldm_core::Command;
use ldm_core::error::{IoResultExt, Result};

/// Sends a remove request for `target` over the command FIFO.
///
/// The FIFO is opened non-blocking, so this fails right away instead of
/// hanging when no daemon is reading.
pub fn send_remove(fifo_path: &Path, target: &str) -> Result<()> {
    let mut fifo = OpenOptions::new()
        .write(true)
        .custom_flags(nix::libc::O_NONBLOCK)
        .open(fifo_path)
        .fifo_context(fifo_path)?;

    // One write per message; the daemon reads whatever is pending at once.
    fifo.write_all(&Command::Remove(target.to_string()).encode())
        .fifo_context(fifo_path)?;

    Ok(())
}

//! Process level daemon plumbing: detaching and the PID lock.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use ldm_core::error::{IoResultExt, Result};
use nix::sys::stat::{Mode, umask};

/// Detaches from the terminal.
///
/// Forks, starts a new session, changes to `/` and points stdio at
/// `/dev/null`. Only the child returns.
pub fn daemonize() -> nix::Result<()> {
    nix::unistd::daemon(false, false)?;
    umask(Mode::from_bits_truncate(0o022));
    Ok(())
}

/// A lock file holding the daemon's PID.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    /// Whether another instance holds the lock.
    pub fn is_held(path: &Path) -> bool {
        path.exists()
    }

    /// Writes the current PID to `path`. Fails if the file already exists.
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .lock_context(path)?;
        write!(file, "{}", nix::unistd::getpid()).lock_context(path)?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the lock file.
    pub fn release(self) {
        if let Err(err) = fs::remove_file(&self.path) {
            log::warn!("cannot remove lock {}: {err}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ldm.pid");
        assert!(!PidLock::is_held(&path));

        let lock = PidLock::acquire(&path).unwrap();
        assert!(PidLock::is_held(&path));
        assert_eq!(lock.path(), path.as_path());

        let pid: i32 = fs::read_to_string(&path).unwrap().parse().unwrap();
        assert_eq!(pid, nix::unistd::getpid().as_raw());

        // A second instance can't take it.
        assert!(PidLock::acquire(&path).is_err());

        lock.release();
        assert!(!PidLock::is_held(&path));
    }
}

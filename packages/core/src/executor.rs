//! Mount/unmount hook execution.
//!
//! After every mount and unmount the daemon can run a user supplied program
//! as `<hook> mount|unmount <mountpoint>`. The program runs with the
//! configured uid/gid instead of root, and the daemon waits for it.

use std::fmt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Exit status reported when the hook could not be started at all.
pub const SPAWN_FAILED: i32 = -1;

/// Which transition the hook is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Mount,
    Unmount,
}

impl HookAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HookAction::Mount => "mount",
            HookAction::Unmount => "unmount",
        }
    }
}

impl fmt::Display for HookAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs the hook and waits for it.
pub trait HookRunner {
    /// Returns the hook's exit status, `0` when no hook is configured, or
    /// [`SPAWN_FAILED`].
    fn run(&mut self, action: HookAction, mountpoint: &Path) -> i32;
}

/// Spawns the hook as a child process with dropped credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHook {
    program: Option<PathBuf>,
    uid: u32,
    gid: u32,
}

impl CommandHook {
    pub fn new(program: Option<PathBuf>, uid: u32, gid: u32) -> Self {
        Self { program, uid, gid }
    }
}

impl HookRunner for CommandHook {
    fn run(&mut self, action: HookAction, mountpoint: &Path) -> i32 {
        let Some(program) = &self.program else {
            return 0;
        };

        let status = Command::new(program)
            .arg(action.as_str())
            .arg(mountpoint)
            .stdin(Stdio::null())
            .gid(self.gid)
            .uid(self.uid)
            .status();

        match status {
            Ok(status) => {
                let code = status.code().unwrap_or(SPAWN_FAILED);
                log::debug!(
                    "hook {} {action} {} exited with {code}",
                    program.display(),
                    mountpoint.display()
                );
                code
            }
            Err(err) => {
                log::error!("could not execute \"{}\": {err}", program.display());
                SPAWN_FAILED
            }
        }
    }
}

//! Spawning the interactive shell behind a session.
//!
//! `portable-pty` puts the child in a fresh process session with the PTY
//! slave as its controlling terminal, so everything the shell spawns shares
//! one process group. That group id is what [`ShellProcess`] signals at
//! teardown, catching orphaned children along with the shell itself.

use std::path::Path;

use portable_pty::{Child, CommandBuilder, SlavePty};

use super::authz::Identity;
use super::error::{TerminalError, TerminalResult};

/// Marker variable exported into every panel shell.
pub const PANEL_ENV_MARKER: &str = "SHELLPANEL";

/// Minimal process-control surface the session needs.
///
/// The session never touches raw pids or signals; this keeps the engine
/// portable and lets tests substitute a fake process.
pub trait ProcessControl: Send {
    /// Signal the whole process group: SIGTERM when `forceful` is false,
    /// SIGKILL when true. Errors (e.g. group already gone) are swallowed.
    fn signal(&mut self, forceful: bool);

    /// Exit code if the process has exited, `None` while still running.
    fn try_wait(&mut self) -> Option<u32>;

    /// Block until the process exits, reaping it.
    fn wait(&mut self);
}

/// A spawned shell bound to its process group.
pub struct ShellProcess {
    child: Box<dyn Child + Send + Sync>,
    pgid: Option<i32>,
}

impl std::fmt::Debug for ShellProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellProcess").field("pgid", &self.pgid).finish_non_exhaustive()
    }
}

impl ProcessControl for ShellProcess {
    fn signal(&mut self, forceful: bool) {
        let sig = if forceful { libc::SIGKILL } else { libc::SIGTERM };
        if let Some(pgid) = self.pgid {
            unsafe {
                libc::killpg(pgid, sig);
            }
        }
    }

    fn try_wait(&mut self) -> Option<u32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            Ok(None) => None,
            // Treat a wait error as "already reaped".
            Err(_) => Some(0),
        }
    }

    fn wait(&mut self) {
        let _ = self.child.wait();
    }
}

/// Start one interactive shell attached to `slave`.
///
/// For [`Identity::User`] the caller must already have consulted the
/// identity authorizer; this function only enforces that the
/// privilege-switch tool exists, failing closed when it does not. On any
/// error the slave handle is dropped before returning, so a failed spawn
/// never leaks the PTY.
pub fn launch_shell(
    slave: Box<dyn SlavePty + Send>,
    identity: &Identity,
    shell: &str,
    privilege_tool: Option<&Path>,
) -> TerminalResult<ShellProcess> {
    let mut cmd = match identity {
        Identity::OwnUser => {
            let mut cmd = CommandBuilder::new(shell);
            cmd.arg("-l");
            cmd
        }
        Identity::User(name) => {
            let tool = privilege_tool.ok_or_else(|| {
                TerminalError::Unauthorized(format!(
                    "cannot run as '{name}': privilege-switch tool not available"
                ))
            })?;
            let mut cmd = CommandBuilder::new(tool);
            cmd.arg("-u");
            cmd.arg(name);
            cmd.arg("-i");
            cmd
        }
    };

    cmd.env(PANEL_ENV_MARKER, "1");
    cmd.env("TERM", "xterm-256color");

    let child = slave
        .spawn_command(cmd)
        .map_err(|e| TerminalError::Allocation(format!("failed to spawn shell: {e}")))?;
    drop(slave);

    // The child is its own session leader, so pid == pgid.
    let pgid = child.process_id().map(|pid| pid as i32);

    Ok(ShellProcess { child, pgid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::pty::open_pty;

    #[test]
    fn own_user_shell_spawns_and_terminates() {
        let pair = open_pty(80, 24).expect("openpty");
        let mut process =
            launch_shell(pair.slave, &Identity::OwnUser, "/bin/sh", None).expect("spawn");
        assert!(process.try_wait().is_none());
        process.signal(true);
        process.wait();
    }

    #[test]
    fn named_identity_without_tool_fails_closed() {
        let pair = open_pty(80, 24).expect("openpty");
        let err = launch_shell(
            pair.slave,
            &Identity::User("deploy".to_string()),
            "/bin/sh",
            None,
        )
        .expect_err("must refuse without privilege tool");
        assert!(matches!(err, TerminalError::Unauthorized(_)));
    }
}

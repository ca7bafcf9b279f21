// Buttond Command Execution
// Runs fired action commands through the shell

use std::io;
use std::process::{Child, Command};

use crate::machine::Firing;

/// Something that runs the command of a fired action.
pub trait CommandExecutor {
    /// Run the command of `firing`. The exit status is not reported back.
    fn execute(&mut self, firing: &Firing) -> io::Result<()>;
}

/// How `ShellExecutor` runs commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Wait for each command before handling further input
    Blocking,
    /// Spawn and continue; children are reaped by `reap()` and outlive the
    /// executor if still running when it is dropped
    #[default]
    Detached,
}

/// Executes commands with `/bin/sh -c`.
///
/// Actions with `exit_after` always run blocking so the daemon only exits
/// once the command finished.
#[derive(Debug, Default)]
pub struct ShellExecutor {
    mode: ExecMode,
    children: Vec<Child>,
}

impl ShellExecutor {
    pub fn new(mode: ExecMode) -> Self {
        Self {
            mode,
            children: Vec::new(),
        }
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    /// Number of detached commands still running
    pub fn running(&self) -> usize {
        self.children.len()
    }

    fn command(cmd: &str) -> Command {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(cmd);
        command
    }

    /// Collect finished detached commands.
    pub fn reap(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    log::warn!("command (pid {}) exited with {}", child.id(), status);
                }
                false
            }
            Ok(None) => true,
            Err(e) => {
                log::warn!("failed to check command (pid {}): {}", child.id(), e);
                false
            }
        });
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&mut self, firing: &Firing) -> io::Result<()> {
        if self.mode == ExecMode::Blocking || firing.exit_after {
            let status = Self::command(&firing.command).status()?;
            if !status.success() {
                log::warn!("command '{}' exited with {}", firing.command, status);
            }
        } else {
            let child = Self::command(&firing.command).spawn()?;
            log::debug!("spawned '{}' as pid {}", firing.command, child.id());
            self.children.push(child);
        }
        Ok(())
    }
}

impl Drop for ShellExecutor {
    fn drop(&mut self) {
        // Collect what already finished; commands still running are left alone
        self.reap();
        for child in &self.children {
            log::debug!("leaving command (pid {}) running", child.id());
        }
    }
}

/// Executor that only records what it was asked to run.
#[derive(Debug, Default, Clone)]
pub struct RecordingExecutor {
    pub fired: Vec<Firing>,
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&mut self, firing: &Firing) -> io::Result<()> {
        self.fired.push(firing.clone());
        Ok(())
    }
}

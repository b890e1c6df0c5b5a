use crate::wm::ShellCommand;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tokio::runtime::{Handle, RuntimeFlavor};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("no async runtime available to run '{0}'")]
    NoRuntime(ShellCommand),
}

/// Runs `f`, which may block on a child process or IPC. On a multi-threaded
/// runtime the worker is handed off first so other tasks keep running.
pub fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Starts a shell command line without waiting for it to finish.
pub trait Spawner: Send {
    fn spawn(&self, command: &ShellCommand) -> Result<(), SpawnError>;
}

/// Runs command lines through `sh -c` on the current tokio runtime.
///
/// The child is detached: nobody awaits it except a logging task, and two
/// spawns of the same line run side by side.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellSpawner;

impl Spawner for ShellSpawner {
    fn spawn(&self, command: &ShellCommand) -> Result<(), SpawnError> {
        let handle = Handle::try_current().map_err(|_| SpawnError::NoRuntime(command.clone()))?;
        let line = command.clone();

        handle.spawn(async move {
            let output = Command::new("sh")
                .arg("-c")
                .arg(line.as_str())
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await;

            match output {
                Ok(out) if !out.status.success() => log::error!(
                    "'{}' exited with {}: {}",
                    line,
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
                Ok(out) if !out.stderr.is_empty() => log::warn!(
                    "'{}' wrote to stderr: {}",
                    line,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
                Ok(_) => log::debug!("'{}' finished", line),
                Err(e) => log::error!("Failed to spawn '{}': {}", line, e),
            }
        });

        Ok(())
    }
}

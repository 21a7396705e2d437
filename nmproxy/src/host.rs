//! Native messaging host subprocess.
//!
//! The host speaks the frame protocol on its stdin/stdout; stderr is free-form
//! diagnostics. All three are piped so the coordinator can pump them
//! independently.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::error::BridgeError;
use crate::signal::{CancellationToken, ErrorSlot};

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn {}: {source}", command.display())]
    Spawn {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("host {0} not captured")]
    StreamNotCaptured(&'static str),
}

/// Extension point for different host spawn strategies.
pub trait HostSpawner: Send + Sync {
    fn spawn(&self, command: &Path) -> Result<Child, SpawnError>;
}

/// Spawns the command directly with all standard streams piped.
pub struct CommandSpawner;

impl HostSpawner for CommandSpawner {
    fn spawn(&self, command: &Path) -> Result<Child, SpawnError> {
        Command::new(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                command: command.to_path_buf(),
                source,
            })
    }
}

/// Handle on a running host. Owned by the coordinator; killed on teardown.
pub struct HostProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl HostProcess {
    pub fn spawn(spawner: &dyn HostSpawner, command: &Path) -> Result<Self, SpawnError> {
        let mut child = spawner.spawn(command)?;

        let stdin = child
            .stdin
            .take()
            .ok_or(SpawnError::StreamNotCaptured("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(SpawnError::StreamNotCaptured("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SpawnError::StreamNotCaptured("stderr"))?;

        tracing::debug!(
            pid = ?child.id(),
            command = %command.display(),
            "Spawned native messaging host"
        );

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr: Some(stderr),
        })
    }

    /// OS process id, `None` once the process has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Forcibly terminate and reap the host.
    pub async fn kill(&mut self) {
        let pid = self.child.id();
        match self.child.kill().await {
            Ok(()) => tracing::debug!(?pid, "Native messaging host terminated"),
            // Already exited and reaped.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => tracing::warn!(?pid, error = %e, "Failed to kill native messaging host"),
        }
    }
}

/// Copy the host's stderr verbatim to `sink` until EOF or cancellation.
///
/// EOF is not an error here: a host that exits is reported by the relay
/// reading its stdout.
pub async fn copy_stderr<R, W>(
    mut stderr: R,
    mut sink: W,
    cancel: CancellationToken,
    errors: ErrorSlot,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        copied = tokio::io::copy(&mut stderr, &mut sink) => copied,
    };

    match copied {
        Ok(bytes) => tracing::debug!(bytes, "Host closed stderr"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to copy host stderr");
            errors.publish(BridgeError::HostStderr(e));
        }
    }
}

//! Local endpoint providers — the non-socket side of a session.
//!
//! A session talks to either the calling process's own standard
//! streams or the stdin/stdout of a shell-invoked command. Both are
//! exposed as boxed async read/write handles so the pumps never depend
//! on process details; the guard returned alongside them owns the
//! subprocess lifecycle.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::RelayError;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An opened local endpoint: one readable stream, one writable stream
/// and a guard for whatever process backs them.
pub struct LocalEndpoint {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub guard: EndpointGuard,
    /// Descriptor names for errors, logs and tap EOF markers.
    pub reader_name: &'static str,
    pub writer_name: &'static str,
}

/// Open the local endpoint: the process's own stdio, or a spawned
/// shell command when one is configured.
pub fn open(command: Option<&str>) -> Result<LocalEndpoint, RelayError> {
    match command {
        None => Ok(LocalEndpoint {
            reader: Box::new(tokio::io::stdin()),
            writer: Box::new(tokio::io::stdout()),
            guard: EndpointGuard { child: None },
            reader_name: "stdin",
            writer_name: "stdout",
        }),
        Some(cmd) => spawn_command(cmd),
    }
}

fn spawn_command(cmd: &str) -> Result<LocalEndpoint, RelayError> {
    let mut command = shell_command(cmd);
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RelayError::Spawn {
            command: cmd.to_string(),
            source: e,
        })?;

    let stdout = child.stdout.take().ok_or_else(|| RelayError::Spawn {
        command: cmd.to_string(),
        source: std::io::Error::other("child stdout not captured"),
    })?;
    let stdin = child.stdin.take().ok_or_else(|| RelayError::Spawn {
        command: cmd.to_string(),
        source: std::io::Error::other("child stdin not captured"),
    })?;

    debug!(command = cmd, pid = child.id(), "command spawned");

    Ok(LocalEndpoint {
        reader: Box::new(stdout),
        writer: Box::new(stdin),
        guard: EndpointGuard { child: Some(child) },
        reader_name: "command stdout",
        writer_name: "command stdin",
    })
}

#[cfg(unix)]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(cmd);
    command
}

#[cfg(windows)]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(cmd);
    command
}

/// Owns the subprocess backing a command endpoint, if any.
///
/// `kill_on_drop` covers abandoned sessions; [`terminate`] is the
/// orderly path, reaping the child so it cannot be left orphaned.
///
/// [`terminate`]: EndpointGuard::terminate
pub struct EndpointGuard {
    child: Option<Child>,
}

impl EndpointGuard {
    /// Stop and reap the subprocess. No-op for stdio endpoints and for
    /// commands that already exited on their own.
    pub async fn terminate(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(%status, "command exited");
                return;
            }
            Ok(None) => {
                if let Err(e) = child.start_kill() {
                    warn!("failed to signal command: {e}");
                }
            }
            Err(e) => warn!("failed to poll command status: {e}"),
        }

        match child.wait().await {
            Ok(status) => debug!(%status, "command terminated"),
            Err(e) => warn!("failed to reap command: {e}"),
        }
    }
}

//! Named-pipe transport between the cache service and its clients
//!
//! One message per open/close. A reader waits for a writer to send a line and
//! hang up; a writer waits for a reader, writes, and waits until the reader
//! has drained the pipe before closing. The drain wait keeps a half-duplex
//! exchange on a single FIFO from handing a request back to its own sender.
//!
//! # Security Model
//!
//! The FIFO is the only access-control boundary: it must be owned by the
//! calling user, be an actual FIFO (no symlink or regular file swapped in)
//! and carry no permission bits beyond owner read/write. Every read and
//! write re-validates the path first.

pub mod handoff;

pub use handoff::{read_handoff, SecretHandoff, ASKPASS_FIFO_ENV};

use crate::context::Context;
use crate::error::{CredpipeError, CredpipeResult};
use std::ffi::CString;
use std::future::Future;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tracing::{debug, warn, Instrument};

/// Poll interval while waiting for a counterpart or for the reader to drain
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Permission bits that must never be set on the FIFO (u+x, g+rwx, o+rwx)
const FORBIDDEN_MODE: u32 = 0o177;

/// A named pipe at a fixed path
#[derive(Debug, Clone)]
pub struct Fifo {
    path: PathBuf,
    ctx: Context,
}

/// Removes the FIFO when dropped
#[derive(Debug)]
pub struct FifoGuard {
    path: PathBuf,
}

impl Drop for FifoGuard {
    fn drop(&mut self) {
        remove_quietly(&self.path);
    }
}

impl Fifo {
    /// Create a handle for the FIFO at `path` (nothing touches the disk yet)
    pub fn new(path: impl Into<PathBuf>, ctx: &Context) -> Self {
        Self {
            path: path.into(),
            ctx: ctx.clone(),
        }
    }

    /// Path of the FIFO
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a fresh FIFO with mode 0600, replacing anything at the path
    pub fn create(&self) -> CredpipeResult<FifoGuard> {
        if std::fs::symlink_metadata(&self.path).is_ok() {
            debug!("Removing stale FIFO {}", self.path.display());
            self.delete();
        }

        let c_path = CString::new(self.path.as_os_str().as_bytes()).map_err(|_| {
            CredpipeError::PipeCreate {
                path: self.path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path contains a NUL byte",
                ),
            }
        })?;

        // SAFETY: c_path is a valid NUL-terminated string for the call's duration
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        if rc != 0 {
            return Err(CredpipeError::PipeCreate {
                path: self.path.clone(),
                source: std::io::Error::last_os_error(),
            });
        }

        std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).map_err(
            |e| CredpipeError::PipeCreate {
                path: self.path.clone(),
                source: e,
            },
        )?;

        debug!("Created FIFO {}", self.path.display());
        Ok(FifoGuard {
            path: self.path.clone(),
        })
    }

    /// Remove the FIFO, ignoring every error
    pub fn delete(&self) {
        remove_quietly(&self.path);
    }

    /// Check ownership, file type and permissions of the path
    pub fn validate(&self) -> CredpipeResult<()> {
        let meta = std::fs::symlink_metadata(&self.path).map_err(|e| {
            CredpipeError::channel(format!("{} is not accessible", self.path.display()), e)
        })?;

        // SAFETY: getuid has no preconditions and cannot fail
        let uid = unsafe { libc::getuid() };
        if meta.uid() != uid {
            return Err(CredpipeError::integrity(&self.path, "not owned by current user"));
        }

        if !meta.file_type().is_fifo() {
            return Err(CredpipeError::integrity(&self.path, "not a named pipe (FIFO)"));
        }

        let mode = meta.mode() & 0o777;
        if mode & FORBIDDEN_MODE != 0 {
            return Err(CredpipeError::integrity(
                &self.path,
                format!("wrong permissions {:o}", mode),
            ));
        }

        Ok(())
    }

    /// Read one message, waiting at most `timeout` (zero waits forever)
    ///
    /// Only the first line counts; use [`Fifo::read_batch`] where several
    /// writers may share one open of the pipe.
    pub async fn read(&self, timeout: Duration) -> CredpipeResult<String> {
        let mut lines = self.read_batch(timeout).await?;
        if lines.is_empty() {
            return Ok(String::new());
        }
        Ok(lines.swap_remove(0))
    }

    /// Read every message sent until the last writer hangs up
    ///
    /// A writer that opens the pipe before the previous one's hang-up is
    /// seen lands in the same batch, one line per message.
    pub async fn read_batch(&self, timeout: Duration) -> CredpipeResult<Vec<String>> {
        self.validate()?;
        let span = self.ctx.span("transport");
        self.bounded(timeout, self.read_messages())
            .instrument(span)
            .await
    }

    /// Write one message, waiting at most `timeout` (zero waits forever)
    pub async fn write(&self, message: &str, timeout: Duration) -> CredpipeResult<()> {
        if message.contains('\n') {
            return Err(CredpipeError::Protocol(
                "message must be a single line".to_string(),
            ));
        }
        self.validate()?;
        let span = self.ctx.span("transport");
        self.bounded(timeout, self.write_message(message))
            .instrument(span)
            .await
    }

    async fn bounded<T, F>(&self, timeout: Duration, fut: F) -> CredpipeResult<T>
    where
        F: Future<Output = CredpipeResult<T>>,
    {
        if timeout.is_zero() {
            return fut.await;
        }

        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                debug!("FIFO exchange timed out after {:?}", timeout);
                Err(CredpipeError::TransportTimeout {
                    path: self.path.clone(),
                    after: timeout,
                })
            }
        }
    }

    async fn read_messages(&self) -> CredpipeResult<Vec<String>> {
        let mut rx = pipe::OpenOptions::new()
            .open_receiver(&self.path)
            .map_err(|e| {
                CredpipeError::channel(format!("opening {} for reading", self.path.display()), e)
            })?;

        let mut buf = Vec::new();
        rx.read_to_end(&mut buf).await.map_err(|e| {
            CredpipeError::channel(format!("reading from {}", self.path.display()), e)
        })?;

        let text = String::from_utf8(buf)
            .map_err(|_| CredpipeError::Protocol("message is not valid UTF-8".to_string()))?;

        Ok(text
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn write_message(&self, message: &str) -> CredpipeResult<()> {
        let mut tx = loop {
            match pipe::OpenOptions::new().open_sender(&self.path) {
                Ok(tx) => break tx,
                // No reader yet
                Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                    tokio::time::sleep(POLL_INTERVAL).await
                }
                Err(e) => {
                    return Err(CredpipeError::channel(
                        format!("opening {} for writing", self.path.display()),
                        e,
                    ))
                }
            }
        };

        let mut line = String::with_capacity(message.len() + 1);
        line.push_str(message);
        line.push('\n');

        tx.write_all(line.as_bytes()).await.map_err(|e| {
            CredpipeError::channel(format!("writing to {}", self.path.display()), e)
        })?;

        while pending_bytes(&tx)? > 0 {
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Ok(())
    }
}

/// Bytes written to the pipe but not yet consumed by a reader
fn pending_bytes(tx: &pipe::Sender) -> CredpipeResult<usize> {
    let mut pending: libc::c_int = 0;
    // SAFETY: FIONREAD writes a single c_int through the provided pointer
    let rc = unsafe { libc::ioctl(tx.as_raw_fd(), libc::FIONREAD, &mut pending as *mut libc::c_int) };
    if rc != 0 {
        return Err(CredpipeError::channel(
            "querying FIFO buffer",
            std::io::Error::last_os_error(),
        ));
    }
    Ok(usize::try_from(pending).unwrap_or(0))
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

//! One-shot secret handoff to a child askpass helper
//!
//! Used when a secret must reach a helper process (e.g. `SSH_ASKPASS`) but
//! the cache service is not involved: a private temporary directory holds a
//! FIFO, a background task writes the secret exactly once, and the path is
//! exported to the child through [`ASKPASS_FIFO_ENV`].

use super::{Fifo, FifoGuard};
use crate::context::Context;
use crate::error::{CredpipeError, CredpipeResult};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Environment variable pointing a helper at the handoff FIFO
pub const ASKPASS_FIFO_ENV: &str = "CREDPIPE_ASKPASS_FIFO";

/// How long `finish` waits for the helper to pick the secret up
const FINISH_TIMEOUT: Duration = Duration::from_secs(5);

/// A secret waiting in a temporary FIFO for exactly one reader
pub struct SecretHandoff {
    dir: PathBuf,
    fifo: Fifo,
    writer: Option<JoinHandle<CredpipeResult<()>>>,
    guard: Option<FifoGuard>,
}

impl SecretHandoff {
    /// Create the FIFO under `parent` and start writing `secret` into it
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(parent: &Path, secret: String, ctx: &Context) -> CredpipeResult<Self> {
        let dir = parent.join(format!("credpipe-{}", Uuid::new_v4()));
        std::fs::DirBuilder::new()
            .mode(0o700)
            .create(&dir)
            .map_err(|e| CredpipeError::io(format!("creating {}", dir.display()), e))?;

        let fifo = Fifo::new(dir.join("FIFO"), ctx);
        let guard = match fifo.create() {
            Ok(guard) => guard,
            Err(e) => {
                let _ = std::fs::remove_dir(&dir);
                return Err(e);
            }
        };

        let writer_fifo = fifo.clone();
        let writer =
            tokio::spawn(async move { writer_fifo.write(&secret, Duration::ZERO).await });

        debug!("Secret handoff ready at {}", fifo.path().display());
        Ok(Self {
            dir,
            fifo,
            writer: Some(writer),
            guard: Some(guard),
        })
    }

    /// Start a handoff in the system temp directory
    pub fn start_in_temp(secret: String, ctx: &Context) -> CredpipeResult<Self> {
        Self::start(&std::env::temp_dir(), secret, ctx)
    }

    /// Private directory holding the FIFO, removed on finish
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Environment pair to hand to the child process
    pub fn env(&self) -> (&'static str, &Path) {
        (ASKPASS_FIFO_ENV, self.fifo.path())
    }

    /// Wait for the reader, then tear everything down
    ///
    /// Returns whether the secret was picked up. An unread secret is
    /// discarded by cancelling the writer.
    pub async fn finish(mut self) -> bool {
        let consumed = match self.writer.take() {
            Some(mut writer) => match tokio::time::timeout(FINISH_TIMEOUT, &mut writer).await {
                Ok(Ok(Ok(()))) => true,
                Ok(Ok(Err(e))) => {
                    warn!("Secret handoff failed: {}", e);
                    false
                }
                Ok(Err(e)) => {
                    warn!("Secret handoff task failed: {}", e);
                    false
                }
                Err(_) => {
                    debug!("Secret handoff was not read, discarding");
                    writer.abort();
                    false
                }
            },
            None => false,
        };

        self.cleanup();
        consumed
    }

    fn cleanup(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        drop(self.guard.take());
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.dir.display(), e);
            }
        }
    }
}

impl Drop for SecretHandoff {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Read a secret handed off through the FIFO at `path`
pub async fn read_handoff(path: &Path, ctx: &Context) -> CredpipeResult<String> {
    Fifo::new(path, ctx).read(FINISH_TIMEOUT).await
}

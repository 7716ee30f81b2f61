//! Client side of the cache service

use super::info::CacheInfo;
use super::protocol::{Request, Response};
use super::CachePaths;
use crate::context::Context;
use crate::credentials::CredentialKey;
use crate::error::{CredpipeError, CredpipeResult};
use crate::supervisor::Supervisor;
use crate::transport::Fifo;
use std::time::Duration;
use tracing::debug;

/// Bound on every exchange with the service
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to a running cache service through its FIFO
#[derive(Debug, Clone)]
pub struct CacheClient {
    paths: CachePaths,
    fifo: Fifo,
    supervisor: Supervisor,
}

impl CacheClient {
    pub fn new(paths: CachePaths, ctx: &Context) -> Self {
        Self {
            fifo: Fifo::new(paths.fifo(), ctx),
            supervisor: Supervisor::new(paths.pid_file(), ctx),
            paths,
        }
    }

    /// Check that a compatible service is running
    pub fn ensure_available(&self) -> CredpipeResult<()> {
        if !self.supervisor.status() {
            return Err(CredpipeError::NotRunning);
        }
        CacheInfo::load(&self.paths.info())?.check_version()
    }

    /// Ask the service for a secret
    pub async fn get(&self, key: &CredentialKey) -> CredpipeResult<Option<String>> {
        self.ensure_available()?;

        self.fifo
            .write(&Request::Get(key.clone()).to_string(), CLIENT_TIMEOUT)
            .await?;
        let line = self.fifo.read(CLIENT_TIMEOUT).await?;
        let response = Response::parse(&line)?;

        debug!(
            "Cache {} for {}",
            if matches!(response, Response::Password(_)) {
                "hit"
            } else {
                "miss"
            },
            key
        );
        Ok(response.into_option())
    }

    /// Hand a secret to the service for the rest of its session
    pub async fn set(&self, key: &CredentialKey, secret: &str) -> CredpipeResult<()> {
        self.ensure_available()?;

        let request = Request::Set(key.clone(), secret.to_string());
        self.fifo.write(&request.to_string(), CLIENT_TIMEOUT).await?;
        debug!("Sent {} to cache", key);
        Ok(())
    }
}

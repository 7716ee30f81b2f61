//! The cache service: keeps secrets in memory and serves them over a FIFO
//!
//! Startup seeds the keyring-backed slots, writes the `info` record, saves
//! the session environment and creates the FIFO. The serve loop then answers
//! one request at a time until SIGTERM/SIGINT; SIGHUP re-reads the
//! configuration and re-seeds.

pub mod client;
pub mod entries;
pub mod info;
pub mod protocol;

pub use client::{CacheClient, CLIENT_TIMEOUT};
pub use entries::{CacheEntries, SlotPlan};
pub use info::{CacheInfo, PROTOCOL_VERSION};
pub use protocol::{Request, Response};

use crate::config::ConfigManager;
use crate::context::Context;
use crate::credentials::SecretStore;
use crate::env::SessionEnv;
use crate::error::{CredpipeError, CredpipeResult};
use crate::supervisor::Service;
use crate::transport::{Fifo, FifoGuard};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Instrument};

/// Bound on writing a `get_pw` answer back to the client
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Files the service keeps in its cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    dir: PathBuf,
}

impl CachePaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Paths under the configured cache directory (`CREDPIPE_CACHE_DIR` aware)
    pub fn from_env() -> Self {
        Self::new(ConfigManager::cache_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fifo(&self) -> PathBuf {
        self.dir.join("FIFO")
    }

    pub fn info(&self) -> PathBuf {
        self.dir.join("info")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.dir.join("credpipe.pid")
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.join("daemon.log")
    }

    /// Session environment snapshot, stored next to the cache directory
    pub fn session_env(&self) -> PathBuf {
        self.dir
            .parent()
            .unwrap_or(&self.dir)
            .join("session_env")
    }
}

/// Out-of-band events for the serve loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Reload,
    Shutdown,
}

/// Signal streams turned into [`Control`] events
struct SignalTrampoline {
    term: Signal,
    int: Signal,
    hup: Signal,
}

impl SignalTrampoline {
    fn install() -> CredpipeResult<Self> {
        let stream = |kind| signal(kind).map_err(|e| CredpipeError::io("installing signal handler", e));
        Ok(Self {
            term: stream(SignalKind::terminate())?,
            int: stream(SignalKind::interrupt())?,
            hup: stream(SignalKind::hangup())?,
        })
    }

    async fn forward(mut self, tx: mpsc::Sender<Control>) {
        loop {
            let event = tokio::select! {
                _ = self.term.recv() => Control::Shutdown,
                _ = self.int.recv() => Control::Shutdown,
                _ = self.hup.recv() => Control::Reload,
            };
            debug!("Signal received: {:?}", event);
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }
}

/// Long-running secret cache
pub struct CacheService {
    config: ConfigManager,
    paths: CachePaths,
    store: Arc<dyn SecretStore>,
    ctx: Context,
}

impl CacheService {
    pub fn new(
        config: ConfigManager,
        paths: CachePaths,
        store: Arc<dyn SecretStore>,
        ctx: &Context,
    ) -> Self {
        Self {
            config,
            paths,
            store,
            ctx: ctx.clone(),
        }
    }

    /// Serve until SIGTERM or SIGINT
    pub async fn serve(self) -> CredpipeResult<()> {
        // installed before startup so an early SIGHUP cannot kill us
        let signals = SignalTrampoline::install()?;
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(signals.forward(tx));
        self.serve_with(rx).await
    }

    /// Serve until a `Shutdown` event arrives or `control` closes
    pub async fn serve_with(self, control: mpsc::Receiver<Control>) -> CredpipeResult<()> {
        let span = self.ctx.span("service");
        self.run_loop(control).instrument(span).await
    }

    async fn run_loop(self, mut control: mpsc::Receiver<Control>) -> CredpipeResult<()> {
        let config = self.config.load().await?;
        let plan = SlotPlan::from_config(&config);
        if plan.is_empty() {
            info!("Nothing to cache");
            return Ok(());
        }

        ConfigManager::ensure_private_dir(self.paths.dir())?;

        let mut entries = CacheEntries::new();
        entries.refresh(&plan, self.store.as_ref()).await;

        CacheInfo::current().write(&self.paths.info())?;

        if let Err(e) = SessionEnv::capture().save(&self.paths.session_env()) {
            warn!("Cannot save session environment: {}", e);
        }

        let fifo = Fifo::new(self.paths.fifo(), &self.ctx);
        let mut guard: Option<FifoGuard> = Some(fifo.create()?);

        let (from_keyring, _) = entries.counts();
        info!(
            "Serving {} slots ({} from {}) on {}",
            plan.cached.len(),
            from_keyring,
            self.store.backend_name(),
            fifo.path().display()
        );

        // Survives control events so a half-read exchange is finished
        // rather than dropped
        let mut incoming = std::pin::pin!(fifo.read_batch(Duration::ZERO));

        let result = loop {
            tokio::select! {
                biased;

                event = control.recv() => match event {
                    Some(Control::Reload) => self.reload(&mut entries).await,
                    Some(Control::Shutdown) | None => {
                        info!("Shutting down");
                        break Ok(());
                    }
                },

                batch = incoming.as_mut() => {
                    match batch {
                        Ok(lines) => {
                            for line in &lines {
                                self.handle(&fifo, &mut entries, line).await;
                            }
                        }
                        Err(e) if e.is_integrity() => {
                            error!("{}", e);
                            break Err(e);
                        }
                        Err(e) => {
                            warn!("Exchange failed: {}", e);
                            if std::fs::symlink_metadata(fifo.path()).is_err() {
                                warn!("FIFO disappeared, recreating");
                                guard.take();
                                guard = Some(fifo.create()?);
                            }
                        }
                    }
                    incoming.set(fifo.read_batch(Duration::ZERO));
                }
            }
        };

        drop(guard);
        if let Err(e) = std::fs::remove_file(self.paths.info()) {
            debug!("Cannot remove info record: {}", e);
        }
        result
    }

    async fn handle(&self, fifo: &Fifo, entries: &mut CacheEntries, line: &str) {
        match Request::parse(line) {
            Ok(Request::Get(key)) => {
                let response = Response::from(entries.get(&key).map(str::to_string));
                debug!(
                    "get_pw {}: {}",
                    key,
                    if matches!(response, Response::Password(_)) {
                        "hit"
                    } else {
                        "miss"
                    }
                );
                if let Err(e) = fifo.write(&response.to_string(), RESPONSE_TIMEOUT).await {
                    warn!("Failed to answer get_pw for {}: {}", key, e);
                }
            }
            Ok(Request::Set(key, secret)) => {
                debug!("set_pw {}", key);
                entries.set(key, secret);
            }
            Err(e) => warn!("Ignoring request: {}", e),
        }
    }

    async fn reload(&self, entries: &mut CacheEntries) {
        match self.config.load().await {
            Ok(config) => {
                let plan = SlotPlan::from_config(&config);
                entries.refresh(&plan, self.store.as_ref()).await;
                let (from_keyring, session) = entries.counts();
                info!(
                    "Reloaded configuration: {} keyring and {} session entries",
                    from_keyring, session
                );
            }
            Err(e) => warn!("Reload failed, keeping current entries: {}", e),
        }
    }
}

impl Service for CacheService {
    fn name(&self) -> &str {
        "cache service"
    }

    fn run(self) -> CredpipeResult<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| CredpipeError::io("building async runtime", e))?;
        runtime.block_on(self.serve())
    }
}

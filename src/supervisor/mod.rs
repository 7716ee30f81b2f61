//! Process supervision: detach, single instance, signal-driven control
//!
//! `Supervisor` owns the pid file and knows nothing about what it runs.
//! Anything implementing [`Service`] can be started in the background,
//! stopped with SIGTERM and reloaded with SIGHUP.

mod detach;
pub mod instance;

pub use instance::{process_exists, process_name, InstanceLock, InstanceRecord};

use crate::context::Context;
use crate::error::{CredpipeError, CredpipeResult};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often `stop` re-sends SIGTERM
const STOP_INTERVAL: Duration = Duration::from_millis(100);

/// How long `stop` keeps trying before giving up
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// A long-running unit of work the supervisor can host
pub trait Service {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Run until told to stop
    ///
    /// Called after detaching, so this is the place to build an async
    /// runtime if the service needs one.
    fn run(self) -> CredpipeResult<()>;
}

/// Controls one daemon instance through its pid file
#[derive(Debug, Clone)]
pub struct Supervisor {
    pid_file: PathBuf,
    ctx: Context,
}

impl Supervisor {
    pub fn new(pid_file: impl Into<PathBuf>, ctx: &Context) -> Self {
        Self {
            pid_file: pid_file.into(),
            ctx: ctx.clone(),
        }
    }

    /// Path of the pid file
    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// Detach and run `service` in the background
    ///
    /// In the calling process this only returns on error: on success the
    /// original process exits during the fork and the daemon returns once
    /// the service finishes.
    pub fn start<S: Service>(&self, service: S) -> CredpipeResult<()> {
        let lock = self.acquire()?;
        detach::daemonize(self.ctx.log_file())?;
        self.run_locked(lock, service)
    }

    /// Run `service` in the calling process, same bookkeeping as `start`
    pub fn start_foreground<S: Service>(&self, service: S) -> CredpipeResult<()> {
        let lock = self.acquire()?;
        self.run_locked(lock, service)
    }

    /// Stop the daemon, waiting for it to exit
    ///
    /// Returns whether a running daemon was stopped.
    pub fn stop(&self) -> CredpipeResult<bool> {
        let _span = self.ctx.span("supervisor").entered();

        let Some(record) = InstanceRecord::load(&self.pid_file)? else {
            info!("Daemon not running");
            return Ok(false);
        };

        if !record.is_alive() {
            info!("Removing stale pid file for process {}", record.pid);
            self.remove_record(record.pid);
            return Ok(false);
        }

        let deadline = Instant::now() + STOP_TIMEOUT;
        loop {
            match send_signal(record.pid, libc::SIGTERM) {
                Ok(()) => {}
                Err(e) if e.raw_os_error() == Some(libc::ESRCH) => break,
                Err(e) => {
                    return Err(CredpipeError::Signal {
                        pid: record.pid,
                        source: e,
                    })
                }
            }

            if Instant::now() >= deadline {
                return Err(CredpipeError::StopTimeout {
                    pid: record.pid,
                    after: STOP_TIMEOUT,
                });
            }
            std::thread::sleep(STOP_INTERVAL);
        }

        self.remove_record(record.pid);
        info!("Stopped daemon (pid {})", record.pid);
        Ok(true)
    }

    /// Stop the daemon if running, then start it again
    pub fn restart<S: Service>(&self, service: S) -> CredpipeResult<()> {
        self.stop()?;
        self.start(service)
    }

    /// Ask the daemon to reload its configuration
    ///
    /// Returns whether a signal was delivered.
    pub fn reload(&self) -> CredpipeResult<bool> {
        let _span = self.ctx.span("supervisor").entered();

        let Some(record) = InstanceRecord::load(&self.pid_file)? else {
            info!("Daemon not running, nothing to reload");
            return Ok(false);
        };

        match send_signal(record.pid, libc::SIGHUP) {
            Ok(()) => {
                debug!("Sent SIGHUP to {}", record.pid);
                Ok(true)
            }
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {
                info!("Removing stale pid file for process {}", record.pid);
                self.remove_record(record.pid);
                Ok(false)
            }
            Err(e) => Err(CredpipeError::Signal {
                pid: record.pid,
                source: e,
            }),
        }
    }

    /// Whether the recorded daemon is alive and still ours
    pub fn status(&self) -> bool {
        self.running_record().is_some()
    }

    /// Record of the running daemon, if any
    pub fn running_record(&self) -> Option<InstanceRecord> {
        match InstanceRecord::load(&self.pid_file) {
            Ok(Some(record)) if record.is_alive() => Some(record),
            Ok(_) => None,
            Err(e) => {
                debug!("Cannot read pid file: {}", e);
                None
            }
        }
    }

    fn acquire(&self) -> CredpipeResult<InstanceLock> {
        if let Some(parent) = self.pid_file.parent() {
            crate::config::ConfigManager::ensure_private_dir(parent)?;
        }

        if self.status() {
            return Err(CredpipeError::AlreadyRunning(self.pid_file.clone()));
        }

        InstanceLock::acquire(&self.pid_file)
    }

    fn run_locked<S: Service>(&self, mut lock: InstanceLock, service: S) -> CredpipeResult<()> {
        let record = InstanceRecord::current();
        lock.write(&record)?;

        {
            let _span = self.ctx.span("supervisor").entered();
            info!("Starting {} (pid {})", service.name(), record.pid);
        }

        let result = service.run();
        lock.release();

        if let Err(e) = &result {
            warn!("Service exited with error: {}", e);
        }
        result
    }

    /// Remove the pid file if it still names `pid`
    fn remove_record(&self, pid: i32) {
        match InstanceRecord::load(&self.pid_file) {
            Ok(Some(record)) if record.pid != pid => {
                debug!("Pid file now names {}, leaving it", record.pid);
            }
            _ => {
                if let Err(e) = std::fs::remove_file(&self.pid_file) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove {}: {}", self.pid_file.display(), e);
                    }
                }
            }
        }
    }
}

fn send_signal(pid: i32, signal: libc::c_int) -> std::io::Result<()> {
    // SAFETY: kill has no memory-safety preconditions
    if unsafe { libc::kill(pid, signal) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

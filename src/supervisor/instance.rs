//! Instance record and single-instance lock
//!
//! The record (`pid`, process name, start time) lets `stop`, `reload` and
//! `status` find the daemon. An exclusive `flock` on the same file is held
//! for the daemon's lifetime, so two concurrent starts cannot both win.

use crate::error::{CredpipeError, CredpipeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Contents of the pid file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Daemon process id
    pub pid: i32,

    /// Kernel process name at start, guards against pid reuse
    pub process_name: Option<String>,

    /// When the daemon started
    pub started_at: DateTime<Utc>,
}

impl InstanceRecord {
    /// Record describing the calling process
    pub fn current() -> Self {
        let pid = std::process::id() as i32;
        Self {
            pid,
            process_name: process_name(pid),
            started_at: Utc::now(),
        }
    }

    /// Read the record at `path`, `None` if missing or not yet written
    pub fn load(path: &Path) -> CredpipeResult<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CredpipeError::io(
                    format!("reading pid file {}", path.display()),
                    e,
                ))
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                debug!("Ignoring unreadable pid file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Whether the recorded process still exists and is still ours
    pub fn is_alive(&self) -> bool {
        if !process_exists(self.pid) {
            return false;
        }

        match (&self.process_name, process_name(self.pid)) {
            (Some(recorded), Some(current)) => *recorded == current,
            _ => true,
        }
    }
}

/// Exclusive lock on the pid file, released on drop
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    file: File,
}

impl InstanceLock {
    /// Take the lock without blocking
    pub fn acquire(path: &Path) -> CredpipeResult<Self> {
        // Retry once if the file is swapped between open and flock
        for _ in 0..2 {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .mode(0o600)
                .open(path)
                .map_err(|e| {
                    CredpipeError::io(format!("opening pid file {}", path.display()), e)
                })?;

            // SAFETY: fd belongs to `file`, which outlives the call
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    return Err(CredpipeError::AlreadyRunning(path.to_path_buf()));
                }
                return Err(CredpipeError::io("locking pid file", err));
            }

            if same_inode(&file, path) {
                return Ok(Self {
                    path: path.to_path_buf(),
                    file,
                });
            }
            debug!("Pid file {} was replaced while locking", path.display());
        }

        Err(CredpipeError::AlreadyRunning(path.to_path_buf()))
    }

    /// Overwrite the pid file with `record`
    pub fn write(&mut self, record: &InstanceRecord) -> CredpipeResult<()> {
        let content = serde_json::to_string(record)?;
        self.file
            .set_len(0)
            .and_then(|_| self.file.seek(SeekFrom::Start(0)))
            .and_then(|_| self.file.write_all(content.as_bytes()))
            .and_then(|_| self.file.flush())
            .map_err(|e| CredpipeError::io(format!("writing pid file {}", self.path.display()), e))
    }

    /// Remove the pid file and drop the lock
    pub fn release(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Failed to remove pid file {}: {}", self.path.display(), e);
            }
        }
        // lock goes away with the fd
    }
}

fn same_inode(file: &File, path: &Path) -> bool {
    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

/// Check if a process exists
pub fn process_exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs error checking only
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return true;
    }
    // EPERM means process exists but we can't signal it
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Kernel process name from /proc/[pid]/comm
#[cfg(target_os = "linux")]
pub fn process_name(pid: i32) -> Option<String> {
    std::fs::read_to_string(format!("/proc/{pid}/comm"))
        .ok()
        .map(|s| s.trim_end().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(not(target_os = "linux"))]
pub fn process_name(_pid: i32) -> Option<String> {
    None
}

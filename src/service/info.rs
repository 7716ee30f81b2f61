//! The `info` record a running cache service leaves for its clients

use crate::error::{CredpipeError, CredpipeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Wire protocol revision; bump on incompatible changes
pub const PROTOCOL_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub version: u32,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl CacheInfo {
    /// Info for the calling process
    pub fn current() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    /// Write the record with mode 0600
    pub fn write(&self, path: &Path) -> CredpipeResult<()> {
        let content = toml::to_string(self)?;
        let tmp = path.with_extension("tmp");

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)
            .map_err(|e| CredpipeError::io(format!("creating {}", tmp.display()), e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| CredpipeError::io(format!("writing {}", tmp.display()), e))?;

        std::fs::rename(&tmp, path)
            .map_err(|e| CredpipeError::io(format!("replacing {}", path.display()), e))
    }

    pub fn load(path: &Path) -> CredpipeResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CredpipeError::io(format!("reading {}", path.display()), e))?;
        Ok(toml::from_str(&content)?)
    }

    /// Refuse services older than this build
    pub fn check_version(&self) -> CredpipeResult<()> {
        if self.version < PROTOCOL_VERSION {
            return Err(CredpipeError::VersionMismatch {
                found: self.version,
                expected: PROTOCOL_VERSION,
            });
        }
        Ok(())
    }
}

//! Error types for credpipe
//!
//! All modules use `CredpipeResult<T>` as their return type.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for credpipe operations
pub type CredpipeResult<T> = Result<T, CredpipeError>;

/// All errors that can occur in credpipe
#[derive(Error, Debug)]
pub enum CredpipeError {
    // Transport errors
    #[error("Refusing to use {path}: {reason}")]
    TransportIntegrity { path: PathBuf, reason: String },

    #[error("Timed out after {after:?} waiting on {path}")]
    TransportTimeout { path: PathBuf, after: Duration },

    #[error("Channel error: {context}")]
    Channel {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create named pipe {path}: {source}")]
    PipeCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid message: {0}")]
    Protocol(String),

    #[error("Cache service speaks protocol version {found}, expected at least {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    // Supervisor errors
    #[error("Daemon already running (pid file {0})")]
    AlreadyRunning(PathBuf),

    #[error("Daemon not running")]
    NotRunning,

    #[error("Failed to detach daemon process: {0}")]
    Detach(#[source] std::io::Error),

    #[error("Failed to signal process {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("Process {pid} did not exit after {after:?}")]
    StopTimeout { pid: i32, after: Duration },

    // Credential errors
    #[error("Invalid credential key component {value:?}: {reason}")]
    InvalidKey { value: String, reason: String },

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Secret store error: {0}")]
    SecretStore(String),

    #[error("Prompt failed: {0}")]
    Prompt(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CredpipeError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a channel error with context
    pub fn channel(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Channel {
            context: context.into(),
            source,
        }
    }

    /// Create an integrity error for a transport path
    pub fn integrity(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::TransportIntegrity {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error means "nobody answered in time"
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TransportTimeout { .. })
    }

    /// Check if the error is a security violation on the transport path
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::TransportIntegrity { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AlreadyRunning(_) => Some("Run: credpipe daemon stop"),
            Self::NotRunning => Some("Run: credpipe daemon start"),
            Self::VersionMismatch { .. } => Some("Run: credpipe daemon restart"),
            Self::TransportIntegrity { .. } => {
                Some("Another user may have tampered with the cache directory")
            }
            Self::ProfileNotFound(_) => Some("Run: credpipe config show"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CredpipeError::ProfileNotFound("7".to_string());
        assert!(err.to_string().contains("Profile not found: 7"));
    }

    #[test]
    fn error_hint() {
        let err = CredpipeError::NotRunning;
        assert_eq!(err.hint(), Some("Run: credpipe daemon start"));
    }

    #[test]
    fn timeout_is_distinct_from_channel() {
        let timeout = CredpipeError::TransportTimeout {
            path: PathBuf::from("/tmp/FIFO"),
            after: Duration::from_secs(1),
        };
        let channel = CredpipeError::channel(
            "opening FIFO",
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
        );

        assert!(timeout.is_timeout());
        assert!(!channel.is_timeout());
        assert!(!timeout.is_integrity());
    }
}

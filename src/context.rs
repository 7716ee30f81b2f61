//! Runtime context shared by the transport, supervisor and cache service
//!
//! Carries logging verbosity, the optional log file and the session label
//! that prefixes every span. Constructed once in `main` and passed down.

use crate::error::{CredpipeError, CredpipeResult};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Log line encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging and session context
#[derive(Debug, Clone)]
pub struct Context {
    /// 0 = warn, 1 = info, 2+ = debug
    verbosity: u8,
    format: LogFormat,
    /// Session label used as span field on every log line
    session: String,
    /// Log file for detached processes (stderr when unset)
    log_file: Option<PathBuf>,
}

impl Context {
    /// Create a context for the given session label
    pub fn new(session: impl Into<String>, verbosity: u8) -> Self {
        Self {
            verbosity,
            format: LogFormat::Text,
            session: session.into(),
            log_file: None,
        }
    }

    /// Route logs to a file instead of stderr
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Encode log lines as `format`
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Configured log file, if any
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Span carrying the session label
    pub fn span(&self, component: &'static str) -> Span {
        tracing::info_span!("credpipe", session = %self.session, component)
    }

    /// Default filter directive for the verbosity level
    fn filter_directive(&self) -> &'static str {
        match self.verbosity {
            0 => "credpipe=warn",
            1 => "credpipe=info",
            _ => "credpipe=debug",
        }
    }

    /// Install the global tracing subscriber
    ///
    /// `RUST_LOG` overrides the verbosity-derived filter. Calling this twice
    /// is harmless; the second subscriber is discarded.
    pub fn init_tracing(&self) -> CredpipeResult<()> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.filter_directive()));

        match &self.log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        CredpipeError::io(format!("opening log file {}", path.display()), e)
                    })?;

                let builder = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file));
                let _ = match self.format {
                    LogFormat::Json => builder.json().try_init(),
                    LogFormat::Text => builder.try_init(),
                };
            }
            None => {
                let builder = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr);
                let _ = match self.format {
                    LogFormat::Json => builder.json().try_init(),
                    LogFormat::Text => builder.with_target(false).without_time().try_init(),
                };
            }
        }

        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new("credpipe", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filter() {
        assert_eq!(Context::new("t", 0).filter_directive(), "credpipe=warn");
        assert_eq!(Context::new("t", 1).filter_directive(), "credpipe=info");
        assert_eq!(Context::new("t", 5).filter_directive(), "credpipe=debug");
    }

    #[test]
    fn log_file_is_optional() {
        let ctx = Context::new("daemon", 1);
        assert!(ctx.log_file().is_none());

        let ctx = ctx.with_log_file("/tmp/daemon.log");
        assert_eq!(ctx.log_file(), Some(Path::new("/tmp/daemon.log")));
        assert_eq!(ctx.session, "daemon");
        assert_eq!(ctx.format, LogFormat::Text);
    }

    #[test]
    fn log_format_is_configurable() {
        let ctx = Context::new("daemon", 0).with_log_format(LogFormat::Json);
        assert_eq!(ctx.format, LogFormat::Json);
    }
}

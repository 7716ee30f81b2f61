//! Session environment snapshot
//!
//! Scheduled jobs start with a bare environment and cannot reach the user's
//! display, D-Bus session or the cache directory. The cache service saves
//! the relevant variables at startup and `credpipe --scheduled` puts them
//! back before doing anything else.

use crate::error::{CredpipeError, CredpipeResult};
use std::collections::BTreeMap;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::debug;

/// Variables worth carrying into a scheduled job
pub const SNAPSHOT_VARS: &[&str] = &[
    "DISPLAY",
    "XAUTHORITY",
    "WAYLAND_DISPLAY",
    "DBUS_SESSION_BUS_ADDRESS",
    "XDG_RUNTIME_DIR",
    "XDG_SESSION_TYPE",
    "XDG_CURRENT_DESKTOP",
    "DESKTOP_SESSION",
    "SSH_AUTH_SOCK",
    "SSH_AGENT_PID",
    "GNOME_KEYRING_CONTROL",
    "GPG_AGENT_INFO",
    "KDE_FULL_SESSION",
    crate::config::CACHE_DIR_ENV,
];

/// A saved set of `KEY=VALUE` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    vars: BTreeMap<String, String>,
}

impl SessionEnv {
    /// Capture the snapshot variables from the current process
    pub fn capture() -> Self {
        Self::from_vars(
            SNAPSHOT_VARS
                .iter()
                .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v))),
        )
    }

    /// Build a snapshot from explicit pairs; values with line breaks are dropped
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            vars: vars
                .into_iter()
                .filter(|(k, v)| !k.is_empty() && !k.contains('=') && !v.contains('\n'))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Write the snapshot with mode 0600, replacing any previous one
    pub fn save(&self, path: &Path) -> CredpipeResult<()> {
        let mut content = String::new();
        for (name, value) in &self.vars {
            content.push_str(name);
            content.push('=');
            content.push_str(value);
            content.push('\n');
        }

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
            .map_err(|e| CredpipeError::io(format!("replacing {}", path.display()), e))?;
        debug!("Saved {} session variables to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a snapshot, `None` if the file does not exist
    pub fn load(path: &Path) -> CredpipeResult<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredpipeError::io(format!("reading {}", path.display()), e)),
        };

        Ok(Some(Self::from_vars(content.lines().filter_map(|line| {
            line.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        }))))
    }

    /// Export every saved variable that is not already set
    ///
    /// Must run before any threads are spawned. Returns the names applied.
    pub fn apply(&self) -> Vec<String> {
        let mut applied = Vec::new();
        for (name, value) in &self.vars {
            if std::env::var_os(name).is_none() {
                std::env::set_var(name, value);
                applied.push(name.clone());
            }
        }
        applied
    }
}

/// Load the snapshot at `path` and apply it, tolerating a missing file
pub fn restore(path: &Path) -> CredpipeResult<Vec<String>> {
    match SessionEnv::load(path)? {
        Some(env) => Ok(env.apply()),
        None => {
            debug!("No session snapshot at {}", path.display());
            Ok(Vec::new())
        }
    }
}

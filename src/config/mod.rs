//! Configuration management for credpipe

pub mod schema;

pub use schema::{Config, PasswordConfig, Profile, PromptConfig};

use crate::error::{CredpipeError, CredpipeResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "CREDPIPE_CACHE_DIR";

/// Configuration manager
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    ///
    /// Relative paths are anchored to the current directory now, since a
    /// detached daemon later runs from `/`.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: absolute(path),
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("credpipe")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("credpipe")
    }

    /// Get the password cache directory (FIFO, info, pid file, daemon log)
    pub fn cache_dir() -> PathBuf {
        match std::env::var_os(CACHE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => absolute(PathBuf::from(dir)),
            _ => absolute(Self::state_dir().join("password_cache")),
        }
    }

    /// Load configuration, using defaults if not exists
    pub async fn load(&self) -> CredpipeResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Blocking variant of [`ConfigManager::load`] for use before a runtime exists
    pub fn load_blocking(&self) -> CredpipeResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path).map_err(|e| {
            CredpipeError::io(
                format!("reading config from {}", self.config_path.display()),
                e,
            )
        })?;
        parse(&self.config_path, &content)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> CredpipeResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            CredpipeError::io(format!("reading config from {}", path.display()), e)
        })?;

        parse(path, &content)
    }

    /// Save configuration to file
    ///
    /// Writes a sibling temp file and renames it over the target, so a
    /// concurrent reader (the cache service on reload) never sees a
    /// half-written file.
    pub async fn save(&self, config: &Config) -> CredpipeResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        let tmp = self.config_path.with_extension("toml.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| CredpipeError::io(format!("writing config to {}", tmp.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&tmp, perms)
                .map_err(|e| CredpipeError::io("setting config file permissions", e))?;
        }

        fs::rename(&tmp, &self.config_path).await.map_err(|e| {
            CredpipeError::io(
                format!("replacing config at {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> CredpipeResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CredpipeError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure a private directory exists (created or tightened to 0700)
    pub fn ensure_private_dir(dir: &Path) -> CredpipeResult<()> {
        std::fs::create_dir_all(dir)
            .map_err(|e| CredpipeError::io(format!("creating directory {}", dir.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(dir, perms).map_err(|e| {
                CredpipeError::io(format!("setting permissions on {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

fn parse(path: &Path, content: &str) -> CredpipeResult<Config> {
    toml::from_str(content).map_err(|e| CredpipeError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Anchor `path` to the current directory, leaving it as is if that fails
fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::path::absolute(&path).unwrap_or(path)
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

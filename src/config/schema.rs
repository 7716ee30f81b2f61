//! Configuration schema for credpipe
//!
//! Configuration is stored at `~/.config/credpipe/config.toml`

use crate::credentials::Mode;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Interactive prompt settings
    pub prompt: PromptConfig,

    /// Backup profiles
    pub profiles: Vec<Profile>,
}

impl Config {
    /// Look up a profile by id
    pub fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log at info level even without `-v`
    pub verbose: bool,
}

/// Interactive prompt settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Seconds before an unanswered prompt is cancelled
    pub timeout_secs: u64,

    /// Graphical askpass helper used when a display is available
    pub askpass_program: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            askpass_program: Some("ssh-askpass".to_string()),
        }
    }
}

/// A backup profile as far as credentials are concerned
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Stable profile identifier
    pub id: String,

    /// Human-readable profile name
    pub name: String,

    /// Snapshot mode, decides which secrets are needed
    pub mode: Mode,

    /// Remote user, part of the credential key
    pub user: Option<String>,

    /// Remote host, part of the credential key
    pub host: Option<String>,

    /// Password handling
    pub password: PasswordConfig,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            id: "1".to_string(),
            name: "Main profile".to_string(),
            mode: Mode::Local,
            user: None,
            host: None,
            password: PasswordConfig::default(),
        }
    }
}

/// Per-profile password handling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Keep secrets in the cache service for unattended runs
    pub use_cache: bool,

    /// Persist secrets in the system keyring
    pub save_to_keyring: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[prompt]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.profiles.is_empty());
        assert_eq!(config.prompt.timeout_secs, 300);
    }

    #[test]
    fn config_deserializes_profiles() {
        let toml = r#"
            [[profiles]]
            id = "2"
            name = "Offsite"
            mode = "ssh_encfs"
            user = "bob"
            host = "backup.example.org"

            [profiles.password]
            use_cache = true
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let profile = config.profile("2").unwrap();

        assert_eq!(profile.mode, Mode::SshEncfs);
        assert!(profile.password.use_cache);
        assert!(!profile.password.save_to_keyring); // default preserved
        assert!(config.profile("1").is_none());
    }
}

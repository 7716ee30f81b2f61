//! Snapshot modes and the secret slots they require

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Snapshot mode of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Plain local snapshots, no secrets
    #[default]
    Local,
    /// Local snapshots inside an encfs volume
    LocalEncfs,
    /// Snapshots over ssh
    Ssh,
    /// Snapshots over ssh into an encfs volume
    SshEncfs,
}

/// Secret position within a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Primary,
    Secondary,
}

/// What a slot's secret unlocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretKind {
    /// ssh private key passphrase
    SshKey,
    /// encfs volume password
    Encfs,
}

impl Slot {
    /// Both slots in lookup order
    pub const ALL: [Slot; 2] = [Slot::Primary, Slot::Secondary];
}

impl Mode {
    /// All modes
    pub const ALL: [Mode; 4] = [Mode::Local, Mode::LocalEncfs, Mode::Ssh, Mode::SshEncfs];

    /// Which secret a slot holds for this mode, `None` if the slot is unused
    pub fn secret_kind(&self, slot: Slot) -> Option<SecretKind> {
        match (self, slot) {
            (Self::Local, _) => None,
            (Self::LocalEncfs, Slot::Primary) => Some(SecretKind::Encfs),
            (Self::Ssh, Slot::Primary) => Some(SecretKind::SshKey),
            (Self::SshEncfs, Slot::Primary) => Some(SecretKind::SshKey),
            (Self::SshEncfs, Slot::Secondary) => Some(SecretKind::Encfs),
            (_, Slot::Secondary) => None,
        }
    }

    /// Whether the mode needs a secret in this slot
    pub fn needs_password(&self, slot: Slot) -> bool {
        self.secret_kind(slot).is_some()
    }

    /// Slots this mode needs, in order
    pub fn required_slots(&self) -> impl Iterator<Item = Slot> + '_ {
        Slot::ALL.into_iter().filter(move |s| self.needs_password(*s))
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::LocalEncfs => "local_encfs",
            Self::Ssh => "ssh",
            Self::SshEncfs => "ssh_encfs",
        }
    }
}

impl SecretKind {
    /// Short identifier used in keyring service names
    pub fn id(&self) -> &'static str {
        match self {
            Self::SshKey => "ssh",
            Self::Encfs => "encfs",
        }
    }

    /// Human-readable label for prompts
    pub fn label(&self) -> &'static str {
        match self {
            Self::SshKey => "SSH private key",
            Self::Encfs => "encfs",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown mode '{s}' (expected local, local_encfs, ssh, ssh_encfs)"))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" | "1" => Ok(Self::Primary),
            "secondary" | "2" => Ok(Self::Secondary),
            _ => Err(format!("unknown slot '{s}' (expected primary or secondary)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_needs_nothing() {
        assert_eq!(Mode::Local.required_slots().count(), 0);
    }

    #[test]
    fn ssh_encfs_needs_both_slots() {
        let slots: Vec<_> = Mode::SshEncfs.required_slots().collect();
        assert_eq!(slots, vec![Slot::Primary, Slot::Secondary]);
        assert_eq!(Mode::SshEncfs.secret_kind(Slot::Secondary), Some(SecretKind::Encfs));
    }

    #[test]
    fn single_secret_modes_use_primary_only() {
        assert!(Mode::Ssh.needs_password(Slot::Primary));
        assert!(!Mode::Ssh.needs_password(Slot::Secondary));
        assert!(Mode::LocalEncfs.needs_password(Slot::Primary));
        assert!(!Mode::LocalEncfs.needs_password(Slot::Secondary));
    }

    #[test]
    fn mode_parses_and_displays() {
        assert_eq!("ssh_encfs".parse::<Mode>().unwrap(), Mode::SshEncfs);
        assert_eq!(Mode::LocalEncfs.to_string(), "local_encfs");
        assert!("ftp".parse::<Mode>().is_err());
    }

    #[test]
    fn slot_accepts_numeric_ids() {
        assert_eq!("2".parse::<Slot>().unwrap(), Slot::Secondary);
        assert_eq!("primary".parse::<Slot>().unwrap(), Slot::Primary);
    }
}

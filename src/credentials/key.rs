//! Credential keys: `(service, user)` pairs rendered as `service/user`

use crate::config::Profile;
use crate::credentials::{Mode, Slot};
use crate::error::{CredpipeError, CredpipeResult};
use std::fmt;

/// Prefix for keyring service names
const SERVICE_PREFIX: &str = "credpipe";

/// Identifies one secret slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    service: String,
    user: String,
}

impl CredentialKey {
    /// Build a key from raw components
    ///
    /// Components end up inside `get_pw:`/`set_pw:` lines, so they may not
    /// contain the field separator, the key separator or a newline.
    pub fn new(service: impl Into<String>, user: impl Into<String>) -> CredpipeResult<Self> {
        let service = service.into();
        let user = user.into();
        validate_component(&service)?;
        validate_component(&user)?;
        Ok(Self { service, user })
    }

    /// Derive the key for a profile's slot, `None` if the mode has no secret there
    pub fn for_profile(profile: &Profile, mode: Mode, slot: Slot) -> CredpipeResult<Option<Self>> {
        let Some(kind) = mode.secret_kind(slot) else {
            return Ok(None);
        };

        let service = format!("{}.{}.{}", SERVICE_PREFIX, profile.id, kind.id());
        let user = match (&profile.user, &profile.host) {
            (Some(user), Some(host)) => format!("{}@{}", user, host),
            _ => format!("profile_{}", profile.id),
        };

        Self::new(service, user).map(Some)
    }

    /// Parse a `service/user` string as sent over the wire
    pub fn parse(s: &str) -> CredpipeResult<Self> {
        let (service, user) = s
            .split_once('/')
            .ok_or_else(|| CredpipeError::Protocol(format!("key without '/': {s:?}")))?;
        Self::new(service, user)
    }

    /// Keyring service name
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Keyring user name
    pub fn user(&self) -> &str {
        &self.user
    }
}

fn validate_component(value: &str) -> CredpipeResult<()> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.contains(':') {
        Some("must not contain ':'")
    } else if value.contains('/') {
        Some("must not contain '/'")
    } else if value.contains('\n') || value.contains('\r') {
        Some("must not contain a line break")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CredpipeError::InvalidKey {
            value: value.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(mode: Mode) -> Profile {
        Profile {
            id: "3".to_string(),
            mode,
            ..Profile::default()
        }
    }

    #[test]
    fn renders_service_slash_user() {
        let key = CredentialKey::new("alpha", "bob").unwrap();
        assert_eq!(key.to_string(), "alpha/bob");
        assert_eq!(CredentialKey::parse("alpha/bob").unwrap(), key);
    }

    #[test]
    fn profile_key_uses_secret_kind() {
        let p = profile(Mode::SshEncfs);
        let primary = CredentialKey::for_profile(&p, p.mode, Slot::Primary)
            .unwrap()
            .unwrap();
        let secondary = CredentialKey::for_profile(&p, p.mode, Slot::Secondary)
            .unwrap()
            .unwrap();

        assert_eq!(primary.to_string(), "credpipe.3.ssh/profile_3");
        assert_eq!(secondary.to_string(), "credpipe.3.encfs/profile_3");
    }

    #[test]
    fn profile_key_prefers_user_at_host() {
        let mut p = profile(Mode::Ssh);
        p.user = Some("bob".to_string());
        p.host = Some("backup.example.org".to_string());

        let key = CredentialKey::for_profile(&p, p.mode, Slot::Primary)
            .unwrap()
            .unwrap();
        assert_eq!(key.user(), "bob@backup.example.org");
    }

    #[test]
    fn unused_slot_has_no_key() {
        let p = profile(Mode::Local);
        assert!(CredentialKey::for_profile(&p, p.mode, Slot::Primary)
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejects_separators() {
        assert!(CredentialKey::new("a:b", "bob").is_err());
        assert!(CredentialKey::new("alpha", "b/ob").is_err());
        assert!(CredentialKey::new("alpha", "").is_err());
        assert!(CredentialKey::parse("no-slash").is_err());
    }
}

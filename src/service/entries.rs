//! In-memory secret maps held by the cache service

use crate::config::Config;
use crate::credentials::{CredentialKey, SecretStore};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Which slots the configuration wants cached
#[derive(Debug, Clone, Default)]
pub struct SlotPlan {
    /// Cacheable slots, with whether the keyring should seed them
    pub cached: Vec<(CredentialKey, bool)>,

    /// Slots that need a secret but must not be cached
    pub uncacheable: HashSet<CredentialKey>,
}

impl SlotPlan {
    pub fn from_config(config: &Config) -> Self {
        let mut plan = Self::default();

        for profile in &config.profiles {
            for slot in profile.mode.required_slots() {
                let key = match CredentialKey::for_profile(profile, profile.mode, slot) {
                    Ok(Some(key)) => key,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Skipping profile {} {}: {}", profile.id, slot, e);
                        continue;
                    }
                };

                if profile.password.use_cache {
                    plan.cached.push((key, profile.password.save_to_keyring));
                } else {
                    plan.uncacheable.insert(key);
                }
            }
        }

        plan
    }

    /// Nothing to serve
    pub fn is_empty(&self) -> bool {
        self.cached.is_empty()
    }
}

/// Keyring-seeded secrets plus secrets set during this session
#[derive(Debug, Default)]
pub struct CacheEntries {
    keyring: HashMap<CredentialKey, String>,
    session: HashMap<CredentialKey, String>,
}

impl CacheEntries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look a key up, keyring-seeded entries first
    pub fn get(&self, key: &CredentialKey) -> Option<&str> {
        self.keyring
            .get(key)
            .or_else(|| self.session.get(key))
            .map(String::as_str)
    }

    /// Remember a secret for the rest of the session
    pub fn set(&mut self, key: CredentialKey, secret: String) {
        self.session.insert(key, secret);
    }

    /// Re-seed from the keyring and prune session entries per `plan`
    pub async fn refresh(&mut self, plan: &SlotPlan, store: &dyn SecretStore) {
        self.keyring = collect_keyring(plan, store).await;

        let before = self.session.len();
        self.session.retain(|key, _| !plan.uncacheable.contains(key));
        let dropped = before - self.session.len();
        if dropped > 0 {
            debug!("Dropped {} session entries no longer cacheable", dropped);
        }
    }

    /// Number of keyring-seeded and session entries
    pub fn counts(&self) -> (usize, usize) {
        (self.keyring.len(), self.session.len())
    }
}

/// Fetch every keyring-backed slot of `plan`, skipping misses and errors
pub async fn collect_keyring(
    plan: &SlotPlan,
    store: &dyn SecretStore,
) -> HashMap<CredentialKey, String> {
    let mut found = HashMap::new();

    for (key, from_keyring) in &plan.cached {
        if !from_keyring {
            continue;
        }
        match store.get(key).await {
            Ok(Some(secret)) => {
                debug!("Loaded {} from {}", key, store.backend_name());
                found.insert(key.clone(), secret);
            }
            Ok(None) => debug!("No {} entry for {}", store.backend_name(), key),
            Err(e) => warn!("Cannot read {} from {}: {}", key, store.backend_name(), e),
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PasswordConfig, Profile};
    use crate::credentials::{MemoryStore, Mode, Slot};

    fn profile(id: &str, mode: Mode, use_cache: bool, save_to_keyring: bool) -> Profile {
        Profile {
            id: id.to_string(),
            mode,
            password: PasswordConfig {
                use_cache,
                save_to_keyring,
            },
            ..Profile::default()
        }
    }

    fn key_of(p: &Profile, slot: Slot) -> CredentialKey {
        CredentialKey::for_profile(p, p.mode, slot).unwrap().unwrap()
    }

    #[test]
    fn plan_splits_cacheable_slots() {
        let config = Config {
            profiles: vec![
                profile("1", Mode::SshEncfs, true, true),
                profile("2", Mode::Ssh, false, true),
                profile("3", Mode::Local, true, true),
            ],
            ..Config::default()
        };

        let plan = SlotPlan::from_config(&config);
        assert_eq!(plan.cached.len(), 2);
        assert!(plan.cached.iter().all(|(_, keyring)| *keyring));
        assert_eq!(plan.uncacheable.len(), 1);
        assert!(plan
            .uncacheable
            .contains(&key_of(&config.profiles[1], Slot::Primary)));
    }

    #[test]
    fn empty_plan_without_cacheable_profiles() {
        let config = Config {
            profiles: vec![profile("1", Mode::Local, true, false)],
            ..Config::default()
        };
        assert!(SlotPlan::from_config(&config).is_empty());
    }

    #[test]
    fn keyring_entries_shadow_session_entries() {
        let key = CredentialKey::new("alpha", "bob").unwrap();
        let mut entries = CacheEntries::new();
        entries.set(key.clone(), "session".to_string());
        assert_eq!(entries.get(&key), Some("session"));

        entries.keyring.insert(key.clone(), "keyring".to_string());
        assert_eq!(entries.get(&key), Some("keyring"));
    }

    #[tokio::test]
    async fn collect_skips_missing_and_failing_entries() {
        let p = profile("1", Mode::SshEncfs, true, true);
        let plan = SlotPlan::from_config(&Config {
            profiles: vec![p.clone()],
            ..Config::default()
        });
        let store = MemoryStore::new().with_entry(&key_of(&p, Slot::Primary), "ssh-pass");

        let found = collect_keyring(&plan, &store).await;
        assert_eq!(found.len(), 1);
        assert_eq!(store.lookups(), 2);

        let failing = MemoryStore::unavailable();
        assert!(collect_keyring(&plan, &failing).await.is_empty());
    }

    #[tokio::test]
    async fn refresh_prunes_only_uncacheable_slots() {
        let keep = profile("1", Mode::Ssh, true, false);
        let gone = profile("2", Mode::Ssh, false, false);
        let unknown = CredentialKey::new("alpha", "bob").unwrap();

        let mut entries = CacheEntries::new();
        entries.set(key_of(&keep, Slot::Primary), "a".to_string());
        entries.set(key_of(&gone, Slot::Primary), "b".to_string());
        entries.set(unknown.clone(), "c".to_string());

        let plan = SlotPlan::from_config(&Config {
            profiles: vec![keep.clone(), gone.clone()],
            ..Config::default()
        });
        entries.refresh(&plan, &MemoryStore::new()).await;

        assert_eq!(entries.get(&key_of(&keep, Slot::Primary)), Some("a"));
        assert_eq!(entries.get(&key_of(&gone, Slot::Primary)), None);
        assert_eq!(entries.get(&unknown), Some("c"));
        assert_eq!(entries.counts(), (0, 2));
    }
}

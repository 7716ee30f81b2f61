//! Secret resolution across layers
//!
//! `get` walks local map → cache service → keyring → prompt and stops at the
//! first hit. Every hit lands in the local map. Layer failures are logged
//! and fall through; only configuration problems become errors.

use crate::config::{Config, Profile};
use crate::context::Context;
use crate::credentials::{CredentialKey, Mode, SecretStore, Slot};
use crate::error::{CredpipeError, CredpipeResult};
use crate::service::CacheClient;
use crate::ui::{PasswordPrompt, PromptOutcome};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

/// Where a secret came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Local,
    Cache,
    Keyring,
    Prompt,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Cache => "cache",
            Self::Keyring => "keyring",
            Self::Prompt => "prompt",
        };
        write!(f, "{name}")
    }
}

/// Outcome of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The mode has no secret in this slot
    NotRequired,
    Found { secret: String, source: Layer },
    /// Every layer came up empty or the prompt was cancelled
    Missing,
}

impl Resolution {
    pub fn secret(&self) -> Option<&str> {
        match self {
            Self::Found { secret, .. } => Some(secret.as_str()),
            _ => None,
        }
    }
}

/// Which layers `get` may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveScope {
    #[default]
    Any,
    /// Keyring and local map only: no cache service, no prompt
    KeyringOnly,
}

/// Client-side facade over all secret layers
pub struct Resolver {
    config: Config,
    local: Mutex<HashMap<CredentialKey, String>>,
    cache: Option<CacheClient>,
    store: Arc<dyn SecretStore>,
    prompt: Arc<dyn PasswordPrompt>,
    prompt_timeout: Duration,
    ctx: Context,
}

impl Resolver {
    pub fn new(
        config: Config,
        store: Arc<dyn SecretStore>,
        prompt: Arc<dyn PasswordPrompt>,
        ctx: &Context,
    ) -> Self {
        let prompt_timeout = Duration::from_secs(config.prompt.timeout_secs);
        Self {
            config,
            local: Mutex::new(HashMap::new()),
            cache: None,
            store,
            prompt,
            prompt_timeout,
            ctx: ctx.clone(),
        }
    }

    /// Enable the cache service layer
    pub fn with_cache(mut self, client: CacheClient) -> Self {
        self.cache = Some(client);
        self
    }

    /// Find the secret for `(profile, mode, slot)`
    pub async fn get(
        &self,
        profile_id: &str,
        mode: Mode,
        slot: Slot,
        scope: ResolveScope,
    ) -> CredpipeResult<Resolution> {
        let profile = self.profile(profile_id)?;
        let Some(key) = CredentialKey::for_profile(profile, mode, slot)? else {
            return Ok(Resolution::NotRequired);
        };

        let span = self.ctx.span("resolver");
        let resolution = self
            .lookup(profile, mode, slot, &key, scope)
            .instrument(span)
            .await;

        if let Resolution::Found { secret, source } = &resolution {
            debug!("Resolved {} from {}", key, source);
            self.remember(&key, secret);
        }
        Ok(resolution)
    }

    /// Store a secret in every enabled layer
    pub async fn set(
        &self,
        secret: &str,
        profile_id: &str,
        mode: Mode,
        slot: Slot,
    ) -> CredpipeResult<()> {
        let profile = self.profile(profile_id)?;
        let Some(key) = CredentialKey::for_profile(profile, mode, slot)? else {
            debug!("Profile {} needs no {} secret in {} mode", profile.id, slot, mode);
            return Ok(());
        };

        let span = self.ctx.span("resolver");
        async {
            if profile.password.save_to_keyring {
                if let Err(e) = self.store.set(&key, secret).await {
                    warn!("Cannot store {} in {}: {}", key, self.store.backend_name(), e);
                }
            }
            if profile.password.use_cache {
                self.push_to_cache(&key, secret).await;
            }
        }
        .instrument(span)
        .await;

        self.remember(&key, secret);
        Ok(())
    }

    async fn lookup(
        &self,
        profile: &Profile,
        mode: Mode,
        slot: Slot,
        key: &CredentialKey,
        scope: ResolveScope,
    ) -> Resolution {
        if let Some(secret) = self.recall(key) {
            return found(secret, Layer::Local);
        }

        if profile.password.use_cache && scope == ResolveScope::Any {
            if let Some(secret) = self.from_cache(key).await {
                return found(secret, Layer::Cache);
            }
        }

        if profile.password.save_to_keyring {
            match self.store.get(key).await {
                Ok(Some(secret)) => return found(secret, Layer::Keyring),
                Ok(None) => debug!("No {} entry for {}", self.store.backend_name(), key),
                Err(e) => warn!("Cannot read {} from {}: {}", key, self.store.backend_name(), e),
            }
        }

        if scope == ResolveScope::KeyringOnly {
            return Resolution::Missing;
        }

        let text = prompt_text(profile, mode, slot);
        match self.prompt.prompt(&text, self.prompt_timeout).await {
            PromptOutcome::Entered(secret) => {
                if profile.password.use_cache {
                    self.push_to_cache(key, &secret).await;
                }
                found(secret, Layer::Prompt)
            }
            PromptOutcome::Cancelled => {
                info!("No secret for {}", key);
                Resolution::Missing
            }
        }
    }

    async fn from_cache(&self, key: &CredentialKey) -> Option<String> {
        let client = self.cache.as_ref()?;
        match client.get(key).await {
            Ok(secret) => secret,
            Err(e) if e.is_integrity() => {
                error!("{}", e);
                None
            }
            Err(e) => {
                debug!("Cache service unavailable: {}", e);
                None
            }
        }
    }

    async fn push_to_cache(&self, key: &CredentialKey, secret: &str) {
        let Some(client) = &self.cache else {
            return;
        };
        if let Err(e) = client.set(key, secret).await {
            debug!("Cannot hand {} to cache service: {}", key, e);
        }
    }

    fn profile(&self, id: &str) -> CredpipeResult<&Profile> {
        self.config
            .profile(id)
            .ok_or_else(|| CredpipeError::ProfileNotFound(id.to_string()))
    }

    fn recall(&self, key: &CredentialKey) -> Option<String> {
        self.local.lock().ok()?.get(key).cloned()
    }

    fn remember(&self, key: &CredentialKey, secret: &str) {
        if let Ok(mut local) = self.local.lock() {
            local.insert(key.clone(), secret.to_string());
        }
    }
}

fn found(secret: String, source: Layer) -> Resolution {
    Resolution::Found { secret, source }
}

fn prompt_text(profile: &Profile, mode: Mode, slot: Slot) -> String {
    let label = mode
        .secret_kind(slot)
        .map(|kind| kind.label())
        .unwrap_or("secret");
    format!("{} password for profile \"{}\" ({})", label, profile.name, profile.id)
}

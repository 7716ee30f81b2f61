//! CLI command implementations

pub mod askpass;
pub mod config;
pub mod daemon;
pub mod exec;
pub mod get;
pub mod set;

pub use askpass::execute as askpass;
pub use config::execute as config;
pub use daemon::execute as daemon;
pub use exec::execute as exec;
pub use get::execute as get;
pub use set::execute as set;

use crate::cli::args::SlotArgs;
use crate::config::Config;
use crate::context::Context;
use crate::credentials::{KeyringStore, Mode, Resolver};
use crate::error::{CredpipeError, CredpipeResult};
use crate::service::{CacheClient, CachePaths};
use crate::ui::{InteractivePrompt, UiContext};
use std::sync::Arc;

/// Resolver wired to the real keyring, the cache daemon and the user
fn resolver(config: Config, ctx: &Context) -> Resolver {
    let prompt = InteractivePrompt::new(
        UiContext::detect(),
        config.prompt.askpass_program.as_deref(),
    );
    let client = CacheClient::new(CachePaths::from_env(), ctx);

    Resolver::new(config, Arc::new(KeyringStore::new()), Arc::new(prompt), ctx)
        .with_cache(client)
}

/// Mode for a slot lookup: explicit flag, else the profile's own
fn target_mode(config: &Config, target: &SlotArgs) -> CredpipeResult<Mode> {
    if let Some(mode) = target.mode {
        return Ok(mode);
    }
    config
        .profile(&target.profile)
        .map(|p| p.mode)
        .ok_or_else(|| CredpipeError::ProfileNotFound(target.profile.clone()))
}

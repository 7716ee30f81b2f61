//! Askpass command - SSH_ASKPASS-style helper
//!
//! Sources, in order: a handoff FIFO exported by the parent, a profile slot
//! named in the environment, then an interactive prompt.

use super::resolver;
use crate::cli::args::AskpassArgs;
use crate::config::Config;
use crate::context::Context;
use crate::credentials::{ResolveScope, Slot};
use crate::error::{CredpipeError, CredpipeResult};
use crate::transport::{read_handoff, ASKPASS_FIFO_ENV};
use crate::ui::{InteractivePrompt, PasswordPrompt, PromptOutcome, UiContext};
use std::path::PathBuf;
use std::time::Duration;

/// Profile whose secret the helper should answer with
pub const ASKPASS_PROFILE_ENV: &str = "CREDPIPE_ASKPASS_PROFILE";

/// Slot for [`ASKPASS_PROFILE_ENV`], primary when unset
pub const ASKPASS_SLOT_ENV: &str = "CREDPIPE_ASKPASS_SLOT";

const DEFAULT_PROMPT: &str = "Password:";

/// Execute the askpass command
pub async fn execute(args: AskpassArgs, config: Config, ctx: &Context) -> CredpipeResult<()> {
    let secret = match Source::from_env()? {
        Source::Handoff(path) => {
            tracing::debug!("Reading secret from handoff {}", path.display());
            read_handoff(&path, ctx).await?
        }
        Source::Profile { id, slot } => from_profile(config, &id, slot, ctx).await?,
        Source::Prompt => from_prompt(&config, args.prompt.as_deref()).await?,
    };

    println!("{}", secret);
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Source {
    Handoff(PathBuf),
    Profile { id: String, slot: Slot },
    Prompt,
}

impl Source {
    fn from_env() -> CredpipeResult<Self> {
        Self::from_vars(
            std::env::var_os(ASKPASS_FIFO_ENV).map(PathBuf::from),
            std::env::var(ASKPASS_PROFILE_ENV).ok(),
            std::env::var(ASKPASS_SLOT_ENV).ok(),
        )
    }

    fn from_vars(
        fifo: Option<PathBuf>,
        profile: Option<String>,
        slot: Option<String>,
    ) -> CredpipeResult<Self> {
        if let Some(path) = fifo.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(Self::Handoff(path));
        }

        match profile.filter(|p| !p.is_empty()) {
            Some(id) => {
                let slot = match slot.as_deref() {
                    None | Some("") => Slot::Primary,
                    Some(s) => s.parse().map_err(CredpipeError::User)?,
                };
                Ok(Self::Profile { id, slot })
            }
            None => Ok(Self::Prompt),
        }
    }
}

async fn from_profile(config: Config, id: &str, slot: Slot, ctx: &Context) -> CredpipeResult<String> {
    let mode = config
        .profile(id)
        .map(|p| p.mode)
        .ok_or_else(|| CredpipeError::ProfileNotFound(id.to_string()))?;

    resolver(config, ctx)
        .get(id, mode, slot, ResolveScope::Any)
        .await?
        .secret()
        .map(str::to_string)
        .ok_or_else(|| CredpipeError::User(format!("No {} secret for profile {}", slot, id)))
}

async fn from_prompt(config: &Config, text: Option<&str>) -> CredpipeResult<String> {
    let prompt = InteractivePrompt::new(UiContext::detect(), config.prompt.askpass_program.as_deref());
    let timeout = Duration::from_secs(config.prompt.timeout_secs);

    match prompt.prompt(text.unwrap_or(DEFAULT_PROMPT), timeout).await {
        PromptOutcome::Entered(secret) => Ok(secret),
        PromptOutcome::Cancelled => Err(CredpipeError::Prompt("cancelled".to_string())),
    }
}

//! Get command - print the secret for a profile slot

use super::{resolver, target_mode};
use crate::cli::args::GetArgs;
use crate::config::Config;
use crate::context::Context;
use crate::credentials::{Resolution, ResolveScope};
use crate::error::{CredpipeError, CredpipeResult};
use crate::ui::{self, UiContext};

/// Execute the get command
pub async fn execute(args: GetArgs, config: Config, ctx: &Context) -> CredpipeResult<()> {
    let mode = target_mode(&config, &args.target)?;
    let scope = if args.keyring_only {
        ResolveScope::KeyringOnly
    } else {
        ResolveScope::Any
    };

    let target = args.target;
    let resolution = resolver(config, ctx)
        .get(&target.profile, mode, target.slot, scope)
        .await?;

    match resolution {
        Resolution::Found { secret, source } => {
            tracing::info!("Secret for profile {} from {}", target.profile, source);
            println!("{}", secret);
            Ok(())
        }
        Resolution::NotRequired => {
            ui::step_info(
                &UiContext::detect(),
                &format!("Mode {} needs no {} secret", mode, target.slot),
            );
            Ok(())
        }
        Resolution::Missing => Err(CredpipeError::User(format!(
            "No {} secret available for profile {}",
            target.slot, target.profile
        ))),
    }
}

//! Set command - store a secret read from stdin

use super::{resolver, target_mode};
use crate::cli::args::SetArgs;
use crate::config::Config;
use crate::context::Context;
use crate::error::{CredpipeError, CredpipeResult};
use crate::ui::{self, UiContext};
use tokio::io::AsyncReadExt;

/// Execute the set command
pub async fn execute(args: SetArgs, config: Config, ctx: &Context) -> CredpipeResult<()> {
    let mode = target_mode(&config, &args.target)?;

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .map_err(|e| CredpipeError::io("reading secret from stdin", e))?;
    let secret = parse_secret(&input)?;

    let target = args.target;
    resolver(config, ctx)
        .set(secret, &target.profile, mode, target.slot)
        .await?;

    ui::step_ok(
        &UiContext::detect(),
        &format!("Stored {} secret for profile {}", target.slot, target.profile),
    );
    Ok(())
}

/// One line, trailing newline optional
fn parse_secret(input: &str) -> CredpipeResult<&str> {
    let secret = input
        .strip_suffix('\n')
        .map(|s| s.strip_suffix('\r').unwrap_or(s))
        .unwrap_or(input);

    if secret.is_empty() {
        return Err(CredpipeError::User("No secret on stdin".to_string()));
    }
    if secret.contains('\n') {
        return Err(CredpipeError::User(
            "Secret must be a single line".to_string(),
        ));
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_one_trailing_newline() {
        assert_eq!(parse_secret("hunter2\n").unwrap(), "hunter2");
        assert_eq!(parse_secret("hunter2\r\n").unwrap(), "hunter2");
        assert_eq!(parse_secret("with space ").unwrap(), "with space ");
    }

    #[test]
    fn rejects_empty_and_multiline() {
        assert!(parse_secret("").is_err());
        assert!(parse_secret("\n").is_err());
        assert!(parse_secret("a\nb\n").is_err());
    }
}

//! Exec command - run a command that reads its secret through askpass
//!
//! The secret is resolved once, parked in a one-shot handoff FIFO and the
//! child is pointed at it through `SSH_ASKPASS`.

use super::{resolver, target_mode};
use crate::cli::args::ExecArgs;
use crate::config::Config;
use crate::context::Context;
use crate::credentials::{Resolution, ResolveScope};
use crate::error::{CredpipeError, CredpipeResult};
use crate::transport::SecretHandoff;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Execute the exec command
pub async fn execute(args: ExecArgs, config: Config, ctx: &Context) -> CredpipeResult<()> {
    let mode = target_mode(&config, &args.target)?;
    let target = args.target;

    let resolution = resolver(config, ctx)
        .get(&target.profile, mode, target.slot, ResolveScope::Any)
        .await?;

    let handoff = match resolution {
        Resolution::Found { secret, source } => {
            info!("Secret for profile {} from {}", target.profile, source);
            Some(SecretHandoff::start_in_temp(secret, ctx)?)
        }
        Resolution::NotRequired => None,
        Resolution::Missing => {
            return Err(CredpipeError::User(format!(
                "No {} secret available for profile {}",
                target.slot, target.profile
            )))
        }
    };

    let status = run(&args.command, handoff.as_ref()).await;
    if let Some(handoff) = handoff {
        if !handoff.finish().await {
            debug!("Child exited without reading the secret");
        }
    }

    let status = status?;
    if status.success() {
        Ok(())
    } else {
        Err(CredpipeError::User(format!(
            "{} exited with {}",
            args.command[0], status
        )))
    }
}

async fn run(
    command: &[String],
    handoff: Option<&SecretHandoff>,
) -> CredpipeResult<std::process::ExitStatus> {
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| CredpipeError::User("No command given".to_string()))?;

    let mut child = Command::new(program);
    child.args(rest);

    if let Some(handoff) = handoff {
        let (name, path) = handoff.env();
        let helper = write_helper(handoff.dir())?;
        child
            .env(name, path)
            .env("SSH_ASKPASS", helper)
            .env("SSH_ASKPASS_REQUIRE", "force");
    }

    debug!("Running {}", program);
    child
        .status()
        .await
        .map_err(|e| CredpipeError::io(format!("running {}", program), e))
}

/// Script forwarding askpass calls back to this binary
fn write_helper(dir: &Path) -> CredpipeResult<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| CredpipeError::io("locating credpipe executable", e))?;
    let path = dir.join("askpass");

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o700)
        .open(&path)
        .map_err(|e| CredpipeError::io(format!("creating {}", path.display()), e))?;
    writeln!(
        file,
        "#!/bin/sh\nexec {} askpass \"$@\"",
        shell_quote(&exe.to_string_lossy())
    )
    .map_err(|e| CredpipeError::io(format!("writing {}", path.display()), e))?;

    Ok(path)
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx() -> Context {
        Context::new("test".to_string(), 0)
    }

    #[test]
    fn quoting_survives_single_quotes() {
        assert_eq!(shell_quote("/opt/it's/credpipe"), r"'/opt/it'\''s/credpipe'");
    }

    #[tokio::test]
    async fn child_reads_secret_through_handoff() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let handoff = SecretHandoff::start(temp.path(), "s3cr3t".to_string(), &ctx()).unwrap();

        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cat \"$CREDPIPE_ASKPASS_FIFO\" > '{}'", out.display()),
        ];
        let status = run(&command, Some(&handoff)).await.unwrap();

        assert!(status.success());
        assert!(handoff.finish().await);
        assert_eq!(std::fs::read_to_string(&out).unwrap().trim_end(), "s3cr3t");
    }

    #[tokio::test]
    async fn helper_script_calls_back_into_askpass() {
        let temp = TempDir::new().unwrap();
        let handoff = SecretHandoff::start(temp.path(), "x".to_string(), &ctx()).unwrap();

        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "test -x \"$SSH_ASKPASS\" && grep -q ' askpass ' \"$SSH_ASKPASS\" && \
             test \"$SSH_ASKPASS_REQUIRE\" = force"
                .to_string(),
        ];
        let status = run(&command, Some(&handoff)).await.unwrap();

        assert!(status.success());
        drop(handoff);
    }

    #[tokio::test]
    async fn failed_spawn_is_an_error() {
        let command = vec!["/nonexistent/credpipe-test-binary".to_string()];
        assert!(run(&command, None).await.is_err());
    }
}

//! credpipe - credential cache for unattended backups
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use credpipe::cli::args::{ConfigAction, ConfigArgs, DaemonAction};
use credpipe::cli::{commands, Cli, Commands};
use credpipe::config::{Config, ConfigManager};
use credpipe::context::Context;
use credpipe::error::{CredpipeError, CredpipeResult};
use credpipe::service::CachePaths;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

/// Grace period for a prompt still blocking a worker thread
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

// Not `#[tokio::main]`: `daemon start` forks, which must happen before any
// runtime threads exist.
fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> CredpipeResult<()> {
    let cli = Cli::parse();
    let paths = CachePaths::from_env();

    // Before anything reads the environment
    let restored = if cli.scheduled {
        credpipe::env::restore(&paths.session_env())?
    } else {
        Vec::new()
    };
    // The snapshot may carry a different cache directory
    let paths = CachePaths::from_env();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    // `config init` must work even when the existing file is broken
    let loaded = match &cli.command {
        Commands::Config(ConfigArgs {
            action: Some(ConfigAction::Init { .. }),
        }) => Ok(Config::default()),
        _ => manager.load_blocking(),
    };
    let verbose = match &loaded {
        Ok(config) if config.general.verbose => cli.verbose.max(1),
        _ => cli.verbose,
    };

    let session = cli
        .session
        .clone()
        .unwrap_or_else(|| cli.command.name().to_string());
    let mut ctx = Context::new(session, verbose).with_log_format(cli.log_format);

    if let Commands::Daemon(args) = &cli.command {
        if matches!(
            args.action,
            DaemonAction::Start { foreground: false } | DaemonAction::Restart
        ) {
            ConfigManager::ensure_private_dir(paths.dir())?;
            ctx = ctx.with_log_file(paths.log_file());
        }
    }
    ctx.init_tracing()?;

    if !restored.is_empty() {
        debug!("Restored session variables: {}", restored.join(", "));
    }

    match cli.command {
        Commands::Daemon(args) => commands::daemon(args, &ctx, &manager),
        command => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| CredpipeError::io("starting async runtime", e))?;

            let result = runtime.block_on(dispatch(command, loaded, &manager, &ctx));
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            result
        }
    }
}

async fn dispatch(
    command: Commands,
    loaded: CredpipeResult<Config>,
    manager: &ConfigManager,
    ctx: &Context,
) -> CredpipeResult<()> {
    let config = loaded?;

    match command {
        Commands::Daemon(_) => Err(CredpipeError::Internal(
            "daemon command dispatched on a runtime".to_string(),
        )),
        Commands::Get(args) => commands::get(args, config, ctx).await,
        Commands::Set(args) => commands::set(args, config, ctx).await,
        Commands::Askpass(args) => commands::askpass(args, config, ctx).await,
        Commands::Exec(args) => commands::exec(args, config, ctx).await,
        Commands::Config(args) => commands::config(args, &config, manager, ctx).await,
    }
}

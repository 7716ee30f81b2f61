//! CLI argument definitions using clap derive

use crate::context::LogFormat;
use crate::credentials::{Mode, Slot};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// credpipe - cache backup credentials for unattended runs
///
/// Keeps ssh and encfs secrets in a per-user background process so that
/// scheduled backups can run without asking again.
#[derive(Parser, Debug)]
#[command(name = "credpipe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CREDPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log line encoding
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "CREDPIPE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Session label attached to every log line
    #[arg(long, global = true)]
    pub session: Option<String>,

    /// Running from a scheduler: restore the saved session environment first
    #[arg(long, global = true, env = "CREDPIPE_SCHEDULED")]
    pub scheduled: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Control the cache daemon
    Daemon(DaemonArgs),

    /// Print the secret for a profile slot
    Get(GetArgs),

    /// Store a secret read from stdin
    Set(SetArgs),

    /// Act as an SSH_ASKPASS helper
    Askpass(AskpassArgs),

    /// Run a command with a profile's secret handed to its askpass helper
    Exec(ExecArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

impl Commands {
    /// Name used as the default session label
    pub fn name(&self) -> &'static str {
        match self {
            Self::Daemon(_) => "daemon",
            Self::Get(_) => "get",
            Self::Set(_) => "set",
            Self::Askpass(_) => "askpass",
            Self::Exec(_) => "exec",
            Self::Config(_) => "config",
        }
    }
}

/// Arguments for the daemon command
#[derive(Parser, Debug)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub action: DaemonAction,
}

/// Daemon subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonAction {
    /// Start the daemon in the background
    Start {
        /// Stay attached to the terminal
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Stop, then start again
    Restart,

    /// Re-read configuration and re-seed from the keyring
    Reload,

    /// Show whether the daemon is running
    Status,
}

/// Which slot to address
#[derive(Parser, Debug, Clone)]
pub struct SlotArgs {
    /// Profile id
    #[arg(short, long)]
    pub profile: String,

    /// Snapshot mode (defaults to the profile's configured mode)
    #[arg(short, long)]
    pub mode: Option<Mode>,

    /// Secret slot: primary (1) or secondary (2)
    #[arg(short, long, default_value = "primary")]
    pub slot: Slot,
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub target: SlotArgs,

    /// Only consult the keyring: no cache daemon, no prompt
    #[arg(long)]
    pub keyring_only: bool,
}

/// Arguments for the set command
#[derive(Parser, Debug)]
pub struct SetArgs {
    #[command(flatten)]
    pub target: SlotArgs,
}

/// Arguments for the askpass command
#[derive(Parser, Debug)]
pub struct AskpassArgs {
    /// Prompt text passed by ssh
    pub prompt: Option<String>,
}

/// Arguments for the exec command
#[derive(Parser, Debug)]
pub struct ExecArgs {
    #[command(flatten)]
    pub target: SlotArgs,

    /// Command and arguments to run
    #[arg(trailing_var_arg = true, required = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value and reload the daemon
    Set {
        /// Configuration key (e.g., profiles.1.password.use_cache)
        key: String,
        /// Value to set
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_daemon_start() {
        let cli = Cli::parse_from(["credpipe", "daemon", "start", "--foreground"]);
        match cli.command {
            Commands::Daemon(args) => {
                assert_eq!(args.action, DaemonAction::Start { foreground: true })
            }
            _ => panic!("expected Daemon command"),
        }
    }

    #[test]
    fn cli_parses_get() {
        let cli = Cli::parse_from([
            "credpipe",
            "get",
            "--profile",
            "2",
            "--mode",
            "ssh_encfs",
            "--slot",
            "2",
            "--keyring-only",
        ]);
        match cli.command {
            Commands::Get(args) => {
                assert_eq!(args.target.profile, "2");
                assert_eq!(args.target.mode, Some(Mode::SshEncfs));
                assert_eq!(args.target.slot, Slot::Secondary);
                assert!(args.keyring_only);
            }
            _ => panic!("expected Get command"),
        }
    }

    #[test]
    fn cli_get_defaults_to_primary() {
        let cli = Cli::parse_from(["credpipe", "get", "-p", "1"]);
        match cli.command {
            Commands::Get(args) => {
                assert_eq!(args.target.slot, Slot::Primary);
                assert!(args.target.mode.is_none());
            }
            _ => panic!("expected Get command"),
        }
    }

    #[test]
    fn cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["credpipe", "get", "-p", "1", "-m", "ftp"]).is_err());
    }

    #[test]
    fn cli_parses_askpass_prompt() {
        let cli = Cli::parse_from(["credpipe", "askpass", "Enter passphrase for key:"]);
        match cli.command {
            Commands::Askpass(args) => {
                assert_eq!(args.prompt.as_deref(), Some("Enter passphrase for key:"))
            }
            _ => panic!("expected Askpass command"),
        }
    }

    #[test]
    fn cli_parses_exec_command_line() {
        let cli = Cli::parse_from([
            "credpipe", "exec", "-p", "1", "--", "rsync", "-a", "src/", "host:dst/",
        ]);
        match cli.command {
            Commands::Exec(args) => {
                assert_eq!(args.target.profile, "1");
                assert_eq!(args.command, ["rsync", "-a", "src/", "host:dst/"]);
            }
            _ => panic!("expected Exec command"),
        }
        assert!(Cli::try_parse_from(["credpipe", "exec", "-p", "1"]).is_err());
    }

    #[test]
    fn cli_global_flags() {
        let cli = Cli::parse_from(["credpipe", "--scheduled", "--session", "cron", "-vv", "daemon", "status"]);
        assert!(cli.scheduled);
        assert_eq!(cli.session.as_deref(), Some("cron"));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.command.name(), "daemon");
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn cli_parses_json_logs() {
        let cli = Cli::parse_from(["credpipe", "--log-format", "json", "daemon", "status"]);
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}

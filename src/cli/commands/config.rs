//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, Profile};
use crate::context::Context;
use crate::credentials::Mode;
use crate::error::{CredpipeError, CredpipeResult};
use crate::service::CachePaths;
use crate::supervisor::Supervisor;
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
    ctx: &Context,
) -> CredpipeResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config),
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut config = config.clone();
            set_value(&mut config, &key, &value)?;
            manager.save(&config).await?;

            let ui_ctx = UiContext::detect();
            ui::step_ok(&ui_ctx, &format!("Set {} = {}", key, value));
            notify_daemon(&ui_ctx, ctx);
        }
    }

    Ok(())
}

fn show_config(config: &Config) {
    let toml =
        toml::to_string_pretty(config).unwrap_or_else(|_| "Error serializing config".to_string());
    println!("{}", toml);
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> CredpipeResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    let mut config = Config::default();
    config.profiles.push(Profile::default());
    manager.save(&config).await?;

    ui::step_ok_detail(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );

    Ok(())
}

/// A running daemon only sees the new file after a reload
fn notify_daemon(ui_ctx: &UiContext, ctx: &Context) {
    let supervisor = Supervisor::new(CachePaths::from_env().pid_file(), ctx);
    match supervisor.reload() {
        Ok(true) => ui::step_info(ui_ctx, "Cache daemon reloaded"),
        Ok(false) => {}
        Err(e) => ui::step_warn_hint(
            ui_ctx,
            &format!("Could not reload cache daemon: {}", e),
            "Run 'credpipe daemon reload'",
        ),
    }
}

/// Apply a dot-separated key to `config`
fn set_value(config: &mut Config, key: &str, value: &str) -> CredpipeResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "verbose"] => config.general.verbose = parse_bool(value)?,

        ["prompt", "timeout_secs"] => config.prompt.timeout_secs = parse_u64(value)?,
        ["prompt", "askpass_program"] => config.prompt.askpass_program = optional(value),

        ["profiles", id, field @ ..] if !id.is_empty() => {
            set_profile_value(profile_mut(config, id), field, key, value)?
        }

        _ => return Err(unknown_key(key)),
    }

    Ok(())
}

fn set_profile_value(
    profile: &mut Profile,
    field: &[&str],
    key: &str,
    value: &str,
) -> CredpipeResult<()> {
    match field {
        ["name"] => profile.name = value.to_string(),
        ["mode"] => profile.mode = value.parse::<Mode>().map_err(CredpipeError::User)?,
        ["user"] => profile.user = optional(value),
        ["host"] => profile.host = optional(value),
        ["password", "use_cache"] => profile.password.use_cache = parse_bool(value)?,
        ["password", "save_to_keyring"] => profile.password.save_to_keyring = parse_bool(value)?,
        _ => return Err(unknown_key(key)),
    }
    Ok(())
}

/// Existing profile, or a new one with defaults
fn profile_mut<'a>(config: &'a mut Config, id: &str) -> &'a mut Profile {
    let index = match config.profiles.iter().position(|p| p.id == id) {
        Some(index) => index,
        None => {
            config.profiles.push(Profile {
                id: id.to_string(),
                name: format!("Profile {}", id),
                ..Profile::default()
            });
            config.profiles.len() - 1
        }
    };
    &mut config.profiles[index]
}

fn unknown_key(key: &str) -> CredpipeError {
    CredpipeError::User(format!(
        "Unknown config key: {} (valid: general.verbose, prompt.timeout_secs, \
         prompt.askpass_program, profiles.<id>.name|mode|user|host, \
         profiles.<id>.password.use_cache|save_to_keyring)",
        key
    ))
}

/// Empty string clears an optional value
fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(value: &str) -> CredpipeResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(CredpipeError::User(format!(
            "Invalid boolean value: {}",
            value
        ))),
    }
}

fn parse_u64(value: &str) -> CredpipeResult<u64> {
    value
        .parse()
        .map_err(|_| CredpipeError::User(format!("Invalid number: {}", value)))
}

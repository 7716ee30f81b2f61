//! Daemon command - start, stop and inspect the cache daemon
//!
//! Runs before any async runtime exists: `start` forks, and forking a
//! multi-threaded process is not allowed.

use crate::cli::args::{DaemonAction, DaemonArgs};
use crate::config::ConfigManager;
use crate::context::Context;
use crate::credentials::KeyringStore;
use crate::error::{CredpipeError, CredpipeResult};
use crate::service::{CacheInfo, CachePaths, CacheService};
use crate::supervisor::Supervisor;
use crate::ui::{self, UiContext};
use std::sync::Arc;

/// Execute the daemon command
pub fn execute(args: DaemonArgs, ctx: &Context, manager: &ConfigManager) -> CredpipeResult<()> {
    let paths = CachePaths::from_env();
    let supervisor = Supervisor::new(paths.pid_file(), ctx);
    let ui_ctx = UiContext::detect();

    let service = || {
        CacheService::new(
            manager.clone(),
            paths.clone(),
            Arc::new(KeyringStore::new()),
            ctx,
        )
    };

    match args.action {
        DaemonAction::Start { foreground } => {
            if supervisor.status() {
                return Err(CredpipeError::AlreadyRunning(paths.pid_file()));
            }
            if foreground {
                supervisor.start_foreground(service())
            } else {
                ui::step_ok_detail(&ui_ctx, "Starting cache daemon", &paths.dir().display().to_string());
                supervisor.start(service())
            }
        }
        DaemonAction::Stop => {
            if supervisor.stop()? {
                ui::step_ok(&ui_ctx, "Cache daemon stopped");
            } else {
                ui::step_info(&ui_ctx, "Cache daemon not running");
            }
            Ok(())
        }
        DaemonAction::Restart => {
            ui::step_info(&ui_ctx, "Restarting cache daemon");
            supervisor.restart(service())
        }
        DaemonAction::Reload => {
            if supervisor.reload()? {
                ui::step_ok(&ui_ctx, "Reload requested");
                Ok(())
            } else {
                Err(CredpipeError::NotRunning)
            }
        }
        DaemonAction::Status => {
            show_status(&ui_ctx, &supervisor, &paths);
            Ok(())
        }
    }
}

fn show_status(ui_ctx: &UiContext, supervisor: &Supervisor, paths: &CachePaths) {
    ui::section(ui_ctx, "Cache daemon");

    let Some(record) = supervisor.running_record() else {
        ui::key_value_status(ui_ctx, "Status", "not running", false);
        ui::key_value(ui_ctx, "Cache dir", &paths.dir().display().to_string());
        return;
    };

    ui::key_value_status(ui_ctx, "Status", &format!("running (pid {})", record.pid), true);
    ui::key_value(
        ui_ctx,
        "Started",
        &record.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );

    match CacheInfo::load(&paths.info()) {
        Ok(info) => {
            let compatible = info.check_version().is_ok();
            ui::key_value_status(ui_ctx, "Protocol", &info.version.to_string(), compatible);
        }
        Err(_) => ui::key_value_status(ui_ctx, "Protocol", "unknown", false),
    }
    ui::key_value(ui_ctx, "FIFO", &paths.fifo().display().to_string());
}

//! Password prompts: graphical askpass helper first, terminal second

use super::context::UiContext;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// What the user did with a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Entered(String),
    /// Dismissed, interrupted, timed out or nobody there to ask
    Cancelled,
}

/// Something that can ask the user for a secret
#[async_trait]
pub trait PasswordPrompt: Send + Sync {
    async fn prompt(&self, text: &str, timeout: Duration) -> PromptOutcome;
}

/// Masked terminal prompt via cliclack
#[derive(Debug, Clone)]
pub struct TerminalPrompt {
    ui: UiContext,
}

impl TerminalPrompt {
    pub fn new(ui: UiContext) -> Self {
        Self { ui }
    }
}

#[async_trait]
impl PasswordPrompt for TerminalPrompt {
    async fn prompt(&self, text: &str, timeout: Duration) -> PromptOutcome {
        if !self.ui.is_interactive() {
            debug!("No terminal to prompt on");
            return PromptOutcome::Cancelled;
        }

        let text = text.to_string();
        let task = tokio::task::spawn_blocking(move || {
            cliclack::password(text).mask('▪').interact()
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(secret))) => PromptOutcome::Entered(secret),
            Ok(Ok(Err(e))) => {
                debug!("Prompt aborted: {}", e);
                PromptOutcome::Cancelled
            }
            Ok(Err(e)) => {
                warn!("Prompt task failed: {}", e);
                PromptOutcome::Cancelled
            }
            Err(_) => {
                warn!("Prompt timed out after {}s", timeout.as_secs());
                PromptOutcome::Cancelled
            }
        }
    }
}

/// External `ssh-askpass`-style helper: prompt text as argv[1], secret on stdout
#[derive(Debug, Clone)]
pub struct AskpassPrompt {
    program: String,
    ui: UiContext,
}

impl AskpassPrompt {
    pub fn new(program: impl Into<String>, ui: UiContext) -> Self {
        Self {
            program: program.into(),
            ui,
        }
    }

    /// Run the helper, `None` if it could not be shown at all
    pub async fn try_prompt(&self, text: &str, timeout: Duration) -> Option<PromptOutcome> {
        if !self.ui.is_graphical() {
            return None;
        }

        let child = Command::new(&self.program)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                debug!("Cannot run {}: {}", self.program, e);
                return None;
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                let mut secret = String::from_utf8_lossy(&output.stdout).into_owned();
                if secret.ends_with('\n') {
                    secret.pop();
                }
                Some(PromptOutcome::Entered(secret))
            }
            Ok(Ok(output)) => {
                debug!("{} exited with {}", self.program, output.status);
                Some(PromptOutcome::Cancelled)
            }
            Ok(Err(e)) => {
                warn!("{} failed: {}", self.program, e);
                None
            }
            Err(_) => {
                warn!("{} timed out after {}s", self.program, timeout.as_secs());
                Some(PromptOutcome::Cancelled)
            }
        }
    }
}

#[async_trait]
impl PasswordPrompt for AskpassPrompt {
    async fn prompt(&self, text: &str, timeout: Duration) -> PromptOutcome {
        self.try_prompt(text, timeout)
            .await
            .unwrap_or(PromptOutcome::Cancelled)
    }
}

/// Graphical helper when available, terminal otherwise
#[derive(Debug, Clone)]
pub struct InteractivePrompt {
    askpass: Option<AskpassPrompt>,
    terminal: TerminalPrompt,
}

impl InteractivePrompt {
    pub fn new(ui: UiContext, askpass_program: Option<&str>) -> Self {
        Self {
            askpass: askpass_program.map(|p| AskpassPrompt::new(p, ui.clone())),
            terminal: TerminalPrompt::new(ui),
        }
    }
}

#[async_trait]
impl PasswordPrompt for InteractivePrompt {
    async fn prompt(&self, text: &str, timeout: Duration) -> PromptOutcome {
        if let Some(askpass) = &self.askpass {
            if let Some(outcome) = askpass.try_prompt(text, timeout).await {
                return outcome;
            }
        }
        self.terminal.prompt(text, timeout).await
    }
}

/// Scripted prompt for tests and unattended runs
#[derive(Debug, Clone)]
pub struct MockPrompt {
    outcome: PromptOutcome,
    calls: Arc<AtomicUsize>,
}

impl MockPrompt {
    /// Always answer with `secret`
    pub fn with_password(secret: impl Into<String>) -> Self {
        Self {
            outcome: PromptOutcome::Entered(secret.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always cancel
    pub fn cancelled() -> Self {
        Self {
            outcome: PromptOutcome::Cancelled,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times the prompt was shown
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PasswordPrompt for MockPrompt {
    async fn prompt(&self, _text: &str, _timeout: Duration) -> PromptOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("askpass");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn terminal_prompt_cancels_without_terminal() {
        let prompt = TerminalPrompt::new(UiContext::non_interactive());
        let outcome = prompt.prompt("Password:", Duration::from_secs(1)).await;
        assert_eq!(outcome, PromptOutcome::Cancelled);
    }

    #[tokio::test]
    async fn askpass_reads_stdout() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "echo \"pw for $1\"");
        let prompt = AskpassPrompt::new(program, UiContext::non_interactive().with_graphical(true));

        let outcome = prompt.prompt("ssh", Duration::from_secs(5)).await;
        assert_eq!(outcome, PromptOutcome::Entered("pw for ssh".to_string()));
    }

    #[tokio::test]
    async fn askpass_nonzero_exit_is_cancel() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "exit 1");
        let prompt = AskpassPrompt::new(program, UiContext::non_interactive().with_graphical(true));

        assert_eq!(
            prompt.try_prompt("x", Duration::from_secs(5)).await,
            Some(PromptOutcome::Cancelled)
        );
    }

    #[tokio::test]
    async fn askpass_needs_a_display() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "echo nope");
        let prompt = AskpassPrompt::new(program, UiContext::non_interactive());

        assert_eq!(prompt.try_prompt("x", Duration::from_secs(5)).await, None);
    }

    #[tokio::test]
    async fn interactive_falls_back_when_helper_is_missing() {
        let ui = UiContext::non_interactive().with_graphical(true);
        let prompt = InteractivePrompt::new(ui, Some("/nonexistent/credpipe-askpass"));

        // helper missing, terminal unavailable
        let outcome = prompt.prompt("x", Duration::from_secs(1)).await;
        assert_eq!(outcome, PromptOutcome::Cancelled);
    }

    #[tokio::test]
    async fn mock_counts_calls() {
        let prompt = MockPrompt::with_password("s3cr3t");
        assert_eq!(
            prompt.prompt("x", Duration::ZERO).await,
            PromptOutcome::Entered("s3cr3t".to_string())
        );
        assert_eq!(prompt.call_count(), 1);
    }
}

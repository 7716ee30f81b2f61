//! UI module: status output and password prompts
//!
//! Uses `cliclack` for styled output and masked prompts, with plain output
//! when stdout is not a terminal and no prompts at all for unattended runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use credpipe::ui::{self, InteractivePrompt, PasswordPrompt, UiContext};
//!
//! let ctx = UiContext::detect();
//! let prompt = InteractivePrompt::new(ctx.clone(), Some("ssh-askpass"));
//! let outcome = prompt.prompt("SSH passphrase", timeout).await;
//!
//! ui::step_ok(&ctx, "Secret stored");
//! ```

mod context;
mod output;
mod prompts;

pub use context::UiContext;
pub use output::{
    key_value, key_value_status, section, step_info, step_ok, step_ok_detail, step_warn_hint,
};
pub use prompts::{
    AskpassPrompt, InteractivePrompt, MockPrompt, PasswordPrompt, PromptOutcome, TerminalPrompt,
};

//! UI context for detecting interactive vs unattended environments

use std::io::IsTerminal;

/// UI context that determines output and prompt behavior
#[derive(Debug, Clone)]
pub struct UiContext {
    /// Whether a user can answer on the terminal
    interactive: bool,
    /// Whether a graphical session is reachable
    graphical: bool,
    /// Whether stdout is a terminal (styled output)
    fancy: bool,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        Self {
            interactive: Self::detect_interactive(),
            graphical: Self::detect_graphical(),
            fancy: std::io::stdout().is_terminal(),
        }
    }

    /// Create a context where nobody can be asked anything (scheduled jobs, tests)
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            graphical: false,
            fancy: false,
        }
    }

    /// Override graphical session detection
    pub fn with_graphical(mut self, graphical: bool) -> Self {
        self.graphical = graphical;
        self
    }

    /// Check if terminal prompts can be shown
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Check if a graphical askpass helper could be shown
    pub fn is_graphical(&self) -> bool {
        self.graphical
    }

    /// Check if we should use fancy output (colors, cliclack log lines)
    pub fn use_fancy_output(&self) -> bool {
        self.fancy
    }

    /// Detect if someone is sitting at the terminal
    ///
    /// Prompts go to stderr, so stdout may be captured.
    fn detect_interactive() -> bool {
        if !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
            return false;
        }

        // Check for CI environment variables
        if std::env::var("CI").is_ok() {
            return false;
        }

        let ci_vars = [
            "GITHUB_ACTIONS",
            "GITLAB_CI",
            "CIRCLECI",
            "JENKINS_URL",
            "BUILDKITE",
        ];

        !ci_vars.iter().any(|var| std::env::var(var).is_ok())
    }

    fn detect_graphical() -> bool {
        ["DISPLAY", "WAYLAND_DISPLAY"]
            .iter()
            .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_context() {
        let ctx = UiContext::non_interactive();
        assert!(!ctx.is_interactive());
        assert!(!ctx.is_graphical());
        assert!(!ctx.use_fancy_output());
    }

    #[test]
    fn with_graphical() {
        let ctx = UiContext::non_interactive().with_graphical(true);
        assert!(ctx.is_graphical());
        assert!(!ctx.is_interactive());
    }
}

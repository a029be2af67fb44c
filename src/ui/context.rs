//! UI context for detecting interactive vs CI environments

use std::io::IsTerminal;

/// Environment variables whose presence means a CI runner
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// Disables spinners and colors regardless of the terminal
const PLAIN_VAR: &str = "KILN_PLAIN";

/// UI context that determines output behavior
#[derive(Debug, Clone)]
pub struct UiContext {
    interactive: bool,
    auto_yes: bool,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        let interactive = interactive_for(
            std::io::stdout().is_terminal(),
            std::io::stdin().is_terminal(),
            |var| std::env::var_os(var).is_some(),
        );
        Self {
            interactive,
            auto_yes: false,
        }
    }

    /// Plain output, no prompts (tests and piped runs)
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            auto_yes: false,
        }
    }

    /// Answer yes to every confirmation
    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    /// Spinners, progress bars and cliclack framing
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}

/// Interactive only on a TTY for both stdin and stdout, outside CI, and
/// without `KILN_PLAIN`
fn interactive_for(stdout_tty: bool, stdin_tty: bool, is_set: impl Fn(&str) -> bool) -> bool {
    stdout_tty
        && stdin_tty
        && !is_set(PLAIN_VAR)
        && !CI_VARS.iter().any(|var| is_set(var))
}

//! Terminal status lines and formatting.
//!
//! Status lines go to stderr so `kiln build` output stays pipe-friendly.

mod format;
mod messages;

pub use format::{format_batch, format_duration, print_batch_summary};
pub use messages::{error, info, module_outcome, success, warning};

/// Detects common CI environments.
pub fn is_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "CIRCLECI", "TRAVIS"]
        .iter()
        .any(|var| std::env::var_os(var).is_some())
}

/// Whether stderr should be colored. `NO_COLOR` beats `FORCE_COLOR`.
pub fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }

    console::user_attended_stderr() && !is_ci()
}

/// Apply the color decision to `owo-colors` and `console`.
pub fn init_colors() {
    let enabled = should_use_color();
    owo_colors::set_override(enabled);
    console::set_colors_enabled_stderr(enabled);
}

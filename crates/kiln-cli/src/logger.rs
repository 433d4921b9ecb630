//! Logging setup for the kiln binary.
//!
//! Level selection, in order:
//! 1. `--verbose` (or `debug = true` in config): DEBUG for kiln crates
//! 2. `--quiet`: errors only
//! 3. `RUST_LOG`
//! 4. INFO for kiln crates

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub(crate) const VERBOSE_FILTER: &str =
    "kiln=debug,kiln_cli=debug,kiln_core=debug,kiln_config=debug,kiln_modules=debug";
pub(crate) const QUIET_FILTER: &str = "kiln=error,kiln_cli=error,kiln_core=error";
pub(crate) const DEFAULT_FILTER: &str =
    "kiln=info,kiln_cli=info,kiln_core=info,kiln_config=info,kiln_modules=info";

/// Initialize the global tracing subscriber. Call once, before any logging.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    init_logger_with_filter(filter, no_color);
}

/// Initialize with an explicit filter.
///
/// Does nothing if a global subscriber is already installed, so tests can
/// call it repeatedly.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && should_use_colors())
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Whether ANSI colors should be used on stderr.
///
/// `NO_COLOR` wins over `FORCE_COLOR`; otherwise the terminal decides.
pub fn should_use_colors() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }

    console::Term::stderr().features().colors_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn filters_parse() {
        for directives in [VERBOSE_FILTER, QUIET_FILTER, DEFAULT_FILTER] {
            EnvFilter::try_new(directives).unwrap();
        }
    }

    #[test]
    #[serial]
    fn no_color_overrides_force_color() {
        unsafe {
            std::env::set_var("NO_COLOR", "1");
            std::env::set_var("FORCE_COLOR", "1");
        }
        assert!(!should_use_colors());

        unsafe { std::env::remove_var("NO_COLOR") };
        assert!(should_use_colors());

        unsafe { std::env::remove_var("FORCE_COLOR") };
    }

    #[test]
    fn init_is_repeatable() {
        init_logger_with_filter(EnvFilter::new("off"), true);
        init_logger_with_filter(EnvFilter::new("off"), true);
    }
}

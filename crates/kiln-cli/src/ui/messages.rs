//! Status lines on stderr: a symbol, then the message.
//!
//! Coloring follows the decision made once in `ui::init_colors`.

use std::time::Duration;

use kiln_core::ModuleOutcome;
use owo_colors::{OwoColorize, Stream, Style};

use super::format::format_duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Success,
    Info,
    Warning,
    Error,
}

impl Level {
    fn symbol(self) -> &'static str {
        match self {
            Level::Success => "✓",
            Level::Info => "ℹ",
            Level::Warning => "⚠",
            Level::Error => "✗",
        }
    }

    fn symbol_style(self) -> Style {
        match self {
            Level::Success => Style::new().green().bold(),
            Level::Info => Style::new().blue().bold(),
            Level::Warning => Style::new().yellow().bold(),
            Level::Error => Style::new().red().bold(),
        }
    }

    /// Warnings and errors tint the message too.
    fn text_style(self) -> Style {
        match self {
            Level::Warning => Style::new().yellow(),
            Level::Error => Style::new().red(),
            Level::Success | Level::Info => Style::new(),
        }
    }
}

fn emit(level: Level, message: &str) {
    eprintln!(
        "{} {}",
        level
            .symbol()
            .if_supports_color(Stream::Stderr, |s| s.style(level.symbol_style())),
        message.if_supports_color(Stream::Stderr, |s| s.style(level.text_style()))
    );
}

pub fn success(message: &str) {
    emit(Level::Success, message);
}

pub fn info(message: &str) {
    emit(Level::Info, message);
}

pub fn warning(message: &str) {
    emit(Level::Warning, message);
}

pub fn error(message: &str) {
    emit(Level::Error, message);
}

fn module_line(outcome: &ModuleOutcome) -> (Level, String) {
    let elapsed = format_duration(Duration::from_millis(outcome.duration_ms));
    match &outcome.result {
        Ok(()) => (
            Level::Success,
            format!("Module '{}' finished in {}", outcome.name, elapsed),
        ),
        Err(err) => (Level::Error, format!("{} ({})", err, elapsed)),
    }
}

/// Print how one module run ended. Returns `false` if it failed.
pub fn module_outcome(outcome: &ModuleOutcome) -> bool {
    let (level, line) = module_line(outcome);
    emit(level, &line);
    level != Level::Error
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::ModuleError;

    fn outcome(result: Result<(), ModuleError>) -> ModuleOutcome {
        ModuleOutcome {
            name: "sprites".into(),
            result,
            duration_ms: 40,
        }
    }

    #[test]
    fn module_lines_carry_name_and_duration() {
        let (level, line) = module_line(&outcome(Ok(())));
        assert_eq!(level, Level::Success);
        assert_eq!(line, "Module 'sprites' finished in 40ms");

        let (level, line) = module_line(&outcome(Err(ModuleError::Failed {
            module: "sprites".into(),
            message: "entry directory missing".into(),
        })));
        assert_eq!(level, Level::Error);
        assert!(line.contains("entry directory missing"));
        assert!(line.ends_with("(40ms)"));
    }

    #[test]
    fn module_outcome_reports_failure() {
        assert!(module_outcome(&outcome(Ok(()))));
        assert!(!module_outcome(&outcome(Err(ModuleError::Failed {
            module: "images".into(),
            message: "boom".into(),
        }))));
    }

    #[test]
    fn symbols_match_levels() {
        let symbols: Vec<_> = [Level::Success, Level::Info, Level::Warning, Level::Error]
            .into_iter()
            .map(Level::symbol)
            .collect();
        assert_eq!(symbols, ["✓", "ℹ", "⚠", "✗"]);
    }
}

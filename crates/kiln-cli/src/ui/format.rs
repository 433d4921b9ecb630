//! Formatting for durations and batch outcomes.

use std::time::Duration;

use kiln_core::BatchReport;

use super::messages;

/// Format a duration as `50ms`, `1.50s` or `1m 30s`.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// One line describing a processed batch.
///
/// Per-step details (compiler diagnostics included) are logged by the
/// orchestrator; this is the summary shown after them.
pub fn format_batch(report: &BatchReport) -> String {
    let categories = |failed: bool| {
        report
            .results
            .iter()
            .filter(|result| result.failed() == failed)
            .map(|result| result.category.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let built = categories(false);
    let failed = categories(true);
    let elapsed = format_duration(Duration::from_millis(report.duration_ms));

    let mut line = match (built.is_empty(), failed.is_empty()) {
        (true, true) => format!("Nothing to rebuild ({elapsed})"),
        (false, true) => format!("Rebuilt {built} in {elapsed}"),
        (true, false) => format!("Failed: {failed} ({elapsed})"),
        (false, false) => format!("Rebuilt {built}, failed: {failed} ({elapsed})"),
    };

    if !report.reloaded.is_empty() {
        line.push_str(&format!(", reloaded {} file(s)", report.reloaded.len()));
    }
    line
}

pub fn print_batch_summary(report: &BatchReport) {
    let line = format_batch(report);
    if report.failures().next().is_some() {
        messages::error(&line);
    } else {
        messages::success(&line);
    }

    if let Some(err) = &report.reload_error {
        messages::warning(&format!("Live reload failed: {}", err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{BuildStepError, BuildStepResult, Category, ChangeSummary};
    use std::path::PathBuf;

    fn result(category: Category, failed: bool) -> BuildStepResult {
        BuildStepResult {
            category,
            succeeded: !failed,
            error: failed.then(|| BuildStepError::Failed {
                category,
                message: "exit status 1".into(),
                diagnostics: None,
            }),
            duration_ms: 10,
        }
    }

    fn report(results: Vec<BuildStepResult>, reloaded: usize) -> BatchReport {
        BatchReport {
            changes: ChangeSummary::default(),
            results,
            reloaded: (0..reloaded).map(|i| PathBuf::from(format!("f{i}"))).collect(),
            reload_error: None,
            duration_ms: 1500,
        }
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
    }

    #[test]
    fn batch_lines() {
        let ok = report(
            vec![result(Category::Template, false), result(Category::Style, false)],
            2,
        );
        assert_eq!(
            format_batch(&ok),
            "Rebuilt template, style in 1.50s, reloaded 2 file(s)"
        );

        let mixed = report(
            vec![result(Category::Style, true), result(Category::Script, false)],
            1,
        );
        assert_eq!(
            format_batch(&mixed),
            "Rebuilt script, failed: style (1.50s), reloaded 1 file(s)"
        );

        assert_eq!(format_batch(&report(vec![], 0)), "Nothing to rebuild (1.50s)");
    }
}

use crate::orchestrator::RunReport;
use std::fmt::Write;

/// Renders a run as a short human summary
///
/// ```text
/// strategy thread-pool, width 4: 9 succeeded, 1 failed, elapsed 1.23s
///   FAILED https://example.com/broken: fetch failed: HTTP status 500
/// ```
pub fn format_run_report(report: &RunReport) -> String {
    let mut out = format!(
        "strategy {}, width {}: {} succeeded, {} failed, elapsed {:.2}s\n",
        report.strategy,
        report.width,
        report.succeeded.len(),
        report.failed.len(),
        report.elapsed.as_secs_f64()
    );

    for (url, err) in &report.failed {
        // Writing to a String cannot fail
        let _ = writeln!(out, "  FAILED {}: {}", url, err);
    }

    out
}

pub fn print_run_report(report: &RunReport) {
    print!("{}", format_run_report(report));
}

/// Side-by-side table for several strategies over the same URL list
pub fn format_comparison(reports: &[RunReport]) -> String {
    let mut out = format!(
        "{:<14} {:>6} {:>10} {:>8} {:>10}\n",
        "strategy", "width", "succeeded", "failed", "elapsed"
    );

    for report in reports {
        let _ = writeln!(
            out,
            "{:<14} {:>6} {:>10} {:>8} {:>9.2}s",
            report.strategy.as_str(),
            report.width,
            report.succeeded.len(),
            report.failed.len(),
            report.elapsed.as_secs_f64()
        );
    }

    out
}

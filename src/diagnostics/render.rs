//! Human-readable rendering of reports for the terminal

use colored::Colorize;
use std::fmt::Write;

use super::{CorpusReport, Severity, ValidationIssue};

fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Error => "error".red().bold().to_string(),
        Severity::Warning => "warning".yellow().bold().to_string(),
    }
}

/// One line per issue: `error[rule] kind id /path: message`
pub fn render_issue(issue: &ValidationIssue) -> String {
    let path = if issue.element_path.is_empty() {
        String::new()
    } else {
        format!(" {}", issue.element_path.cyan())
    };
    format!(
        "{}[{}] {}{}: {}",
        severity_label(issue.severity),
        issue.rule_id,
        issue.document,
        path,
        issue.message
    )
}

pub fn render_corpus(report: &CorpusReport) -> String {
    let mut out = String::new();
    for issue in report.issues() {
        let _ = writeln!(out, "{}", render_issue(issue));
    }
    if report.cancelled {
        let _ = writeln!(out, "{}", "Validation was cancelled; the report is partial".yellow());
    }
    let _ = writeln!(
        out,
        "{}",
        summary(report.error_count(), report.warning_count(), report.dataset_count())
    );
    out
}

fn summary(errors: usize, warnings: usize, datasets: usize) -> String {
    let counts = format!("{errors} error(s), {warnings} warning(s) in {datasets} datasets");
    if errors > 0 {
        format!("{} {counts}", "✗".red())
    } else {
        format!("{} {counts}", "✓".green())
    }
}

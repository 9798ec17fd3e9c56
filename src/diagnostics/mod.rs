//! Issues, reports, and the aggregator that merges them

mod aggregator;
pub mod render;

pub use aggregator::{Cancellation, CorpusReport, DiagnosticsAggregator};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::models::DatasetRef;
use crate::validation::RuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Advisory; the data can still be used
    Warning,
    /// The data cannot be trusted for computation
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// One finding about one element of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub document: DatasetRef,
    pub element_path: String,
    pub rule_id: RuleId,
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        document: DatasetRef,
        element_path: impl Into<String>,
        rule_id: RuleId,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            document,
            element_path: element_path.into(),
            rule_id,
            severity,
            message: message.into(),
        }
    }

    pub fn error(
        document: DatasetRef,
        element_path: impl Into<String>,
        rule_id: RuleId,
        message: impl Into<String>,
    ) -> Self {
        Self::new(document, element_path, rule_id, Severity::Error, message)
    }

    pub fn warning(
        document: DatasetRef,
        element_path: impl Into<String>,
        rule_id: RuleId,
        message: impl Into<String>,
    ) -> Self {
        Self::new(document, element_path, rule_id, Severity::Warning, message)
    }

    fn dedup_key(&self) -> IssueKey {
        (self.document.clone(), self.element_path.clone(), self.rule_id)
    }
}

type IssueKey = (DatasetRef, String, RuleId);

/// Issues deduplicated by (document, element path, rule), iterated in that order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    issues: BTreeMap<IssueKey, ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an issue; a duplicate keeps whichever copy has the higher severity
    pub fn push(&mut self, issue: ValidationIssue) {
        let key = issue.dedup_key();
        match self.issues.get(&key) {
            Some(existing) if existing.severity >= issue.severity => {}
            _ => {
                self.issues.insert(key, issue);
            }
        }
    }

    pub fn merge(&mut self, other: ValidationReport) {
        for issue in other.issues.into_values() {
            self.push(issue);
        }
    }

    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.values()
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.issues().filter(|i| i.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues().filter(|i| i.severity == Severity::Warning).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Issues raised by `rule`
    pub fn by_rule(&self, rule: RuleId) -> Vec<&ValidationIssue> {
        self.issues().filter(|i| i.rule_id == rule).collect()
    }
}

impl Extend<ValidationIssue> for ValidationReport {
    fn extend<I: IntoIterator<Item = ValidationIssue>>(&mut self, iter: I) {
        for issue in iter {
            self.push(issue);
        }
    }
}

impl FromIterator<ValidationIssue> for ValidationReport {
    fn from_iter<I: IntoIterator<Item = ValidationIssue>>(iter: I) -> Self {
        let mut report = Self::new();
        report.extend(iter);
        report
    }
}

impl Serialize for ValidationReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.issues())
    }
}

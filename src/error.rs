//! Failures of the document store

use miette::Diagnostic;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{DatasetKey, DatasetKind};

/// Why a dataset could not be loaded. Cloneable so one coalesced load can answer every waiter.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("{key} not found (searched: {})", display_searched(.searched))]
    #[diagnostic(
        code(vellum::load::not_found),
        help("check the reference's uri or add the dataset to the corpus")
    )]
    NotFound { key: DatasetKey, searched: Vec<String> },

    #[error("{key} at {location} could not be parsed: {reason}")]
    #[diagnostic(code(vellum::load::unparseable))]
    Unparseable {
        key: DatasetKey,
        location: String,
        reason: String,
    },

    #[error("dataset {id} was requested as a {expected} but is a {found}")]
    #[diagnostic(code(vellum::load::kind_mismatch))]
    KindMismatch {
        id: Uuid,
        expected: DatasetKind,
        found: DatasetKind,
    },

    #[error("loading {key} timed out after {after_ms} ms")]
    #[diagnostic(code(vellum::load::timeout))]
    Timeout { key: DatasetKey, after_ms: u64 },

    #[error("{key} has different content at {first} and {second}")]
    #[diagnostic(
        code(vellum::load::conflicting_content),
        help("two locations declare the same dataset id; keep one copy")
    )]
    ConflictingContent {
        key: DatasetKey,
        first: String,
        second: String,
    },
}

fn display_searched(searched: &[String]) -> String {
    if searched.is_empty() {
        "no candidate locations".to_string()
    } else {
        searched.join(", ")
    }
}

impl LoadError {
    /// Short tag naming the variant, used in issue messages and logs
    pub fn cause_tag(&self) -> &'static str {
        match self {
            LoadError::NotFound { .. } => "NotFound",
            LoadError::Unparseable { .. } => "Unparseable",
            LoadError::KindMismatch { .. } => "KindMismatch",
            LoadError::Timeout { .. } => "Timeout",
            LoadError::ConflictingContent { .. } => "ConflictingContent",
        }
    }
}

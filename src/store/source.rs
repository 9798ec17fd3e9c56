//! The parsing collaborator: turns a location into a typed `Document`

use std::fmt;
use std::path::{Path, PathBuf};

use crate::models::Document;

/// Where a document can be read from: a file path or a URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(String);

impl Location {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Nothing exists at the location
    NotFound,
    /// Something exists but could not be read
    Io(String),
    /// Read, but not a well-formed document
    Parse(String),
}

/// Reads already-structured documents. Implementations are called from blocking worker threads.
pub trait DocumentSource: Send + Sync {
    fn read(&self, location: &Location) -> Result<Document, SourceError>;
}

/// Reads YAML or JSON document files from disk
#[derive(Debug, Clone, Default)]
pub struct FsSource;

impl FsSource {
    pub fn new() -> Self {
        Self
    }

    fn is_json(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }
}

impl DocumentSource for FsSource {
    fn read(&self, location: &Location) -> Result<Document, SourceError> {
        let path = PathBuf::from(location.as_str());
        let content = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound,
            _ => SourceError::Io(e.to_string()),
        })?;

        if Self::is_json(&path) {
            serde_json::from_str(&content).map_err(|e| SourceError::Parse(e.to_string()))
        } else {
            serde_yaml::from_str(&content).map_err(|e| SourceError::Parse(e.to_string()))
        }
    }
}

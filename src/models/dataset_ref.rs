use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The five dataset types a reference can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Process,
    Flow,
    FlowProperty,
    UnitGroup,
    Unit,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Process => "process",
            DatasetKind::Flow => "flow",
            DatasetKind::FlowProperty => "flow property",
            DatasetKind::UnitGroup => "unit group",
            DatasetKind::Unit => "unit",
        }
    }

    /// Conventional ILCD directory for datasets of this kind
    pub fn directory_name(&self) -> &'static str {
        match self {
            DatasetKind::Process => "processes",
            DatasetKind::Flow => "flows",
            DatasetKind::FlowProperty => "flowproperties",
            DatasetKind::UnitGroup => "unitgroups",
            DatasetKind::Unit => "units",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a dataset inside a corpus. Cache entries and graph nodes are keyed by this,
/// never by the path a document was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetKey {
    pub kind: DatasetKind,
    pub id: Uuid,
}

impl DatasetKey {
    pub fn new(kind: DatasetKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    /// A hint-less, versionless reference to this dataset
    pub fn to_ref(self) -> DatasetRef {
        DatasetRef::new(self.kind, self.id)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// A typed pointer from one dataset to another (ILCD `GlobalReferenceType`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetRef {
    pub kind: DatasetKind,
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Relative location of the target, tried before the corpus index
    #[serde(default, rename = "uri", skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<String>,
}

impl DatasetRef {
    pub fn new(kind: DatasetKind, id: Uuid) -> Self {
        Self {
            kind,
            id,
            version: None,
            location_hint: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_location_hint(mut self, hint: impl Into<String>) -> Self {
        self.location_hint = Some(hint.into());
        self
    }

    pub fn key(&self) -> DatasetKey {
        DatasetKey::new(self.kind, self.id)
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)?;
        if let Some(version) = &self.version {
            write!(f, " v{version}")?;
        }
        Ok(())
    }
}

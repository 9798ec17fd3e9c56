use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::dataset_ref::{DatasetKey, DatasetKind, DatasetRef};

/// A parsed dataset of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Multilingual base name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<LangString>,

    #[serde(flatten)]
    pub body: DocumentBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentBody {
    Process(ProcessBody),
    Flow(FlowBody),
    FlowProperty(FlowPropertyBody),
    UnitGroup(UnitGroupBody),
    Unit(UnitBody),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Geography>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mix_and_location_types: Vec<LangString>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exchanges: Vec<Exchange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cas_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synonyms: Option<ListField>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mix_and_location_types: Vec<LangString>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flow_properties: Vec<FlowPropertyEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowPropertyBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_group: Option<DatasetRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitGroupBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_to_reference_unit: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<UnitEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

/// One input or output line of a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub internal_id: u32,
    pub flow: DatasetRef,
    /// Selects the flow property of the target flow that is authoritative for this exchange
    pub reference_to_reference_flow_property: u32,
    #[serde(rename = "mean_amount")]
    pub amount: f64,
    pub direction: Direction,
    /// Unit label declared by the producer; the resolved chain is authoritative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_value: Option<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowPropertyEntry {
    pub internal_id: u32,
    pub unit_group: DatasetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitEntry {
    pub internal_id: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geography {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gis: Option<GisField>,
}

/// A string with an optional `xml:lang`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangString {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    pub value: String,
}

impl LangString {
    pub fn new(lang: Option<&str>, value: impl Into<String>) -> Self {
        Self {
            lang: lang.map(str::to_string),
            value: value.into(),
        }
    }
}

/// A numeric field as the parsing layer delivered it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    /// The finite numeric value, accepting text that parses as a number
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.filter(|n| n.is_finite())
    }
}

/// A list-like field: sibling elements, or the legacy delimiter-joined string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListField {
    Items(Vec<LangString>),
    Joined(String),
}

/// Geographic coordinates: separate attributes, or the legacy `lat;long` string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GisField {
    Point {
        #[serde(default)]
        latitude: Option<Scalar>,
        #[serde(default)]
        longitude: Option<Scalar>,
    },
    Combined(String),
}

/// Failure to select exactly one element by `internal_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdLookupError {
    Missing,
    Duplicate(usize),
}

pub trait HasInternalId {
    fn internal_id(&self) -> u32;
}

impl HasInternalId for FlowPropertyEntry {
    fn internal_id(&self) -> u32 {
        self.internal_id
    }
}

impl HasInternalId for UnitEntry {
    fn internal_id(&self) -> u32 {
        self.internal_id
    }
}

impl HasInternalId for Exchange {
    fn internal_id(&self) -> u32 {
        self.internal_id
    }
}

/// Select the single element with `internal_id`. Never picks the first of several matches.
pub fn find_by_internal_id<T: HasInternalId>(items: &[T], internal_id: u32) -> Result<&T, IdLookupError> {
    let mut matches = items.iter().filter(|item| item.internal_id() == internal_id);
    let first = matches.next().ok_or(IdLookupError::Missing)?;
    let extra = matches.count();
    if extra > 0 {
        return Err(IdLookupError::Duplicate(extra + 1));
    }
    Ok(first)
}

/// Internal ids used more than once, with their occurrence counts, in ascending id order
pub fn duplicate_internal_ids<T: HasInternalId>(items: &[T]) -> Vec<(u32, usize)> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for item in items {
        *counts.entry(item.internal_id()).or_default() += 1;
    }
    counts.into_iter().filter(|(_, count)| *count > 1).collect()
}

impl Document {
    pub fn kind(&self) -> DatasetKind {
        match &self.body {
            DocumentBody::Process(_) => DatasetKind::Process,
            DocumentBody::Flow(_) => DatasetKind::Flow,
            DocumentBody::FlowProperty(_) => DatasetKind::FlowProperty,
            DocumentBody::UnitGroup(_) => DatasetKind::UnitGroup,
            DocumentBody::Unit(_) => DatasetKind::Unit,
        }
    }

    pub fn key(&self) -> DatasetKey {
        DatasetKey::new(self.kind(), self.id)
    }

    /// The canonical reference naming this document in reports
    pub fn self_ref(&self) -> DatasetRef {
        self.key().to_ref()
    }

    pub fn as_process(&self) -> Option<&ProcessBody> {
        match &self.body {
            DocumentBody::Process(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_flow(&self) -> Option<&FlowBody> {
        match &self.body {
            DocumentBody::Flow(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_unit_group(&self) -> Option<&UnitGroupBody> {
        match &self.body {
            DocumentBody::UnitGroup(body) => Some(body),
            _ => None,
        }
    }

    /// Every reference embedded in this document, paired with its element path
    pub fn references(&self) -> Vec<(String, &DatasetRef)> {
        match &self.body {
            DocumentBody::Process(process) => process
                .exchanges
                .iter()
                .enumerate()
                .map(|(i, exchange)| (format!("/exchanges/{i}/flow"), &exchange.flow))
                .collect(),
            DocumentBody::Flow(flow) => flow
                .flow_properties
                .iter()
                .enumerate()
                .map(|(i, entry)| (format!("/flow_properties/{i}/unit_group"), &entry.unit_group))
                .collect(),
            DocumentBody::FlowProperty(property) => property
                .unit_group
                .iter()
                .map(|reference| ("/unit_group".to_string(), reference))
                .collect(),
            DocumentBody::UnitGroup(_) | DocumentBody::Unit(_) => Vec::new(),
        }
    }

    /// SHA-256 over the canonical JSON encoding, used to compare copies read from different locations
    pub fn content_digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

//! The rule registry

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use super::field_rules::{
    CasNumberRule, CoordinatesRule, MixAndLocationTypeRule, MultilangDuplicateRule,
    RequiredFieldRule, StringLengthRule, StructuredListRule, VariableMeanValueRule,
};
use super::reference_validator::{
    ExchangeUnitChainRule, ExchangeUnitNameRule, ReferenceAvailabilityRule, ReferenceUnitRule,
    ReferenceVersionRule, UniqueInternalIdRule,
};
use crate::config::VellumConfig;
use crate::diagnostics::ValidationIssue;
use crate::error::LoadError;
use crate::models::{DatasetKind, DatasetRef, Document};
use crate::resolver::ExchangeResolution;
use crate::store::LoadOutcome;

/// Stable identifier of a validation rule, as it appears in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleId {
    CasNumber,
    MixAndLocationType,
    RequiredField,
    VariableMeanValue,
    StructuredList,
    Coordinates,
    ReferenceAvailable,
    ReferenceVersion,
    StringLength,
    MultilangDuplicate,
    UniqueInternalId,
    ReferenceUnit,
    ExchangeUnitChain,
    ExchangeUnitName,
    DatasetLoad,
    ConflictingCopies,
    ReferenceCycle,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::CasNumber => "cas-number",
            RuleId::MixAndLocationType => "mix-and-location-type",
            RuleId::RequiredField => "required-field",
            RuleId::VariableMeanValue => "variable-mean-value",
            RuleId::StructuredList => "structured-list",
            RuleId::Coordinates => "coordinates",
            RuleId::ReferenceAvailable => "reference-available",
            RuleId::ReferenceVersion => "reference-version",
            RuleId::StringLength => "string-length",
            RuleId::MultilangDuplicate => "multilang-duplicate",
            RuleId::UniqueInternalId => "unique-internal-id",
            RuleId::ReferenceUnit => "reference-unit",
            RuleId::ExchangeUnitChain => "exchange-unit-chain",
            RuleId::ExchangeUnitName => "exchange-unit-name",
            RuleId::DatasetLoad => "dataset-load",
            RuleId::ConflictingCopies => "conflicting-copies",
            RuleId::ReferenceCycle => "reference-cycle",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Reports sort by the textual id
impl Ord for RuleId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for RuleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for RuleId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Everything a rule may consult besides the document itself
pub struct RuleContext<'a> {
    pub config: &'a VellumConfig,
    /// Load outcome per embedded reference; `None` when validating without a store
    pub references: Option<HashMap<DatasetRef, LoadOutcome>>,
    /// References whose location hint holds a copy differing from the one the store serves
    pub conflicts: HashMap<DatasetRef, LoadError>,
    /// Unit resolution per exchange; `None` without a store
    pub resolutions: Option<Vec<ExchangeResolution>>,
}

impl<'a> RuleContext<'a> {
    /// A context for validating a document on its own
    pub fn offline(config: &'a VellumConfig) -> Self {
        Self {
            config,
            references: None,
            conflicts: HashMap::new(),
            resolutions: None,
        }
    }

    pub fn reference_outcome(&self, reference: &DatasetRef) -> Option<&LoadOutcome> {
        self.references.as_ref()?.get(reference)
    }
}

/// One independent check over a document
pub trait Rule: Send + Sync {
    fn id(&self) -> RuleId;

    fn applies_to(&self, kind: DatasetKind) -> bool;

    fn check(&self, doc: &Document, ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>);
}

/// Every built-in rule
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(RequiredFieldRule),
        Box::new(CasNumberRule),
        Box::new(MixAndLocationTypeRule),
        Box::new(VariableMeanValueRule),
        Box::new(StructuredListRule),
        Box::new(CoordinatesRule),
        Box::new(StringLengthRule),
        Box::new(MultilangDuplicateRule),
        Box::new(UniqueInternalIdRule),
        Box::new(ReferenceUnitRule),
        Box::new(ReferenceAvailabilityRule),
        Box::new(ReferenceVersionRule),
        Box::new(ExchangeUnitChainRule),
        Box::new(ExchangeUnitNameRule),
    ]
}

//! Per-field rules: value patterns, enumerations, shapes, and presence

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use super::rules::{Rule, RuleContext, RuleId};
use crate::diagnostics::{Severity, ValidationIssue};
use crate::models::{DatasetKind, DatasetRef, Document, DocumentBody, GisField, ListField, Scalar};

/// `[0-9]` rather than `\d`, which would admit non-ASCII digits
static CAS_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{2,7}-[0-9]{2}-[0-9]$").expect("CAS pattern is valid"));

pub const MIX_AND_LOCATION_TYPES: [&str; 4] = [
    "at producer",
    "production mix",
    "consumption mix",
    "post-consumer",
];

/// A field value in the shape the parsing layer delivered it
#[derive(Debug, Clone, Copy)]
pub enum FieldValue<'a> {
    Absent,
    Text(&'a str),
    Scalar(&'a Scalar),
    List(&'a ListField),
    Gis(&'a GisField),
}

/// Evaluate one field-level rule. `None` means the value passes, or that the rule
/// has nothing to say about a value of this shape.
pub fn check_field(
    rule: RuleId,
    value: FieldValue<'_>,
    max_length: Option<usize>,
) -> Option<(Severity, String)> {
    let error = |message: String| Some((Severity::Error, message));

    match (rule, value) {
        (RuleId::RequiredField, FieldValue::Absent) => error("required field is missing".to_string()),
        (RuleId::CasNumber, FieldValue::Text(cas)) if !CAS_NUMBER.is_match(cas) => error(format!(
            "CAS number {cas:?} does not match the pattern of 2 to 7 digits, 2 digits, 1 check digit"
        )),
        (RuleId::MixAndLocationType, FieldValue::Text(text))
            if !MIX_AND_LOCATION_TYPES.contains(&text) =>
        {
            error(format!(
                "{text:?} is not a mix and location type; expected one of: {}",
                MIX_AND_LOCATION_TYPES.join(", ")
            ))
        }
        (RuleId::VariableMeanValue, FieldValue::Scalar(scalar)) if scalar.as_number().is_none() => {
            error(format!("mean value {} is not a finite number", display_scalar(scalar)))
        }
        (RuleId::StructuredList, FieldValue::List(ListField::Joined(joined))) => {
            let parts = split_joined(joined);
            (parts.len() > 1).then(|| {
                let suggested: Vec<String> = parts.iter().map(|p| format!("{p:?}")).collect();
                (
                    Severity::Error,
                    format!(
                        "{joined:?} is a single delimiter-joined string; expected one entry per value, e.g. [{}]",
                        suggested.join(", ")
                    ),
                )
            })
        }
        (RuleId::Coordinates, FieldValue::Gis(gis)) => coordinate_problems(gis)
            .into_iter()
            .next()
            .map(|(_, message)| (Severity::Error, message)),
        (RuleId::StringLength, FieldValue::Text(text)) => {
            let max = max_length?;
            let length = text.chars().count();
            (length > max).then(|| {
                (
                    Severity::Warning,
                    format!("{length} characters exceeds the documented maximum of {max}"),
                )
            })
        }
        _ => None,
    }
}

fn display_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Number(n) => n.to_string(),
        Scalar::Text(s) => format!("{s:?}"),
    }
}

fn split_joined(joined: &str) -> Vec<&str> {
    joined
        .split([';', ','])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

fn check_coordinate(name: &str, value: &Scalar, limit: f64) -> Option<String> {
    if let Scalar::Text(text) = value {
        if text.contains([';', ',']) {
            return Some(format!("{name} {text:?} is a joined string, not a single number"));
        }
    }
    match value.as_number() {
        None => Some(format!("{name} {} is not numeric", display_scalar(value))),
        Some(n) if !(-limit..=limit).contains(&n) => {
            Some(format!("{name} {n} is outside [-{limit}, {limit}]"))
        }
        Some(_) => None,
    }
}

/// Shape and range problems of a coordinate pair, with the attribute each concerns.
/// Absent attributes are left to the required-field rule.
pub fn coordinate_problems(gis: &GisField) -> Vec<(&'static str, String)> {
    match gis {
        GisField::Combined(raw) => vec![(
            "",
            format!(
                "coordinates given as the combined string {raw:?}; expected separate numeric latitude and longitude attributes"
            ),
        )],
        GisField::Point {
            latitude,
            longitude,
        } => {
            let mut problems = Vec::new();
            if let Some(message) = latitude.as_ref().and_then(|v| check_coordinate("latitude", v, 90.0)) {
                problems.push(("latitude", message));
            }
            if let Some(message) =
                longitude.as_ref().and_then(|v| check_coordinate("longitude", v, 180.0))
            {
                problems.push(("longitude", message));
            }
            problems
        }
    }
}

fn push_check(
    issues: &mut Vec<ValidationIssue>,
    doc_ref: &DatasetRef,
    path: String,
    rule: RuleId,
    value: FieldValue<'_>,
    max_length: Option<usize>,
) {
    if let Some((severity, message)) = check_field(rule, value, max_length) {
        issues.push(ValidationIssue::new(doc_ref.clone(), path, rule, severity, message));
    }
}

/// Presence of fields other rules presuppose; absence is reported here and only here
pub struct RequiredFieldRule;

impl Rule for RequiredFieldRule {
    fn id(&self) -> RuleId {
        RuleId::RequiredField
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        matches!(kind, DatasetKind::Process | DatasetKind::UnitGroup)
    }

    fn check(&self, doc: &Document, _ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let doc_ref = doc.self_ref();
        let mut missing = |path: String| {
            let field = path.rsplit('/').next().unwrap_or_default().to_string();
            issues.push(ValidationIssue::error(
                doc_ref.clone(),
                path,
                RuleId::RequiredField,
                format!("required field `{field}` is missing"),
            ));
        };

        match &doc.body {
            DocumentBody::Process(process) => {
                for (i, exchange) in process.exchanges.iter().enumerate() {
                    if exchange.unit_name.is_none() {
                        missing(format!("/exchanges/{i}/unit_name"));
                    }
                }
                for (i, variable) in process.variables.iter().enumerate() {
                    if variable.mean_value.is_none() {
                        missing(format!("/variables/{i}/mean_value"));
                    }
                }
                if let Some(GisField::Point {
                    latitude,
                    longitude,
                }) = process.location.as_ref().and_then(|l| l.gis.as_ref())
                {
                    if latitude.is_none() {
                        missing("/location/gis/latitude".to_string());
                    }
                    if longitude.is_none() {
                        missing("/location/gis/longitude".to_string());
                    }
                }
            }
            DocumentBody::UnitGroup(group) => {
                if group.reference_to_reference_unit.is_none() {
                    missing("/reference_to_reference_unit".to_string());
                }
            }
            _ => {}
        }
    }
}

pub struct CasNumberRule;

impl Rule for CasNumberRule {
    fn id(&self) -> RuleId {
        RuleId::CasNumber
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        kind == DatasetKind::Flow
    }

    fn check(&self, doc: &Document, _ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        if let Some(cas) = doc.as_flow().and_then(|f| f.cas_number.as_deref()) {
            push_check(
                issues,
                &doc.self_ref(),
                "/cas_number".to_string(),
                RuleId::CasNumber,
                FieldValue::Text(cas),
                None,
            );
        }
    }
}

pub struct MixAndLocationTypeRule;

impl Rule for MixAndLocationTypeRule {
    fn id(&self) -> RuleId {
        RuleId::MixAndLocationType
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        matches!(kind, DatasetKind::Process | DatasetKind::Flow)
    }

    fn check(&self, doc: &Document, _ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let entries = match &doc.body {
            DocumentBody::Process(process) => &process.mix_and_location_types,
            DocumentBody::Flow(flow) => &flow.mix_and_location_types,
            _ => return,
        };
        let doc_ref = doc.self_ref();
        for (i, entry) in entries.iter().enumerate() {
            push_check(
                issues,
                &doc_ref,
                format!("/mix_and_location_types/{i}"),
                RuleId::MixAndLocationType,
                FieldValue::Text(&entry.value),
                None,
            );
        }
    }
}

pub struct VariableMeanValueRule;

impl Rule for VariableMeanValueRule {
    fn id(&self) -> RuleId {
        RuleId::VariableMeanValue
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        kind == DatasetKind::Process
    }

    fn check(&self, doc: &Document, _ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let Some(process) = doc.as_process() else {
            return;
        };
        let doc_ref = doc.self_ref();
        for (i, variable) in process.variables.iter().enumerate() {
            if let Some(mean) = &variable.mean_value {
                push_check(
                    issues,
                    &doc_ref,
                    format!("/variables/{i}/mean_value"),
                    RuleId::VariableMeanValue,
                    FieldValue::Scalar(mean),
                    None,
                );
            }
        }
    }
}

pub struct StructuredListRule;

impl Rule for StructuredListRule {
    fn id(&self) -> RuleId {
        RuleId::StructuredList
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        kind == DatasetKind::Flow
    }

    fn check(&self, doc: &Document, _ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        if let Some(synonyms) = doc.as_flow().and_then(|f| f.synonyms.as_ref()) {
            push_check(
                issues,
                &doc.self_ref(),
                "/synonyms".to_string(),
                RuleId::StructuredList,
                FieldValue::List(synonyms),
                None,
            );
        }
    }
}

pub struct CoordinatesRule;

impl Rule for CoordinatesRule {
    fn id(&self) -> RuleId {
        RuleId::Coordinates
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        kind == DatasetKind::Process
    }

    fn check(&self, doc: &Document, _ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let Some(gis) = doc
            .as_process()
            .and_then(|p| p.location.as_ref())
            .and_then(|l| l.gis.as_ref())
        else {
            return;
        };
        let doc_ref = doc.self_ref();
        for (attribute, message) in coordinate_problems(gis) {
            let path = if attribute.is_empty() {
                "/location/gis".to_string()
            } else {
                format!("/location/gis/{attribute}")
            };
            issues.push(ValidationIssue::error(doc_ref.clone(), path, RuleId::Coordinates, message));
        }
    }
}

/// Advisory maximum lengths from configuration
pub struct StringLengthRule;

impl Rule for StringLengthRule {
    fn id(&self) -> RuleId {
        RuleId::StringLength
    }

    fn applies_to(&self, _kind: DatasetKind) -> bool {
        true
    }

    fn check(&self, doc: &Document, ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let doc_ref = doc.self_ref();

        let name_max = ctx.config.max_length("name");
        for (i, entry) in doc.name.iter().enumerate() {
            push_check(
                issues,
                &doc_ref,
                format!("/name/{i}"),
                RuleId::StringLength,
                FieldValue::Text(&entry.value),
                name_max,
            );
        }

        let synonyms_max = ctx.config.max_length("synonyms");
        match doc.as_flow().and_then(|f| f.synonyms.as_ref()) {
            Some(ListField::Items(items)) => {
                for (i, entry) in items.iter().enumerate() {
                    push_check(
                        issues,
                        &doc_ref,
                        format!("/synonyms/{i}"),
                        RuleId::StringLength,
                        FieldValue::Text(&entry.value),
                        synonyms_max,
                    );
                }
            }
            Some(ListField::Joined(joined)) => push_check(
                issues,
                &doc_ref,
                "/synonyms".to_string(),
                RuleId::StringLength,
                FieldValue::Text(joined),
                synonyms_max,
            ),
            None => {}
        }
    }
}

/// A single-valued multilingual field should carry at most one entry per language
pub struct MultilangDuplicateRule;

impl Rule for MultilangDuplicateRule {
    fn id(&self) -> RuleId {
        RuleId::MultilangDuplicate
    }

    fn applies_to(&self, _kind: DatasetKind) -> bool {
        true
    }

    fn check(&self, doc: &Document, _ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in &doc.name {
            *counts.entry(entry.lang.as_deref().unwrap_or("(default)")).or_default() += 1;
        }
        let repeated: Vec<&str> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(lang, _)| lang)
            .collect();
        if !repeated.is_empty() {
            issues.push(ValidationIssue::warning(
                doc.self_ref(),
                "/name",
                RuleId::MultilangDuplicate,
                format!("name has more than one entry for language: {}", repeated.join(", ")),
            ));
        }
    }
}

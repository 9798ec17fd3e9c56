//! Rules that need the targets of a document's references, or its internal id tables

use std::collections::HashMap;

use super::rules::{Rule, RuleContext, RuleId};
use crate::diagnostics::ValidationIssue;
use crate::models::document::{HasInternalId, IdLookupError, duplicate_internal_ids, find_by_internal_id};
use crate::models::{DatasetKind, DatasetRef, Document, DocumentBody};
use crate::resolver::{Hop, ResolutionError};

/// Distinct references of a document in first-use order, with the first usage path and usage count
fn distinct_references(doc: &Document) -> Vec<(&DatasetRef, String, usize)> {
    let mut positions: HashMap<&DatasetRef, usize> = HashMap::new();
    let mut distinct: Vec<(&DatasetRef, String, usize)> = Vec::new();
    for (path, reference) in doc.references() {
        let next = distinct.len();
        let position = *positions.entry(reference).or_insert(next);
        if position == next {
            distinct.push((reference, path, 1));
        } else {
            distinct[position].2 += 1;
        }
    }
    distinct
}

/// The kind every reference of a document of `kind` must point at
fn expected_target(kind: DatasetKind) -> Option<DatasetKind> {
    match kind {
        DatasetKind::Process => Some(DatasetKind::Flow),
        DatasetKind::Flow | DatasetKind::FlowProperty => Some(DatasetKind::UnitGroup),
        DatasetKind::UnitGroup | DatasetKind::Unit => None,
    }
}

/// Every embedded reference must load. One issue per distinct reference, at its first use.
pub struct ReferenceAvailabilityRule;

impl Rule for ReferenceAvailabilityRule {
    fn id(&self) -> RuleId {
        RuleId::ReferenceAvailable
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        expected_target(kind).is_some()
    }

    fn check(&self, doc: &Document, ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let doc_ref = doc.self_ref();
        let expected = expected_target(doc.kind());

        for (reference, path, uses) in distinct_references(doc) {
            let also = if uses > 1 {
                format!(" (referenced {uses} times)")
            } else {
                String::new()
            };

            if let Some(expected) = expected.filter(|expected| *expected != reference.kind) {
                issues.push(ValidationIssue::error(
                    doc_ref.clone(),
                    path,
                    RuleId::ReferenceAvailable,
                    format!("[KindMismatch] {reference} is typed as a {}, expected a {expected}{also}", reference.kind),
                ));
                continue;
            }

            match ctx.reference_outcome(reference) {
                Some(Err(cause)) => issues.push(ValidationIssue::error(
                    doc_ref.clone(),
                    path,
                    RuleId::ReferenceAvailable,
                    format!("[{}] {reference} cannot be resolved: {cause}{also}", cause.cause_tag()),
                )),
                Some(Ok(_)) => {
                    if let Some(conflict) = ctx.conflicts.get(reference) {
                        issues.push(ValidationIssue::error(
                            doc_ref.clone(),
                            path,
                            RuleId::ReferenceAvailable,
                            format!("[{}] {conflict}{also}", conflict.cause_tag()),
                        ));
                    }
                }
                None => {}
            }
        }
    }
}

/// A versioned reference whose target carries a different version
pub struct ReferenceVersionRule;

impl Rule for ReferenceVersionRule {
    fn id(&self) -> RuleId {
        RuleId::ReferenceVersion
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        expected_target(kind).is_some()
    }

    fn check(&self, doc: &Document, ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let doc_ref = doc.self_ref();
        for (reference, path, _) in distinct_references(doc) {
            let Some(wanted) = reference.version.as_deref() else {
                continue;
            };
            let Some(Ok(target)) = ctx.reference_outcome(reference) else {
                continue;
            };
            if let Some(found) = target.version.as_deref().filter(|found| *found != wanted) {
                issues.push(ValidationIssue::warning(
                    doc_ref.clone(),
                    format!("{path}/version"),
                    RuleId::ReferenceVersion,
                    format!("{reference} asks for version {wanted}, the corpus holds {found}"),
                ));
            }
        }
    }
}

fn report_duplicates<T: HasInternalId>(
    doc_ref: &DatasetRef,
    field: &str,
    items: &[T],
    issues: &mut Vec<ValidationIssue>,
) {
    for (internal_id, count) in duplicate_internal_ids(items) {
        let first = items
            .iter()
            .position(|item| item.internal_id() == internal_id)
            .unwrap_or_default();
        issues.push(ValidationIssue::error(
            doc_ref.clone(),
            format!("/{field}/{first}/internal_id"),
            RuleId::UniqueInternalId,
            format!("internal id {internal_id} is used {count} times in {field}"),
        ));
    }
}

/// `internal_id` must be unique within each table of a document
pub struct UniqueInternalIdRule;

impl Rule for UniqueInternalIdRule {
    fn id(&self) -> RuleId {
        RuleId::UniqueInternalId
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        matches!(kind, DatasetKind::Process | DatasetKind::Flow | DatasetKind::UnitGroup)
    }

    fn check(&self, doc: &Document, _ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let doc_ref = doc.self_ref();
        match &doc.body {
            DocumentBody::Process(process) => {
                report_duplicates(&doc_ref, "exchanges", &process.exchanges, issues)
            }
            DocumentBody::Flow(flow) => {
                report_duplicates(&doc_ref, "flow_properties", &flow.flow_properties, issues)
            }
            DocumentBody::UnitGroup(group) => report_duplicates(&doc_ref, "units", &group.units, issues),
            _ => {}
        }
    }
}

/// The declared reference unit of a group must exist
pub struct ReferenceUnitRule;

impl Rule for ReferenceUnitRule {
    fn id(&self) -> RuleId {
        RuleId::ReferenceUnit
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        kind == DatasetKind::UnitGroup
    }

    fn check(&self, doc: &Document, _ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let Some(group) = doc.as_unit_group() else {
            return;
        };
        let Some(reference_unit) = group.reference_to_reference_unit else {
            return;
        };
        // Duplicates are reported by the unique-internal-id rule
        if let Err(IdLookupError::Missing) = find_by_internal_id(&group.units, reference_unit) {
            issues.push(ValidationIssue::error(
                doc.self_ref(),
                "/reference_to_reference_unit",
                RuleId::ReferenceUnit,
                format!("reference unit {reference_unit} selects no unit of this group"),
            ));
        }
    }
}

/// Every exchange must resolve to a unit through the full chain
pub struct ExchangeUnitChainRule;

impl Rule for ExchangeUnitChainRule {
    fn id(&self) -> RuleId {
        RuleId::ExchangeUnitChain
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        kind == DatasetKind::Process
    }

    fn check(&self, doc: &Document, ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let Some(resolutions) = &ctx.resolutions else {
            return;
        };
        let doc_ref = doc.self_ref();
        for resolution in resolutions {
            let Err(error) = &resolution.result else {
                continue;
            };
            // The flow reference itself is covered by reference availability
            if matches!(error, ResolutionError::HopFailed { hop: Hop::Flow, .. }) {
                continue;
            }
            issues.push(ValidationIssue::error(
                doc_ref.clone(),
                format!("/exchanges/{}", resolution.position),
                RuleId::ExchangeUnitChain,
                format!(
                    "cannot resolve the unit of {} at the {} hop: {error}",
                    resolution.exchange,
                    error.hop()
                ),
            ));
        }
    }
}

/// The declared unit label of an exchange should match the resolved unit
pub struct ExchangeUnitNameRule;

impl Rule for ExchangeUnitNameRule {
    fn id(&self) -> RuleId {
        RuleId::ExchangeUnitName
    }

    fn applies_to(&self, kind: DatasetKind) -> bool {
        kind == DatasetKind::Process
    }

    fn check(&self, doc: &Document, ctx: &RuleContext<'_>, issues: &mut Vec<ValidationIssue>) {
        let (Some(process), Some(resolutions)) = (doc.as_process(), &ctx.resolutions) else {
            return;
        };
        let doc_ref = doc.self_ref();
        for resolution in resolutions {
            let position = resolution.position;
            let Some(exchange) = process.exchanges.get(position) else {
                continue;
            };
            let (Some(declared), Ok(resolved)) = (exchange.unit_name.as_deref(), &resolution.result) else {
                continue;
            };
            if declared.trim() != resolved.unit_name.trim() {
                issues.push(ValidationIssue::warning(
                    doc_ref.clone(),
                    format!("/exchanges/{position}/unit_name"),
                    RuleId::ExchangeUnitName,
                    format!(
                        "declared unit {declared:?} differs from {:?} resolved through {}",
                        resolved.unit_name, resolved.trace.unit_group
                    ),
                ));
            }
        }
    }
}

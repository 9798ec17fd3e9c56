use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::field_rules::{FieldValue, check_field};
use super::rules::{Rule, RuleContext, RuleId, default_rules};
use crate::config::VellumConfig;
use crate::diagnostics::{ValidationIssue, ValidationReport};
use crate::models::{DatasetKind, DatasetRef, Document};
use crate::resolver::ReferenceResolver;
use crate::store::{DocumentStore, LoadOutcome};

/// Applies the rule registry to documents. Holds no mutable state; share it behind an `Arc`.
pub struct SemanticValidator {
    resolver: Option<ReferenceResolver>,
    config: VellumConfig,
    rules: Vec<Box<dyn Rule>>,
}

impl SemanticValidator {
    /// A validator that follows references through `store`
    pub fn new(store: Arc<DocumentStore>, config: VellumConfig) -> Self {
        Self {
            resolver: Some(ReferenceResolver::new(store)),
            config,
            rules: default_rules(),
        }
    }

    /// A validator for documents on their own; reference rules stay silent
    pub fn offline(config: VellumConfig) -> Self {
        Self {
            resolver: None,
            config,
            rules: default_rules(),
        }
    }

    pub fn config(&self) -> &VellumConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&Arc<DocumentStore>> {
        self.resolver.as_ref().map(ReferenceResolver::store)
    }

    /// Run every applicable rule over `document`
    pub async fn validate(&self, document: &Document) -> ValidationReport {
        let mut ctx = RuleContext::offline(&self.config);

        if let Some(resolver) = &self.resolver {
            let store = resolver.store();
            let references = load_references(store, document).await;
            for (reference, outcome) in &references {
                if outcome.is_ok() {
                    if let Some(conflict) = store.reference_conflict(reference) {
                        ctx.conflicts.insert(reference.clone(), conflict);
                    }
                }
            }
            ctx.references = Some(references);

            if document.kind() == DatasetKind::Process {
                ctx.resolutions = Some(resolver.resolve_process(document).await);
            }
        }

        let kind = document.kind();
        let mut issues = Vec::new();
        for rule in self.rules.iter().filter(|rule| rule.applies_to(kind)) {
            let before = issues.len();
            rule.check(document, &ctx, &mut issues);
            if issues.len() > before {
                debug!("{}: {} raised {} issue(s)", document.self_ref(), rule.id(), issues.len() - before);
            }
        }

        issues.into_iter().collect()
    }

    /// Check a single field value against one rule, outside any document pass.
    /// The first segment of `element_path` selects the configured maximum length.
    pub fn validate_field(
        &self,
        document: &DatasetRef,
        element_path: &str,
        value: FieldValue<'_>,
        rule: RuleId,
    ) -> Option<ValidationIssue> {
        let field = element_path
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default();
        let (severity, message) = check_field(rule, value, self.config.max_length(field))?;
        Some(ValidationIssue::new(
            document.clone(),
            element_path,
            rule,
            severity,
            message,
        ))
    }
}

/// Load every distinct reference of `document` concurrently
async fn load_references(
    store: &Arc<DocumentStore>,
    document: &Document,
) -> HashMap<DatasetRef, LoadOutcome> {
    let distinct: BTreeSet<DatasetRef> = document
        .references()
        .into_iter()
        .map(|(_, reference)| reference.clone())
        .collect();

    let mut tasks = JoinSet::new();
    for reference in distinct {
        let store = store.clone();
        tasks.spawn(async move {
            let outcome = store.load(&reference).await;
            (reference, outcome)
        });
    }

    let mut outcomes = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((reference, outcome)) => {
                outcomes.insert(reference, outcome);
            }
            Err(e) => warn!("Reference load task failed: {e}"),
        }
    }
    outcomes
}

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{ValidationIssue, ValidationReport};
use crate::config::VellumConfig;
use crate::graph::ReferenceGraph;
use crate::models::{DatasetKey, DatasetRef};
use crate::store::DocumentStore;
use crate::validation::{RuleId, SemanticValidator};

/// Cooperative cancellation of a corpus run. Clones share one flag.
#[derive(Debug, Clone)]
pub struct Cancellation {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns once the flag is set
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Result of a corpus-wide run. Partial when `cancelled` is set.
#[derive(Debug, Clone, Default)]
pub struct CorpusReport {
    pub reports: BTreeMap<DatasetRef, ValidationReport>,
    /// Reference cycles, each as its sorted participants
    pub cycles: Vec<Vec<DatasetKey>>,
    pub cancelled: bool,
}

impl CorpusReport {
    pub fn report(&self, dataset: &DatasetRef) -> Option<&ValidationReport> {
        self.reports.get(&dataset.key().to_ref())
    }

    pub fn dataset_count(&self) -> usize {
        self.reports.len()
    }

    /// All issues in report order
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.reports.values().flat_map(ValidationReport::issues)
    }

    pub fn error_count(&self) -> usize {
        self.reports.values().map(ValidationReport::error_count).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.reports.values().map(ValidationReport::warning_count).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.reports.values().any(ValidationReport::has_errors)
    }
}

impl Serialize for CorpusReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let issues: Vec<&ValidationIssue> = self.issues().collect();
        let mut state = serializer.serialize_struct("CorpusReport", 6)?;
        state.serialize_field("datasets", &self.dataset_count())?;
        state.serialize_field("errors", &self.error_count())?;
        state.serialize_field("warnings", &self.warning_count())?;
        state.serialize_field("cancelled", &self.cancelled)?;
        state.serialize_field("cycles", &self.cycles)?;
        state.serialize_field("issues", &issues)?;
        state.end()
    }
}

/// Outcome of validating one listed dataset
struct DatasetOutcome {
    dataset: DatasetRef,
    report: ValidationReport,
    /// The dataset's identity and the identities it references, when it loaded
    edges: Option<(DatasetKey, Vec<DatasetKey>)>,
}

/// Runs validation over datasets and merges the findings into deterministic reports
pub struct DiagnosticsAggregator {
    validator: Arc<SemanticValidator>,
}

impl DiagnosticsAggregator {
    pub fn new(store: Arc<DocumentStore>, config: VellumConfig) -> Self {
        Self::with_validator(Arc::new(SemanticValidator::new(store, config)))
    }

    pub fn with_validator(validator: Arc<SemanticValidator>) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &Arc<SemanticValidator> {
        &self.validator
    }

    /// Deduplicate and sort raw issues from any source
    pub fn aggregate(issues: impl IntoIterator<Item = ValidationIssue>) -> ValidationReport {
        issues.into_iter().collect()
    }

    /// Validate every dataset the store's index knows about
    pub async fn validate_corpus(&self, cancel: Option<&Cancellation>) -> CorpusReport {
        let datasets: Vec<DatasetRef> = match self.validator.store() {
            Some(store) => store.index().datasets().into_iter().map(DatasetKey::to_ref).collect(),
            None => Vec::new(),
        };
        self.aggregate_corpus(datasets, cancel).await
    }

    /// Validate `datasets` concurrently, one task per dataset.
    ///
    /// A dataset that fails to load gets a `dataset-load` error and the run continues.
    /// A dataset held at several locations with differing content gets a
    /// `conflicting-copies` error once all tasks are done.
    /// On cancellation, reports already finished are kept and the rest are dropped.
    pub async fn aggregate_corpus(
        &self,
        datasets: impl IntoIterator<Item = DatasetRef>,
        cancel: Option<&Cancellation>,
    ) -> CorpusReport {
        let mut corpus = CorpusReport::default();
        let mut tasks = JoinSet::new();

        for dataset in datasets {
            let validator = self.validator.clone();
            tasks.spawn(async move { validate_dataset(&validator, dataset).await });
        }
        debug!("Validating {} datasets", tasks.len());

        let mut graph = ReferenceGraph::new();
        loop {
            let joined = match cancel {
                Some(cancel) => tokio::select! {
                    biased;
                    _ = cancel.cancelled(), if !corpus.cancelled => {
                        info!("Validation cancelled with {} datasets outstanding", tasks.len());
                        corpus.cancelled = true;
                        tasks.abort_all();
                        continue;
                    }
                    joined = tasks.join_next() => joined,
                },
                None => tasks.join_next().await,
            };

            let Some(joined) = joined else {
                break;
            };
            match joined {
                Ok(outcome) => {
                    if let Some((from, targets)) = outcome.edges {
                        graph.add_document(from, targets);
                    }
                    corpus
                        .reports
                        .entry(outcome.dataset)
                        .or_default()
                        .merge(outcome.report);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!("Dataset validation task failed: {e}"),
            }
        }

        // Every referrer has loaded by now, so the recorded conflicts no longer depend on task order
        if let Some(store) = self.validator.store() {
            let datasets: Vec<DatasetRef> = corpus.reports.keys().cloned().collect();
            for dataset in datasets {
                if let Some(conflict) = store.conflict(&dataset.key()) {
                    let issue = ValidationIssue::error(
                        dataset.clone(),
                        "",
                        RuleId::ConflictingCopies,
                        format!("[{}] {conflict}", conflict.cause_tag()),
                    );
                    corpus.reports.entry(dataset).or_default().push(issue);
                }
            }
        }

        for cycle in graph.find_cycles() {
            let Some(first) = cycle.first().copied() else {
                continue;
            };
            let members: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            let issue = ValidationIssue::warning(
                first.to_ref(),
                "",
                RuleId::ReferenceCycle,
                format!("reference cycle through {}", members.join(", ")),
            );
            corpus.reports.entry(first.to_ref()).or_default().push(issue);
            corpus.cycles.push(cycle);
        }

        info!(
            "Validated {} datasets: {} errors, {} warnings{}",
            corpus.dataset_count(),
            corpus.error_count(),
            corpus.warning_count(),
            if corpus.cancelled { " (cancelled)" } else { "" }
        );
        corpus
    }
}

async fn validate_dataset(validator: &SemanticValidator, dataset: DatasetRef) -> DatasetOutcome {
    let identity = dataset.key().to_ref();

    let Some(store) = validator.store() else {
        return DatasetOutcome {
            report: ValidationReport::new(),
            dataset: identity,
            edges: None,
        };
    };

    match store.load(&dataset).await {
        Ok(document) => {
            let targets = document
                .references()
                .into_iter()
                .map(|(_, reference)| reference.key())
                .collect();
            DatasetOutcome {
                report: validator.validate(&document).await,
                dataset: identity,
                edges: Some((document.key(), targets)),
            }
        }
        Err(cause) => {
            let issue = ValidationIssue::error(
                identity.clone(),
                "",
                RuleId::DatasetLoad,
                format!("[{}] {cause}", cause.cause_tag()),
            );
            DatasetOutcome {
                report: DiagnosticsAggregator::aggregate([issue]),
                dataset: identity,
                edges: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::models::{DatasetKind, Document, DocumentBody, FlowPropertyBody, LangString};
    use crate::store::index::MemoryCorpus;
    use crate::store::source::Location;
    use crate::testing::*;
    use std::time::Duration;

    fn flow_property(n: u128, unit_group: DatasetRef) -> Document {
        Document {
            id: id(n),
            version: None,
            name: vec![LangString::new(Some("en"), "Mass")],
            body: DocumentBody::FlowProperty(FlowPropertyBody {
                unit_group: Some(unit_group),
            }),
        }
    }

    fn aggregator_over(corpus: Arc<MemoryCorpus>) -> DiagnosticsAggregator {
        DiagnosticsAggregator::new(
            Arc::new(DocumentStore::in_memory(corpus)),
            VellumConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_clean_corpus() {
        let aggregator = aggregator_over(Arc::new(steel_corpus()));
        let report = aggregator.validate_corpus(None).await;

        assert_eq!(report.dataset_count(), 3);
        assert_eq!(report.error_count(), 0);
        assert!(report.cycles.is_empty());
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_missing_reference_reported_once_per_referrer() {
        let corpus = steel_corpus();
        corpus.remove(&reference(DatasetKind::UnitGroup, MASS_GROUP).key());
        let aggregator = aggregator_over(Arc::new(corpus));
        let report = aggregator.validate_corpus(None).await;

        let missing: Vec<&ValidationIssue> = report
            .issues()
            .filter(|i| i.rule_id == RuleId::ReferenceAvailable)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].document, reference(DatasetKind::Flow, STEEL_FLOW));

        // The process reports the broken chain behind its exchange
        let process_report = report.report(&reference(DatasetKind::Process, STEEL_PROCESS)).unwrap();
        assert_eq!(process_report.by_rule(RuleId::ExchangeUnitChain).len(), 1);
    }

    #[tokio::test]
    async fn test_unloadable_dataset_does_not_stop_run() {
        let corpus = Arc::new(steel_corpus());
        let ghost = reference(DatasetKind::Flow, 0xdead);
        let aggregator = aggregator_over(corpus);

        let report = aggregator
            .aggregate_corpus(
                vec![ghost.clone(), reference(DatasetKind::UnitGroup, MASS_GROUP)],
                None,
            )
            .await;

        assert_eq!(report.dataset_count(), 2);
        let ghost_report = report.report(&ghost).unwrap();
        let issues: Vec<&ValidationIssue> = ghost_report.issues().collect();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id, RuleId::DatasetLoad);
        assert!(issues[0].message.starts_with("[NotFound]"));
        assert!(report.report(&reference(DatasetKind::UnitGroup, MASS_GROUP)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_reported_once() {
        let corpus = MemoryCorpus::new();
        let a = reference(DatasetKind::FlowProperty, 0xa);
        let b = reference(DatasetKind::FlowProperty, 0xb);
        let c = reference(DatasetKind::FlowProperty, 0xc);
        corpus.insert(flow_property(0xa, b.clone()));
        corpus.insert(flow_property(0xb, c.clone()));
        corpus.insert(flow_property(0xc, a.clone()));
        let aggregator = aggregator_over(Arc::new(corpus));

        let report = aggregator.validate_corpus(None).await;
        assert_eq!(report.cycles, vec![vec![a.key(), b.key(), c.key()]]);

        let cycle_issues: Vec<&ValidationIssue> = report
            .issues()
            .filter(|i| i.rule_id == RuleId::ReferenceCycle)
            .collect();
        assert_eq!(cycle_issues.len(), 1);
        assert_eq!(cycle_issues[0].severity, Severity::Warning);
        assert_eq!(cycle_issues[0].document, a);
        for member in [&a, &b, &c] {
            assert_eq!(cycle_issues[0].message.matches(&member.id.to_string()).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_corpus_report_is_deterministic() {
        let corpus = steel_corpus();
        corpus.remove(&reference(DatasetKind::UnitGroup, MASS_GROUP).key());
        let corpus = Arc::new(corpus);

        let first = aggregator_over(corpus.clone()).validate_corpus(None).await;
        let second = aggregator_over(corpus).validate_corpus(None).await;
        let first: Vec<&ValidationIssue> = first.issues().collect();
        let second: Vec<&ValidationIssue> = second.issues().collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_returns_partial_report() {
        let corpus = Arc::new(steel_corpus().with_latency(Duration::from_millis(200)));
        let aggregator = aggregator_over(corpus);
        let cancel = Cancellation::new();
        cancel.cancel();

        let report = aggregator.validate_corpus(Some(&cancel)).await;
        assert!(report.cancelled);
        assert!(report.dataset_count() < 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_mid_run_keeps_finished_reports() {
        const SLOW_FLOW: u128 = 0x51;
        let corpus = Arc::new(steel_corpus().with_latency(Duration::from_millis(300)));
        corpus.insert(flow(SLOW_FLOW, &[(0, reference(DatasetKind::UnitGroup, MASS_GROUP))]));
        let store = Arc::new(DocumentStore::in_memory(corpus));

        // Everything but the slow flow is cached, so only its task still waits on storage
        let finished = [
            reference(DatasetKind::UnitGroup, MASS_GROUP),
            reference(DatasetKind::Flow, STEEL_FLOW),
            reference(DatasetKind::Process, STEEL_PROCESS),
        ];
        for dataset in &finished {
            store.load(dataset).await.unwrap();
        }
        let aggregator = Arc::new(DiagnosticsAggregator::new(store, VellumConfig::default()));
        let cancel = Cancellation::new();

        let run = {
            let aggregator = aggregator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { aggregator.validate_corpus(Some(&cancel)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let report = run.await.unwrap();
        assert!(report.cancelled);
        for dataset in &finished {
            assert!(report.report(dataset).is_some(), "{dataset} should have finished");
        }
        assert!(report.report(&reference(DatasetKind::Flow, SLOW_FLOW)).is_none());
        assert_eq!(report.dataset_count(), 3);
        assert_eq!(report.error_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_conflicting_copies_reported_the_same_on_every_run() {
        const MIRROR_PROCESS: u128 = 0x77;
        let corpus = steel_corpus();
        let mut mirror = flow(STEEL_FLOW, &[]);
        mirror.version = Some("02.00.000".to_string());
        corpus.insert_at(Location::new("mirror/steel.yml"), mirror);
        let via_mirror = reference(DatasetKind::Flow, STEEL_FLOW).with_location_hint("../mirror/steel.yml");
        corpus.insert(process(MIRROR_PROCESS, vec![exchange(1, via_mirror, 0)]));
        let corpus = Arc::new(corpus);

        let mut runs = Vec::new();
        for _ in 0..5 {
            let report = aggregator_over(corpus.clone()).validate_corpus(None).await;
            runs.push(report.issues().cloned().collect::<Vec<ValidationIssue>>());

            let flow_report = report.report(&reference(DatasetKind::Flow, STEEL_FLOW)).unwrap();
            let copies = flow_report.by_rule(RuleId::ConflictingCopies);
            assert_eq!(copies.len(), 1);
            assert_eq!(copies[0].severity, Severity::Error);
            assert!(copies[0].message.contains("mirror/steel.yml"));

            let hinted = report.report(&reference(DatasetKind::Process, MIRROR_PROCESS)).unwrap();
            assert_eq!(hinted.by_rule(RuleId::ReferenceAvailable).len(), 1);
            let plain = report.report(&reference(DatasetKind::Process, STEEL_PROCESS)).unwrap();
            assert!(plain.by_rule(RuleId::ReferenceAvailable).is_empty());
        }
        for run in &runs[1..] {
            assert_eq!(run, &runs[0]);
        }
    }

    #[test]
    fn test_aggregate_dedups_raw_issues() {
        let doc = reference(DatasetKind::Flow, STEEL_FLOW);
        let report = DiagnosticsAggregator::aggregate(vec![
            ValidationIssue::warning(doc.clone(), "/name/0", RuleId::StringLength, "a"),
            ValidationIssue::warning(doc.clone(), "/name/0", RuleId::StringLength, "a"),
            ValidationIssue::error(doc, "/cas_number", RuleId::CasNumber, "b"),
        ]);
        assert_eq!(report.len(), 2);
        assert_eq!(report.error_count(), 1);
    }
}

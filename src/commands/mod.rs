mod inspect;
mod resolve;
mod validate;

pub use inspect::{InspectFormat, inspect_command};
pub use resolve::resolve_command;
pub use validate::validate_command;

use anyhow::{Context as _, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use vellum_resolve::config::VellumConfig;
use vellum_resolve::models::{DatasetKind, DatasetRef, Document};
use vellum_resolve::store::DocumentStore;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum KindArg {
    Process,
    Flow,
    FlowProperty,
    UnitGroup,
    Unit,
}

impl From<KindArg> for DatasetKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Process => DatasetKind::Process,
            KindArg::Flow => DatasetKind::Flow,
            KindArg::FlowProperty => DatasetKind::FlowProperty,
            KindArg::UnitGroup => DatasetKind::UnitGroup,
            KindArg::Unit => DatasetKind::Unit,
        }
    }
}

/// Settings and the document store shared by every command
pub struct Context {
    pub config: VellumConfig,
    pub store: Arc<DocumentStore>,
}

impl Context {
    pub fn open(corpus: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let mut config = VellumConfig::load(corpus)?;
        if let Some(timeout_ms) = timeout_ms {
            config.load_timeout_ms = timeout_ms;
        }

        let store = DocumentStore::open_dir(corpus, &config)
            .with_context(|| format!("Failed to open corpus {}", corpus.display()))?;
        info!(
            "Indexed {} datasets under {}",
            store.index().datasets().len(),
            corpus.display()
        );

        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    /// Load one dataset, rendering a failure as a diagnostic on stderr
    pub async fn load(&self, reference: &DatasetRef) -> Result<Arc<Document>> {
        match self.store.load(reference).await {
            Ok(document) => Ok(document),
            Err(e) => {
                eprintln!("{:?}", miette::Report::new(e));
                anyhow::bail!("Could not load {reference}")
            }
        }
    }
}

/// Parse `KIND:ID`, with KIND in snake case (e.g. `unit_group:93a6...`)
pub fn parse_dataset_spec(spec: &str) -> Result<DatasetRef> {
    let (kind, id) = spec
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Expected KIND:ID, got {spec:?}"))?;
    let kind: DatasetKind = serde_yaml::from_str(kind.trim())
        .with_context(|| format!("Unknown dataset kind {kind:?}"))?;
    let id = Uuid::parse_str(id.trim()).with_context(|| format!("Invalid dataset id {id:?}"))?;
    Ok(DatasetRef::new(kind, id))
}

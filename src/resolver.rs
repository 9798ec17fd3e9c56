//! Walks the fixed Flow -> FlowProperty -> UnitGroup -> Unit chain behind an exchange

use miette::Diagnostic;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::LoadError;
use crate::models::document::{IdLookupError, find_by_internal_id};
use crate::models::{DatasetKind, DatasetRef, Document, Exchange};
use crate::store::DocumentStore;

/// One step of the unit chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Hop {
    Flow,
    FlowProperty,
    UnitGroup,
    Unit,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Hop::Flow => "flow",
            Hop::FlowProperty => "flow property",
            Hop::UnitGroup => "unit group",
            Hop::Unit => "unit",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExchangeId {
    pub process: Uuid,
    pub internal_id: u32,
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exchange #{} of process {}", self.internal_id, self.process)
    }
}

/// The four links a resolved unit came through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitTrace {
    pub flow: DatasetRef,
    pub flow_property: u32,
    pub unit_group: DatasetRef,
    pub unit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedUnit {
    pub unit_name: String,
    pub exchange: ExchangeId,
    pub trace: UnitTrace,
}

/// The outcome for one exchange of a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResolution {
    /// Index of the exchange in the process's exchange list
    pub position: usize,
    pub exchange: ExchangeId,
    pub result: Result<ResolvedUnit, ResolutionError>,
}

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("{hop} hop failed for {reference}: {cause}")]
    #[diagnostic(code(vellum::resolve::hop_failed))]
    HopFailed {
        hop: Hop,
        reference: DatasetRef,
        #[source]
        cause: LoadError,
    },

    #[error("{flow} has no flow property with internal id {internal_id}")]
    #[diagnostic(code(vellum::resolve::property_not_found))]
    PropertyNotFound { flow: DatasetRef, internal_id: u32 },

    #[error("{unit_group} has no unit with internal id {}", display_id(.internal_id))]
    #[diagnostic(code(vellum::resolve::unit_not_found))]
    UnitNotFound {
        unit_group: DatasetRef,
        /// `None` when the group declares no reference unit at all
        internal_id: Option<u32>,
    },

    #[error("{document} uses internal id {internal_id} {count} times; cannot select a {hop}")]
    #[diagnostic(code(vellum::resolve::duplicate_internal_id))]
    DuplicateInternalId {
        hop: Hop,
        document: DatasetRef,
        internal_id: u32,
        count: usize,
    },
}

fn display_id(internal_id: &Option<u32>) -> String {
    internal_id.map_or_else(|| "(no reference unit declared)".to_string(), |id| id.to_string())
}

impl ResolutionError {
    /// The link of the chain that broke
    pub fn hop(&self) -> Hop {
        match self {
            ResolutionError::HopFailed { hop, .. } => *hop,
            ResolutionError::PropertyNotFound { .. } => Hop::FlowProperty,
            ResolutionError::UnitNotFound { .. } => Hop::Unit,
            ResolutionError::DuplicateInternalId { hop, .. } => *hop,
        }
    }
}

/// Resolves exchanges against a document store. Cheap to clone; holds no state of its own.
#[derive(Clone)]
pub struct ReferenceResolver {
    store: Arc<DocumentStore>,
}

impl ReferenceResolver {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Load one hop's document. A reference typed as the wrong kind is left to the store,
    /// which reports the kind it actually holds under that id.
    async fn load_hop(&self, hop: Hop, reference: &DatasetRef) -> Result<Arc<Document>, ResolutionError> {
        let document = self
            .store
            .load(reference)
            .await
            .map_err(|cause| ResolutionError::HopFailed {
                hop,
                reference: reference.clone(),
                cause,
            })?;
        debug!("{hop} hop: loaded {reference}");
        Ok(document)
    }

    /// Find the unit name for `exchange` of process `process_id`
    pub async fn resolve_unit_for_exchange(
        &self,
        process_id: Uuid,
        exchange: &Exchange,
    ) -> Result<ResolvedUnit, ResolutionError> {
        let exchange_id = ExchangeId {
            process: process_id,
            internal_id: exchange.internal_id,
        };

        // 1. Flow document
        let flow_doc = self.load_hop(Hop::Flow, &exchange.flow).await?;
        let flow_ref = flow_doc.self_ref();
        let flow = flow_doc.as_flow().ok_or_else(|| ResolutionError::HopFailed {
            hop: Hop::Flow,
            reference: exchange.flow.clone(),
            cause: LoadError::KindMismatch {
                id: flow_doc.id,
                expected: DatasetKind::Flow,
                found: flow_doc.kind(),
            },
        })?;

        // 2. Flow property, by internal id within the flow
        let wanted = exchange.reference_to_reference_flow_property;
        let property = find_by_internal_id(&flow.flow_properties, wanted).map_err(|e| match e {
            IdLookupError::Missing => ResolutionError::PropertyNotFound {
                flow: flow_ref.clone(),
                internal_id: wanted,
            },
            IdLookupError::Duplicate(count) => ResolutionError::DuplicateInternalId {
                hop: Hop::FlowProperty,
                document: flow_ref.clone(),
                internal_id: wanted,
                count,
            },
        })?;
        debug!("flow property hop: #{wanted} of {flow_ref}");

        // 3. Unit group document
        let group_doc = self.load_hop(Hop::UnitGroup, &property.unit_group).await?;
        let group_ref = group_doc.self_ref();
        let group = group_doc.as_unit_group().ok_or_else(|| ResolutionError::HopFailed {
            hop: Hop::UnitGroup,
            reference: property.unit_group.clone(),
            cause: LoadError::KindMismatch {
                id: group_doc.id,
                expected: DatasetKind::UnitGroup,
                found: group_doc.kind(),
            },
        })?;

        // 4. Reference unit, by internal id within the group
        let unit_id = group
            .reference_to_reference_unit
            .ok_or_else(|| ResolutionError::UnitNotFound {
                unit_group: group_ref.clone(),
                internal_id: None,
            })?;
        let unit = find_by_internal_id(&group.units, unit_id).map_err(|e| match e {
            IdLookupError::Missing => ResolutionError::UnitNotFound {
                unit_group: group_ref.clone(),
                internal_id: Some(unit_id),
            },
            IdLookupError::Duplicate(count) => ResolutionError::DuplicateInternalId {
                hop: Hop::Unit,
                document: group_ref.clone(),
                internal_id: unit_id,
                count,
            },
        })?;
        debug!("unit hop: {exchange_id} resolves to {:?}", unit.name);

        Ok(ResolvedUnit {
            unit_name: unit.name.clone(),
            exchange: exchange_id,
            trace: UnitTrace {
                flow: flow_ref,
                flow_property: wanted,
                unit_group: group_ref,
                unit: unit_id,
            },
        })
    }

    /// Resolve every exchange of a process concurrently, in document order.
    /// An exchange whose task fails is missing from the result; positions stay exact.
    pub async fn resolve_process(&self, process: &Document) -> Vec<ExchangeResolution> {
        let Some(body) = process.as_process() else {
            return Vec::new();
        };

        let mut tasks = JoinSet::new();
        for (position, exchange) in body.exchanges.iter().cloned().enumerate() {
            let resolver = self.clone();
            let process_id = process.id;
            tasks.spawn(async move {
                let result = resolver.resolve_unit_for_exchange(process_id, &exchange).await;
                ExchangeResolution {
                    position,
                    exchange: ExchangeId {
                        process: process_id,
                        internal_id: exchange.internal_id,
                    },
                    result,
                }
            });
        }

        let mut results = Vec::with_capacity(body.exchanges.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!("Exchange resolution task failed: {e}"),
            }
        }
        results.sort_by_key(|resolution| resolution.position);
        results
    }
}

pub mod dataset_ref;
pub mod display;
pub mod document;

// Re-export commonly used types
pub use dataset_ref::{DatasetKey, DatasetKind, DatasetRef};
pub use document::{
    Direction, Document, DocumentBody, Exchange, FlowBody, FlowPropertyBody, FlowPropertyEntry,
    Geography, GisField, LangString, ListField, ProcessBody, Scalar, UnitBody, UnitEntry,
    UnitGroupBody, Variable,
};

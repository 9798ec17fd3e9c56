//! Document builders shared by unit tests

use uuid::Uuid;

use crate::models::{
    DatasetKind, DatasetRef, Direction, Document, DocumentBody, Exchange, FlowBody,
    FlowPropertyEntry, LangString, ProcessBody, UnitEntry, UnitGroupBody,
};
use crate::store::index::MemoryCorpus;

pub const MASS_GROUP: u128 = 0x93a6_0a57_a3c8_11da_a746_0800_200c_9a66;
pub const STEEL_FLOW: u128 = 0x0d9d_0b8c_7d1c_4bd6_8b0c_5f3c_4d2a_1e01;
pub const STEEL_PROCESS: u128 = 0x5b8c_1f3e_0f7a_4d11_9a53_7c0e_0c4c_1f10;

pub fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn reference(kind: DatasetKind, n: u128) -> DatasetRef {
    DatasetRef::new(kind, id(n))
}

pub fn unit_group(n: u128, reference_unit: Option<u32>, units: &[(u32, &str)]) -> Document {
    Document {
        id: id(n),
        version: Some("01.00.000".to_string()),
        name: vec![LangString::new(Some("en"), "Units of mass")],
        body: DocumentBody::UnitGroup(UnitGroupBody {
            reference_to_reference_unit: reference_unit,
            units: units
                .iter()
                .map(|(internal_id, name)| UnitEntry {
                    internal_id: *internal_id,
                    name: name.to_string(),
                    mean_value: Some(1.0),
                })
                .collect(),
        }),
    }
}

pub fn flow(n: u128, properties: &[(u32, DatasetRef)]) -> Document {
    Document {
        id: id(n),
        version: Some("01.00.000".to_string()),
        name: vec![LangString::new(Some("en"), "Steel")],
        body: DocumentBody::Flow(FlowBody {
            flow_properties: properties
                .iter()
                .map(|(internal_id, unit_group)| FlowPropertyEntry {
                    internal_id: *internal_id,
                    unit_group: unit_group.clone(),
                    mean_value: Some(1.0),
                })
                .collect(),
            ..FlowBody::default()
        }),
    }
}

pub fn exchange(internal_id: u32, flow: DatasetRef, property: u32) -> Exchange {
    Exchange {
        internal_id,
        flow,
        reference_to_reference_flow_property: property,
        amount: 42.5,
        direction: Direction::Output,
        unit_name: Some("kg".to_string()),
    }
}

pub fn process(n: u128, exchanges: Vec<Exchange>) -> Document {
    Document {
        id: id(n),
        version: Some("01.00.000".to_string()),
        name: vec![LangString::new(Some("en"), "Steel production")],
        body: DocumentBody::Process(ProcessBody {
            exchanges,
            ..ProcessBody::default()
        }),
    }
}

/// A consistent steel -> mass -> kg chain plus a process with one exchange over it
pub fn steel_corpus() -> MemoryCorpus {
    let corpus = MemoryCorpus::new();
    corpus.insert(unit_group(MASS_GROUP, Some(0), &[(0, "kg"), (1, "g")]));
    corpus.insert(flow(
        STEEL_FLOW,
        &[(0, reference(DatasetKind::UnitGroup, MASS_GROUP))],
    ));
    corpus.insert(process(
        STEEL_PROCESS,
        vec![exchange(1, reference(DatasetKind::Flow, STEEL_FLOW), 0)],
    ));
    corpus
}

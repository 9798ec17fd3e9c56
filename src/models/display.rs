//! Display implementations for models

use super::document::{Document, DocumentBody, GisField, LangString, ListField, Scalar};

fn lang_list(values: &[LangString]) -> String {
    values
        .iter()
        .map(|v| match &v.lang {
            Some(lang) => format!("{:?}@{lang}", v.value),
            None => format!("{:?}", v.value),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn scalar(value: &Scalar) -> String {
    match value {
        Scalar::Number(n) => n.to_string(),
        Scalar::Text(s) => format!("{s:?}"),
    }
}

impl Document {
    pub fn pretty_print(&self) {
        println!("{} {{", self.kind());
        println!("    id: {},", self.id);

        if let Some(version) = &self.version {
            println!("    version: {version:?},");
        }

        if !self.name.is_empty() {
            println!("    name: [{}],", lang_list(&self.name));
        }

        match &self.body {
            DocumentBody::Process(process) => {
                if let Some(location) = &process.location {
                    if let Some(code) = &location.code {
                        println!("    location: {code:?},");
                    }
                    match &location.gis {
                        Some(GisField::Point { latitude, longitude }) => println!(
                            "    gis: ({}, {}),",
                            latitude.as_ref().map(scalar).unwrap_or_else(|| "?".into()),
                            longitude.as_ref().map(scalar).unwrap_or_else(|| "?".into())
                        ),
                        Some(GisField::Combined(raw)) => println!("    gis: {raw:?} (combined),"),
                        None => {}
                    }
                }
                if !process.variables.is_empty() {
                    println!("    variables: [");
                    for variable in &process.variables {
                        let mean = variable.mean_value.as_ref().map(scalar);
                        println!("        {} = {},", variable.name, mean.unwrap_or_else(|| "-".into()));
                    }
                    println!("    ],");
                }
                if !process.exchanges.is_empty() {
                    println!("    exchanges: [");
                    for exchange in &process.exchanges {
                        println!(
                            "        #{} {:?} {} {} -> {} (property {}),",
                            exchange.internal_id,
                            exchange.direction,
                            exchange.amount,
                            exchange.unit_name.as_deref().unwrap_or("?"),
                            exchange.flow,
                            exchange.reference_to_reference_flow_property
                        );
                    }
                    println!("    ],");
                }
            }
            DocumentBody::Flow(flow) => {
                if let Some(cas) = &flow.cas_number {
                    println!("    cas_number: {cas:?},");
                }
                match &flow.synonyms {
                    Some(ListField::Items(items)) => println!("    synonyms: [{}],", lang_list(items)),
                    Some(ListField::Joined(raw)) => println!("    synonyms: {raw:?} (joined),"),
                    None => {}
                }
                if !flow.flow_properties.is_empty() {
                    println!("    flow_properties: [");
                    for entry in &flow.flow_properties {
                        println!("        #{} -> {},", entry.internal_id, entry.unit_group);
                    }
                    println!("    ],");
                }
            }
            DocumentBody::FlowProperty(property) => {
                if let Some(unit_group) = &property.unit_group {
                    println!("    unit_group: {unit_group},");
                }
            }
            DocumentBody::UnitGroup(group) => {
                if let Some(reference) = group.reference_to_reference_unit {
                    println!("    reference_unit: {reference},");
                }
                println!("    units: [");
                for unit in &group.units {
                    println!("        #{} {:?},", unit.internal_id, unit.name);
                }
                println!("    ],");
            }
            DocumentBody::Unit(unit) => {
                if let Some(symbol) = &unit.symbol {
                    println!("    symbol: {symbol:?},");
                }
            }
        }

        println!("}}");
    }
}

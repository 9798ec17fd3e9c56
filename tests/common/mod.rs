#![allow(dead_code)]

use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const MASS_GROUP: &str = "93a60a57-a3c8-11da-a746-0800200c9a66";
pub const STEEL_FLOW: &str = "0d9d0b8c-7d1c-4bd6-8b0c-5f3c4d2a1e01";
pub const STEEL_PROCESS: &str = "5b8c1f3e-0f7a-4d11-9a53-7c0e0c4c1f10";
pub const MISSING_GROUP: &str = "6f0e5d4c-3b2a-4190-8e7d-6c5b4a392817";

pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn mass_group() -> String {
    format!(
        r#"kind: unit_group
id: {MASS_GROUP}
version: "01.00.000"
name:
  - {{ lang: en, value: Units of mass }}
reference_to_reference_unit: 0
units:
  - {{ internal_id: 0, name: kg, mean_value: 1.0 }}
  - {{ internal_id: 1, name: g, mean_value: 0.001 }}
"#
    )
}

pub fn steel_flow(unit_group: &str) -> String {
    format!(
        r#"kind: flow
id: {STEEL_FLOW}
version: "01.00.000"
name:
  - {{ lang: en, value: Steel }}
cas_number: 7439-89-6
synonyms:
  - {{ lang: en, value: iron }}
flow_properties:
  - internal_id: 0
    unit_group:
      kind: unit_group
      id: {unit_group}
      uri: ../unitgroups/{unit_group}.yml
    mean_value: 1.0
"#
    )
}

pub fn steel_process(unit_name: &str) -> String {
    format!(
        r#"kind: process
id: {STEEL_PROCESS}
version: "01.00.000"
name:
  - {{ lang: en, value: Steel production }}
mix_and_location_types:
  - {{ lang: en, value: production mix }}
location:
  code: KR
  gis: {{ latitude: 36.504, longitude: 128.103 }}
exchanges:
  - internal_id: 1
    flow:
      kind: flow
      id: {STEEL_FLOW}
      uri: ../flows/{STEEL_FLOW}.yml
    reference_to_reference_flow_property: 0
    mean_amount: 42.5
    direction: output
    unit_name: {unit_name}
"#
    )
}

/// A corpus where every reference resolves
pub fn consistent_corpus() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), &format!("unitgroups/{MASS_GROUP}.yml"), &mass_group());
    write(dir.path(), &format!("flows/{STEEL_FLOW}.yml"), &steel_flow(MASS_GROUP));
    write(dir.path(), &format!("processes/{STEEL_PROCESS}.yml"), &steel_process("kg"));
    dir
}

/// The same corpus, but the flow points at a unit group that does not exist
pub fn broken_corpus() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), &format!("unitgroups/{MASS_GROUP}.yml"), &mass_group());
    write(dir.path(), &format!("flows/{STEEL_FLOW}.yml"), &steel_flow(MISSING_GROUP));
    write(dir.path(), &format!("processes/{STEEL_PROCESS}.yml"), &steel_process("kg"));
    dir
}

use std::fs;

use tempfile::tempdir;
use xgraph_map::{GeneratorDef, GeneratorPolicy, MappingSet};
use xgraph_mapfile::{load_mapping, load_policy, LoadError};

const MAPPING: &str = r#"<x3ml>
  <namespaces><namespace prefix="ex" uri="http://example.org/"/></namespaces>
  <mappings>
    <mapping>
      <domain>
        <source_node>/records/record</source_node>
        <target_node><entity><type>ex:Record</type><instance_generator name="UUID"/></entity></target_node>
      </domain>
    </mapping>
  </mappings>
</x3ml>"#;

#[test]
fn xml_and_json_files_load_to_the_same_model() {
    let dir = tempdir().unwrap();
    let xml_path = dir.path().join("mapping.x3ml");
    fs::write(&xml_path, MAPPING).unwrap();
    let from_xml = load_mapping(&xml_path).unwrap();

    let json_path = dir.path().join("mapping.json");
    fs::write(&json_path, serde_json::to_string_pretty(&from_xml).unwrap()).unwrap();
    let from_json: MappingSet = load_mapping(&json_path).unwrap();

    assert_eq!(from_xml, from_json);
}

#[test]
fn policy_file_loads() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("policy.xml");
    fs::write(
        &path,
        r#"<generator_policy><generator name="RecordURI" prefix="ex"><pattern>record/{id}</pattern></generator></generator_policy>"#,
    )
    .unwrap();
    let policy: GeneratorPolicy = load_policy(&path).unwrap();
    assert!(matches!(&policy.generators[0], GeneratorDef::Template(t) if t.pattern == "record/{id}"));
}

#[test]
fn duplicate_generator_in_xml_policy_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("policy.xml");
    fs::write(
        &path,
        r#"<generator_policy>
             <generator name="A"><pattern>x</pattern></generator>
             <generator name="A"><pattern>y</pattern></generator>
           </generator_policy>"#,
    )
    .unwrap();
    assert!(matches!(load_policy(&path), Err(LoadError::DuplicateGenerator(_))));
}

#[test]
fn missing_file_reports_its_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.x3ml");
    let err = load_mapping(&path).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
    assert!(err.to_string().contains("absent.x3ml"));
}

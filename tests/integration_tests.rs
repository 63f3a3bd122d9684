//! Integration tests for the complete xgraph pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - textual mapping + policy → Engine → Graph
//! - Graph → N-Triples / JSON lines
//! - identity, variables, custom generators and skips over real documents
//!
//! Run with: cargo test --test integration_tests

use std::fs;
use std::sync::Arc;

use tempfile::tempdir;
use xgraph_map::{
    CustomRegistry, Engine, EngineOptions, Execution, Graph, JsonLinesWriter, NTriplesWriter, Site,
    ThesaurusHierarchy, UuidMode, ValueKind, XmlDocument,
};
use xgraph_mapfile::{load_mapping, load_policy, parse_mapping, parse_policy};

const EX: &str = "http://example.org/";
const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

fn ex(local: &str) -> String {
    format!("{EX}{local}")
}

fn engine_from_text(mapping: &str, policy: &str, hierarchy: Option<ThesaurusHierarchy>) -> Engine {
    let mapping = parse_mapping(mapping).expect("mapping parses");
    let policy = parse_policy(policy).expect("policy parses");
    Engine::new(
        mapping,
        &policy,
        EngineOptions {
            uuid_mode: UuidMode::Sequential { width: 3 },
            ..EngineOptions::default()
        },
        &CustomRegistry::with_defaults(),
        hierarchy.map(|h| Arc::new(h) as Arc<dyn xgraph_map::Hierarchy>),
    )
    .expect("engine builds")
}

fn run(engine: &Engine, xml: &str) -> Execution {
    let doc = XmlDocument::parse(xml).expect("document parses");
    engine.execute(&doc)
}

fn ntriples(graph: &Graph) -> String {
    let mut writer = NTriplesWriter::new(Vec::new());
    graph.write_to(&mut writer).unwrap();
    String::from_utf8(writer.into_inner()).unwrap()
}

// ============================================================================
// People: conditions, internal nodes, labels, additionals, narrower
// ============================================================================

const PEOPLE_MAPPING: &str = r#"
<x3ml>
  <namespaces><namespace prefix="ex" uri="http://example.org/"/></namespaces>
  <mappings>
    <mapping>
      <domain>
        <source_node>//person</source_node>
        <target_node>
          <if><not><if><exists>@deleted</exists></if></not></if>
          <entity>
            <type>ex:Person</type>
            <instance_generator name="PersonURI"><arg name="id">@id</arg></instance_generator>
            <label_generator name="Literal"><arg name="text">name</arg></label_generator>
            <additional>
              <relationship>ex:category</relationship>
              <entity>
                <type>ex:Category</type>
                <instance_generator name="Constant"><arg name="text" type="constant">person</arg></instance_generator>
              </entity>
            </additional>
          </entity>
        </target_node>
      </domain>
      <link>
        <path>
          <source_relation>birth</source_relation>
          <target_relation>
            <if><equals value="yes">@certain</equals></if>
            <relationship>ex:wasBorn</relationship>
            <entity>
              <type>ex:Birth</type>
              <instance_generator name="UUID"/>
            </entity>
            <relationship>ex:tookPlaceAt</relationship>
          </target_relation>
        </path>
        <range>
          <source_node>birth/place</source_node>
          <target_node>
            <entity>
              <type>ex:Place</type>
              <instance_generator name="Literal"><arg name="text"/></instance_generator>
            </entity>
          </target_node>
        </range>
      </link>
      <link>
        <path>
          <source_relation>kind</source_relation>
          <target_relation><relationship>ex:hasType</relationship></target_relation>
        </path>
        <range>
          <source_node>kind</source_node>
          <target_node>
            <if><narrower value="scientist">text()</narrower></if>
            <entity>
              <type>ex:Type</type>
              <instance_generator name="TypeURI"><arg name="term">text()</arg></instance_generator>
            </entity>
          </target_node>
        </range>
      </link>
    </mapping>
  </mappings>
</x3ml>"#;

const PEOPLE_POLICY: &str = r#"
<generator_policy>
  <generator name="PersonURI" prefix="ex"><pattern>person/{id}</pattern></generator>
  <generator name="TypeURI" prefix="ex"><pattern>type/{term}</pattern></generator>
</generator_policy>"#;

const PEOPLE: &str = r#"
<people xml:lang="en">
  <person id="p1">
    <name>Ada</name>
    <birth certain="yes"><place>London</place></birth>
    <kind>mathematician</kind>
  </person>
  <person id="p2" deleted="true"><name>Ghost</name></person>
  <person id="p3">
    <name xml:lang="fr">Émile</name>
    <birth certain="no"><place>Paris</place></birth>
    <kind>poet</kind>
  </person>
</people>"#;

fn people_engine() -> Engine {
    let hierarchy = ThesaurusHierarchy::new()
        .with_broader("mathematician", "scientist")
        .with_broader("poet", "artist");
    engine_from_text(PEOPLE_MAPPING, PEOPLE_POLICY, Some(hierarchy))
}

#[test]
fn test_people_mapping_end_to_end() {
    let out = run(&people_engine(), PEOPLE);
    assert!(out.skips.is_empty(), "unexpected skips: {:?}", out.skips);

    let p1 = ex("person/p1");
    let p3 = ex("person/p3");

    // The deleted person produces nothing.
    assert!(out.graph.iter().all(|t| !t.subject.content.ends_with("p2")));

    let labels: Vec<_> = out
        .graph
        .with_predicate(RDFS_LABEL)
        .map(|t| (t.subject.content.clone(), t.object.content.clone(), t.object.language.clone()))
        .collect();
    assert_eq!(
        labels,
        vec![
            (p1.clone(), "Ada".to_string(), Some("en".to_string())),
            (p3.clone(), "Émile".to_string(), Some("fr".to_string())),
        ]
    );

    // Internal node chain: person -> birth event -> place.
    let born: Vec<_> = out.graph.with_predicate(&ex("wasBorn")).collect();
    assert_eq!(born.len(), 1);
    assert_eq!(born[0].subject.content, p1);
    assert_eq!(born[0].object.content, "uuid:AAA");
    let place: Vec<_> = out.graph.with_predicate(&ex("tookPlaceAt")).collect();
    assert_eq!(place.len(), 1);
    assert_eq!(place[0].subject.content, "uuid:AAA");
    assert_eq!(place[0].object.content, "London");
    assert_eq!(place[0].object.kind, ValueKind::Literal);

    // Only the narrower-than-scientist kind is typed.
    let types: Vec<_> = out
        .graph
        .with_predicate(&ex("hasType"))
        .map(|t| (t.subject.content.clone(), t.object.content.clone()))
        .collect();
    assert_eq!(types, vec![(p1.clone(), ex("type/mathematician"))]);

    // Additional node on every emitted person.
    let categories: Vec<_> = out.graph.with_predicate(&ex("category")).map(|t| t.subject.content.clone()).collect();
    assert_eq!(categories, vec![p1, p3]);
}

#[test]
fn test_people_ntriples_output() {
    let out = run(&people_engine(), PEOPLE);
    let nt = ntriples(&out.graph);

    let person_type = format!(
        "<{EX}person/p1> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <{EX}Person> ."
    );
    assert_eq!(nt.matches(&person_type).count(), 1, "type asserted once:\n{nt}");
    assert!(nt.contains(&format!("<{EX}person/p1> <{RDFS_LABEL}> \"Ada\"@en .")));
    assert!(nt.contains(&format!("<uuid:AAA> <{EX}tookPlaceAt> \"London\"@en .")));
    assert!(nt.lines().all(|l| l.ends_with(" .")));
}

#[test]
fn test_sequential_runs_are_reproducible() {
    let engine = people_engine();
    let first = ntriples(&run(&engine, PEOPLE).graph);
    let second = ntriples(&run(&engine, PEOPLE).graph);
    assert_eq!(first, second);
}

// ============================================================================
// Identity across mappings, variables
// ============================================================================

#[test]
fn test_same_node_same_identity_across_mappings() {
    let mapping = r#"
<x3ml>
  <namespaces><namespace prefix="ex" uri="http://example.org/"/></namespaces>
  <mappings>
    <mapping>
      <domain>
        <source_node>/catalog/object</source_node>
        <target_node><entity><type>ex:Object</type><instance_generator name="UUID"/></entity></target_node>
      </domain>
    </mapping>
    <mapping>
      <domain>
        <source_node>/catalog</source_node>
        <target_node><entity><type>ex:Catalog</type><instance_generator name="UUID"/></entity></target_node>
      </domain>
      <link>
        <path>
          <source_relation>object</source_relation>
          <target_relation><relationship>ex:contains</relationship></target_relation>
        </path>
        <range>
          <source_node>object</source_node>
          <target_node><entity><type>ex:Object</type><instance_generator name="UUID"/></entity></target_node>
        </range>
      </link>
    </mapping>
  </mappings>
</x3ml>"#;
    let engine = engine_from_text(mapping, "<generator_policy/>", None);
    let out = run(&engine, "<catalog><object/><object/></catalog>");

    // Objects took AAA and AAB in the first mapping; the catalog takes AAC and
    // the second mapping reuses the objects' identities.
    let contained: Vec<_> = out.graph.with_predicate(&ex("contains")).collect();
    assert_eq!(contained.len(), 2);
    assert!(contained.iter().all(|t| t.subject.content == "uuid:AAC"));
    assert_eq!(contained[0].object.content, "uuid:AAA");
    assert_eq!(contained[1].object.content, "uuid:AAB");
}

#[test]
fn test_variable_is_shared_within_a_domain() {
    let mapping = r#"
<x3ml>
  <namespaces><namespace prefix="ex" uri="http://example.org/"/></namespaces>
  <mappings>
    <mapping>
      <domain>
        <source_node>//work</source_node>
        <target_node><entity><type>ex:Work</type><instance_generator name="UUID"/></entity></target_node>
      </domain>
      <link>
        <path><source_relation>made</source_relation><target_relation><relationship>ex:producedBy</relationship></target_relation></path>
        <range>
          <source_node>made</source_node>
          <target_node><entity variable="production"><type>ex:Production</type><instance_generator name="UUID"/></entity></target_node>
        </range>
      </link>
      <link>
        <path><source_relation>dated</source_relation><target_relation><relationship>ex:producedBy</relationship></target_relation></path>
        <range>
          <source_node>dated</source_node>
          <target_node><entity variable="production"><type>ex:Production</type><instance_generator name="UUID"/></entity></target_node>
        </range>
      </link>
    </mapping>
  </mappings>
</x3ml>"#;
    let engine = engine_from_text(mapping, "<generator_policy/>", None);
    let out = run(&engine, "<works><work><made/><dated/></work><work><made/><dated/></work></works>");

    let productions: Vec<_> = out
        .graph
        .with_predicate(&ex("producedBy"))
        .map(|t| (t.subject.content.clone(), t.object.content.clone()))
        .collect();
    assert_eq!(productions.len(), 4);
    // Both links of one work point at one production; works do not share.
    assert_eq!(productions[0].1, productions[1].1);
    assert_eq!(productions[2].1, productions[3].1);
    assert_ne!(productions[0].1, productions[2].1);
}

// ============================================================================
// Custom generators and skips
// ============================================================================

const DATING_MAPPING: &str = r#"
<x3ml>
  <namespaces><namespace prefix="ex" uri="http://example.org/"/></namespaces>
  <mappings>
    <mapping>
      <domain>
        <source_node>//event</source_node>
        <target_node><entity><type>ex:Event</type><instance_generator name="EventURI"><arg name="id">@id</arg></instance_generator></entity></target_node>
      </domain>
      <link>
        <path><source_relation>year</source_relation><target_relation><relationship>ex:beginsAt</relationship></target_relation></path>
        <range>
          <source_node>year</source_node>
          <target_node>
            <entity>
              <type>ex:DateTime</type>
              <instance_generator name="YearStart">
                <arg name="text"/>
                <arg name="bound" type="constant">Lower</arg>
              </instance_generator>
            </entity>
          </target_node>
        </range>
      </link>
    </mapping>
  </mappings>
</x3ml>"#;

const DATING_POLICY: &str = r#"
<generator_policy>
  <generator name="EventURI" prefix="ex"><pattern>event/{id}</pattern></generator>
  <generator name="YearStart">
    <custom generatorClass="org.example.generators.YearBound">
      <set-arg name="text" type="xpath"/>
      <set-arg name="bound" type="constant"/>
    </custom>
  </generator>
</generator_policy>"#;

#[test]
fn test_custom_year_bound_and_skips() {
    let engine = engine_from_text(DATING_MAPPING, DATING_POLICY, None);
    let out = run(
        &engine,
        r#"<events>
             <event id="e1"><year>1815</year></event>
             <event id="e2"><year>not a year</year></event>
             <event><year>1900</year></event>
           </events>"#,
    );

    let begins: Vec<_> = out
        .graph
        .with_predicate(&ex("beginsAt"))
        .map(|t| (t.subject.content.clone(), t.object.content.clone()))
        .collect();
    assert_eq!(begins, vec![(ex("event/e1"), "1815-01-01T00:00:00".to_string())]);

    // One custom-generator failure on a range, one missing id on a domain.
    let sites: Vec<Site> = out.skips.iter().map(|s| s.site()).collect();
    assert_eq!(sites, vec![Site::Range, Site::Domain]);
    assert!(out.skips[0].path.contains("event[2]"));
}

// ============================================================================
// Loading from disk, output formats
// ============================================================================

#[test]
fn test_files_on_disk_and_json_form_agree() {
    let dir = tempdir().unwrap();
    let xml_mapping = dir.path().join("people.x3ml");
    let json_mapping = dir.path().join("people.json");
    let policy_path = dir.path().join("policy.xml");
    fs::write(&xml_mapping, PEOPLE_MAPPING).unwrap();
    fs::write(&policy_path, PEOPLE_POLICY).unwrap();

    let from_xml = load_mapping(&xml_mapping).unwrap();
    fs::write(&json_mapping, serde_json::to_string(&from_xml).unwrap()).unwrap();
    let from_json = load_mapping(&json_mapping).unwrap();
    assert_eq!(from_xml, from_json);

    let policy = load_policy(&policy_path).unwrap();
    let hierarchy: Arc<dyn xgraph_map::Hierarchy> =
        Arc::new(ThesaurusHierarchy::new().with_broader("mathematician", "scientist"));
    let options = EngineOptions {
        uuid_mode: UuidMode::Sequential { width: 3 },
        ..EngineOptions::default()
    };
    let registry = CustomRegistry::with_defaults();
    let a = Engine::new(from_xml, &policy, options.clone(), &registry, Some(hierarchy.clone())).unwrap();
    let b = Engine::new(from_json, &policy, options, &registry, Some(hierarchy)).unwrap();
    assert_eq!(run(&a, PEOPLE).graph, run(&b, PEOPLE).graph);
}

#[test]
fn test_json_lines_output() {
    let out = run(&people_engine(), PEOPLE);
    let mut writer = JsonLinesWriter::new(Vec::new());
    out.graph.write_to(&mut writer).unwrap();
    let text = String::from_utf8(writer.into_inner()).unwrap();

    let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), out.graph.len());
    assert!(lines
        .iter()
        .any(|v| v["predicate"] == serde_json::Value::String(ex("tookPlaceAt"))));
}

#[test]
fn test_narrower_requires_a_hierarchy() {
    let mapping = parse_mapping(PEOPLE_MAPPING).unwrap();
    let policy = parse_policy(PEOPLE_POLICY).unwrap();
    let err = Engine::new(
        mapping,
        &policy,
        EngineOptions::default(),
        &CustomRegistry::with_defaults(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, xgraph_map::ConfigError::NarrowerWithoutHierarchy));
}

use std::collections::HashMap;

use proptest::prelude::*;
use xgraph_map::{
    CustomRegistry, Domain, Engine, EngineOptions, Entity, GeneratorPolicy, GeneratorRef, Link, Mapping,
    MappingNamespace, MappingSet, Path, Property, QualifiedName, Range, UuidMode, XmlDocument,
};

fn q(tag: &str) -> QualifiedName {
    tag.parse().unwrap()
}

/// Two mappings reaching the same `item` nodes along different routes.
fn mapping() -> MappingSet {
    let item = || Entity::new(q("ex:Item"), GeneratorRef::new("UUID"));
    let tag = || Entity::new(q("ex:Tag"), GeneratorRef::new("Literal").arg("text", "@k"));
    let direct = Mapping {
        domain: Domain {
            source: "/root/item".into(),
            entity: item(),
        },
        links: vec![Link {
            path: Path {
                source: "tag".into(),
                property: Property::new(q("ex:tagged")),
                internal_nodes: vec![],
            },
            range: Range {
                source: "".into(),
                entity: tag(),
            },
        }],
    };
    let from_group = Mapping {
        domain: Domain {
            source: "/root".into(),
            entity: Entity::new(q("ex:Group"), GeneratorRef::new("UUID")),
        },
        links: vec![Link {
            path: Path {
                source: "item".into(),
                property: Property::new(q("ex:member")),
                internal_nodes: vec![],
            },
            range: Range {
                source: "".into(),
                entity: item(),
            },
        }],
    };
    MappingSet {
        namespaces: vec![MappingNamespace::new("ex", "http://example.org/")],
        language: None,
        mappings: vec![direct, from_group],
    }
}

fn engine(mode: UuidMode) -> Engine {
    Engine::new(
        mapping(),
        &GeneratorPolicy::default(),
        EngineOptions {
            uuid_mode: mode,
            ..EngineOptions::default()
        },
        &CustomRegistry::new(),
        None,
    )
    .unwrap()
}

fn document() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::collection::vec("[a-z]{1,4}", 0..3), 0..6).prop_map(|items| {
        let mut xml = String::from("<root>");
        for tags in items {
            xml.push_str("<item>");
            for k in tags {
                xml.push_str(&format!("<tag k=\"{k}\"/>"));
            }
            xml.push_str("</item>");
        }
        xml.push_str("</root>");
        xml
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn each_item_has_exactly_one_identifier(xml in document()) {
        let doc = XmlDocument::parse(&xml).unwrap();
        let out = engine(UuidMode::Random).execute(&doc);

        let member_iri = "http://example.org/member";
        let tagged_iri = "http://example.org/tagged";
        let members: Vec<_> = out.graph.with_predicate(member_iri).map(|t| t.object.clone()).collect();
        let mut subjects_seen: HashMap<String, usize> = HashMap::new();
        for t in out.graph.with_predicate(tagged_iri) {
            *subjects_seen.entry(t.subject.content.clone()).or_default() += 1;
        }
        // Every item tagged through the direct route is the same resource the
        // group route points at.
        for subject in subjects_seen.keys() {
            prop_assert!(members.iter().any(|m| &m.content == subject));
        }
        let unique: std::collections::HashSet<_> = members.iter().collect();
        prop_assert_eq!(unique.len(), members.len());
    }

    #[test]
    fn sequential_runs_are_identical(xml in document()) {
        let doc = XmlDocument::parse(&xml).unwrap();
        let e = engine(UuidMode::Sequential { width: 4 });
        let first = e.execute(&doc);
        let second = e.execute(&doc);
        prop_assert_eq!(first.graph, second.graph);
    }

    #[test]
    fn random_runs_share_the_graph_shape(xml in document()) {
        let doc = XmlDocument::parse(&xml).unwrap();
        let e = engine(UuidMode::Random);
        let shape = |g: &xgraph_map::Graph| -> Vec<(String, Option<String>, Option<String>)> {
            g.iter()
                .map(|t| (t.predicate.clone(), t.subject_class.clone(), t.object_class.clone()))
                .collect()
        };
        let a = e.execute(&doc);
        let b = e.execute(&doc);
        prop_assert_eq!(shape(&a.graph), shape(&b.graph));
    }
}

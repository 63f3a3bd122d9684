//! xgraph-map: declarative XML-to-RDF mapping engine
//!
//! A mapping set says, per kind of source fragment, which *domain* entity it
//! describes, which *paths* (properties) lead away from it and which *range*
//! entities sit at the other end. The engine walks an XML document along those
//! rules and emits triples.
//!
//! ## Module Organization
//!
//! - `model`: mapping set and generator policy records
//! - `namespace`: prefix resolution
//! - `document` / `xpath`: source tree and the expression subset evaluated on it
//! - `condition`: boolean gates on entities and properties
//! - `generator`: built-in, template and custom value generators
//! - `engine`: domain → path → range traversal with identity memoization
//! - `output`: triples, graphs and sinks (N-Triples, JSON lines)
//!
//! ```no_run
//! use xgraph_map::{CustomRegistry, Engine, EngineOptions, GeneratorPolicy, MappingSet, XmlDocument};
//!
//! # fn demo(mapping: MappingSet, policy: GeneratorPolicy, xml: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(mapping, &policy, EngineOptions::default(), &CustomRegistry::with_defaults(), None)?;
//! let doc = XmlDocument::parse(xml)?;
//! let execution = engine.execute(&doc);
//! println!("{} triples, {} skipped", execution.graph.len(), execution.skips.len());
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod document;
pub mod engine;
pub mod error;
pub mod generator;
pub mod model;
pub mod namespace;
pub mod output;
pub mod xpath;

// Re-export key types
pub use condition::{ConditionEvaluator, Hierarchy, ThesaurusHierarchy};
pub use document::{NodeId, NodeKind, SourceDocument, XmlDocument, XmlName};
pub use engine::{Engine, EngineOptions, Execution, Skip};
pub use error::{ConfigError, DocumentError, ExpressionError, GenerateError, ResolveError, Site};
pub use generator::custom::{CustomError, CustomGenerator, CustomRegistry, YearBound};
pub use generator::uuid::{RandomUuids, SequentialUuids, UuidMode, UuidSource};
pub use generator::{Value, ValueKind, ValuePolicy};
pub use model::{
    AdditionalNode, ArgKind, Condition, CustomArgDef, CustomDef, Domain, Entity, GeneratorArg,
    GeneratorDef, GeneratorPolicy, GeneratorRef, InternalNode, Link, Mapping, MappingNamespace,
    MappingSet, Path, Property, QualifiedName, Range, TemplateDef,
};
pub use namespace::Namespaces;
pub use output::{CollectingSink, Graph, JsonLinesWriter, NTriplesWriter, Triple, TripleSink};
pub use xpath::XPath;

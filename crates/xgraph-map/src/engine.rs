//! Execution engine.
//!
//! [`Engine::new`] validates and compiles a mapping set and generator policy
//! once; [`Engine::execute`] runs them against one document. All mutable
//! state (identity cache, entity variables, UUID source, output) belongs to
//! a single execution, so one engine can serve many documents concurrently.
//!
//! Traversal per mapping: domain nodes, then for each link the path nodes,
//! internal hops and range nodes, then additional nodes hanging off every
//! resolved entity. A failed resolution skips the node it belongs to and is
//! recorded in [`Execution::skips`]; it never aborts the run.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::condition::{ConditionEvaluator, Hierarchy};
use crate::document::{NodeId, SourceDocument};
use crate::error::{ConfigError, ExpressionError, GenerateError, ResolveError, Site};
use crate::generator::custom::CustomRegistry;
use crate::generator::uuid::{UuidMode, UuidSource};
use crate::generator::{ArgValue, ArgumentSource, Value, ValuePolicy};
use crate::model::{
    ArgKind, Condition, Entity, GeneratorPolicy, GeneratorRef, Link, MappingSet, Property,
    QualifiedName,
};
use crate::namespace::{Namespaces, RDFS_LABEL_IRI};
use crate::output::{Graph, Triple};
use crate::xpath::{ExpressionTable, XPath};

/// Expression used for an XPath argument with no content.
const DEFAULT_ARGUMENT_EXPRESSION: &str = "text()";

// ============================================================================
// Options and results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(default)]
    pub uuid_mode: UuidMode,
    /// Literal language used when the mapping declares none.
    #[serde(default)]
    pub language: Option<String>,
    /// Kind of arguments bound to parameters that leave the kind open.
    #[serde(default = "default_arg_kind")]
    pub default_arg_kind: ArgKind,
}

fn default_arg_kind() -> ArgKind {
    ArgKind::XPath
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            uuid_mode: UuidMode::Random,
            language: None,
            default_arg_kind: default_arg_kind(),
        }
    }
}

/// A resolution that failed and the node it was attempted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    /// Structural path of the context node.
    pub path: String,
    pub error: ResolveError,
}

impl Skip {
    pub fn site(&self) -> Site {
        self.error.site()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub graph: Graph,
    pub skips: Vec<Skip>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    mapping: MappingSet,
    namespaces: Namespaces,
    policy: ValuePolicy,
    expressions: ExpressionTable,
    /// Argument contents that do not compile; only an error if some
    /// parameter reads them as XPath.
    rejected: HashMap<String, ExpressionError>,
    hierarchy: Option<Arc<dyn Hierarchy>>,
    options: EngineOptions,
    language: Option<String>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("mappings", &self.mapping.mappings.len())
            .field("expressions", &self.expressions.len())
            .field("policy", &self.policy)
            .field("options", &self.options)
            .finish()
    }
}

impl Engine {
    /// Validate and compile. Fails on unknown prefixes, uncompilable
    /// source/condition expressions, bad policy entries, and `Narrower`
    /// conditions without a hierarchy.
    pub fn new(
        mapping: MappingSet,
        policy: &GeneratorPolicy,
        options: EngineOptions,
        registry: &CustomRegistry,
        hierarchy: Option<Arc<dyn Hierarchy>>,
    ) -> Result<Self, ConfigError> {
        let namespaces = Namespaces::from_declarations(&mapping.namespaces);
        let value_policy = ValuePolicy::new(policy, &namespaces, registry)?;

        let mut compiler = Compiler {
            namespaces: &namespaces,
            policy: &value_policy,
            has_hierarchy: hierarchy.is_some(),
            expressions: ExpressionTable::default(),
            rejected: HashMap::new(),
        };
        compiler.expression(DEFAULT_ARGUMENT_EXPRESSION, "default argument")?;
        for (i, m) in mapping.mappings.iter().enumerate() {
            let ctx = format!("mapping {}", i + 1);
            compiler.expression(&m.domain.source, &format!("{ctx} domain source"))?;
            compiler.entity(&m.domain.entity, &format!("{ctx} domain"))?;
            for (j, link) in m.links.iter().enumerate() {
                let ctx = format!("{ctx} link {}", j + 1);
                compiler.expression(&link.path.source, &format!("{ctx} path source"))?;
                compiler.property(&link.path.property, &format!("{ctx} path"))?;
                for (k, hop) in link.path.internal_nodes.iter().enumerate() {
                    let ctx = format!("{ctx} internal node {}", k + 1);
                    compiler.entity(&hop.entity, &ctx)?;
                    compiler.property(&hop.property, &ctx)?;
                }
                compiler.expression(&link.range.source, &format!("{ctx} range source"))?;
                compiler.entity(&link.range.entity, &format!("{ctx} range"))?;
            }
        }
        let Compiler {
            expressions,
            rejected,
            ..
        } = compiler;

        let language = non_empty(mapping.language.as_deref()).or_else(|| non_empty(options.language.as_deref()));
        tracing::debug!(
            mappings = mapping.mappings.len(),
            expressions = expressions.len(),
            "engine ready"
        );
        Ok(Self {
            mapping,
            namespaces,
            policy: value_policy,
            expressions,
            rejected,
            hierarchy,
            options,
            language,
        })
    }

    pub fn mapping(&self) -> &MappingSet {
        &self.mapping
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run every mapping against `doc`.
    pub fn execute<D: SourceDocument + ?Sized>(&self, doc: &D) -> Execution {
        let mut run = Run {
            engine: self,
            doc,
            conditions: ConditionEvaluator::new(doc, &self.expressions, self.hierarchy.as_deref()),
            uuids: self.options.uuid_mode.source(),
            identities: HashMap::new(),
            variables: HashMap::new(),
            out: Execution::default(),
        };
        run.mappings();
        let out = run.out;
        tracing::info!(
            triples = out.graph.len(),
            skips = out.skips.len(),
            "execution finished"
        );
        out
    }

    fn argument_expression(&self, generator: &str, argument: &str, source: &str) -> Result<&XPath, GenerateError> {
        if let Some(xp) = self.expressions.get(source) {
            return Ok(xp);
        }
        let source_error = self.rejected.get(source).cloned().unwrap_or_else(|| ExpressionError {
            expression: source.to_string(),
            offset: 0,
            message: "expression was never compiled".to_string(),
        });
        Err(GenerateError::ArgumentExpression {
            generator: generator.to_string(),
            argument: argument.to_string(),
            source: source_error,
        })
    }
}

// ============================================================================
// Load-time validation
// ============================================================================

struct Compiler<'a> {
    namespaces: &'a Namespaces,
    policy: &'a ValuePolicy,
    has_hierarchy: bool,
    expressions: ExpressionTable,
    rejected: HashMap<String, ExpressionError>,
}

impl Compiler<'_> {
    fn expression(&mut self, source: &str, context: &str) -> Result<(), ConfigError> {
        self.expressions
            .compile(source, self.namespaces)
            .map(|_| ())
            .map_err(|source| ConfigError::Expression {
                context: context.to_string(),
                source,
            })
    }

    fn condition(&mut self, condition: Option<&Condition>, context: &str) -> Result<(), ConfigError> {
        let Some(condition) = condition else { return Ok(()) };
        if condition.uses_narrower() && !self.has_hierarchy {
            return Err(ConfigError::NarrowerWithoutHierarchy);
        }
        for expr in condition.expressions() {
            self.expression(expr, &format!("{context} condition"))?;
        }
        Ok(())
    }

    fn property(&mut self, property: &Property, context: &str) -> Result<(), ConfigError> {
        self.namespaces.require(&property.tag, context)?;
        self.condition(property.condition.as_ref(), context)
    }

    fn entity(&mut self, entity: &Entity, context: &str) -> Result<(), ConfigError> {
        self.namespaces.require(&entity.class, context)?;
        self.condition(entity.condition.as_ref(), context)?;
        self.generator(&entity.generator, context)?;
        for label in &entity.labels {
            self.generator(label, &format!("{context} label"))?;
        }
        for (i, extra) in entity.additionals.iter().enumerate() {
            let ctx = format!("{context} additional {}", i + 1);
            self.property(&extra.property, &ctx)?;
            self.entity(&extra.entity, &ctx)?;
        }
        Ok(())
    }

    fn generator(&mut self, reference: &GeneratorRef, context: &str) -> Result<(), ConfigError> {
        if !self.policy.contains(&reference.name) {
            tracing::warn!(
                generator = %reference.name,
                context,
                "generator is not defined; entities using it will be skipped"
            );
        }
        for arg in &reference.args {
            let content = arg.content.trim();
            match arg.kind {
                Some(ArgKind::Literal) | Some(ArgKind::QName) => {}
                Some(ArgKind::XPath) if !content.is_empty() => {
                    self.expression(&arg.content, &format!("{context} argument"))?;
                }
                None if !content.is_empty() => {
                    if let Err(err) = self.expressions.compile(&arg.content, self.namespaces) {
                        self.rejected.insert(arg.content.clone(), err);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ============================================================================
// One execution
// ============================================================================

/// Identity-cache key: where the entity sits, what it is, how it is named.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdentityKey {
    path: String,
    class: String,
    generator: String,
}

/// A resolved entity and the node it was resolved at.
#[derive(Debug, Clone)]
struct Resolved {
    node: NodeId,
    value: Value,
    class: String,
}

struct Run<'a, D: SourceDocument + ?Sized> {
    engine: &'a Engine,
    doc: &'a D,
    conditions: ConditionEvaluator<'a, D>,
    uuids: Box<dyn UuidSource>,
    identities: HashMap<IdentityKey, String>,
    /// Entity variables of the current domain context.
    variables: HashMap<String, Value>,
    out: Execution,
}

impl<'a, D: SourceDocument + ?Sized> Run<'a, D> {
    fn mappings(&mut self) {
        let engine = self.engine;
        for mapping in &engine.mapping.mappings {
            for node in self.select(&mapping.domain.source, self.doc.root()) {
                self.variables.clear();
                let Some(domain) = self.entity(Site::Domain, &mapping.domain.entity, node) else {
                    continue;
                };
                self.attach(&domain, &mapping.domain.entity);
                for link in &mapping.links {
                    self.link(&domain, link);
                }
            }
        }
    }

    fn link(&mut self, domain: &Resolved, link: &'a Link) {
        for path_node in self.select(&link.path.source, domain.node) {
            let property = &link.path.property;
            if !self.conditions.holds(property.condition.as_ref(), path_node) {
                tracing::debug!(
                    property = %property.tag,
                    path = %self.doc.structural_path(path_node),
                    "path condition failed"
                );
                continue;
            }
            let Some(predicate) = self.predicate(Site::Path, &property.tag, path_node) else {
                continue;
            };

            // Internal hops, all resolved at the path node.
            let mut hops: Vec<(Resolved, String, &'a Entity)> = Vec::new();
            let mut complete = true;
            for hop in &link.path.internal_nodes {
                let hop_predicate = if self.conditions.holds(hop.property.condition.as_ref(), path_node) {
                    self.predicate(Site::Internal, &hop.property.tag, path_node)
                } else {
                    None
                };
                let resolved = hop_predicate
                    .as_ref()
                    .and_then(|_| self.entity(Site::Internal, &hop.entity, path_node));
                match (resolved, hop_predicate) {
                    (Some(r), Some(p)) => hops.push((r, p, &hop.entity)),
                    _ => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }

            let mut chain_emitted = false;
            for range_node in self.select(&link.range.source, path_node) {
                let Some(range) = self.entity(Site::Range, &link.range.entity, range_node) else {
                    continue;
                };
                if !chain_emitted {
                    let mut subject = domain.clone();
                    let mut via = predicate.clone();
                    for (hop, next, entity) in &hops {
                        self.emit(&subject, &via, hop);
                        self.attach(hop, *entity);
                        subject = hop.clone();
                        via = next.clone();
                    }
                    chain_emitted = true;
                }
                let (last, via) = match hops.last() {
                    Some((hop, next, _)) => (hop, next),
                    None => (domain, &predicate),
                };
                self.emit(last, via, &range);
                self.attach(&range, &link.range.entity);
            }
        }
    }

    /// Labels and additional nodes of an already-emitted entity.
    fn attach(&mut self, owner: &Resolved, entity: &'a Entity) {
        for label in &entity.labels {
            self.label(owner, entity, label);
        }
        for extra in &entity.additionals {
            if !owner.value.is_uri() {
                self.skip(
                    owner.node,
                    ResolveError::LiteralSubject {
                        site: Site::Additional,
                        tag: entity.class.to_string(),
                        property: extra.property.tag.to_string(),
                    },
                );
                continue;
            }
            if !self.conditions.holds(extra.property.condition.as_ref(), owner.node) {
                tracing::debug!(property = %extra.property.tag, "additional condition failed");
                continue;
            }
            let Some(predicate) = self.predicate(Site::Additional, &extra.property.tag, owner.node) else {
                continue;
            };
            let Some(target) = self.entity(Site::Additional, &extra.entity, owner.node) else {
                continue;
            };
            self.emit(owner, &predicate, &target);
            self.attach(&target, &extra.entity);
        }
    }

    fn label(&mut self, owner: &Resolved, entity: &Entity, label: &GeneratorRef) {
        let tag = entity.class.to_string();
        if !owner.value.is_uri() {
            self.skip(
                owner.node,
                ResolveError::LiteralSubject {
                    site: Site::Label,
                    tag,
                    property: "rdfs:label".to_string(),
                },
            );
            return;
        }
        let result = self.generate(label, &entity.class, owner.node).and_then(|v| {
            if v.is_uri() {
                Err(GenerateError::UriNotAllowed(label.name.clone()))
            } else {
                Ok(v)
            }
        });
        match result {
            Ok(literal) => self.out.graph.push(Triple {
                subject: owner.value.clone(),
                subject_class: Some(owner.class.clone()),
                predicate: RDFS_LABEL_IRI.to_string(),
                object: literal,
                object_class: None,
            }),
            Err(source) => self.skip(
                owner.node,
                ResolveError::Generate {
                    site: Site::Label,
                    tag,
                    source,
                },
            ),
        }
    }

    /// Condition, variable, identity cache, generator; in that order.
    fn entity(&mut self, site: Site, entity: &Entity, node: NodeId) -> Option<Resolved> {
        if !self.conditions.holds(entity.condition.as_ref(), node) {
            tracing::debug!(
                %site,
                class = %entity.class,
                path = %self.doc.structural_path(node),
                "entity condition failed"
            );
            return None;
        }
        let class = match self.engine.namespaces.expand(&entity.class) {
            Some(class) => class,
            None => {
                self.skip(
                    node,
                    ResolveError::Namespace {
                        site,
                        tag: entity.class.to_string(),
                        prefix: entity.class.prefix.clone(),
                    },
                );
                return None;
            }
        };

        if let Some(value) = entity.variable.as_ref().and_then(|v| self.variables.get(v)) {
            return Some(Resolved {
                node,
                value: value.clone(),
                class,
            });
        }

        let key = IdentityKey {
            path: self.doc.structural_path(node),
            class: entity.class.to_string(),
            generator: entity.generator.name.clone(),
        };
        let value = match self.identities.get(&key) {
            Some(uri) => Value::uri(uri.clone()),
            None => match self.generate(&entity.generator, &entity.class, node) {
                Ok(value) => {
                    if value.is_uri() {
                        self.identities.insert(key, value.content.clone());
                    }
                    value
                }
                Err(source) => {
                    self.skip(
                        node,
                        ResolveError::Generate {
                            site,
                            tag: entity.class.to_string(),
                            source,
                        },
                    );
                    return None;
                }
            },
        };
        if let Some(variable) = &entity.variable {
            self.variables.insert(variable.clone(), value.clone());
        }
        Some(Resolved { node, value, class })
    }

    fn predicate(&mut self, site: Site, tag: &QualifiedName, node: NodeId) -> Option<String> {
        let iri = self.engine.namespaces.expand(tag);
        if iri.is_none() {
            self.skip(
                node,
                ResolveError::Namespace {
                    site,
                    tag: tag.to_string(),
                    prefix: tag.prefix.clone(),
                },
            );
        }
        iri
    }

    fn generate(&mut self, reference: &GeneratorRef, owner: &QualifiedName, node: NodeId) -> Result<Value, GenerateError> {
        let args = NodeArguments {
            engine: self.engine,
            doc: self.doc,
            node,
            reference,
            owner,
        };
        self.engine
            .policy
            .generate(&reference.name, &args, self.uuids.as_mut())
    }

    fn emit(&mut self, subject: &Resolved, predicate: &str, object: &Resolved) {
        self.out.graph.push(Triple {
            subject: subject.value.clone(),
            subject_class: Some(subject.class.clone()),
            predicate: predicate.to_string(),
            object: object.value.clone(),
            object_class: Some(object.class.clone()),
        });
    }

    fn select(&self, source: &str, context: NodeId) -> Vec<NodeId> {
        match self.engine.expressions.get(source) {
            Some(xp) => self.doc.select(xp, context),
            None => Vec::new(),
        }
    }

    fn skip(&mut self, node: NodeId, error: ResolveError) {
        let path = self.doc.structural_path(node);
        tracing::warn!(site = %error.site(), path = %path, error = %error, "resolution skipped");
        self.out.skips.push(Skip { path, error });
    }
}

// ============================================================================
// Arguments for one invocation
// ============================================================================

struct NodeArguments<'a, D: SourceDocument + ?Sized> {
    engine: &'a Engine,
    doc: &'a D,
    node: NodeId,
    reference: &'a GeneratorRef,
    owner: &'a QualifiedName,
}

impl<D: SourceDocument + ?Sized> ArgumentSource for NodeArguments<'_, D> {
    fn argument(
        &self,
        generator: &str,
        name: &str,
        kind: Option<ArgKind>,
    ) -> Result<Option<ArgValue>, GenerateError> {
        let Some(arg) = self.reference.find_arg(name) else {
            return Ok(None);
        };
        let empty = || GenerateError::EmptyArgument {
            generator: generator.to_string(),
            argument: name.to_string(),
        };
        match kind.or(arg.kind).unwrap_or(self.engine.options.default_arg_kind) {
            ArgKind::Literal => Ok(Some(ArgValue {
                text: arg.content.clone(),
                language: non_empty(arg.language.as_deref()),
                namespace: None,
            })),
            ArgKind::QName => {
                let content = arg.content.trim();
                let tag = if content.is_empty() {
                    self.owner.clone()
                } else {
                    content
                        .parse::<QualifiedName>()
                        .map_err(|_| GenerateError::MissingQualifiedName {
                            generator: generator.to_string(),
                            argument: name.to_string(),
                        })?
                };
                Ok(Some(ArgValue {
                    namespace: self.engine.namespaces.uri(&tag.prefix).map(str::to_string),
                    text: tag.local,
                    language: None,
                }))
            }
            ArgKind::XPath => {
                let source = if arg.content.trim().is_empty() {
                    DEFAULT_ARGUMENT_EXPRESSION
                } else {
                    arg.content.as_str()
                };
                let xp = self.engine.argument_expression(generator, name, source)?;
                let first = *self.doc.select(xp, self.node).first().ok_or_else(empty)?;
                let text = self.doc.string_value(first).trim().to_string();
                if text.is_empty() {
                    return Err(empty());
                }
                Ok(Some(ArgValue {
                    text,
                    language: non_empty(arg.language.as_deref()).or_else(|| self.doc.language(first)),
                    namespace: None,
                }))
            }
        }
    }

    fn literal_language(&self, value_language: Option<&str>) -> Option<String> {
        let explicit = self
            .reference
            .args
            .iter()
            .find(|a| a.name.as_deref() == Some("language"));
        if let Some(arg) = explicit {
            let lang = arg.content.trim();
            return (!lang.is_empty()).then(|| lang.to_string());
        }
        value_language
            .map(str::to_string)
            .or_else(|| self.doc.language(self.node))
            .or_else(|| self.engine.language.clone())
    }
}

/// Empty language tags mean "no language".
fn non_empty(language: Option<&str>) -> Option<String> {
    language.map(str::trim).filter(|l| !l.is_empty()).map(str::to_string)
}

//! XML element form of mappings and policies.
//!
//! Elements are matched on local name; namespace declarations on the mapping
//! document itself are ignored. Range `source_node` expressions are written
//! relative to the domain and must extend the path's `source_relation`; the
//! shared prefix is stripped here so the model's range source is relative to
//! the path node.

use xgraph_map::{
    AdditionalNode, ArgKind, Condition, CustomArgDef, CustomDef, DocumentError, Domain, Entity,
    GeneratorArg, GeneratorDef, GeneratorPolicy, GeneratorRef, InternalNode, Link, Mapping,
    MappingNamespace, MappingSet, NodeId, Path, Property, QualifiedName, Range, SourceDocument,
    TemplateDef, XmlDocument,
};

use crate::LoadError;

pub fn parse_mapping(text: &str) -> Result<MappingSet, LoadError> {
    let doc = XmlDocument::parse(text)?;
    let tree = Tree { doc: &doc };
    let root = tree.root("x3ml")?;

    let mut mappings = Vec::new();
    if let Some(list) = tree.child(root, "mappings") {
        for m in tree.children(list, "mapping") {
            mappings.push(tree.mapping(m)?);
        }
    }
    Ok(MappingSet {
        namespaces: tree.namespaces(root)?,
        language: tree.attr(root, "language").map(str::to_string),
        mappings,
    })
}

pub fn parse_policy(text: &str) -> Result<GeneratorPolicy, LoadError> {
    let doc = XmlDocument::parse(text)?;
    let tree = Tree { doc: &doc };
    let root = tree.root("generator_policy")?;

    let mut generators = Vec::new();
    for g in tree.children(root, "generator") {
        generators.push(tree.generator_def(g)?);
    }
    Ok(GeneratorPolicy {
        namespaces: tree.namespaces(root)?,
        generators,
    })
}

/// Strip the path source from a domain-relative range source.
pub fn range_extension(path: &str, range: &str) -> Result<String, LoadError> {
    let incompatible = || LoadError::IncompatibleRange {
        path: path.to_string(),
        range: range.to_string(),
    };
    let rest = range.strip_prefix(path).ok_or_else(incompatible)?;
    if rest.is_empty() {
        return Ok(String::new());
    }
    if path.is_empty() || path.ends_with('/') {
        return Ok(rest.to_string());
    }
    rest.strip_prefix('/').map(str::to_string).ok_or_else(incompatible)
}

struct Tree<'d> {
    doc: &'d XmlDocument,
}

impl<'d> Tree<'d> {
    fn root(&self, expected: &str) -> Result<NodeId, LoadError> {
        let root = self.doc.root_element().ok_or(DocumentError::NoRootElement)?;
        let found = self.doc.local_name(root);
        if found != expected {
            return Err(LoadError::UnexpectedRoot {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(root)
    }

    fn children<'a>(&'a self, node: NodeId, local: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.doc
            .child_elements(node)
            .filter(move |c| self.doc.local_name(*c) == local)
    }

    fn child(&self, node: NodeId, local: &str) -> Option<NodeId> {
        self.children(node, local).next()
    }

    fn require(&self, node: NodeId, local: &str) -> Result<NodeId, LoadError> {
        self.child(node, local).ok_or_else(|| LoadError::MissingElement {
            element: self.doc.local_name(node).to_string(),
            child: local.to_string(),
        })
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&'d str> {
        self.doc.attribute(node, name)
    }

    fn require_attr(&self, node: NodeId, name: &str) -> Result<&'d str, LoadError> {
        self.attr(node, name).ok_or_else(|| LoadError::MissingAttribute {
            element: self.doc.local_name(node).to_string(),
            attribute: name.to_string(),
        })
    }

    fn text(&self, node: NodeId) -> String {
        self.doc.string_value(node).trim().to_string()
    }

    fn namespaces(&self, root: NodeId) -> Result<Vec<MappingNamespace>, LoadError> {
        let mut out = Vec::new();
        if let Some(list) = self.child(root, "namespaces") {
            for ns in self.children(list, "namespace") {
                out.push(MappingNamespace::new(
                    self.require_attr(ns, "prefix")?,
                    self.require_attr(ns, "uri")?,
                ));
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Mappings
    // ------------------------------------------------------------------------

    fn mapping(&self, node: NodeId) -> Result<Mapping, LoadError> {
        let domain = self.require(node, "domain")?;
        let source = self.text(self.require(domain, "source_node")?);
        let entity = self.target_node(self.require(domain, "target_node")?)?;

        let mut links = Vec::new();
        for l in self.children(node, "link") {
            links.push(self.link(l)?);
        }
        Ok(Mapping {
            domain: Domain { source, entity },
            links,
        })
    }

    fn target_node(&self, node: NodeId) -> Result<Entity, LoadError> {
        let mut entity = self.entity(self.require(node, "entity")?)?;
        entity.condition = self.conditions(node)?;
        Ok(entity)
    }

    fn link(&self, node: NodeId) -> Result<Link, LoadError> {
        let path = self.require(node, "path")?;
        let path_source = self.text(self.require(path, "source_relation")?);
        let relation = self.require(path, "target_relation")?;
        let condition = self.conditions(relation)?;

        // relationship (entity relationship)*
        let mut property: Option<Property> = None;
        let mut internal_nodes = Vec::new();
        let mut pending: Option<Entity> = None;
        for c in self.doc.child_elements(relation) {
            match (self.doc.local_name(c), property.is_some(), pending.take()) {
                ("if", _, p) => pending = p,
                ("relationship", false, None) => {
                    property = Some(Property {
                        tag: self.qualified(c)?,
                        condition: condition.clone(),
                    });
                }
                ("relationship", true, Some(entity)) => internal_nodes.push(InternalNode {
                    entity,
                    property: Property::new(self.qualified(c)?),
                }),
                ("entity", true, None) => pending = Some(self.entity(c)?),
                (found, _, _) => {
                    return Err(LoadError::UnexpectedElement {
                        parent: "target_relation".to_string(),
                        found: found.to_string(),
                    })
                }
            }
        }
        if pending.is_some() {
            return Err(LoadError::MissingElement {
                element: "target_relation".to_string(),
                child: "relationship".to_string(),
            });
        }
        let property = property.ok_or_else(|| LoadError::MissingElement {
            element: "target_relation".to_string(),
            child: "relationship".to_string(),
        })?;

        let range = self.require(node, "range")?;
        let range_source = self.text(self.require(range, "source_node")?);
        let entity = self.target_node(self.require(range, "target_node")?)?;

        Ok(Link {
            range: Range {
                source: range_extension(&path_source, &range_source)?,
                entity,
            },
            path: Path {
                source: path_source,
                property,
                internal_nodes,
            },
        })
    }

    fn entity(&self, node: NodeId) -> Result<Entity, LoadError> {
        let class = self.qualified(self.require(node, "type")?)?;
        let generator = self.generator_ref(self.require(node, "instance_generator")?)?;
        let mut entity = Entity::new(class, generator);
        entity.variable = self.attr(node, "variable").map(str::to_string);
        for label in self.children(node, "label_generator") {
            entity.labels.push(self.generator_ref(label)?);
        }
        for extra in self.children(node, "additional") {
            let tag_node = self
                .child(extra, "relationship")
                .or_else(|| self.child(extra, "property"))
                .ok_or_else(|| LoadError::MissingElement {
                    element: "additional".to_string(),
                    child: "relationship".to_string(),
                })?;
            entity.additionals.push(AdditionalNode {
                property: Property {
                    tag: self.qualified(tag_node)?,
                    condition: self.conditions(extra)?,
                },
                entity: self.entity(self.require(extra, "entity")?)?,
            });
        }
        Ok(entity)
    }

    fn qualified(&self, node: NodeId) -> Result<QualifiedName, LoadError> {
        Ok(self.text(node).parse::<QualifiedName>()?)
    }

    fn generator_ref(&self, node: NodeId) -> Result<GeneratorRef, LoadError> {
        let mut reference = GeneratorRef::new(self.require_attr(node, "name")?);
        for arg in self.children(node, "arg") {
            let kind = self
                .attr(arg, "type")
                .map(|t| t.parse::<ArgKind>().map_err(|_| LoadError::ArgumentKind(t.to_string())))
                .transpose()?;
            reference.args.push(GeneratorArg {
                name: self.attr(arg, "name").map(str::to_string),
                kind,
                content: self.text(arg),
                language: self.attr(arg, "language").map(str::to_string),
            });
        }
        Ok(reference)
    }

    // ------------------------------------------------------------------------
    // Conditions
    // ------------------------------------------------------------------------

    /// All `<if>` children of `node`, conjoined.
    fn conditions(&self, node: NodeId) -> Result<Option<Condition>, LoadError> {
        let mut list = Vec::new();
        for i in self.children(node, "if") {
            list.push(self.if_block(i)?);
        }
        Ok(match list.len() {
            0 => None,
            1 => list.pop(),
            _ => Some(Condition::And(list)),
        })
    }

    fn if_block(&self, node: NodeId) -> Result<Condition, LoadError> {
        let mut list = Vec::new();
        for c in self.doc.child_elements(node) {
            list.push(self.condition(c)?);
        }
        Ok(match list.len() {
            1 => list.remove(0),
            _ => Condition::And(list),
        })
    }

    fn condition(&self, node: NodeId) -> Result<Condition, LoadError> {
        let nested = |this: &Self| -> Result<Vec<Condition>, LoadError> {
            this.children(node, "if").map(|i| this.if_block(i)).collect()
        };
        Ok(match self.doc.local_name(node) {
            "exists" => Condition::Exists(self.text(node)),
            "equals" => Condition::Equals {
                expression: self.text(node),
                value: self.require_attr(node, "value")?.to_string(),
            },
            "narrower" => Condition::Narrower {
                expression: self.text(node),
                value: self.require_attr(node, "value")?.to_string(),
            },
            "and" => Condition::And(nested(self)?),
            "or" => Condition::Or(nested(self)?),
            "not" => Condition::not(self.if_block(self.require(node, "if")?)?),
            other => {
                return Err(LoadError::UnexpectedElement {
                    parent: "if".to_string(),
                    found: other.to_string(),
                })
            }
        })
    }

    // ------------------------------------------------------------------------
    // Policy
    // ------------------------------------------------------------------------

    fn generator_def(&self, node: NodeId) -> Result<GeneratorDef, LoadError> {
        let name = self.require_attr(node, "name")?.to_string();
        if let Some(custom) = self.child(node, "custom") {
            let class = self.require_attr(custom, "generatorClass")?;
            // Dotted class paths name their implementation by the last segment.
            let implementation = class.rsplit('.').next().unwrap_or(class).to_string();
            let mut args = Vec::new();
            for a in self.children(custom, "set-arg") {
                let kind = self
                    .attr(a, "type")
                    .map(|t| t.parse::<ArgKind>().map_err(|_| LoadError::ArgumentKind(t.to_string())))
                    .transpose()?;
                args.push(CustomArgDef {
                    name: self.require_attr(a, "name")?.to_string(),
                    kind,
                });
            }
            return Ok(GeneratorDef::Custom(CustomDef {
                name,
                implementation,
                args,
            }));
        }
        Ok(GeneratorDef::Template(TemplateDef {
            name,
            prefix: self.attr(node, "prefix").map(str::to_string),
            pattern: self.text(self.require(node, "pattern")?),
        }))
    }
}

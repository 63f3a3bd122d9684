//! Mapping model.
//!
//! Plain, immutable records describing a mapping specification and a
//! generator policy. Populated by a loader (see the `xgraph-mapfile` crate) or
//! built directly in code; the engine only reads them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// Names
// ============================================================================

/// `prefix:LocalName`, resolved against the namespace table before execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    pub prefix: String,
    pub local: String,
}

impl QualifiedName {
    pub fn new(prefix: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            local: local.into(),
        }
    }
}

impl FromStr for QualifiedName {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let tag = tag.trim();
        match tag.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => {
                Ok(Self::new(prefix, local))
            }
            _ => Err(ConfigError::UnqualifiedTag(tag.to_string())),
        }
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.local)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingNamespace {
    pub prefix: String,
    pub uri: String,
}

impl MappingNamespace {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }
}

// ============================================================================
// Mapping specification
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingSet {
    #[serde(default)]
    pub namespaces: Vec<MappingNamespace>,
    /// Default language for literals when neither the generator nor the
    /// source document supplies one.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub domain: Domain,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// Evaluated against the document root.
    pub source: String,
    pub entity: Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub path: Path,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// Relative to the domain node.
    pub source: String,
    pub property: Property,
    /// Intermediate hops: `domain -property-> internal[0] -internal[0].property-> ... -> range`.
    #[serde(default)]
    pub internal_nodes: Vec<InternalNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalNode {
    pub entity: Entity,
    /// Property leading *out of* this node toward the next hop.
    pub property: Property,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    /// Relative to the path node.
    pub source: String,
    pub entity: Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub class: QualifiedName,
    #[serde(default)]
    pub condition: Option<Condition>,
    pub generator: GeneratorRef,
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub labels: Vec<GeneratorRef>,
    #[serde(default)]
    pub additionals: Vec<AdditionalNode>,
}

impl Entity {
    pub fn new(class: QualifiedName, generator: GeneratorRef) -> Self {
        Self {
            class,
            condition: None,
            generator,
            variable: None,
            labels: Vec::new(),
            additionals: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    pub fn with_label(mut self, label: GeneratorRef) -> Self {
        self.labels.push(label);
        self
    }

    pub fn with_additional(mut self, property: Property, entity: Entity) -> Self {
        self.additionals.push(AdditionalNode { property, entity });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub tag: QualifiedName,
    #[serde(default)]
    pub condition: Option<Condition>,
}

impl Property {
    pub fn new(tag: QualifiedName) -> Self {
        Self {
            tag,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A property + entity hanging off another entity; the owner is the subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalNode {
    pub property: Property,
    pub entity: Entity,
}

// ============================================================================
// Conditions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Empty expression tests the context node itself.
    Exists(String),
    Equals { expression: String, value: String },
    Narrower { expression: String, value: String },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn exists(expression: impl Into<String>) -> Self {
        Condition::Exists(expression.into())
    }

    pub fn equals(expression: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Equals {
            expression: expression.into(),
            value: value.into(),
        }
    }

    pub fn narrower(expression: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Narrower {
            expression: expression.into(),
            value: value.into(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Every expression string in this tree, depth first.
    pub fn expressions(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_expressions(&mut out);
        out
    }

    fn collect_expressions<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Exists(e) => out.push(e),
            Condition::Equals { expression, .. } | Condition::Narrower { expression, .. } => {
                out.push(expression)
            }
            Condition::And(list) | Condition::Or(list) => {
                for c in list {
                    c.collect_expressions(out);
                }
            }
            Condition::Not(c) => c.collect_expressions(out),
        }
    }

    pub fn uses_narrower(&self) -> bool {
        match self {
            Condition::Narrower { .. } => true,
            Condition::And(list) | Condition::Or(list) => list.iter().any(Condition::uses_narrower),
            Condition::Not(c) => c.uses_narrower(),
            Condition::Exists(_) | Condition::Equals { .. } => false,
        }
    }
}

// ============================================================================
// Generator references
// ============================================================================

/// How a generator argument's content is turned into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    /// Evaluate the content against the context node (default `text()`).
    XPath,
    /// Use the owning entity's/property's qualified name.
    QName,
    /// Use the content verbatim.
    Literal,
}

impl FromStr for ArgKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xpath" => Ok(ArgKind::XPath),
            "qname" => Ok(ArgKind::QName),
            "literal" | "constant" => Ok(ArgKind::Literal),
            other => Err(format!("unknown argument kind `{other}`")),
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArgKind::XPath => "xpath",
            ArgKind::QName => "qname",
            ArgKind::Literal => "literal",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorRef {
    pub name: String,
    #[serde(default)]
    pub args: Vec<GeneratorArg>,
}

impl GeneratorRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Named argument whose kind is decided by the parameter it binds to.
    pub fn arg(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.args.push(GeneratorArg {
            name: Some(name.into()),
            kind: None,
            content: content.into(),
            language: None,
        });
        self
    }

    pub fn typed_arg(
        mut self,
        name: impl Into<String>,
        kind: ArgKind,
        content: impl Into<String>,
    ) -> Self {
        self.args.push(GeneratorArg {
            name: Some(name.into()),
            kind: Some(kind),
            content: content.into(),
            language: None,
        });
        self
    }

    /// Sole unnamed argument; binds to whatever parameter asks first.
    pub fn unnamed_arg(mut self, content: impl Into<String>) -> Self {
        self.args.push(GeneratorArg {
            name: None,
            kind: None,
            content: content.into(),
            language: None,
        });
        self
    }

    /// Find the argument bound to `name`.
    ///
    /// A single unnamed argument binds to any parameter name.
    pub fn find_arg(&self, name: &str) -> Option<&GeneratorArg> {
        if let Some(arg) = self.args.iter().find(|a| a.name.as_deref() == Some(name)) {
            return Some(arg);
        }
        match self.args.as_slice() {
            [only] if only.name.is_none() => Some(only),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorArg {
    #[serde(default)]
    pub name: Option<String>,
    /// Declared kind; only consulted where the binding parameter leaves the
    /// kind open (untyped template placeholders).
    #[serde(default)]
    pub kind: Option<ArgKind>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
}

// ============================================================================
// Generator policy
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorPolicy {
    #[serde(default)]
    pub namespaces: Vec<MappingNamespace>,
    #[serde(default)]
    pub generators: Vec<GeneratorDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorDef {
    Template(TemplateDef),
    Custom(CustomDef),
}

impl GeneratorDef {
    pub fn name(&self) -> &str {
        match self {
            GeneratorDef::Template(t) => &t.name,
            GeneratorDef::Custom(c) => &c.name,
        }
    }
}

/// A URI template (when `prefix` is set) or a simple literal template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDef {
    pub name: String,
    #[serde(default)]
    pub prefix: Option<String>,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDef {
    pub name: String,
    /// Registry key of the implementation.
    pub implementation: String,
    #[serde(default)]
    pub args: Vec<CustomArgDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomArgDef {
    pub name: String,
    #[serde(default)]
    pub kind: Option<ArgKind>,
}

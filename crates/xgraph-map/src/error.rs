//! Error taxonomy.
//!
//! Three layers, matching when a problem can be noticed:
//!
//! - [`ConfigError`]: found while building an [`crate::engine::Engine`]; fatal
//!   for that engine.
//! - [`GenerateError`]: a single generator invocation failed; the enclosing
//!   domain/path/range node is skipped.
//! - [`ResolveError`]: a `GenerateError` (or namespace failure) annotated with
//!   where in the traversal it happened. These are collected, never raised.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expression `{expression}` at offset {offset}: {message}")]
pub struct ExpressionError {
    pub expression: String,
    pub offset: usize,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: usize, message: String },
    #[error("document has no root element")]
    NoRootElement,
    #[error("unbalanced end tag `{0}`")]
    UnbalancedEnd(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no namespace bound to prefix `{prefix}` (used by {context})")]
    UnknownPrefix { prefix: String, context: String },
    #[error("tag `{0}` is not a qualified name (expected prefix:LocalName)")]
    UnqualifiedTag(String),
    #[error("invalid expression in {context}: {source}")]
    Expression {
        context: String,
        #[source]
        source: ExpressionError,
    },
    #[error("generator `{0}` is defined more than once")]
    DuplicateGenerator(String),
    #[error("generator `{generator}` refers to unregistered custom implementation `{implementation}`")]
    UnknownCustomGenerator {
        generator: String,
        implementation: String,
    },
    #[error("mapping uses a narrower condition but no hierarchy lookup was supplied")]
    NarrowerWithoutHierarchy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    #[error("no generator named `{0}`")]
    UnknownGenerator(String),
    #[error("generator `{generator}` is missing argument `{argument}`")]
    MissingArgument { generator: String, argument: String },
    #[error("generator `{generator}` got an empty value for argument `{argument}`")]
    EmptyArgument { generator: String, argument: String },
    #[error("generator `{generator}` has a malformed template: {reason}")]
    MalformedTemplate { generator: String, reason: String },
    #[error("argument `{argument}` of generator `{generator}` is not a valid expression: {source}")]
    ArgumentExpression {
        generator: String,
        argument: String,
        #[source]
        source: ExpressionError,
    },
    #[error("generator `{generator}` needs a qualified name for `{argument}` but none is available")]
    MissingQualifiedName { generator: String, argument: String },
    #[error("custom generator `{generator}` failed: {message}")]
    Custom { generator: String, message: String },
    #[error("generator `{0}` produced a literal where a URI is required")]
    LiteralNotAllowed(String),
    #[error("generator `{0}` produced a URI where a literal is required")]
    UriNotAllowed(String),
    #[error("sequential UUID source exhausted after {0} identifiers")]
    UuidExhausted(usize),
}

/// Where in the traversal a resolution was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    Domain,
    Path,
    Internal,
    Range,
    Additional,
    Label,
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Site::Domain => "domain",
            Site::Path => "path",
            Site::Internal => "internal",
            Site::Range => "range",
            Site::Additional => "additional",
            Site::Label => "label",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("{site} `{tag}`: {source}")]
    Generate {
        site: Site,
        tag: String,
        #[source]
        source: GenerateError,
    },
    #[error("{site} `{tag}`: no namespace bound to prefix `{prefix}`")]
    Namespace {
        site: Site,
        tag: String,
        prefix: String,
    },
    #[error("{site} `{tag}`: a literal cannot be the subject of `{property}`")]
    LiteralSubject {
        site: Site,
        tag: String,
        property: String,
    },
}

impl ResolveError {
    pub fn site(&self) -> Site {
        match self {
            ResolveError::Generate { site, .. }
            | ResolveError::Namespace { site, .. }
            | ResolveError::LiteralSubject { site, .. } => *site,
        }
    }
}

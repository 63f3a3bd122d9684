//! Loading mapping specifications and generator policies.
//!
//! Two textual forms are accepted for each document:
//! - the XML element form (`<x3ml>` for mappings, `<generator_policy>` for
//!   policies), read by [`xml`];
//! - JSON, the serde representation of the `xgraph_map` model types.
//!
//! The form is picked from the first non-blank character: `{` means JSON.

pub mod xml;

use std::fs;
use std::path::{Path, PathBuf};

use xgraph_map::{ConfigError, DocumentError, GeneratorPolicy, MappingSet};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML: {0}")]
    Document(#[from] DocumentError),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected <{expected}> as the root element, found <{found}>")]
    UnexpectedRoot { expected: String, found: String },
    #[error("<{element}> is missing required child <{child}>")]
    MissingElement { element: String, child: String },
    #[error("<{element}> is missing required attribute `{attribute}`")]
    MissingAttribute { element: String, attribute: String },
    #[error("unexpected <{found}> inside <{parent}>")]
    UnexpectedElement { parent: String, found: String },
    #[error(transparent)]
    Name(#[from] ConfigError),
    #[error("unknown argument type `{0}`")]
    ArgumentKind(String),
    #[error("range source `{range}` does not extend path source `{path}`")]
    IncompatibleRange { path: String, range: String },
    #[error("generator `{0}` is defined more than once")]
    DuplicateGenerator(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xml,
    Json,
}

impl Format {
    pub fn detect(text: &str) -> Self {
        match text.trim_start().chars().next() {
            Some('{') => Format::Json,
            _ => Format::Xml,
        }
    }
}

pub fn parse_mapping(text: &str) -> Result<MappingSet, LoadError> {
    match Format::detect(text) {
        Format::Json => Ok(serde_json::from_str(text)?),
        Format::Xml => xml::parse_mapping(text),
    }
}

pub fn parse_policy(text: &str) -> Result<GeneratorPolicy, LoadError> {
    let policy: GeneratorPolicy = match Format::detect(text) {
        Format::Json => serde_json::from_str(text)?,
        Format::Xml => xml::parse_policy(text)?,
    };
    let mut seen = std::collections::HashSet::new();
    for g in &policy.generators {
        if !seen.insert(g.name()) {
            return Err(LoadError::DuplicateGenerator(g.name().to_string()));
        }
    }
    Ok(policy)
}

pub fn load_mapping(path: &Path) -> Result<MappingSet, LoadError> {
    let mapping = parse_mapping(&read(path)?)?;
    tracing::debug!(path = %path.display(), mappings = mapping.mappings.len(), "loaded mapping");
    Ok(mapping)
}

pub fn load_policy(path: &Path) -> Result<GeneratorPolicy, LoadError> {
    let policy = parse_policy(&read(path)?)?;
    tracing::debug!(path = %path.display(), generators = policy.generators.len(), "loaded generator policy");
    Ok(policy)
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

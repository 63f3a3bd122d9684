//! Prefix → namespace URI resolution.

use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::model::{MappingNamespace, QualifiedName};

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

pub const RDFS_LABEL_IRI: &str = "http://www.w3.org/2000/01/rdf-schema#label";

/// Prefix table used to expand class/property tags and to scope expression
/// name tests. `rdf`, `rdfs`, `xsd` and `xml` are pre-bound; declarations
/// from a mapping or policy override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    prefixes: BTreeMap<String, String>,
}

impl Default for Namespaces {
    fn default() -> Self {
        let mut prefixes = BTreeMap::new();
        prefixes.insert("rdf".to_string(), RDF_NS.to_string());
        prefixes.insert("rdfs".to_string(), RDFS_NS.to_string());
        prefixes.insert("xsd".to_string(), XSD_NS.to_string());
        prefixes.insert("xml".to_string(), XML_NS.to_string());
        Self { prefixes }
    }
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_declarations<'a>(decls: impl IntoIterator<Item = &'a MappingNamespace>) -> Self {
        let mut ns = Self::default();
        ns.extend(decls);
        ns
    }

    pub fn extend<'a>(&mut self, decls: impl IntoIterator<Item = &'a MappingNamespace>) {
        for decl in decls {
            self.insert(&decl.prefix, &decl.uri);
        }
    }

    pub fn insert(&mut self, prefix: &str, uri: &str) {
        self.prefixes.insert(prefix.to_string(), uri.to_string());
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    pub fn expand(&self, name: &QualifiedName) -> Option<String> {
        self.uri(&name.prefix)
            .map(|ns| format!("{ns}{}", name.local))
    }

    /// Expand or fail with a configuration error naming `context`.
    pub fn require(&self, name: &QualifiedName, context: &str) -> Result<String, ConfigError> {
        self.expand(name).ok_or_else(|| ConfigError::UnknownPrefix {
            prefix: name.prefix.clone(),
            context: context.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

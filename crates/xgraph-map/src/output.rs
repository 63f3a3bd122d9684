//! Triples and triple sinks.
//!
//! The engine produces a [`Graph`]; how it is written out is a sink concern.

use std::collections::HashSet;
use std::io::{self, Write};

use oxrdf::vocab::rdf;
use oxrdf::{Literal, NamedNode, Term};
use serde::{Deserialize, Serialize};

use crate::generator::{Value, ValueKind};

/// One assertion. Classes are expanded IRIs; `None` for values without a
/// class (label literals).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_class: Option<String>,
    pub predicate: String,
    pub object: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_class: Option<String>,
}

/// Triples in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    triples: Vec<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, triple: Triple) {
        self.triples.push(triple);
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    pub fn into_triples(self) -> Vec<Triple> {
        self.triples
    }

    /// Triples whose predicate is `predicate`.
    pub fn with_predicate<'a, 'p>(&'a self, predicate: &'p str) -> impl Iterator<Item = &'a Triple> + 'p
    where
        'a: 'p,
    {
        self.triples.iter().filter(move |t| t.predicate == predicate)
    }

    /// Hand every triple to `sink`, then finish it.
    pub fn write_to(&self, sink: &mut dyn TripleSink) -> io::Result<()> {
        for t in &self.triples {
            sink.assert(t)?;
        }
        sink.finish()
    }
}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Triple;
    type IntoIter = std::slice::Iter<'a, Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.iter()
    }
}

pub trait TripleSink {
    fn assert(&mut self, triple: &Triple) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub triples: Vec<Triple>,
}

impl TripleSink for CollectingSink {
    fn assert(&mut self, triple: &Triple) -> io::Result<()> {
        self.triples.push(triple.clone());
        Ok(())
    }
}

/// N-Triples. Each classed URI resource gets one `rdf:type` line, written
/// before the first assertion that mentions it.
///
/// Terms are built as `oxrdf` terms, so IRIs and language tags are validated
/// and literals escaped by its serializer. A triple with a term that does not
/// validate (or with a literal subject) is dropped with a warning.
pub struct NTriplesWriter<W: Write> {
    out: W,
    typed: HashSet<String>,
}

impl<W: Write> NTriplesWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            typed: HashSet::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Type declarations still owed for `triple`, then the triple itself.
    fn statements(&mut self, triple: &Triple) -> Result<Vec<oxrdf::Triple>, String> {
        if triple.subject.kind == ValueKind::Literal {
            return Err("literal subject cannot be written as N-Triples".to_string());
        }
        let subject = named_node(&triple.subject.content)?;
        let assertion = oxrdf::Triple::new(subject.clone(), named_node(&triple.predicate)?, term(&triple.object)?);

        let mut classed = Vec::new();
        if let Some(class) = &triple.subject_class {
            classed.push((subject, named_node(class)?));
        }
        if let (Term::NamedNode(object), Some(class)) = (&assertion.object, &triple.object_class) {
            classed.push((object.clone(), named_node(class)?));
        }

        let mut out = Vec::new();
        for (node, class) in classed {
            if self.typed.insert(node.as_str().to_string()) {
                out.push(oxrdf::Triple::new(node, rdf::TYPE, class));
            }
        }
        out.push(assertion);
        Ok(out)
    }
}

impl<W: Write> TripleSink for NTriplesWriter<W> {
    fn assert(&mut self, triple: &Triple) -> io::Result<()> {
        match self.statements(triple) {
            Ok(statements) => {
                for statement in statements {
                    writeln!(self.out, "{statement} .")?;
                }
                Ok(())
            }
            Err(reason) => {
                tracing::warn!(
                    subject = %triple.subject,
                    predicate = %triple.predicate,
                    object = %triple.object,
                    %reason,
                    "triple dropped from N-Triples output"
                );
                Ok(())
            }
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// One JSON object per line.
pub struct JsonLinesWriter<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TripleSink for JsonLinesWriter<W> {
    fn assert(&mut self, triple: &Triple) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, triple)?;
        self.out.write_all(b"\n")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn named_node(iri: &str) -> Result<NamedNode, String> {
    NamedNode::new(iri).map_err(|e| format!("invalid IRI <{iri}>: {e}"))
}

fn term(value: &Value) -> Result<Term, String> {
    match (value.kind, &value.language) {
        (ValueKind::Uri, _) => Ok(named_node(&value.content)?.into()),
        (ValueKind::Literal, Some(lang)) => Literal::new_language_tagged_literal(value.content.as_str(), lang.as_str())
            .map(Term::from)
            .map_err(|e| format!("invalid language tag `{lang}`: {e}")),
        (ValueKind::Literal, None) => Ok(Literal::new_simple_literal(value.content.as_str()).into()),
    }
}

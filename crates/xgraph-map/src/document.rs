//! Source documents.
//!
//! The engine reads its input through [`SourceDocument`]: navigate the tree,
//! evaluate a compiled expression against a node, render a node's structural
//! path. [`XmlDocument`] is the in-memory implementation, an arena tree built
//! from XML text with `quick-xml`.
//!
//! Node ids are handed out in document order (element, then its attributes,
//! then its children), so sorting ids sorts nodes.

use std::borrow::Cow;
use std::collections::HashMap;
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::DocumentError;
use crate::namespace::XML_NS;
use crate::xpath::XPath;

/// What the engine needs from an input document.
///
/// Implementations expose their tree through the navigation methods and
/// get expression evaluation for free: [`XPath::evaluate`] only walks the
/// tree through this trait. Node ids must follow document order.
pub trait SourceDocument {
    /// The document node; domain source expressions are evaluated here.
    fn root(&self) -> NodeId;

    fn kind(&self, node: NodeId) -> NodeKind;

    /// Element or attribute name; `None` for document and text nodes.
    fn name(&self, node: NodeId) -> Option<&XmlName>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Element, text and document children in document order.
    fn children(&self, node: NodeId) -> &[NodeId];

    fn attributes(&self, node: NodeId) -> &[NodeId];

    fn string_value(&self, node: NodeId) -> String;

    /// Location of `node` independent of how it was reached, e.g.
    /// `/records[1]/record[2]/@id`. Used as the identity-cache key.
    fn structural_path(&self, node: NodeId) -> String;

    /// Nearest `xml:lang` on the node or its ancestors. An empty
    /// `xml:lang=""` resets the language: the walk stops with `None`.
    fn language(&self, node: NodeId) -> Option<String>;

    /// Descendants of `node` (not including it) in document order.
    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Nodes selected by `expr` from `context`, in document order.
    fn select(&self, expr: &XPath, context: NodeId) -> Vec<NodeId> {
        expr.evaluate(self, context)
    }

    /// Trimmed string value of the first match, empty when nothing matches.
    fn value_at(&self, expr: &XPath, context: NodeId) -> String {
        self.select(expr, context)
            .first()
            .map(|n| self.string_value(*n).trim().to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Id for the `index`-th node in document order.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl XmlName {
    /// Name as written in the source (`prefix:local` or `local`).
    pub fn display(&self) -> Cow<'_, str> {
        match &self.prefix {
            Some(p) => Cow::Owned(format!("{p}:{}", self.local)),
            None => Cow::Borrowed(&self.local),
        }
    }

    fn same_as(&self, other: &XmlName) -> bool {
        self.local == other.local && self.namespace == other.namespace
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    name: Option<XmlName>,
    value: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            name: None,
            value: String::new(),
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<NodeData>,
}

impl FromStr for XmlDocument {
    type Err = DocumentError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl XmlDocument {
    pub const ROOT: NodeId = NodeId(0);

    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let mut builder = TreeBuilder::new();
        let mut reader = Reader::from_str(text);

        loop {
            let event = reader.read_event().map_err(|e| DocumentError::Xml {
                position: reader.buffer_position(),
                message: e.to_string(),
            })?;
            match event {
                Event::Start(ref e) => {
                    builder.open(e, reader.buffer_position())?;
                }
                Event::Empty(ref e) => {
                    builder.open(e, reader.buffer_position())?;
                    builder.close(e.name().as_ref())?;
                }
                Event::End(ref e) => {
                    builder.close(e.name().as_ref())?;
                }
                Event::Text(ref e) => {
                    let text = e.unescape().map_err(|err| DocumentError::Xml {
                        position: reader.buffer_position(),
                        message: err.to_string(),
                    })?;
                    builder.text(&text);
                }
                Event::CData(ref e) => {
                    let raw = e.clone().into_inner();
                    builder.text(&String::from_utf8_lossy(&raw));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        builder.finish()
    }

    pub fn root_element(&self) -> Option<NodeId> {
        self.child_elements(Self::ROOT).next()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn kind(&self, node: NodeId) -> NodeKind {
        self.nodes[node.0].kind
    }

    pub fn name(&self, node: NodeId) -> Option<&XmlName> {
        self.nodes[node.0].name.as_ref()
    }

    pub fn local_name(&self, node: NodeId) -> &str {
        self.nodes[node.0]
            .name
            .as_ref()
            .map(|n| n.local.as_str())
            .unwrap_or("")
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn attributes(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].attributes
    }

    pub fn child_elements(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node)
            .iter()
            .copied()
            .filter(move |c| self.kind(*c) == NodeKind::Element)
    }

    /// Unqualified attribute lookup by local name.
    pub fn attribute(&self, node: NodeId, local: &str) -> Option<&str> {
        self.attributes(node)
            .iter()
            .find(|a| self.local_name(**a) == local)
            .map(|a| self.nodes[a.0].value.as_str())
    }

    /// Text of an element's own text children, trimmed.
    pub fn own_text(&self, node: NodeId) -> String {
        let mut out = String::new();
        for c in self.children(node) {
            if self.kind(*c) == NodeKind::Text {
                out.push_str(&self.nodes[c.0].value);
            }
        }
        out.trim().to_string()
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let data = &self.nodes[node.0];
        match data.kind {
            NodeKind::Text | NodeKind::Attribute => out.push_str(&data.value),
            NodeKind::Element | NodeKind::Document => {
                for c in &data.children {
                    self.collect_text(*c, out);
                }
            }
        }
    }

    fn step_label(&self, node: NodeId) -> String {
        let data = &self.nodes[node.0];
        match data.kind {
            NodeKind::Document => String::new(),
            NodeKind::Attribute => {
                let name = data.name.as_ref().map(|n| n.display()).unwrap_or_default();
                format!("@{name}")
            }
            NodeKind::Element => {
                let Some(name) = data.name.as_ref() else {
                    return String::new();
                };
                let position = data
                    .parent
                    .map(|p| {
                        self.child_elements(p)
                            .take_while(|s| *s != node)
                            .filter(|s| self.name(*s).is_some_and(|sn| sn.same_as(name)))
                            .count()
                            + 1
                    })
                    .unwrap_or(1);
                format!("{}[{position}]", name.display())
            }
            NodeKind::Text => {
                let position = data
                    .parent
                    .map(|p| {
                        self.children(p)
                            .iter()
                            .take_while(|s| **s != node)
                            .filter(|s| self.kind(**s) == NodeKind::Text)
                            .count()
                            + 1
                    })
                    .unwrap_or(1);
                format!("text()[{position}]")
            }
        }
    }
}

impl SourceDocument for XmlDocument {
    fn root(&self) -> NodeId {
        Self::ROOT
    }

    fn kind(&self, node: NodeId) -> NodeKind {
        XmlDocument::kind(self, node)
    }

    fn name(&self, node: NodeId) -> Option<&XmlName> {
        XmlDocument::name(self, node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        XmlDocument::parent(self, node)
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        XmlDocument::children(self, node)
    }

    fn attributes(&self, node: NodeId) -> &[NodeId] {
        XmlDocument::attributes(self, node)
    }

    fn string_value(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn structural_path(&self, node: NodeId) -> String {
        let mut labels = Vec::new();
        let mut walk = Some(node);
        while let Some(n) = walk {
            if self.kind(n) != NodeKind::Document {
                labels.push(self.step_label(n));
            }
            walk = self.parent(n);
        }
        if labels.is_empty() {
            return "/".to_string();
        }
        labels.reverse();
        let mut path = String::new();
        for label in labels {
            path.push('/');
            path.push_str(&label);
        }
        path
    }

    fn language(&self, node: NodeId) -> Option<String> {
        let mut walk = Some(node);
        while let Some(n) = walk {
            for a in self.attributes(n) {
                let is_lang = self.name(*a).is_some_and(|name| {
                    name.local == "lang" && name.namespace.as_deref() == Some(XML_NS)
                });
                if is_lang {
                    let lang = self.nodes[a.0].value.trim();
                    return (!lang.is_empty()).then(|| lang.to_string());
                }
            }
            walk = self.parent(n);
        }
        None
    }
}

// ============================================================================
// Tree construction
// ============================================================================

struct TreeBuilder {
    nodes: Vec<NodeData>,
    stack: Vec<NodeId>,
    /// Namespace bindings per open element; `""` is the default namespace.
    scopes: Vec<HashMap<String, String>>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            nodes: vec![NodeData::new(NodeKind::Document, None)],
            stack: vec![XmlDocument::ROOT],
            scopes: Vec::new(),
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(XmlDocument::ROOT)
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    fn resolve(&self, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_NS.to_string());
        }
        let key = prefix.unwrap_or("");
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(key))
            .filter(|uri| !uri.is_empty())
            .cloned()
    }

    fn open(&mut self, start: &BytesStart<'_>, position: usize) -> Result<(), DocumentError> {
        let mut scope = HashMap::new();
        let mut plain_attrs = Vec::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| DocumentError::Xml {
                position,
                message: e.to_string(),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| DocumentError::Xml {
                    position,
                    message: e.to_string(),
                })?
                .into_owned();
            if key == "xmlns" {
                scope.insert(String::new(), value);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.insert(prefix.to_string(), value);
            } else {
                plain_attrs.push((key, value));
            }
        }
        self.scopes.push(scope);

        let raw = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let (prefix, local) = split_name(&raw);
        let namespace = self.resolve(prefix.as_deref());
        let parent = self.current();

        let mut element = NodeData::new(NodeKind::Element, Some(parent));
        element.name = Some(XmlName {
            prefix,
            local,
            namespace,
        });
        let element_id = self.push(element);
        self.nodes[parent.0].children.push(element_id);

        for (key, value) in plain_attrs {
            let (prefix, local) = split_name(&key);
            // Unprefixed attributes are in no namespace.
            let namespace = match prefix.as_deref() {
                Some(p) => self.resolve(Some(p)),
                None => None,
            };
            let mut attr = NodeData::new(NodeKind::Attribute, Some(element_id));
            attr.name = Some(XmlName {
                prefix,
                local,
                namespace,
            });
            attr.value = value;
            let attr_id = self.push(attr);
            self.nodes[element_id.0].attributes.push(attr_id);
        }

        self.stack.push(element_id);
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> Result<(), DocumentError> {
        if self.stack.len() <= 1 {
            return Err(DocumentError::UnbalancedEnd(
                String::from_utf8_lossy(name).into_owned(),
            ));
        }
        self.stack.pop();
        self.scopes.pop();
        Ok(())
    }

    fn text(&mut self, text: &str) {
        // Whitespace between elements and text outside the root are not content.
        if text.trim().is_empty() || self.stack.len() <= 1 {
            return;
        }
        let parent = self.current();
        let mut node = NodeData::new(NodeKind::Text, Some(parent));
        node.value = text.to_string();
        let id = self.push(node);
        self.nodes[parent.0].children.push(id);
    }

    fn finish(self) -> Result<XmlDocument, DocumentError> {
        let doc = XmlDocument { nodes: self.nodes };
        if doc.root_element().is_none() {
            return Err(DocumentError::NoRootElement);
        }
        Ok(doc)
    }
}

fn split_name(raw: &str) -> (Option<String>, String) {
    match raw.split_once(':') {
        Some((p, l)) => (Some(p.to_string()), l.to_string()),
        None => (None, raw.to_string()),
    }
}

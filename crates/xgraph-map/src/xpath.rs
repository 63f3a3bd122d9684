//! Source expressions: a compiled XPath 1.0 subset.
//!
//! Supported:
//! - absolute and relative location paths, `/`, `//`, `.`, `..`, `|`
//! - axes `child::`, `attribute::` (`@`), `self::`, `parent::`,
//!   `descendant::`, `descendant-or-self::`
//! - name tests `name`, `p:name`, `p:*`, `*`, and node tests `text()`, `node()`
//! - predicates: `[n]`, `[last()]`, `[path]`, `[path = 'x']`, `[path != 'x']`,
//!   combined with `and`, `or`, `not(...)` and parentheses
//!
//! Prefixes are resolved when compiling, so an unknown prefix is a compile
//! error rather than an empty result. An empty expression selects the context
//! node.

use std::collections::HashMap;
use std::fmt;

use crate::document::{NodeId, NodeKind, SourceDocument};
use crate::error::ExpressionError;
use crate::namespace::Namespaces;

#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    pub fn compile(source: &str, namespaces: &Namespaces) -> Result<Self, ExpressionError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Self {
                source: source.to_string(),
                expr: Expr::Context,
            });
        }
        let tokens = tokenize(trimmed)?;
        let mut parser = Parser {
            source: trimmed,
            tokens,
            pos: 0,
            namespaces,
        };
        let expr = parser.parse_union()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Nodes selected from `context`, sorted into document order.
    pub fn evaluate<D: SourceDocument + ?Sized>(&self, doc: &D, context: NodeId) -> Vec<NodeId> {
        match &self.expr {
            Expr::Context => vec![context],
            Expr::Union(paths) => {
                let mut out = Vec::new();
                for p in paths {
                    out.extend(eval_path(doc, p, context));
                }
                out.sort();
                out.dedup();
                out
            }
        }
    }
}

/// Expressions compiled once up front, looked up by their source text.
#[derive(Debug, Clone, Default)]
pub struct ExpressionTable {
    compiled: HashMap<String, XPath>,
}

impl ExpressionTable {
    /// Compile `source` unless it is already present.
    pub fn compile(&mut self, source: &str, namespaces: &Namespaces) -> Result<&XPath, ExpressionError> {
        if !self.compiled.contains_key(source) {
            let xp = XPath::compile(source, namespaces)?;
            self.compiled.insert(source.to_string(), xp);
        }
        Ok(&self.compiled[source])
    }

    pub fn get(&self, source: &str) -> Option<&XPath> {
        self.compiled.get(source)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Context,
    Union(Vec<LocationPath>),
}

#[derive(Debug, Clone, PartialEq)]
struct LocationPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Attribute,
    SelfNode,
    Parent,
    Descendant,
    DescendantOrSelf,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    /// `local: None` is `*` (optionally namespace-restricted).
    Name {
        namespace: Option<String>,
        any_namespace: bool,
        local: Option<String>,
    },
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    Last,
    Exists(LocationPath),
    Compare {
        path: LocationPath,
        negate: bool,
        literal: String,
    },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

// ============================================================================
// Evaluation
// ============================================================================

fn eval_path<D: SourceDocument + ?Sized>(doc: &D, path: &LocationPath, context: NodeId) -> Vec<NodeId> {
    let mut current = if path.absolute {
        vec![doc.root()]
    } else {
        vec![context]
    };
    for step in &path.steps {
        let mut next = Vec::new();
        for node in &current {
            let candidates: Vec<NodeId> = axis_nodes(doc, step.axis, *node)
                .into_iter()
                .filter(|n| matches_test(doc, step.axis, &step.test, *n))
                .collect();
            next.extend(apply_predicates(doc, &step.predicates, candidates));
        }
        next.sort();
        next.dedup();
        current = next;
    }
    current
}

fn axis_nodes<D: SourceDocument + ?Sized>(doc: &D, axis: Axis, node: NodeId) -> Vec<NodeId> {
    match axis {
        Axis::Child => doc.children(node).to_vec(),
        Axis::Attribute => doc.attributes(node).to_vec(),
        Axis::SelfNode => vec![node],
        Axis::Parent => doc.parent(node).into_iter().collect(),
        Axis::Descendant => doc.descendants(node),
        Axis::DescendantOrSelf => {
            let mut out = vec![node];
            out.extend(doc.descendants(node));
            out
        }
    }
}

fn matches_test<D: SourceDocument + ?Sized>(doc: &D, axis: Axis, test: &NodeTest, node: NodeId) -> bool {
    let kind = doc.kind(node);
    match test {
        NodeTest::Node => true,
        NodeTest::Text => kind == NodeKind::Text,
        NodeTest::Name {
            namespace,
            any_namespace,
            local,
        } => {
            let principal = if axis == Axis::Attribute {
                NodeKind::Attribute
            } else {
                NodeKind::Element
            };
            if kind != principal {
                return false;
            }
            let Some(name) = doc.name(node) else {
                return false;
            };
            if !any_namespace && &name.namespace != namespace {
                return false;
            }
            match local {
                Some(l) => &name.local == l,
                None => true,
            }
        }
    }
}

fn apply_predicates<D: SourceDocument + ?Sized>(doc: &D, predicates: &[Predicate], mut nodes: Vec<NodeId>) -> Vec<NodeId> {
    for predicate in predicates {
        let size = nodes.len();
        nodes = nodes
            .into_iter()
            .enumerate()
            .filter(|(i, n)| predicate_holds(doc, predicate, *n, i + 1, size))
            .map(|(_, n)| n)
            .collect();
    }
    nodes
}

fn predicate_holds<D: SourceDocument + ?Sized>(doc: &D, predicate: &Predicate, node: NodeId, position: usize, size: usize) -> bool {
    match predicate {
        Predicate::Position(n) => position == *n,
        Predicate::Last => position == size,
        Predicate::Exists(path) => !eval_path(doc, path, node).is_empty(),
        Predicate::Compare {
            path,
            negate,
            literal,
        } => {
            eval_path(doc, path, node).into_iter().any(|n| {
                let value = doc.string_value(n);
                (value == *literal) != *negate
            })
        }
        Predicate::Not(inner) => !predicate_holds(doc, inner, node, position, size),
        Predicate::And(a, b) => {
            predicate_holds(doc, a, node, position, size) && predicate_holds(doc, b, node, position, size)
        }
        Predicate::Or(a, b) => {
            predicate_holds(doc, a, node, position, size) || predicate_holds(doc, b, node, position, size)
        }
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Star,
    Pipe,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    NotEq,
    Colon,
    DoubleColon,
    Name(String),
    Literal(String),
    Number(String),
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let err = |offset: usize, message: &str| ExpressionError {
        expression: src.to_string(),
        offset,
        message: message.to_string(),
    };
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (offset, c) = chars[i];
        let peek = chars.get(i + 1).map(|(_, c)| *c);
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '/' if peek == Some('/') => {
                out.push((offset, Token::DoubleSlash));
                i += 2;
            }
            '/' => {
                out.push((offset, Token::Slash));
                i += 1;
            }
            '.' if peek == Some('.') => {
                out.push((offset, Token::DotDot));
                i += 2;
            }
            '.' if peek.is_some_and(|p| p.is_ascii_digit()) => {
                return Err(err(offset, "fractional numbers are not supported"));
            }
            '.' => {
                out.push((offset, Token::Dot));
                i += 1;
            }
            ':' if peek == Some(':') => {
                out.push((offset, Token::DoubleColon));
                i += 2;
            }
            ':' => {
                out.push((offset, Token::Colon));
                i += 1;
            }
            '!' if peek == Some('=') => {
                out.push((offset, Token::NotEq));
                i += 2;
            }
            '@' => {
                out.push((offset, Token::At));
                i += 1;
            }
            '*' => {
                out.push((offset, Token::Star));
                i += 1;
            }
            '|' => {
                out.push((offset, Token::Pipe));
                i += 1;
            }
            '[' => {
                out.push((offset, Token::LBracket));
                i += 1;
            }
            ']' => {
                out.push((offset, Token::RBracket));
                i += 1;
            }
            '(' => {
                out.push((offset, Token::LParen));
                i += 1;
            }
            ')' => {
                out.push((offset, Token::RParen));
                i += 1;
            }
            '=' => {
                out.push((offset, Token::Eq));
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut j = i + 1;
                let mut text = String::new();
                while j < chars.len() && chars[j].1 != quote {
                    text.push(chars[j].1);
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(err(offset, "unterminated string literal"));
                }
                out.push((offset, Token::Literal(text)));
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let mut j = i;
                let mut text = String::new();
                while j < chars.len() && chars[j].1.is_ascii_digit() {
                    text.push(chars[j].1);
                    j += 1;
                }
                out.push((offset, Token::Number(text)));
                i = j;
            }
            c if is_name_start(c) => {
                let mut j = i;
                let mut text = String::new();
                while j < chars.len() && is_name_char(chars[j].1) {
                    text.push(chars[j].1);
                    j += 1;
                }
                out.push((offset, Token::Name(text)));
                i = j;
            }
            other => {
                return Err(err(offset, &format!("unexpected character `{other}`")));
            }
        }
    }
    Ok(out)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
    namespaces: &'a Namespaces,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(_, t)| t)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        t
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(o, _)| *o)
            .unwrap_or(self.source.len())
    }

    fn error(&self, message: &str) -> ExpressionError {
        ExpressionError {
            expression: self.source.to_string(),
            offset: self.offset(),
            message: message.to_string(),
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ExpressionError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn parse_union(&mut self) -> Result<Expr, ExpressionError> {
        let mut paths = vec![self.parse_path()?];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            paths.push(self.parse_path()?);
        }
        Ok(Expr::Union(paths))
    }

    fn parse_path(&mut self) -> Result<LocationPath, ExpressionError> {
        let mut steps = Vec::new();
        let absolute = match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if !self.starts_step() {
                    return Ok(LocationPath {
                        absolute: true,
                        steps,
                    });
                }
                true
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(descendant_or_self());
                true
            }
            _ => false,
        };

        steps.push(self.parse_step()?);
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                    steps.push(self.parse_step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(descendant_or_self());
                    steps.push(self.parse_step()?);
                }
                _ => break,
            }
        }
        Ok(LocationPath { absolute, steps })
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn parse_step(&mut self) -> Result<Step, ExpressionError> {
        match self.peek() {
            Some(Token::Dot) => {
                self.pos += 1;
                return Ok(Step {
                    axis: Axis::SelfNode,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            Some(Token::DotDot) => {
                self.pos += 1;
                return Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            _ => {}
        }

        let mut axis = Axis::Child;
        if self.peek() == Some(&Token::At) {
            self.pos += 1;
            axis = Axis::Attribute;
        } else if let (Some(Token::Name(name)), Some(Token::DoubleColon)) = (self.peek(), self.peek_at(1)) {
            axis = match name.as_str() {
                "child" => Axis::Child,
                "attribute" => Axis::Attribute,
                "self" => Axis::SelfNode,
                "parent" => Axis::Parent,
                "descendant" => Axis::Descendant,
                "descendant-or-self" => Axis::DescendantOrSelf,
                other => return Err(self.error(&format!("unsupported axis `{other}`"))),
            };
            self.pos += 2;
        }

        let test = self.parse_node_test()?;
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.pos += 1;
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket, "`]`")?;
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, ExpressionError> {
        match self.bump() {
            Some(Token::Star) => Ok(NodeTest::Name {
                namespace: None,
                any_namespace: true,
                local: None,
            }),
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return match name.as_str() {
                        "text" | "node" => {
                            self.pos += 1;
                            self.expect(Token::RParen, "`)`")?;
                            Ok(if name == "text" {
                                NodeTest::Text
                            } else {
                                NodeTest::Node
                            })
                        }
                        other => Err(self.error(&format!("unsupported node test `{other}()`"))),
                    };
                }
                if self.peek() == Some(&Token::Colon) {
                    self.pos += 1;
                    let namespace = self
                        .namespaces
                        .uri(&name)
                        .map(str::to_string)
                        .ok_or_else(|| self.error(&format!("unknown namespace prefix `{name}`")))?;
                    return match self.bump() {
                        Some(Token::Star) => Ok(NodeTest::Name {
                            namespace: Some(namespace),
                            any_namespace: false,
                            local: None,
                        }),
                        Some(Token::Name(local)) => Ok(NodeTest::Name {
                            namespace: Some(namespace),
                            any_namespace: false,
                            local: Some(local),
                        }),
                        _ => Err(self.error("expected local name after prefix")),
                    };
                }
                Ok(NodeTest::Name {
                    namespace: None,
                    any_namespace: false,
                    local: Some(name),
                })
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("expected a node test"))
            }
        }
    }

    fn parse_or(&mut self) -> Result<Predicate, ExpressionError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Name(n)) if n == "or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Predicate, ExpressionError> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::Name(n)) if n == "and") {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Predicate, ExpressionError> {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::Name(n)), Some(Token::LParen)) if n == "not" => {
                self.pos += 2;
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(Predicate::Not(Box::new(inner)))
            }
            (Some(Token::Name(n)), Some(Token::LParen)) if n == "last" => {
                self.pos += 2;
                self.expect(Token::RParen, "`)`")?;
                Ok(Predicate::Last)
            }
            (Some(Token::Number(_)), _) => {
                let Some(Token::Number(text)) = self.bump() else {
                    return Err(self.error("expected a number"));
                };
                let n: usize = text
                    .parse()
                    .map_err(|_| self.error("position out of range"))?;
                if n == 0 {
                    return Err(self.error("positions start at 1"));
                }
                Ok(Predicate::Position(n))
            }
            (Some(Token::LParen), _) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            _ => {
                let path = self.parse_path()?;
                let negate = match self.peek() {
                    Some(Token::Eq) => false,
                    Some(Token::NotEq) => true,
                    _ => return Ok(Predicate::Exists(path)),
                };
                self.pos += 1;
                let literal = match self.bump() {
                    Some(Token::Literal(s)) | Some(Token::Number(s)) => s,
                    _ => {
                        self.pos = self.pos.saturating_sub(1);
                        return Err(self.error("expected a string or number to compare with"));
                    }
                };
                Ok(Predicate::Compare {
                    path,
                    negate,
                    literal,
                })
            }
        }
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}

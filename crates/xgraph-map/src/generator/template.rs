//! Template patterns.
//!
//! `{name}` and `{kind:name}` placeholders, `kind` one of `xpath`, `qname`,
//! `literal` (`constant` accepted). Expressions follow RFC 6570 level 3:
//! an optional operator (`+ # . / ; ? &`) and a comma-separated variable
//! list. Every variable holds a single string; the level 4 modifiers
//! (`:n` prefixes, `*` explode) are not supported.

use std::sync::OnceLock;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

use crate::model::ArgKind;

/// Bytes escaped by simple expansion: everything but `ALPHA DIGIT - . _ ~`.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Bytes escaped by reserved expansion: the unreserved set plus the RFC 3986
/// gen-delims and sub-delims pass through.
const RESERVED: &AsciiSet = &UNRESERVED
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'#')
    .remove(b'[')
    .remove(b']')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    /// `None` leaves the kind to the argument declaration.
    pub kind: Option<ArgKind>,
}

/// Expression operator and its expansion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Simple,
    Reserved,
    Fragment,
    Label,
    PathSegment,
    PathParameter,
    Query,
    QueryContinuation,
}

impl Operator {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '+' => Operator::Reserved,
            '#' => Operator::Fragment,
            '.' => Operator::Label,
            '/' => Operator::PathSegment,
            ';' => Operator::PathParameter,
            '?' => Operator::Query,
            '&' => Operator::QueryContinuation,
            _ => return None,
        })
    }

    fn first(self) -> &'static str {
        match self {
            Operator::Simple | Operator::Reserved => "",
            Operator::Fragment => "#",
            Operator::Label => ".",
            Operator::PathSegment => "/",
            Operator::PathParameter => ";",
            Operator::Query => "?",
            Operator::QueryContinuation => "&",
        }
    }

    fn separator(self) -> &'static str {
        match self {
            Operator::Simple | Operator::Reserved | Operator::Fragment => ",",
            Operator::Label => ".",
            Operator::PathSegment => "/",
            Operator::PathParameter => ";",
            Operator::Query | Operator::QueryContinuation => "&",
        }
    }

    /// Variables are written as `name=value`.
    fn named(self) -> bool {
        matches!(
            self,
            Operator::PathParameter | Operator::Query | Operator::QueryContinuation
        )
    }

    /// Written after the name when the value is empty (`;x` but `?x=`).
    fn if_empty(self) -> &'static str {
        match self {
            Operator::Query | Operator::QueryContinuation => "=",
            _ => "",
        }
    }

    fn allows_reserved(self) -> bool {
        matches!(self, Operator::Reserved | Operator::Fragment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Expression { operator: Operator, vars: Vec<Placeholder> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

fn braces() -> &'static Regex {
    static BRACES: OnceLock<Regex> = OnceLock::new();
    BRACES.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("static regex"))
}

impl Template {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let mut parts = Vec::new();
        let mut last = 0;
        for caps in braces().captures_iter(pattern) {
            let Some(whole) = caps.get(0) else { continue };
            push_text(&mut parts, &pattern[last..whole.start()])?;
            let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            parts.push(parse_expression(body)?);
            last = whole.end();
        }
        push_text(&mut parts, &pattern[last..])?;
        Ok(Self { parts })
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.parts.iter().flat_map(|p| match p {
            Part::Expression { vars, .. } => vars.as_slice(),
            Part::Text(_) => &[],
        })
    }

    /// Substitute every placeholder with `resolve`'s value. With `encode`,
    /// values are percent-encoded as their operator requires; without it
    /// values are inserted verbatim (operator prefixes and names still apply).
    pub fn expand<E>(
        &self,
        encode: bool,
        mut resolve: impl FnMut(&Placeholder) -> Result<String, E>,
    ) -> Result<String, E> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(t) => out.push_str(t),
                Part::Expression { operator, vars } => {
                    out.push_str(operator.first());
                    for (i, var) in vars.iter().enumerate() {
                        if i > 0 {
                            out.push_str(operator.separator());
                        }
                        let value = resolve(var)?;
                        if operator.named() {
                            out.push_str(&var.name);
                            if value.is_empty() {
                                out.push_str(operator.if_empty());
                                continue;
                            }
                            out.push('=');
                        }
                        if encode {
                            out.push_str(&percent_encode(&value, operator.allows_reserved()));
                        } else {
                            out.push_str(&value);
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

fn push_text(parts: &mut Vec<Part>, text: &str) -> Result<(), String> {
    if text.contains('{') || text.contains('}') {
        return Err(format!("unbalanced brace in `{text}`"));
    }
    if !text.is_empty() {
        parts.push(Part::Text(text.to_string()));
    }
    Ok(())
}

fn parse_expression(body: &str) -> Result<Part, String> {
    let mut chars = body.chars();
    let (operator, list) = match chars.next().and_then(Operator::from_char) {
        Some(op) => (op, chars.as_str()),
        None => (Operator::Simple, body),
    };
    let mut vars = Vec::new();
    for raw in list.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(format!("empty placeholder in `{{{body}}}`"));
        }
        if raw.ends_with('*') {
            return Err(format!("explode modifier in `{raw}` is not supported"));
        }
        let var = match raw.split_once(':') {
            Some((kind, name)) => {
                let kind: ArgKind = kind.parse()?;
                if name.is_empty() {
                    return Err(format!("placeholder `{raw}` has no name"));
                }
                Placeholder {
                    name: name.to_string(),
                    kind: Some(kind),
                }
            }
            None => Placeholder {
                name: raw.to_string(),
                kind: None,
            },
        };
        if !var
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(format!("invalid placeholder name `{}`", var.name));
        }
        vars.push(var);
    }
    Ok(Part::Expression { operator, vars })
}

/// Percent-encode `value` as UTF-8. `keep_reserved` lets the RFC 3986
/// reserved characters through (`{+x}`, `{#x}`).
pub fn percent_encode(value: &str, keep_reserved: bool) -> String {
    let set = if keep_reserved { RESERVED } else { UNRESERVED };
    utf8_percent_encode(value, set).to_string()
}

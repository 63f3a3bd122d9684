//! Value/URI generation.
//!
//! [`ValuePolicy`] is the compiled generator policy. Dispatch order for a
//! generator name: the built-ins (`UUID`, `Literal`, `Constant`), then a
//! template definition, then a custom definition.
//!
//! Generators never look at the document themselves. Argument values come
//! from an [`ArgumentSource`] supplied by the engine for the current context
//! node and owning tag, so a parameter's kind (not the argument's content)
//! decides how the argument is read.

pub mod custom;
pub mod template;
pub mod uuid;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GenerateError};
use crate::model::{ArgKind, CustomDef, GeneratorDef, GeneratorPolicy};
use crate::namespace::Namespaces;

use self::custom::{CustomFactory, CustomRegistry};
use self::template::Template;
use self::uuid::UuidSource;

pub const UUID_GENERATOR: &str = "UUID";
pub const LITERAL_GENERATOR: &str = "Literal";
pub const CONSTANT_GENERATOR: &str = "Constant";

pub fn is_builtin(name: &str) -> bool {
    matches!(name, UUID_GENERATOR | LITERAL_GENERATOR | CONSTANT_GENERATOR)
}

// ============================================================================
// Values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Uri,
    Literal,
}

/// A generated identifier or literal. Only literals carry a language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    pub content: String,
    pub kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Value {
    pub fn uri(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: ValueKind::Uri,
            language: None,
        }
    }

    pub fn literal(content: impl Into<String>, language: Option<String>) -> Self {
        Self {
            content: content.into(),
            kind: ValueKind::Literal,
            language,
        }
    }

    pub fn is_uri(&self) -> bool {
        self.kind == ValueKind::Uri
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.language) {
            (ValueKind::Uri, _) => write!(f, "<{}>", self.content),
            (ValueKind::Literal, Some(lang)) => write!(f, "{:?}@{lang}", self.content),
            (ValueKind::Literal, None) => write!(f, "{:?}", self.content),
        }
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// A resolved argument.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgValue {
    pub text: String,
    /// Language attached to this particular value, if any.
    pub language: Option<String>,
    /// Namespace URI, for `QName` arguments.
    pub namespace: Option<String>,
}

impl ArgValue {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Argument resolution for one generator invocation.
pub trait ArgumentSource {
    /// Resolve the argument bound to parameter `name`.
    ///
    /// `kind` is the parameter's kind; `None` leaves it to the argument's own
    /// declaration. `Ok(None)` means no argument binds to `name`.
    fn argument(
        &self,
        generator: &str,
        name: &str,
        kind: Option<ArgKind>,
    ) -> Result<Option<ArgValue>, GenerateError>;

    /// Language for a literal built from a value tagged `value_language`.
    fn literal_language(&self, value_language: Option<&str>) -> Option<String>;
}

// ============================================================================
// Compiled policy
// ============================================================================

enum Compiled {
    Template {
        namespace: Option<String>,
        template: Result<Template, String>,
    },
    Custom {
        def: CustomDef,
        factory: CustomFactory,
    },
}

/// Generator policy with templates parsed, prefixes resolved and custom
/// implementations bound. Immutable and shareable across executions.
pub struct ValuePolicy {
    generators: BTreeMap<String, Compiled>,
}

impl fmt::Debug for ValuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValuePolicy")
            .field("generators", &self.generators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ValuePolicy {
    /// Compile `policy`. Template prefixes resolve against `namespaces`
    /// extended with the policy's own declarations.
    ///
    /// A malformed template pattern does not fail construction; it fails
    /// every invocation of that generator instead.
    pub fn new(
        policy: &GeneratorPolicy,
        namespaces: &Namespaces,
        registry: &CustomRegistry,
    ) -> Result<Self, ConfigError> {
        let mut ns = namespaces.clone();
        ns.extend(&policy.namespaces);

        let mut generators = BTreeMap::new();
        for def in &policy.generators {
            let name = def.name();
            if generators.contains_key(name) {
                return Err(ConfigError::DuplicateGenerator(name.to_string()));
            }
            if is_builtin(name) {
                tracing::warn!(generator = name, "policy entry shadows a built-in generator and is ignored");
            }
            let compiled = match def {
                GeneratorDef::Template(t) => {
                    let namespace = match &t.prefix {
                        Some(prefix) => Some(
                            ns.uri(prefix)
                                .ok_or_else(|| ConfigError::UnknownPrefix {
                                    prefix: prefix.clone(),
                                    context: format!("generator `{name}`"),
                                })?
                                .to_string(),
                        ),
                        None => None,
                    };
                    let template = Template::parse(&t.pattern);
                    if let Err(reason) = &template {
                        tracing::warn!(generator = name, reason = %reason, "malformed template pattern");
                    }
                    Compiled::Template {
                        namespace,
                        template,
                    }
                }
                GeneratorDef::Custom(c) => {
                    let factory = registry.get(&c.implementation).cloned().ok_or_else(|| {
                        ConfigError::UnknownCustomGenerator {
                            generator: c.name.clone(),
                            implementation: c.implementation.clone(),
                        }
                    })?;
                    Compiled::Custom {
                        def: c.clone(),
                        factory,
                    }
                }
            };
            generators.insert(name.to_string(), compiled);
        }
        Ok(Self { generators })
    }

    /// Whether `name` is a built-in or defined by the policy.
    pub fn contains(&self, name: &str) -> bool {
        is_builtin(name) || self.generators.contains_key(name)
    }

    pub fn generate(
        &self,
        name: &str,
        args: &dyn ArgumentSource,
        uuids: &mut dyn UuidSource,
    ) -> Result<Value, GenerateError> {
        match name {
            UUID_GENERATOR => return Ok(Value::uri(uuids.next_uuid()?)),
            LITERAL_GENERATOR => return wrap_literal(name, args, ArgKind::XPath),
            CONSTANT_GENERATOR => return wrap_literal(name, args, ArgKind::Literal),
            _ => {}
        }
        match self.generators.get(name) {
            Some(Compiled::Template {
                namespace,
                template,
            }) => {
                let template = template.as_ref().map_err(|reason| GenerateError::MalformedTemplate {
                    generator: name.to_string(),
                    reason: reason.clone(),
                })?;
                expand_template(name, namespace.as_deref(), template, args)
            }
            Some(Compiled::Custom { def, factory }) => run_custom(def, factory, args),
            None => Err(GenerateError::UnknownGenerator(name.to_string())),
        }
    }
}

fn required(
    generator: &str,
    name: &str,
    kind: Option<ArgKind>,
    args: &dyn ArgumentSource,
) -> Result<ArgValue, GenerateError> {
    args.argument(generator, name, kind)?
        .ok_or_else(|| GenerateError::MissingArgument {
            generator: generator.to_string(),
            argument: name.to_string(),
        })
}

fn wrap_literal(generator: &str, args: &dyn ArgumentSource, kind: ArgKind) -> Result<Value, GenerateError> {
    let value = required(generator, "text", Some(kind), args)?;
    // `Constant` may be empty; `Literal` reads the source and must find text.
    if kind == ArgKind::XPath && value.text.is_empty() {
        return Err(GenerateError::EmptyArgument {
            generator: generator.to_string(),
            argument: "text".to_string(),
        });
    }
    let language = args.literal_language(value.language.as_deref());
    Ok(Value::literal(value.text, language))
}

fn expand_template(
    generator: &str,
    namespace: Option<&str>,
    template: &Template,
    args: &dyn ArgumentSource,
) -> Result<Value, GenerateError> {
    let mut language = None;
    let expansion = template.expand(namespace.is_some(), |placeholder| {
        let value = required(generator, &placeholder.name, placeholder.kind, args)?;
        if language.is_none() {
            language = value.language.clone();
        }
        if placeholder.kind == Some(ArgKind::QName) && placeholder.name == "namespace" {
            return value.namespace.ok_or_else(|| GenerateError::MissingQualifiedName {
                generator: generator.to_string(),
                argument: placeholder.name.clone(),
            });
        }
        Ok(value.text)
    })?;
    match namespace {
        Some(ns) => Ok(Value::uri(format!("{ns}{expansion}"))),
        None => Ok(Value::literal(expansion, args.literal_language(language.as_deref()))),
    }
}

fn run_custom(
    def: &CustomDef,
    factory: &CustomFactory,
    args: &dyn ArgumentSource,
) -> Result<Value, GenerateError> {
    let failed = |message: String| GenerateError::Custom {
        generator: def.name.clone(),
        message,
    };
    let mut instance = factory();
    let mut language = None;
    for param in &def.args {
        let kind = param.kind.unwrap_or(ArgKind::XPath);
        let value = required(&def.name, &param.name, Some(kind), args)?;
        if language.is_none() {
            language = value.language.clone();
        }
        instance
            .set_argument(&param.name, &value.text)
            .map_err(|e| failed(e.0))?;
    }
    let content = instance.value().map_err(|e| failed(e.0))?;
    match instance.value_kind().map_err(|e| failed(e.0))? {
        ValueKind::Uri => Ok(Value::uri(content)),
        ValueKind::Literal => Ok(Value::literal(
            content,
            args.literal_language(language.as_deref()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CustomArgDef, MappingNamespace, TemplateDef};
    use super::uuid::SequentialUuids;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Arguments keyed by parameter name; records the kinds asked for.
    #[derive(Default)]
    struct FixedArgs {
        values: HashMap<String, ArgValue>,
        asked: RefCell<Vec<(String, Option<ArgKind>)>>,
        language: Option<String>,
    }

    impl FixedArgs {
        fn with(mut self, name: &str, text: &str) -> Self {
            self.values.insert(name.to_string(), ArgValue::text(text));
            self
        }
    }

    impl ArgumentSource for FixedArgs {
        fn argument(
            &self,
            _generator: &str,
            name: &str,
            kind: Option<ArgKind>,
        ) -> Result<Option<ArgValue>, GenerateError> {
            self.asked.borrow_mut().push((name.to_string(), kind));
            Ok(self.values.get(name).cloned())
        }

        fn literal_language(&self, value_language: Option<&str>) -> Option<String> {
            value_language.map(str::to_string).or_else(|| self.language.clone())
        }
    }

    fn policy(defs: Vec<GeneratorDef>) -> GeneratorPolicy {
        GeneratorPolicy {
            namespaces: vec![MappingNamespace::new("ex", "http://example.org/")],
            generators: defs,
        }
    }

    fn template(name: &str, prefix: Option<&str>, pattern: &str) -> GeneratorDef {
        GeneratorDef::Template(TemplateDef {
            name: name.to_string(),
            prefix: prefix.map(str::to_string),
            pattern: pattern.to_string(),
        })
    }

    fn compile(defs: Vec<GeneratorDef>) -> ValuePolicy {
        ValuePolicy::new(&policy(defs), &Namespaces::new(), &CustomRegistry::with_defaults()).unwrap()
    }

    #[test]
    fn builtins_are_dispatched_first() {
        let p = compile(vec![template("UUID", Some("ex"), "shadow/{id}")]);
        let mut uuids = SequentialUuids::new(3);
        let v = p.generate("UUID", &FixedArgs::default(), &mut uuids).unwrap();
        assert_eq!(v, Value::uri("uuid:AAA"));

        let args = FixedArgs::default().with("text", "Jan");
        let v = p.generate("Literal", &args, &mut uuids).unwrap();
        assert_eq!(v, Value::literal("Jan", None));
        assert_eq!(args.asked.borrow()[0], ("text".to_string(), Some(ArgKind::XPath)));

        let args = FixedArgs::default().with("text", "fixed");
        p.generate("Constant", &args, &mut uuids).unwrap();
        assert_eq!(args.asked.borrow()[0].1, Some(ArgKind::Literal));
    }

    #[test]
    fn literal_without_argument_fails() {
        let p = compile(vec![]);
        let err = p
            .generate("Literal", &FixedArgs::default(), &mut SequentialUuids::new(1))
            .unwrap_err();
        assert!(matches!(err, GenerateError::MissingArgument { .. }));
    }

    #[test]
    fn empty_constant_is_a_value_but_empty_literal_is_not() {
        let p = compile(vec![]);
        let args = FixedArgs::default().with("text", "");
        let v = p.generate("Constant", &args, &mut SequentialUuids::new(1)).unwrap();
        assert_eq!(v, Value::literal("", None));
        let err = p.generate("Literal", &args, &mut SequentialUuids::new(1)).unwrap_err();
        assert!(matches!(err, GenerateError::EmptyArgument { .. }));
    }

    #[test]
    fn uri_template_with_query_and_fragment_operators() {
        let p = compile(vec![
            template("Search", Some("ex"), "search{?q}"),
            template("Anchor", Some("ex"), "doc/{id}{#part}"),
        ]);
        let args = FixedArgs::default().with("q", "van Eyck").with("id", "7").with("part", "a/b");
        let v = p.generate("Search", &args, &mut SequentialUuids::new(1)).unwrap();
        assert_eq!(v, Value::uri("http://example.org/search?q=van%20Eyck"));
        let v = p.generate("Anchor", &args, &mut SequentialUuids::new(1)).unwrap();
        assert_eq!(v, Value::uri("http://example.org/doc/7#a/b"));
    }

    #[test]
    fn uri_template_is_prefixed_and_encoded() {
        let p = compile(vec![template("PersonURI", Some("ex"), "person/{xpath:name}")]);
        let args = FixedArgs::default().with("name", "Jan van Eyck");
        let v = p.generate("PersonURI", &args, &mut SequentialUuids::new(1)).unwrap();
        assert_eq!(v, Value::uri("http://example.org/person/Jan%20van%20Eyck"));
    }

    #[test]
    fn simple_template_yields_literal() {
        let p = compile(vec![template("FullName", None, "{first} {last}")]);
        let args = FixedArgs {
            language: Some("en".into()),
            ..FixedArgs::default()
        }
        .with("first", "Jan")
        .with("last", "van Eyck");
        let v = p.generate("FullName", &args, &mut SequentialUuids::new(1)).unwrap();
        assert_eq!(v, Value::literal("Jan van Eyck", Some("en".into())));
    }

    #[test]
    fn malformed_template_fails_per_invocation() {
        let p = compile(vec![template("Broken", Some("ex"), "a/{b")]);
        let err = p
            .generate("Broken", &FixedArgs::default(), &mut SequentialUuids::new(1))
            .unwrap_err();
        assert!(matches!(err, GenerateError::MalformedTemplate { .. }));
    }

    #[test]
    fn unknown_names_fail_per_invocation() {
        let p = compile(vec![]);
        assert_eq!(
            p.generate("Nope", &FixedArgs::default(), &mut SequentialUuids::new(1)),
            Err(GenerateError::UnknownGenerator("Nope".into()))
        );
        assert!(!p.contains("Nope"));
        assert!(p.contains("UUID"));
    }

    #[test]
    fn policy_construction_rejects_bad_configuration() {
        let dup = policy(vec![template("A", None, "x"), template("A", None, "y")]);
        assert!(matches!(
            ValuePolicy::new(&dup, &Namespaces::new(), &CustomRegistry::new()),
            Err(ConfigError::DuplicateGenerator(_))
        ));

        let prefix = policy(vec![template("A", Some("missing"), "x")]);
        assert!(matches!(
            ValuePolicy::new(&prefix, &Namespaces::new(), &CustomRegistry::new()),
            Err(ConfigError::UnknownPrefix { .. })
        ));

        let custom = policy(vec![GeneratorDef::Custom(CustomDef {
            name: "C".into(),
            implementation: "NotRegistered".into(),
            args: vec![],
        })]);
        assert!(matches!(
            ValuePolicy::new(&custom, &Namespaces::new(), &CustomRegistry::new()),
            Err(ConfigError::UnknownCustomGenerator { .. })
        ));
    }

    #[test]
    fn custom_generator_receives_declared_arguments() {
        let p = compile(vec![GeneratorDef::Custom(CustomDef {
            name: "BeginOfYear".into(),
            implementation: "YearBound".into(),
            args: vec![
                CustomArgDef {
                    name: "text".into(),
                    kind: None,
                },
                CustomArgDef {
                    name: "bound".into(),
                    kind: Some(ArgKind::Literal),
                },
            ],
        })]);
        let args = FixedArgs::default().with("text", "1434").with("bound", "Lower");
        let v = p.generate("BeginOfYear", &args, &mut SequentialUuids::new(1)).unwrap();
        assert_eq!(v, Value::literal("1434-01-01T00:00:00", None));
        assert_eq!(
            *args.asked.borrow(),
            vec![
                ("text".to_string(), Some(ArgKind::XPath)),
                ("bound".to_string(), Some(ArgKind::Literal)),
            ]
        );

        let missing = FixedArgs::default().with("text", "1434");
        assert!(matches!(
            p.generate("BeginOfYear", &missing, &mut SequentialUuids::new(1)),
            Err(GenerateError::MissingArgument { .. })
        ));
    }
}

//! Condition evaluation.
//!
//! Conditions gate entities and properties. Evaluation is pure: it reads the
//! document and never touches the identity cache or the output graph.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::document::{NodeId, SourceDocument};
use crate::model::Condition;
use crate::xpath::ExpressionTable;

/// External thesaurus lookup backing `Narrower`.
pub trait Hierarchy: Send + Sync {
    /// `true` when `concept` equals `broader` or sits below it.
    fn is_narrower_or_equal(&self, concept: &str, broader: &str) -> bool;
}

/// In-memory broader-than graph; containment is the reflexive-transitive
/// closure of the declared edges.
#[derive(Debug, Clone, Default)]
pub struct ThesaurusHierarchy {
    broader: HashMap<String, BTreeSet<String>>,
}

impl ThesaurusHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `narrower` to sit directly below `broader`.
    pub fn with_broader(mut self, narrower: impl Into<String>, broader: impl Into<String>) -> Self {
        self.add_broader(narrower, broader);
        self
    }

    pub fn add_broader(&mut self, narrower: impl Into<String>, broader: impl Into<String>) {
        self.broader
            .entry(narrower.into())
            .or_default()
            .insert(broader.into());
    }
}

impl Hierarchy for ThesaurusHierarchy {
    fn is_narrower_or_equal(&self, concept: &str, broader: &str) -> bool {
        if concept == broader {
            return true;
        }
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([concept]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(parents) = self.broader.get(current) {
                for p in parents {
                    if p == broader {
                        return true;
                    }
                    queue.push_back(p.as_str());
                }
            }
        }
        false
    }
}

/// Evaluates [`Condition`] trees against a context node.
pub struct ConditionEvaluator<'a, D: SourceDocument + ?Sized> {
    doc: &'a D,
    expressions: &'a ExpressionTable,
    hierarchy: Option<&'a dyn Hierarchy>,
}

impl<'a, D: SourceDocument + ?Sized> ConditionEvaluator<'a, D> {
    pub fn new(doc: &'a D, expressions: &'a ExpressionTable, hierarchy: Option<&'a dyn Hierarchy>) -> Self {
        Self {
            doc,
            expressions,
            hierarchy,
        }
    }

    pub fn evaluate(&self, condition: &Condition, node: NodeId) -> bool {
        match condition {
            Condition::Exists(expr) => !self.select(expr, node).is_empty(),
            Condition::Equals { expression, value } => self.value_at(expression, node) == *value,
            Condition::Narrower { expression, value } => {
                let concept = self.value_at(expression, node);
                match self.hierarchy {
                    Some(h) if !concept.is_empty() => h.is_narrower_or_equal(&concept, value),
                    _ => false,
                }
            }
            Condition::And(list) => list.iter().all(|c| self.evaluate(c, node)),
            Condition::Or(list) => list.iter().any(|c| self.evaluate(c, node)),
            Condition::Not(inner) => !self.evaluate(inner, node),
        }
    }

    /// Absent conditions hold.
    pub fn holds(&self, condition: Option<&Condition>, node: NodeId) -> bool {
        condition.map_or(true, |c| self.evaluate(c, node))
    }

    fn select(&self, expr: &str, node: NodeId) -> Vec<NodeId> {
        match self.expressions.get(expr) {
            Some(xp) => self.doc.select(xp, node),
            None => {
                tracing::debug!(expression = expr, "condition expression was not compiled");
                Vec::new()
            }
        }
    }

    fn value_at(&self, expr: &str, node: NodeId) -> String {
        match self.expressions.get(expr) {
            Some(xp) => self.doc.value_at(xp, node),
            None => String::new(),
        }
    }
}

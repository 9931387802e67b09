//! Command context rules.
//!
//! A context rule decides when a command is available. Rules are written in
//! bundle metadata as a bare string, a list, or a mapping:
//!
//! ```yaml
//! context: selection                 # one term
//! context: "walls|doors"             # any-of
//! context: [walls, doors]            # all-of
//! context:
//!   all: [walls, doors]
//!   not_any: [furniture]
//! ```
//!
//! They are parsed once, at discovery time, into an immutable [`ContextRule`]
//! and evaluated against an [`AvailabilityContext`] supplied by the host.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Term that is satisfied by any non-empty selection.
pub const SELECTION_TERM: &str = "selection";

/// Term that is satisfied even when no document is open.
pub const ZERO_DOC_TERM: &str = "zero-doc";

const ANY_SEPARATOR: char = '|';
const ALL_SEPARATOR: char = '&';
const EXACT_SEPARATOR: char = ';';

/// Raw context value as written in bundle metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ContextSpec {
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, TermList>),
}

/// A single term or a list of terms inside a context mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TermList {
    One(String),
    Many(Vec<String>),
}

impl TermList {
    fn into_terms(self) -> Vec<String> {
        let terms: Vec<String> = match self {
            TermList::One(term) => split_terms(&term, &[',']),
            TermList::Many(terms) => terms.iter().map(|t| normalize_term(t)).collect(),
        };
        terms.into_iter().filter(|t| !t.is_empty()).collect()
    }
}

/// One test over the current selection/term set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextExpr {
    /// The term is present.
    Term(String),
    /// Every term is present.
    AllOf(Vec<String>),
    /// At least one term is present.
    AnyOf(Vec<String>),
    /// The selection categories are exactly this set.
    ExactOf(Vec<String>),
}

/// An expression with its optional negation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextClause {
    pub negated: bool,
    pub expr: ContextExpr,
}

/// A parsed context rule: all clauses must hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRule {
    clauses: Vec<ContextClause>,
}

/// What the host currently has selected and active.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityContext {
    /// Whether a document is open.
    pub document_open: bool,
    /// Category names of the selected elements.
    pub selection: Vec<String>,
    /// Free-form predicate terms that are currently true (view types, doc kinds...).
    pub active_terms: BTreeSet<String>,
}

impl AvailabilityContext {
    /// A context with an open document and the given selection categories.
    pub fn with_selection<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            document_open: true,
            selection: categories
                .into_iter()
                .map(|c| c.as_ref().to_string())
                .collect(),
            active_terms: BTreeSet::new(),
        }
    }

    fn selection_set(&self) -> BTreeSet<String> {
        self.selection.iter().map(|c| normalize_term(c)).collect()
    }

    fn has_term(&self, term: &str, selection: &BTreeSet<String>) -> bool {
        match term {
            SELECTION_TERM => !selection.is_empty(),
            ZERO_DOC_TERM => true,
            _ => {
                selection.contains(term)
                    || self.active_terms.iter().any(|t| normalize_term(t) == term)
            }
        }
    }
}

impl ContextExpr {
    fn evaluate(&self, ctx: &AvailabilityContext, selection: &BTreeSet<String>) -> bool {
        match self {
            ContextExpr::Term(term) => ctx.has_term(term, selection),
            ContextExpr::AllOf(terms) => terms.iter().all(|t| ctx.has_term(t, selection)),
            ContextExpr::AnyOf(terms) => terms.iter().any(|t| ctx.has_term(t, selection)),
            ContextExpr::ExactOf(terms) => {
                let wanted: BTreeSet<String> = terms.iter().cloned().collect();
                !wanted.is_empty() && &wanted == selection
            }
        }
    }

    fn from_terms(kind: ListKind, mut terms: Vec<String>) -> Option<Self> {
        terms.retain(|t| !t.is_empty());
        match (kind, terms.len()) {
            (_, 0) => None,
            (ListKind::Exact, _) => Some(ContextExpr::ExactOf(terms)),
            (_, 1) => terms.pop().map(ContextExpr::Term),
            (ListKind::All, _) => Some(ContextExpr::AllOf(terms)),
            (ListKind::Any, _) => Some(ContextExpr::AnyOf(terms)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    All,
    Any,
    Exact,
}

impl ContextRule {
    /// Build a rule from explicit clauses. Returns `None` when there are none.
    pub fn from_clauses(clauses: Vec<ContextClause>) -> Option<Self> {
        if clauses.is_empty() {
            None
        } else {
            Some(Self { clauses })
        }
    }

    /// Parse a metadata value into a rule.
    ///
    /// Returns `Ok(None)` for an empty rule and `Err` for unknown mapping keys.
    pub fn parse(spec: &ContextSpec) -> Result<Option<Self>, String> {
        let clauses = match spec {
            ContextSpec::Text(text) => parse_text(text).into_iter().collect(),
            ContextSpec::List(items) => {
                let terms = items.iter().map(|t| normalize_term(t)).collect();
                ContextExpr::from_terms(ListKind::All, terms)
                    .map(|expr| ContextClause {
                        negated: false,
                        expr,
                    })
                    .into_iter()
                    .collect()
            }
            ContextSpec::Map(entries) => {
                let mut clauses = Vec::new();
                for (key, value) in entries {
                    let (negated, kind) = parse_key(key)?;
                    if let Some(expr) = ContextExpr::from_terms(kind, value.clone().into_terms()) {
                        clauses.push(ContextClause { negated, expr });
                    }
                }
                clauses
            }
        };
        Ok(Self::from_clauses(clauses))
    }

    /// Parse a bare string rule (the legacy script-parameter form).
    pub fn parse_str(text: &str) -> Option<Self> {
        Self::from_clauses(parse_text(text).into_iter().collect())
    }

    pub fn clauses(&self) -> &[ContextClause] {
        &self.clauses
    }

    /// The single un-negated term this rule consists of, if that is all it is.
    pub fn as_single_term(&self) -> Option<&str> {
        match self.clauses.as_slice() {
            [ContextClause {
                negated: false,
                expr: ContextExpr::Term(term),
            }] => Some(term.as_str()),
            _ => None,
        }
    }

    /// Evaluate every clause against the host context.
    pub fn evaluate(&self, ctx: &AvailabilityContext) -> bool {
        let selection = ctx.selection_set();
        self.clauses
            .iter()
            .all(|clause| clause.expr.evaluate(ctx, &selection) != clause.negated)
    }
}

fn normalize_term(term: &str) -> String {
    let lowered = term.trim().to_lowercase();
    match lowered.as_str() {
        "zerodoc" | "zero_doc" => ZERO_DOC_TERM.to_string(),
        _ => lowered,
    }
}

fn split_terms(text: &str, separators: &[char]) -> Vec<String> {
    text.split(|c| separators.contains(&c))
        .map(normalize_term)
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_text(text: &str) -> Option<ContextClause> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(trimmed);

    let (kind, separator) = if inner.contains(EXACT_SEPARATOR) {
        (ListKind::Exact, EXACT_SEPARATOR)
    } else if inner.contains(ALL_SEPARATOR) {
        (ListKind::All, ALL_SEPARATOR)
    } else {
        (ListKind::Any, ANY_SEPARATOR)
    };

    ContextExpr::from_terms(kind, split_terms(inner, &[separator])).map(|expr| ContextClause {
        negated: false,
        expr,
    })
}

fn parse_key(key: &str) -> Result<(bool, ListKind), String> {
    let normalized = key.trim().to_lowercase().replace('_', "-");
    let (negated, rest) = match normalized.strip_prefix("not-") {
        Some(rest) => (true, rest),
        None => (false, normalized.as_str()),
    };
    let rest = rest.strip_suffix("-of").unwrap_or(rest);
    let kind = match rest {
        "all" => ListKind::All,
        "any" => ListKind::Any,
        "exact" => ListKind::Exact,
        _ => return Err(format!("unknown context key '{}'", key)),
    };
    Ok((negated, kind))
}

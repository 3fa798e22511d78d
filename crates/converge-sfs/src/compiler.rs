//! Compilation of selector ASTs into evaluator closures.
//!
//! Each AST node compiles to a closure over evaluation tuples; complex
//! chains compose the closures left to right. Evaluation is pure: running
//! the same compiled selector over the same spec/status pair always
//! produces the same diff contents.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ast::{FieldAction, Selector};
use crate::content::DiffContent;

/// Evaluation tuple threaded through sub-selectors.
///
/// Seeded from the whole spec/status pair; selectors narrow the value
/// arrays and accumulate correlating keys as they match.
#[derive(Debug, Clone, PartialEq)]
struct Tuple {
    keys: Map<String, Value>,
    key: String,
    spec_vals: Vec<Value>,
    status_vals: Vec<Value>,
}

impl Tuple {
    fn seed(spec: &Value, status: &Value) -> Self {
        Self {
            keys: Map::new(),
            key: String::new(),
            spec_vals: vec![spec.clone()],
            status_vals: vec![status.clone()],
        }
    }

    /// A tuple whose two sides are identical carries no discrepancy.
    fn is_noop(&self) -> bool {
        self.spec_vals == self.status_vals
    }
}

type Eval = Arc<dyn Fn(Vec<Tuple>) -> Vec<Tuple> + Send + Sync>;

/// A compiled, reusable selector evaluator.
#[derive(Clone)]
pub struct CompiledSelector {
    source: String,
    eval: Eval,
}

impl CompiledSelector {
    pub(crate) fn new(source: String, ast: &Selector) -> Self {
        Self {
            source,
            eval: compile(ast),
        }
    }

    /// The signature string this evaluator was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the selector against a spec/status pair.
    ///
    /// Returns `None` when no discrepancy survives: no-op tuples (equal on
    /// both sides) and duplicates are dropped at the top level.
    #[must_use]
    pub fn run(&self, spec: &Value, status: &Value) -> Option<Vec<DiffContent>> {
        let tuples = (self.eval)(vec![Tuple::seed(spec, status)]);

        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        for tuple in tuples {
            if tuple.is_noop() {
                continue;
            }
            let content = DiffContent {
                keys: tuple.keys,
                key: tuple.key,
                spec_val: tuple.spec_vals,
                status_val: tuple.status_vals,
            };
            let fingerprint =
                serde_json::to_string(&content).unwrap_or_else(|_| format!("{content:?}"));
            if seen.insert(fingerprint) {
                fields.push(content);
            }
        }

        if fields.is_empty() {
            None
        } else {
            Some(fields)
        }
    }
}

impl fmt::Debug for CompiledSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSelector")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

fn compile(ast: &Selector) -> Eval {
    match ast {
        Selector::Simple(path) => {
            let path = path.clone();
            Arc::new(move |tuples| {
                tuples
                    .into_iter()
                    .map(|tuple| project(tuple, &path))
                    .collect()
            })
        }
        Selector::Vector { action, id_path } => {
            let action = *action;
            let id_path = id_path.clone();
            Arc::new(move |tuples| {
                tuples
                    .into_iter()
                    .flat_map(|tuple| split_vector(tuple, action, &id_path))
                    .collect()
            })
        }
        Selector::Complex(parts) => {
            let evals: Vec<Eval> = parts.iter().map(compile).collect();
            Arc::new(move |mut tuples| {
                for eval in &evals {
                    tuples = eval(tuples);
                }
                tuples
            })
        }
        Selector::Group(clauses) => {
            let evals: Vec<Eval> = clauses.iter().map(compile).collect();
            Arc::new(move |tuples| {
                tuples
                    .into_iter()
                    .flat_map(|tuple| eval_group(tuple, &evals))
                    .collect()
            })
        }
    }
}

/// Walk a dotted path into a value.
fn lookup<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Project a field path out of both sides of a tuple.
///
/// When the path is absent on either side the tuple falls through
/// unchanged, so a selector can still compare the parent values.
fn project(mut tuple: Tuple, path: &[String]) -> Tuple {
    let spec: Vec<Value> = tuple
        .spec_vals
        .iter()
        .filter_map(|v| lookup(v, path).cloned())
        .collect();
    let status: Vec<Value> = tuple
        .status_vals
        .iter()
        .filter_map(|v| lookup(v, path).cloned())
        .collect();

    if spec.is_empty() || status.is_empty() {
        return tuple;
    }

    tuple.spec_vals = spec;
    tuple.status_vals = status;
    tuple.key = path.last().cloned().unwrap_or_default();
    tuple
}

/// Flatten array values into elements grouped by their id value, keyed by
/// the id's canonical serialization. Insertion order is preserved so
/// evaluation stays deterministic.
fn group_elements(vals: &[Value], id_path: &[String]) -> Vec<(String, Value, Vec<Value>)> {
    let mut groups: Vec<(String, Value, Vec<Value>)> = Vec::new();
    for val in vals {
        let Some(elements) = val.as_array() else {
            continue;
        };
        for element in elements {
            // Elements without the id path cannot be correlated.
            let Some(id) = lookup(element, id_path) else {
                continue;
            };
            let fingerprint = id.to_string();
            match groups.iter_mut().find(|(fp, _, _)| *fp == fingerprint) {
                Some((_, _, members)) => members.push(element.clone()),
                None => groups.push((fingerprint, id.clone(), vec![element.clone()])),
            }
        }
    }
    groups
}

/// Split a tuple into one tuple per id group surviving the action's
/// membership rule, merging the id value into the tuple's keys.
fn split_vector(tuple: Tuple, action: FieldAction, id_path: &[String]) -> Vec<Tuple> {
    let spec_groups = group_elements(&tuple.spec_vals, id_path);
    let status_groups = group_elements(&tuple.status_vals, id_path);

    // Ids in spec order first, then status-only ids.
    let mut ids: Vec<(String, Value)> = spec_groups
        .iter()
        .map(|(fp, id, _)| (fp.clone(), id.clone()))
        .collect();
    for (fp, id, _) in &status_groups {
        if !ids.iter().any(|(known, _)| known == fp) {
            ids.push((fp.clone(), id.clone()));
        }
    }

    let id_key = id_path.join(".");
    let mut out = Vec::new();
    for (fingerprint, id) in ids {
        let spec_elems = spec_groups
            .iter()
            .find(|(fp, _, _)| *fp == fingerprint)
            .map(|(_, _, members)| members.clone())
            .unwrap_or_default();
        let status_elems = status_groups
            .iter()
            .find(|(fp, _, _)| *fp == fingerprint)
            .map(|(_, _, members)| members.clone())
            .unwrap_or_default();

        let keep = match action {
            FieldAction::Add => !spec_elems.is_empty() && status_elems.is_empty(),
            FieldAction::Delete => spec_elems.is_empty() && !status_elems.is_empty(),
            FieldAction::Change => {
                !spec_elems.is_empty() && !status_elems.is_empty() && spec_elems != status_elems
            }
            FieldAction::All => true,
        };
        if !keep {
            continue;
        }

        let mut keys = tuple.keys.clone();
        keys.insert(id_key.clone(), id);
        out.push(Tuple {
            keys,
            key: tuple.key.clone(),
            spec_vals: spec_elems,
            status_vals: status_elems,
        });
    }
    out
}

/// Evaluate a bracketed group against one input tuple.
///
/// Uncorrelated input (empty keys, top level) ORs the clauses: every
/// clause's entries are emitted independently. Correlated input (reached
/// through a vector) ANDs them: the element counts only when every clause
/// surfaces a change for the same key tuple.
fn eval_group(tuple: Tuple, clauses: &[Eval]) -> Vec<Tuple> {
    let correlated = !tuple.keys.is_empty();
    let results: Vec<Vec<Tuple>> = clauses
        .iter()
        .map(|eval| eval(vec![tuple.clone()]))
        .collect();

    if correlated {
        let all_changed = results
            .iter()
            .all(|res| res.iter().any(|t| !t.is_noop()));
        if !all_changed {
            return Vec::new();
        }
        results
            .into_iter()
            .flatten()
            .filter(|t| !t.is_noop())
            .collect()
    } else {
        results.into_iter().flatten().collect()
    }
}

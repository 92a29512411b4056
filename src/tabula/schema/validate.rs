//! Schema validation helpers.
//!
//! Two layers live here:
//!
//! - **Structural checks** run once by [`SchemaBuilder::build`](super::SchemaBuilder::build):
//!   duplicate keys, dangling dependencies, dependency cycles, filters that
//!   point nowhere.
//! - **Record checks** run by the form layer before a submit: the per-field
//!   [`Rule`]s.
//!
//! Computed fields are evaluated in topological order over their declared
//! dependencies. Ties are broken by declaration order, so a schema whose
//! declaration order already respects its dependencies evaluates exactly in
//! declaration order.

use super::{Field, FieldKind, FilterKind, FilterSpec, Rule, Schema};
use crate::error::{Result, TabulaError};
use crate::model::{as_date, as_number, is_blank, Record};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A rule a record failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleViolation {
    pub field: String,
    pub message: String,
}

pub(super) fn check_structure(fields: &[Field], filters: &[(String, FilterSpec)]) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.key.is_empty() {
            return Err(TabulaError::Schema("field with an empty key".to_string()));
        }
        if field.key == "id" {
            return Err(TabulaError::Schema(
                "`id` is reserved and cannot be declared as a field".to_string(),
            ));
        }
        if !seen.insert(field.key.as_str()) {
            return Err(TabulaError::Schema(format!(
                "duplicate field key `{}`",
                field.key
            )));
        }
    }

    for field in fields {
        let FieldKind::Computed(computed) = &field.kind else {
            continue;
        };
        for dep in &computed.dependencies {
            if dep == &field.key {
                return Err(TabulaError::Schema(format!(
                    "computed field `{}` depends on itself",
                    field.key
                )));
            }
            if !seen.contains(dep.as_str()) {
                return Err(TabulaError::Schema(format!(
                    "computed field `{}` depends on unknown field `{}`",
                    field.key, dep
                )));
            }
        }
    }

    let mut seen_filters = HashSet::new();
    for (key, spec) in filters {
        if !seen.contains(key.as_str()) {
            return Err(TabulaError::Schema(format!(
                "filter `{}` does not name a field",
                key
            )));
        }
        if !seen_filters.insert(key.as_str()) {
            return Err(TabulaError::Schema(format!("duplicate filter `{}`", key)));
        }
        if spec.kind == FilterKind::Select && spec.options.is_empty() && spec.source.is_none() {
            return Err(TabulaError::Schema(format!(
                "select filter `{}` has neither options nor an option source",
                key
            )));
        }
    }

    Ok(())
}

/// Order computed fields so every one runs after the computed fields it reads.
///
/// Returns indexes into `fields`. Dependencies on stored fields impose no
/// ordering. Fails if the computed fields form a cycle.
pub(super) fn compute_order(fields: &[Field]) -> Result<Vec<usize>> {
    let computed: HashMap<&str, usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| matches!(f.kind, FieldKind::Computed(_)))
        .map(|(i, f)| (f.key.as_str(), i))
        .collect();

    // In-degree counts only edges between computed fields.
    let mut pending: HashMap<usize, usize> = HashMap::new();
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, field) in fields.iter().enumerate() {
        let FieldKind::Computed(c) = &field.kind else {
            continue;
        };
        let mut deps: Vec<usize> = c
            .dependencies
            .iter()
            .filter_map(|d| computed.get(d.as_str()).copied())
            .collect();
        deps.sort_unstable();
        deps.dedup();
        pending.insert(i, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(i);
        }
    }

    let mut order = Vec::with_capacity(pending.len());
    let mut ready: Vec<usize> = pending
        .iter()
        .filter(|(_, &n)| n == 0)
        .map(|(&i, _)| i)
        .collect();

    while !ready.is_empty() {
        // Lowest declaration index first.
        ready.sort_unstable_by(|a, b| b.cmp(a));
        let Some(next) = ready.pop() else {
            break;
        };
        order.push(next);
        for &dependent in dependents.get(&next).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(n) = pending.get_mut(&dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.push(dependent);
                }
            }
        }
    }

    if order.len() != pending.len() {
        let mut stuck: Vec<&str> = pending
            .keys()
            .filter(|i| !order.contains(i))
            .map(|&i| fields[i].key.as_str())
            .collect();
        stuck.sort_unstable();
        return Err(TabulaError::Schema(format!(
            "computed fields form a dependency cycle: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}

pub(super) fn check_record(schema: &Schema, record: &Record) -> Vec<RuleViolation> {
    let mut violations = Vec::new();

    for field in schema.fields() {
        if !field.kind.is_stored() {
            continue;
        }
        let value = record.get(&field.key).filter(|v| !is_blank(v));

        for rule in &field.rules {
            let failed = match (rule, value) {
                (Rule::Required { .. }, None) => true,
                (Rule::Min { min, .. }, Some(v)) => as_number(v).is_some_and(|n| n < *min),
                (Rule::Number { .. }, Some(v)) => as_number(v).is_none(),
                (Rule::Date { .. }, Some(v)) => as_date(v).is_none(),
                _ => false,
            };
            if failed {
                let message = match rule {
                    Rule::Required { message }
                    | Rule::Min { message, .. }
                    | Rule::Number { message }
                    | Rule::Date { message } => message.clone(),
                };
                violations.push(RuleViolation {
                    field: field.key.clone(),
                    message,
                });
            }
        }
    }

    violations
}

//! # Schema
//!
//! A [`Schema`] is the static, declarative description of one record type:
//! which fields exist, what kind of value each holds, which rules the form
//! layer enforces, which fields are derived from others, and which filters the
//! table offers. One generic engine (evaluator, filter engine, record store)
//! serves every schema; there is no per-entity code.
//!
//! ## Field Kinds
//!
//! | Kind | Payload | Notes |
//! |------|---------|-------|
//! | `Text`, `TextArea` | - | free text |
//! | `Number` | - | numeric, numeric strings tolerated |
//! | `Select` | options, optional source | closed set when options are given |
//! | `CreatableSelect` | options, optional source | open set |
//! | `Radio` | options | closed set |
//! | `Date` | - | serialized `YYYY-MM-DD`, structured [`chrono::NaiveDate`] in forms |
//! | `Computed` | dependencies + compute fn | derived after every fetch |
//! | `Action` | - | row actions column, carries no data |
//!
//! ## Building
//!
//! Schemas are assembled with [`SchemaBuilder`] and finalised by
//! [`SchemaBuilder::build`], which runs the structural checks in [`validate`]
//! and fixes the evaluation order of computed fields. A built schema is
//! immutable.
//!
//! ```ignore
//! let schema = Schema::builder("ProjectBudgeting")
//!     .field(Field::new("budgetAmount", "Budget", FieldKind::Number))
//!     .field(Field::new("spentAmount", "Spent", FieldKind::Number))
//!     .field(Field::computed("balance", "Balance", &["budgetAmount", "spentAmount"], |r| {
//!         Ok(json!(r.number("budgetAmount").unwrap_or(0.0) - r.number("spentAmount").unwrap_or(0.0)))
//!     }))
//!     .build()?;
//! ```

use crate::error::Result;
use crate::model::Record;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub mod builtin;
mod validate;

pub use validate::RuleViolation;

/// Error raised by a compute function. Never escapes the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ComputeError(pub String);

impl ComputeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type ComputeFn = Arc<dyn Fn(&Record) -> std::result::Result<Value, ComputeError> + Send + Sync>;

/// Name of an external collection that supplies option values through its
/// `name` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptionSource(pub String);

impl OptionSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A derived field definition.
#[derive(Clone)]
pub struct ComputedField {
    /// Keys of the fields this one reads. Used to order evaluation.
    pub dependencies: Vec<String>,
    pub compute: ComputeFn,
}

impl fmt::Debug for ComputedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedField")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// The kind of value a field holds, with the payload each kind needs.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Text,
    Number,
    Select {
        options: Vec<String>,
        source: Option<OptionSource>,
    },
    CreatableSelect {
        options: Vec<String>,
        source: Option<OptionSource>,
    },
    Date,
    Radio {
        options: Vec<String>,
    },
    TextArea,
    Computed(ComputedField),
    Action,
}

impl FieldKind {
    pub fn select(options: &[&str]) -> Self {
        FieldKind::Select {
            options: to_strings(options),
            source: None,
        }
    }

    pub fn creatable_from(source: &str) -> Self {
        FieldKind::CreatableSelect {
            options: Vec::new(),
            source: Some(OptionSource::new(source)),
        }
    }

    pub fn radio(options: &[&str]) -> Self {
        FieldKind::Radio {
            options: to_strings(options),
        }
    }

    /// Short lowercase name, as shown by `tabula schema`.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Select { .. } => "select",
            FieldKind::CreatableSelect { .. } => "creatable_select",
            FieldKind::Date => "date",
            FieldKind::Radio { .. } => "radio",
            FieldKind::TextArea => "textarea",
            FieldKind::Computed(_) => "computed",
            FieldKind::Action => "action",
        }
    }

    /// Declared options, if the kind has any.
    pub fn options(&self) -> &[String] {
        match self {
            FieldKind::Select { options, .. }
            | FieldKind::CreatableSelect { options, .. }
            | FieldKind::Radio { options } => options,
            _ => &[],
        }
    }

    /// Whether input must be one of the declared options.
    pub fn is_closed_set(&self) -> bool {
        match self {
            FieldKind::Select { options, .. } => !options.is_empty(),
            FieldKind::Radio { .. } => true,
            _ => false,
        }
    }

    pub fn source(&self) -> Option<&OptionSource> {
        match self {
            FieldKind::Select { source, .. } | FieldKind::CreatableSelect { source, .. } => {
                source.as_ref()
            }
            _ => None,
        }
    }

    /// Whether the field carries stored data (everything except computed and action columns).
    pub fn is_stored(&self) -> bool {
        !matches!(self, FieldKind::Computed(_) | FieldKind::Action)
    }
}

/// A validation rule enforced by the form layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required { message: String },
    Min { min: f64, message: String },
    Number { message: String },
    Date { message: String },
}

impl Rule {
    pub fn required(message: impl Into<String>) -> Self {
        Rule::Required {
            message: message.into(),
        }
    }

    pub fn min(min: f64, message: impl Into<String>) -> Self {
        Rule::Min {
            min,
            message: message.into(),
        }
    }

    pub fn number(message: impl Into<String>) -> Self {
        Rule::Number {
            message: message.into(),
        }
    }

    pub fn date(message: impl Into<String>) -> Self {
        Rule::Date {
            message: message.into(),
        }
    }
}

/// A single column of a record type.
#[derive(Debug, Clone)]
pub struct Field {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    pub rules: Vec<Rule>,
}

impl Field {
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            rules: Vec::new(),
        }
    }

    pub fn computed<F>(key: &str, label: &str, dependencies: &[&str], compute: F) -> Self
    where
        F: Fn(&Record) -> std::result::Result<Value, ComputeError> + Send + Sync + 'static,
    {
        Self::new(
            key,
            label,
            FieldKind::Computed(ComputedField {
                dependencies: to_strings(dependencies),
                compute: Arc::new(compute),
            }),
        )
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_required(&self) -> bool {
        self.rules.iter().any(|r| matches!(r, Rule::Required { .. }))
    }
}

/// The kind of widget and predicate a filter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Text,
    Select,
    DateRange,
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Text => "text",
            FilterKind::Select => "select",
            FilterKind::DateRange => "date_range",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Single(String),
    Range(String, String),
}

/// Declarative description of one filter widget.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub placeholder: Placeholder,
    pub options: Vec<String>,
    pub source: Option<OptionSource>,
}

impl FilterSpec {
    pub fn text(placeholder: &str) -> Self {
        Self::new(FilterKind::Text, Placeholder::Single(placeholder.to_string()))
    }

    pub fn select(placeholder: &str) -> Self {
        Self::new(
            FilterKind::Select,
            Placeholder::Single(placeholder.to_string()),
        )
    }

    pub fn date_range(from: &str, to: &str) -> Self {
        Self::new(
            FilterKind::DateRange,
            Placeholder::Range(from.to_string(), to.to_string()),
        )
    }

    fn new(kind: FilterKind, placeholder: Placeholder) -> Self {
        Self {
            kind,
            placeholder,
            options: Vec::new(),
            source: None,
        }
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = to_strings(options);
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = Some(OptionSource::new(source));
        self
    }
}

/// An immutable, validated record-type description.
#[derive(Debug, Clone)]
pub struct Schema {
    collection: String,
    fields: Vec<Field>,
    filters: Vec<(String, FilterSpec)>,
    /// Indexes into `fields` of computed fields, in evaluation order.
    compute_order: Vec<usize>,
}

impl Schema {
    pub fn builder(collection: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            collection: collection.into(),
            fields: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Name of the remote collection (the `sheetName` on the wire).
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn filters(&self) -> &[(String, FilterSpec)] {
        &self.filters
    }

    pub fn filter(&self, key: &str) -> Option<&FilterSpec> {
        self.filters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, spec)| spec)
    }

    /// Keys of every data-bearing field, in declaration order.
    pub fn headers(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !matches!(f.kind, FieldKind::Action))
            .map(|f| f.key.clone())
            .collect()
    }

    /// Computed fields in dependency order.
    pub fn computed_fields(&self) -> impl Iterator<Item = (&str, &ComputedField)> {
        self.compute_order.iter().filter_map(|&i| {
            let field = &self.fields[i];
            match &field.kind {
                FieldKind::Computed(computed) => Some((field.key.as_str(), computed)),
                _ => None,
            }
        })
    }

    pub fn date_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Date))
    }

    /// Check a record against every field's rules.
    pub fn check(&self, record: &Record) -> Vec<RuleViolation> {
        validate::check_record(self, record)
    }
}

pub struct SchemaBuilder {
    collection: String,
    fields: Vec<Field>,
    filters: Vec<(String, FilterSpec)>,
}

impl SchemaBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn filter(mut self, key: impl Into<String>, spec: FilterSpec) -> Self {
        self.filters.push((key.into(), spec));
        self
    }

    /// Validate the definition and fix the computed-field evaluation order.
    pub fn build(self) -> Result<Schema> {
        validate::check_structure(&self.fields, &self.filters)?;
        let compute_order = validate::compute_order(&self.fields)?;
        Ok(Schema {
            collection: self.collection,
            fields: self.fields,
            filters: self.filters,
            compute_order,
        })
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

//! # Rendering
//!
//! Plain-text layout for records, forms and schemas. Every `render_*`
//! function returns a `String` so output can be checked without a terminal;
//! only [`print_message`] writes, and only it applies colour.
//!
//! Column widths are measured with `unicode-width`, so labels and values
//! with wide characters still line up.

use colored::*;
use serde_json::Value;
use tabula::edit::{FormValue, FormValues};
use tabula::model::{as_date, as_number, format_date, Record};
use tabula::schema::{Field, FieldKind, Placeholder, Rule, Schema};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const MAX_COLUMN_WIDTH: usize = 30;
const COLUMN_GAP: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
}

pub fn print_message(level: MessageLevel, content: &str) {
    match level {
        MessageLevel::Info => println!("{}", content.dimmed()),
        MessageLevel::Success => println!("{}", content.green()),
        MessageLevel::Warning => println!("{}", content.yellow()),
    }
}

/// One row per record: the id, then every data-bearing field.
pub fn render_table(schema: &Schema, records: &[Record]) -> String {
    if records.is_empty() {
        return "No records found.\n".to_string();
    }

    let columns: Vec<&Field> = schema
        .fields()
        .iter()
        .filter(|f| !matches!(f.kind, FieldKind::Action))
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(records.len() + 1);
    let mut header = vec!["id".to_string()];
    header.extend(columns.iter().map(|f| f.label.clone()));
    rows.push(header);
    for record in records {
        let mut row = vec![record.id.clone().unwrap_or_default()];
        row.extend(columns.iter().map(|f| format_field(f, record.get(&f.key))));
        rows.push(row);
    }

    let widths: Vec<usize> = (0..rows[0].len())
        .map(|col| {
            rows.iter()
                .map(|row| row[col].width())
                .max()
                .unwrap_or(0)
                .min(MAX_COLUMN_WIDTH)
        })
        .collect();

    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&layout_row(row, &widths));
        out.push('\n');
        if i == 0 {
            let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            out.push_str(&rule.join(COLUMN_GAP));
            out.push('\n');
        }
    }
    out
}

fn layout_row(cells: &[String], widths: &[usize]) -> String {
    let mut parts = Vec::with_capacity(cells.len());
    for (cell, &width) in cells.iter().zip(widths) {
        let shown = truncate_to_width(cell, width);
        let padding = width.saturating_sub(shown.width());
        parts.push(format!("{}{}", shown, " ".repeat(padding)));
    }
    parts.join(COLUMN_GAP).trim_end().to_string()
}

/// The edit form for one record. Computed fields are listed after the form
/// fields, read-only.
pub fn render_form(schema: &Schema, form: &FormValues, record: &Record) -> String {
    let label_width = schema
        .fields()
        .iter()
        .map(|f| f.label.width())
        .max()
        .unwrap_or(0)
        .max(2);

    let mut out = format!(
        "{:<width$}  {}\n",
        "id",
        form.id.as_deref().unwrap_or("(new)"),
        width = label_width
    );
    for field in schema.fields() {
        let value = match (&field.kind, form.get(&field.key)) {
            (FieldKind::Action, _) | (FieldKind::Computed(_), _) => continue,
            (_, Some(FormValue::Date(Some(date)))) => format_date(*date),
            (_, Some(FormValue::Value(value))) => format_field(field, Some(value)),
            _ => String::new(),
        };
        out.push_str(&form_line(&field.label, label_width, &value));
    }
    for (key, _) in schema.computed_fields() {
        if let Some(field) = schema.field(key) {
            let value = format!("{} (computed)", format_field(field, record.get(key)));
            out.push_str(&form_line(&field.label, label_width, &value));
        }
    }
    out
}

fn form_line(label: &str, width: usize, value: &str) -> String {
    let padding = width.saturating_sub(label.width());
    format!("{}{}  {}\n", label, " ".repeat(padding), value)
        .trim_end()
        .to_string()
        + "\n"
}

pub fn render_schema(schema: &Schema) -> String {
    let mut out = format!("Collection: {}\n\nFields:\n", schema.collection());
    let key_width = schema
        .fields()
        .iter()
        .map(|f| f.key.width())
        .max()
        .unwrap_or(0);
    for field in schema.fields() {
        let mut line = format!(
            "  {:<kw$}  {:<16}  {}",
            field.key,
            field.kind.name(),
            field.label,
            kw = key_width
        );
        let notes = field_notes(field);
        if !notes.is_empty() {
            line.push_str(&format!(" [{}]", notes.join(", ")));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    if !schema.filters().is_empty() {
        out.push_str("\nFilters:\n");
        for (key, spec) in schema.filters() {
            let placeholder = match &spec.placeholder {
                Placeholder::Single(p) => p.clone(),
                Placeholder::Range(from, to) => format!("{} .. {}", from, to),
            };
            let mut line = format!(
                "  {:<kw$}  {:<16}  {}",
                key,
                spec.kind.name(),
                placeholder,
                kw = key_width
            );
            if let Some(source) = &spec.source {
                line.push_str(&format!(" (from {})", source));
            }
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

fn field_notes(field: &Field) -> Vec<String> {
    let mut notes = Vec::new();
    for rule in &field.rules {
        match rule {
            Rule::Required { .. } => notes.push("required".to_string()),
            Rule::Min { min, .. } => notes.push(format!("min {}", format_number(*min))),
            Rule::Number { .. } | Rule::Date { .. } => {}
        }
    }
    if !field.kind.options().is_empty() {
        notes.push(field.kind.options().join("|"));
    }
    if let Some(source) = field.kind.source() {
        notes.push(format!("from {}", source));
    }
    if let FieldKind::Computed(computed) = &field.kind {
        notes.push(format!("uses {}", computed.dependencies.join(", ")));
    }
    notes
}

/// `key: option, option` lines for every select filter.
pub fn render_options(schema: &Schema, options: &[(String, Vec<String>)]) -> String {
    if options.is_empty() {
        return format!("No select filters for {}.\n", schema.collection());
    }
    let key_width = options.iter().map(|(k, _)| k.width()).max().unwrap_or(0);
    let mut out = String::new();
    for (key, values) in options {
        let shown = if values.is_empty() {
            "(none)".to_string()
        } else {
            values.join(", ")
        };
        out.push_str(&format!("{:<kw$}  {}\n", key, shown, kw = key_width));
    }
    out
}

/// Display text for one field value. Dates show their calendar day only.
pub fn format_field(field: &Field, value: Option<&Value>) -> String {
    match (value, &field.kind) {
        (None, _) => String::new(),
        (Some(v), FieldKind::Date) => as_date(v)
            .map(|dt| format_date(dt.date()))
            .unwrap_or_else(|| format_value(v)),
        (Some(v), FieldKind::Number) => as_number(v)
            .map(format_number)
            .unwrap_or_else(|| format_value(v)),
        (Some(v), _) => format_value(v),
    }
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.replace('\n', " "),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        Value::Array(items) => items.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, format_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Whole numbers print without decimals, everything else with at most two.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        let s = format!("{:.2}", n);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn truncate_to_width(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;
    for c in s.chars() {
        let char_width = c.width().unwrap_or(0);
        if current_width + char_width > max_width.saturating_sub(1) {
            result.push('…');
            return result;
        }
        result.push(c);
        current_width += char_width;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabula::edit::prepare_edit;
    use tabula::schema::builtin;

    #[test]
    fn numbers_are_compact() {
        assert_eq!(format_number(600.0), "600");
        assert_eq!(format_number(66.666666), "66.67");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(-3.0), "-3");
    }

    #[test]
    fn objects_and_nulls() {
        assert_eq!(format_value(&json!({"days": 4, "variance": -1})), "days: 4, variance: -1");
        assert_eq!(format_value(&Value::Null), "");
        assert_eq!(format_value(&json!("two\nlines")), "two lines");
    }

    #[test]
    fn truncation_respects_display_width() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("abcdefghij", 5), "abcd…");
        assert_eq!(truncate_to_width("日本語テキスト", 6), "日本…");
    }

    #[test]
    fn table_lists_records_with_aligned_columns() {
        let schema = builtin::budget().unwrap();
        let records = vec![
            Record::with_id("1")
                .set("project", "Apollo")
                .set("budgetAmount", 1000)
                .set("spentAmount", 400)
                .set("balance", 600)
                .set("startDate", "2024-01-01T00:00:00.000Z"),
            Record::with_id("22").set("project", "Gemini"),
        ];
        let table = render_table(&schema, &records);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("id  Project"));
        assert!(lines[1].starts_with("──"));
        assert!(lines[2].starts_with("1   Apollo"));
        assert!(lines[2].contains("2024-01-01"));
        assert!(!lines[2].contains("T00:00"));
        assert!(lines[3].starts_with("22  Gemini"));
    }

    #[test]
    fn empty_table() {
        let schema = builtin::tasks().unwrap();
        assert_eq!(render_table(&schema, &[]), "No records found.\n");
    }

    #[test]
    fn form_shows_dates_and_computed_fields() {
        let schema = builtin::tasks().unwrap();
        let record = Record::with_id("5")
            .set("task", "Report")
            .set("dueDate", "2024-03-01T00:00:00.000Z")
            .set("duration", json!({"days": 2, "variance": 0}));
        let form = prepare_edit(&schema, &record);
        let out = render_form(&schema, &form, &record);
        assert!(out.starts_with("id"));
        assert!(out.contains("Report"));
        assert!(out.contains("2024-03-01"));
        assert!(out.contains("days: 2, variance: 0 (computed)"));
    }

    #[test]
    fn schema_listing_names_rules_and_sources() {
        let out = render_schema(&builtin::budget().unwrap());
        assert!(out.starts_with("Collection: ProjectBudgeting"));
        assert!(out.contains("required"));
        assert!(out.contains("min 0"));
        assert!(out.contains("(from DD_Projects)"));
        assert!(out.contains("uses budgetAmount, spentAmount"));
    }

    #[test]
    fn options_listing() {
        let schema = builtin::tasks().unwrap();
        let out = render_options(
            &schema,
            &[
                ("project".to_string(), vec!["Apollo".to_string()]),
                ("assignedTo".to_string(), vec![]),
            ],
        );
        assert!(out.contains("project     Apollo"));
        assert!(out.contains("assignedTo  (none)"));
    }
}

//! Built-in record types.
//!
//! These are plain data: the engine knows nothing about tasks or budgets
//! beyond what is declared here.

use super::{ComputeError, Field, FieldKind, FilterSpec, Rule, Schema};
use crate::error::{Result, TabulaError};
use crate::model::Record;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

pub const TASK_STATUSES: &[&str] = &["To Do", "In Progress", "Done"];
pub const BUDGET_STATUSES: &[&str] = &["Planned", "Ongoing", "Completed", "Over Budget"];
pub const ACCOUNT_CATEGORIES: &[&str] = &["Personnel", "Equipment", "Supplies", "Travel", "Other"];

/// Names accepted by [`by_name`].
pub const NAMES: &[&str] = &["tasks", "budget"];

static TASKS: Lazy<Result<Schema>> = Lazy::new(build_tasks);
static BUDGET: Lazy<Result<Schema>> = Lazy::new(build_budget);

/// Look up a built-in schema by name.
pub fn by_name(name: &str) -> Result<Schema> {
    let schema = match name {
        "tasks" => &*TASKS,
        "budget" => &*BUDGET,
        other => {
            return Err(TabulaError::Schema(format!(
                "unknown schema `{}` (expected one of: {})",
                other,
                NAMES.join(", ")
            )))
        }
    };
    schema
        .as_ref()
        .map(Schema::clone)
        .map_err(|e| TabulaError::Schema(e.to_string()))
}

pub fn tasks() -> Result<Schema> {
    by_name("tasks")
}

pub fn budget() -> Result<Schema> {
    by_name("budget")
}

fn build_tasks() -> Result<Schema> {
    Schema::builder("Records")
        .field(
            Field::new("task", "Task", FieldKind::Text)
                .rule(Rule::required("Please input task name")),
        )
        .field(Field::new("project", "Project", FieldKind::creatable_from("DD_Projects")))
        .field(
            Field::new("dueDate", "Due Date", FieldKind::Date)
                .rule(Rule::date("Please select date")),
        )
        .field(Field::new("startDate", "Start Date", FieldKind::Date))
        .field(Field::new("endDate", "End Date", FieldKind::Date))
        .field(Field::new("status", "Status", FieldKind::radio(TASK_STATUSES)))
        .field(Field::new("notes", "Notes", FieldKind::TextArea))
        .field(Field::new("assignedTo", "Assigned To", FieldKind::creatable_from("DD_Users")))
        .field(Field::computed(
            "duration",
            "Duration",
            &["startDate", "endDate", "dueDate", "status"],
            task_duration,
        ))
        .filter("task", FilterSpec::text("Search task..."))
        .filter("project", FilterSpec::select("Filter by project").source("DD_Projects"))
        .filter("status", FilterSpec::select("Filter by status").options(TASK_STATUSES))
        .filter("dueDate", FilterSpec::date_range("Start date", "End date"))
        .filter("assignedTo", FilterSpec::select("Filter by assignee").source("DD_Users"))
        .build()
}

/// Days between start and end, plus how early (positive) or late (negative)
/// a finished task came in against its due date.
fn task_duration(record: &Record) -> std::result::Result<Value, ComputeError> {
    let (Some(start), Some(end)) = (record.date("startDate"), record.date("endDate")) else {
        return Ok(Value::Null);
    };
    let days = (end - start).num_days();
    let variance = match record.date("dueDate") {
        Some(due) if record.text("status").as_deref() == Some("Done") => (due - end).num_days(),
        _ => 0,
    };
    Ok(json!({ "days": days, "variance": variance }))
}

fn build_budget() -> Result<Schema> {
    Schema::builder("ProjectBudgeting")
        .field(
            Field::new("project", "Project", FieldKind::creatable_from("DD_Projects"))
                .rule(Rule::required("Please select a project")),
        )
        .field(
            Field::new("accountCategory", "Account Category", FieldKind::select(ACCOUNT_CATEGORIES))
                .rule(Rule::required("Please select an account category")),
        )
        .field(
            Field::new("budgetAmount", "Budget Amount", FieldKind::Number)
                .rule(Rule::required("Please enter the budget amount"))
                .rule(Rule::number("Amount must be a number"))
                .rule(Rule::min(0.0, "Amount must be a positive number")),
        )
        .field(
            Field::new("spentAmount", "Spent Amount", FieldKind::Number)
                .rule(Rule::number("Amount must be a number"))
                .rule(Rule::min(0.0, "Amount must be a positive number")),
        )
        .field(Field::computed(
            "balance",
            "Balance",
            &["budgetAmount", "spentAmount"],
            |r| Ok(json!(amount(r, "budgetAmount") - amount(r, "spentAmount"))),
        ))
        .field(Field::computed(
            "percentageUsed",
            "% Used",
            &["budgetAmount", "spentAmount"],
            |r| {
                let budget = amount(r, "budgetAmount");
                if budget == 0.0 {
                    return Ok(json!(0));
                }
                Ok(json!(amount(r, "spentAmount") / budget * 100.0))
            },
        ))
        .field(
            Field::new("startDate", "Start Date", FieldKind::Date)
                .rule(Rule::required("Please select a start date"))
                .rule(Rule::date("Please select a start date")),
        )
        .field(
            Field::new("endDate", "End Date", FieldKind::Date)
                .rule(Rule::required("Please select an end date"))
                .rule(Rule::date("Please select an end date")),
        )
        .field(Field::new("status", "Status", FieldKind::radio(BUDGET_STATUSES)))
        .field(Field::new("notes", "Notes", FieldKind::TextArea))
        .field(Field::new("approver", "Approver", FieldKind::creatable_from("DD_Users")))
        .filter("project", FilterSpec::select("Filter by project").source("DD_Projects"))
        .filter(
            "accountCategory",
            FilterSpec::select("Filter by category").options(ACCOUNT_CATEGORIES),
        )
        .filter("status", FilterSpec::select("Filter by status").options(BUDGET_STATUSES))
        .filter("startDate", FilterSpec::date_range("Start date", "End date"))
        .filter("approver", FilterSpec::select("Filter by approver").source("DD_Users"))
        .build()
}

/// Missing or unparseable amounts count as zero.
fn amount(record: &Record, key: &str) -> f64 {
    record.number(key).unwrap_or(0.0)
}

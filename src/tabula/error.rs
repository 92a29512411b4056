use crate::schema::RuleViolation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabulaError {
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation failed: {}", format_violations(.0))]
    Validation(Vec<RuleViolation>),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Cli(String),
}

fn format_violations(violations: &[RuleViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, TabulaError>;

//! # CLI Layer
//!
//! This module is **one possible client** of the record store. It is the
//! only place in the codebase that:
//! - Knows about terminal I/O (stdout, stderr)
//! - Parses arguments
//! - Installs the tracing subscriber
//! - Owns a tokio runtime
//!
//! ## Structure
//!
//! - `run()`: Main dispatch logic (called by `main.rs`)
//! - `init_context()`: Builds `AppContext` with the store and the runtime
//! - `handle_*()`: Per-command handlers that drive the store and print results
//!
//! ## Where Things Live
//!
//! The tabula home directory holds `config.json`. It is `$TABULA_HOME` when
//! set, otherwise the platform data directory. Collections live in the data
//! directory: `--data-dir`, else the configured `data-dir`, else the home
//! directory.

use super::render::{
    print_message, render_form, render_options, render_schema, render_table, MessageLevel,
};
use super::setup::{Cli, Commands};
use clap::Parser;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tabula::config::{TabulaConfig, KEYS};
use tabula::dispatch::fs::FileDispatcher;
use tabula::edit::FormValues;
use tabula::error::{Result, TabulaError};
use tabula::filter::FilterValue;
use tabula::model::parse_date;
use tabula::schema::{builtin, FilterKind, Schema};
use tabula::store::RecordStore;
use tokio::runtime::Runtime;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const HOME_ENV: &str = "TABULA_HOME";
const LOG_ENV: &str = "TABULA_LOG";

struct AppContext {
    store: RecordStore<FileDispatcher>,
    runtime: Runtime,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let home = tabula_home()?;
    let config = TabulaConfig::load(&home)?;
    init_tracing(cli.verbose, &config.log_level);

    let schema_name = cli
        .schema
        .clone()
        .unwrap_or_else(|| config.default_schema.clone());
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data_dir_or(&home));
    debug!(home = %home.display(), data_dir = %data_dir.display(), schema = %schema_name, "starting");

    let command = cli.command.unwrap_or(Commands::List {
        filters: Vec::new(),
        ranges: Vec::new(),
    });

    match command {
        Commands::Config { key, value } => handle_config(&home, config, key, value),
        Commands::Schema => {
            print!("{}", render_schema(&builtin::by_name(&schema_name)?));
            Ok(())
        }
        Commands::List { filters, ranges } => {
            let ctx = init_context(&schema_name, &data_dir)?;
            ctx.runtime
                .block_on(handle_list(&ctx.store, &filters, &ranges))
        }
        Commands::Add { values } => {
            let ctx = init_context(&schema_name, &data_dir)?;
            ctx.runtime.block_on(handle_add(&ctx.store, &values))
        }
        Commands::Update { id, values } => {
            let ctx = init_context(&schema_name, &data_dir)?;
            ctx.runtime
                .block_on(handle_update(&ctx.store, &id, &values))
        }
        Commands::Delete { id } => {
            let ctx = init_context(&schema_name, &data_dir)?;
            ctx.runtime.block_on(handle_delete(&ctx.store, &id))
        }
        Commands::Show { id } => {
            let ctx = init_context(&schema_name, &data_dir)?;
            ctx.runtime.block_on(handle_show(&ctx.store, &id))
        }
        Commands::Options => {
            let ctx = init_context(&schema_name, &data_dir)?;
            ctx.runtime.block_on(handle_options(&ctx.store))
        }
    }
}

fn tabula_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    ProjectDirs::from("com", "tabula", "tabula")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| TabulaError::Config("could not determine a home directory".into()))
}

/// `TABULA_LOG` wins, then `--verbose`, then the configured level.
fn init_tracing(verbose: bool, configured: &str) {
    let fallback = if verbose { "debug" } else { configured };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn init_context(schema_name: &str, data_dir: &Path) -> Result<AppContext> {
    let schema = builtin::by_name(schema_name)?;
    let store = RecordStore::new(schema, FileDispatcher::new(data_dir));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(AppContext { store, runtime })
}

async fn handle_list(
    store: &RecordStore<FileDispatcher>,
    filters: &[String],
    ranges: &[String],
) -> Result<()> {
    for raw in filters {
        let (key, value) = parse_filter(store.schema(), raw)?;
        store.set_filter(key, value);
    }
    for raw in ranges {
        let (key, value) = parse_range(store.schema(), raw)?;
        if !value.is_active() {
            print_message(
                MessageLevel::Warning,
                &format!("range on `{}` needs both bounds, ignoring it", key),
            );
        }
        store.set_filter(key, value);
    }

    store.load().await?;
    let shown = store.filtered_records();
    print!("{}", render_table(store.schema(), &shown));

    let total = store.records().len();
    if !store.filters().is_empty() && total > 0 {
        print_message(
            MessageLevel::Info,
            &format!("{} of {} records", shown.len(), total),
        );
    }
    Ok(())
}

async fn handle_add(store: &RecordStore<FileDispatcher>, values: &[String]) -> Result<()> {
    let mut form = store.begin_create();
    form.merge(FormValues::from_pairs(store.schema(), values)?);
    store.submit(form).await?;
    print_message(
        MessageLevel::Success,
        &format!(
            "Record added to {} ({} records)",
            store.schema().collection(),
            store.records().len()
        ),
    );
    Ok(())
}

async fn handle_update(
    store: &RecordStore<FileDispatcher>,
    id: &str,
    values: &[String],
) -> Result<()> {
    store.load().await?;
    let record = store
        .find(id)
        .ok_or_else(|| TabulaError::RecordNotFound(id.to_string()))?;
    let mut form = store.begin_edit(&record);
    form.merge(FormValues::from_pairs(store.schema(), values)?);
    store.submit(form).await?;
    print_message(MessageLevel::Success, &format!("Record {} updated", id));
    Ok(())
}

async fn handle_delete(store: &RecordStore<FileDispatcher>, id: &str) -> Result<()> {
    store.delete(id).await?;
    print_message(
        MessageLevel::Success,
        &format!(
            "Record {} deleted ({} records left)",
            id,
            store.records().len()
        ),
    );
    Ok(())
}

async fn handle_show(store: &RecordStore<FileDispatcher>, id: &str) -> Result<()> {
    store.load().await?;
    let record = store
        .find(id)
        .ok_or_else(|| TabulaError::RecordNotFound(id.to_string()))?;
    let form = store.begin_edit(&record);
    print!("{}", render_form(store.schema(), &form, &record));
    Ok(())
}

async fn handle_options(store: &RecordStore<FileDispatcher>) -> Result<()> {
    store.load_dropdown_options().await;
    let options: Vec<(String, Vec<String>)> = store
        .schema()
        .filters()
        .iter()
        .filter(|(_, spec)| spec.kind == FilterKind::Select)
        .map(|(key, _)| (key.clone(), store.options_for_filter(key)))
        .collect();
    print!("{}", render_options(store.schema(), &options));
    Ok(())
}

fn handle_config(
    home: &Path,
    mut config: TabulaConfig,
    key: Option<String>,
    value: Option<String>,
) -> Result<()> {
    match (key, value) {
        (None, _) => {
            for key in KEYS {
                println!("{} = {}", key, config.get(key)?);
            }
        }
        (Some(key), None) => println!("{} = {}", key, config.get(&key)?),
        (Some(key), Some(value)) => {
            config.set(&key, &value)?;
            config.save(home)?;
            print_message(
                MessageLevel::Success,
                &format!("{} = {}", key, config.get(&key)?),
            );
        }
    }
    Ok(())
}

/// `key=value` for a text or select filter.
fn parse_filter(schema: &Schema, raw: &str) -> Result<(String, FilterValue)> {
    let (key, value) = split_pair(raw)?;
    match schema.filter(key).map(|spec| spec.kind) {
        Some(FilterKind::Text) | Some(FilterKind::Select) => {
            Ok((key.to_string(), FilterValue::text(value.trim())))
        }
        Some(FilterKind::DateRange) => Err(TabulaError::Cli(format!(
            "`{}` is a date range filter, use --range {}=FROM..TO",
            key, key
        ))),
        None => Err(no_such_filter(schema, key)),
    }
}

/// `key=FROM..TO` for a date range filter. Either bound may be empty.
fn parse_range(schema: &Schema, raw: &str) -> Result<(String, FilterValue)> {
    let (key, value) = split_pair(raw)?;
    match schema.filter(key).map(|spec| spec.kind) {
        Some(FilterKind::DateRange) => {}
        Some(_) => {
            return Err(TabulaError::Cli(format!(
                "`{}` is not a date range filter, use --filter {}=VALUE",
                key, key
            )))
        }
        None => return Err(no_such_filter(schema, key)),
    }
    let (from, to) = value
        .split_once("..")
        .ok_or_else(|| TabulaError::Cli(format!("expected FROM..TO, got `{}`", value)))?;
    let bound = |s: &str| -> Result<Option<chrono::NaiveDate>> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        parse_date(s)
            .map(Some)
            .ok_or_else(|| TabulaError::Cli(format!("not a date: `{}`", s)))
    };
    Ok((key.to_string(), FilterValue::Range(bound(from)?, bound(to)?)))
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim(), v))
        .ok_or_else(|| TabulaError::Cli(format!("expected key=value, got `{}`", raw)))
}

fn no_such_filter(schema: &Schema, key: &str) -> TabulaError {
    let known: Vec<&str> = schema.filters().iter().map(|(k, _)| k.as_str()).collect();
    TabulaError::Cli(format!(
        "no filter named `{}` (available: {})",
        key,
        known.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tasks() -> Schema {
        builtin::tasks().unwrap()
    }

    #[test]
    fn filter_pairs() {
        let (key, value) = parse_filter(&tasks(), "status=Done").unwrap();
        assert_eq!(key, "status");
        assert_eq!(value, FilterValue::text("Done"));
        assert!(parse_filter(&tasks(), "dueDate=2024-01-01").is_err());
        assert!(parse_filter(&tasks(), "notes=x").is_err());
        assert!(parse_filter(&tasks(), "status").is_err());
    }

    #[test]
    fn range_pairs() {
        let (key, value) = parse_range(&tasks(), "dueDate=2024-01-01..2024-01-31").unwrap();
        assert_eq!(key, "dueDate");
        assert_eq!(
            value,
            FilterValue::range(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
            )
        );
        let (_, open) = parse_range(&tasks(), "dueDate=..2024-01-31").unwrap();
        assert!(matches!(open, FilterValue::Range(None, Some(_))));
        assert!(parse_range(&tasks(), "dueDate=2024-01-01").is_err());
        assert!(parse_range(&tasks(), "dueDate=soon..later").is_err());
        assert!(parse_range(&tasks(), "status=a..b").is_err());
    }
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Returns the version string, including the git hash for non-release builds.
/// Format: "0.3.2" for releases, "0.3.2@abc1234" for dev builds
fn get_version() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const IS_RELEASE: &str = env!("IS_RELEASE");

    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<String> = OnceLock::new();

    VERSION_STRING.get_or_init(|| {
        if IS_RELEASE == "true" || GIT_HASH.is_empty() {
            VERSION.to_string()
        } else {
            format!("{}@{}", VERSION, GIT_HASH)
        }
    })
}

#[derive(Parser, Debug)]
#[command(name = "tabula", bin_name = "tabula", version = get_version())]
#[command(about = "Schema-driven record tables", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Record type to work with (tasks, budget)
    #[arg(short, long, global = true, help_heading = "Options")]
    pub schema: Option<String>,

    /// Directory holding the collection files
    #[arg(long, global = true, value_name = "DIR", help_heading = "Options")]
    pub data_dir: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true, help_heading = "Options")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List records, optionally filtered
    #[command(alias = "ls")]
    List {
        /// Text or select filter
        #[arg(short = 'f', long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,

        /// Date range filter, bounds exclusive; either side may be left empty
        #[arg(short = 'r', long = "range", value_name = "KEY=FROM..TO")]
        ranges: Vec<String>,
    },

    /// Add a record
    Add {
        #[arg(required = true, value_name = "KEY=VALUE")]
        values: Vec<String>,
    },

    /// Change fields of a record
    Update {
        id: String,

        #[arg(required = true, value_name = "KEY=VALUE")]
        values: Vec<String>,
    },

    /// Delete a record
    #[command(alias = "rm")]
    Delete { id: String },

    /// Show one record as its edit form
    Show { id: String },

    /// Show the options offered by select filters
    Options,

    /// Describe the fields and filters of the current record type
    Schema,

    /// Get or set configuration values
    Config {
        /// Configuration key (data-dir, default-schema, log-level)
        key: Option<String>,

        /// Value to set
        value: Option<String>,
    },
}

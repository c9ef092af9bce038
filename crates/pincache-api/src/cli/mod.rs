//! CLI command definitions for the `pcache` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod dataset;
pub mod export;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Inspect and serve chunked dashboard data from the backend cache API.
#[derive(Parser)]
#[command(name = "pcache", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans via OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured datasets.
    #[command(alias = "ls")]
    Datasets,

    /// Show the backend record count for a dataset.
    Count {
        /// Dataset name (as configured).
        dataset: String,
    },

    /// Fetch one chunk of a dataset.
    Chunk {
        /// Dataset name.
        dataset: String,

        /// Chunk index.
        index: u32,
    },

    /// Load a whole dataset and show a page of (optionally filtered) records.
    Load {
        /// Dataset name.
        dataset: String,

        /// Case-insensitive text search across record fields.
        #[arg(short, long)]
        search: Option<String>,

        /// Exact field match, `field=value` (dotted paths allowed). Repeatable.
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Field to sort by.
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending.
        #[arg(long)]
        desc: bool,

        /// Page number (1-based).
        #[arg(long, default_value = "1")]
        page: usize,

        /// Records per page (0 for all).
        #[arg(long, default_value = "25")]
        page_size: usize,
    },

    /// Export a dataset to JSON or CSV.
    Export {
        /// Dataset name.
        dataset: String,

        /// Output format.
        #[arg(long, value_enum, default_value = "json")]
        format: export::ExportFormat,

        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,

        /// Comma-separated CSV columns (default: all top-level fields).
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        /// Case-insensitive text search applied before export.
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Start the HTTP gateway.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

//! `pcache export`: write a whole dataset as JSON or CSV.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use console::style;

use pincache_core::records::export;
use pincache_core::records::query::RecordQuery;
use pincache_types::chunk::Record;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Render `records` in `format`.
pub fn render(
    records: &[Record],
    format: ExportFormat,
    columns: Option<&[String]>,
) -> Result<String> {
    match format {
        ExportFormat::Json => {
            let mut out = export::to_json(records, true).context("Failed to serialize records")?;
            out.push('\n');
            Ok(out)
        }
        ExportFormat::Csv => Ok(export::to_csv(records, columns)),
    }
}

/// Export a dataset. Refuses to write partial data when a chunk fails.
pub async fn export_dataset(
    state: &AppState,
    dataset: &str,
    format: ExportFormat,
    output: Option<&Path>,
    columns: Option<Vec<String>>,
    search: Option<String>,
    quiet: bool,
) -> Result<()> {
    state.cache(dataset)?;
    let records = state
        .registry
        .load_records(dataset)
        .await
        .with_context(|| format!("Failed to load '{dataset}'"))?;

    let query = RecordQuery {
        search,
        page_size: 0,
        ..Default::default()
    };
    let selected: Vec<Record> = query.matching(&records).into_iter().cloned().collect();
    let rendered = render(&selected, format, columns.as_deref())?;

    match output {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !quiet {
                eprintln!(
                    "  {} Exported {} record(s) to {}",
                    style("ok").green(),
                    selected.len(),
                    style(path.display()).cyan(),
                );
            }
        }
        None => print!("{rendered}"),
    }

    tracing::info!(dataset, records = selected.len(), ?format, "dataset exported");
    Ok(())
}

//! Dataset CLI commands: list, count, chunk, and load.

use anyhow::{Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use pincache_core::records::query::{FieldFilter, RecordQuery, SortSpec};
use pincache_types::chunk::{record_id, Record};

use crate::state::AppState;

/// Longest cell shown in the styled record table.
const MAX_CELL_CHARS: usize = 48;

/// List configured datasets with their backend tables and TTLs.
pub fn list_datasets(state: &AppState, json: bool) -> Result<()> {
    let datasets: Vec<_> = state.registry.datasets().collect();

    if json {
        let rows: Vec<serde_json::Value> = datasets
            .iter()
            .map(|d| {
                serde_json::json!({
                    "name": d.name,
                    "table": d.table,
                    "chunk_ttl_secs": state.config.chunk_ttl_for(d).as_secs(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if datasets.is_empty() {
        println!();
        println!("  No datasets configured.");
        println!(
            "  Add a {} section to {}",
            style("[[datasets]]").cyan(),
            style(state.data_dir.join("config.toml").display()).dim(),
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Table").fg(Color::Cyan),
            Cell::new("Chunk TTL").fg(Color::Cyan),
        ]);

    for d in &datasets {
        table.add_row(vec![
            Cell::new(&d.name),
            Cell::new(&d.table),
            Cell::new(format!("{}s", state.config.chunk_ttl_for(d).as_secs())),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  {} dataset(s) from project {} at {}",
        datasets.len(),
        style(&state.config.project).cyan(),
        style(&state.config.base_url).dim(),
    );
    println!();
    Ok(())
}

/// Show the backend record count for a dataset.
pub async fn show_count(state: &AppState, dataset: &str, json: bool) -> Result<()> {
    let cache = state.cache(dataset)?;
    let count = cache
        .get_count()
        .await
        .with_context(|| format!("Failed to fetch count for '{dataset}'"))?;

    if json {
        let result = serde_json::json!({ "dataset": dataset, "count": count });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} has {} record(s)",
            style(dataset).cyan().bold(),
            style(count).bold(),
        );
        println!();
    }
    Ok(())
}

/// Fetch a single chunk and print its records.
pub async fn show_chunk(state: &AppState, dataset: &str, index: u32, json: bool) -> Result<()> {
    let cache = state.cache(dataset)?;
    let records = cache
        .get_chunk(index)
        .await
        .with_context(|| format!("Failed to fetch chunk {index} of '{dataset}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(records.as_slice())?);
        return Ok(());
    }

    println!();
    println!(
        "  {} chunk {} ({} record(s))",
        style(dataset).cyan().bold(),
        style(index).bold(),
        records.len(),
    );
    print_records(&records);
    Ok(())
}

/// Options for `pcache load`.
pub struct LoadArgs {
    pub search: Option<String>,
    pub filters: Vec<String>,
    pub sort: Option<String>,
    pub desc: bool,
    pub page: usize,
    pub page_size: usize,
}

impl LoadArgs {
    /// Build the record query, rejecting malformed filters.
    pub fn to_query(&self) -> Result<RecordQuery> {
        let filters = self
            .filters
            .iter()
            .map(|raw| {
                FieldFilter::parse(raw)
                    .with_context(|| format!("Invalid filter '{raw}' (expected field=value)"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RecordQuery {
            search: self.search.clone(),
            filters,
            sort: self.sort.clone().map(|field| SortSpec {
                field,
                descending: self.desc,
            }),
            page: self.page,
            page_size: self.page_size,
        })
    }
}

/// Load every chunk of a dataset, then show one page of matching records.
pub async fn load_dataset(
    state: &AppState,
    dataset: &str,
    args: LoadArgs,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let query = args.to_query()?;
    let cache = state.cache(dataset)?;

    let bar = if json || quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("  {spinner:.cyan} [{bar:30.cyan/dim}] {pos}/{len} chunks")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let loaded = cache
        .load_all_with_progress(|done, total| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        })
        .await
        .with_context(|| format!("Failed to list chunks for '{dataset}'"))?;
    bar.finish_and_clear();

    for (index, error) in &loaded.failed {
        tracing::warn!(dataset, index, error = %error, "chunk failed to load");
    }

    let page = query.apply(&loaded.records);

    if json {
        let failed: Vec<serde_json::Value> = loaded
            .failed
            .iter()
            .map(|(index, error)| serde_json::json!({ "index": index, "error": error.to_string() }))
            .collect();
        let result = serde_json::json!({
            "dataset": dataset,
            "chunks_loaded": loaded.chunks_loaded,
            "failed_chunks": failed,
            "page": page,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} record(s) from {} chunk(s), {} matching",
        style("ok").green(),
        loaded.records.len(),
        loaded.chunks_loaded,
        style(page.total).bold(),
    );
    if !loaded.failed.is_empty() {
        println!(
            "  {} {} chunk(s) failed; results are incomplete",
            style("!").yellow().bold(),
            loaded.failed.len(),
        );
    }

    print_records(&page.items);
    if page.total_pages > 1 {
        println!(
            "  Page {} of {} (use --page to see more)",
            page.page, page.total_pages
        );
        println!();
    }
    Ok(())
}

/// Render records as a table of id plus the first few fields.
fn print_records(records: &[Record]) {
    if records.is_empty() {
        println!();
        println!("  {}", style("No records.").dim());
        println!();
        return;
    }

    let columns: Vec<String> = pincache_core::records::export::infer_columns(records)
        .into_iter()
        .filter(|c| c != "id" && c != "_id")
        .take(4)
        .collect();

    let mut header = vec![Cell::new("ID").fg(Color::Cyan)];
    header.extend(columns.iter().map(|c| Cell::new(c).fg(Color::Cyan)));

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);

    for record in records {
        let mut row = vec![Cell::new(record_id(record).unwrap_or_else(|| "-".to_string()))];
        row.extend(
            columns
                .iter()
                .map(|c| Cell::new(truncate(&display_value(record.get(c))))),
        );
        table.add_row(row);
    }

    println!();
    println!("{table}");
    println!();
}

fn display_value(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_CELL_CHARS {
        let cut: String = text.chars().take(MAX_CELL_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(filters: &[&str]) -> LoadArgs {
        LoadArgs {
            search: Some("koi".to_string()),
            filters: filters.iter().map(|f| f.to_string()).collect(),
            sort: Some("saves".to_string()),
            desc: true,
            page: 2,
            page_size: 10,
        }
    }

    #[test]
    fn load_args_build_query() {
        let query = args(&["board=art"]).to_query().unwrap();
        assert_eq!(query.search.as_deref(), Some("koi"));
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].field, "board");
        assert_eq!(query.filters[0].value, "art");
        let sort = query.sort.unwrap();
        assert_eq!(sort.field, "saves");
        assert!(sort.descending);
        assert_eq!(query.page, 2);
        assert_eq!(query.page_size, 10);
    }

    #[test]
    fn malformed_filter_is_rejected() {
        let err = args(&["nofield"]).to_query().unwrap_err();
        assert!(err.to_string().contains("nofield"));
    }

    #[test]
    fn long_cells_are_truncated() {
        let long = "x".repeat(100);
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), MAX_CELL_CHARS);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn display_value_renders_scalars() {
        assert_eq!(display_value(None), "");
        assert_eq!(display_value(Some(&serde_json::json!("a"))), "a");
        assert_eq!(display_value(Some(&serde_json::json!(3))), "3");
        assert_eq!(display_value(Some(&serde_json::json!({"k": 1}))), r#"{"k":1}"#);
    }
}

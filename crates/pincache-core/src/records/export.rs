//! JSON and CSV export of record sets.

use std::collections::BTreeSet;

use pincache_types::chunk::Record;
use serde_json::Value;

/// Serialize records as a JSON array.
pub fn to_json(records: &[Record], pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(records)
    } else {
        serde_json::to_string(records)
    }
}

/// Sorted union of top-level keys across all object records.
pub fn infer_columns(records: &[Record]) -> Vec<String> {
    let columns: BTreeSet<&str> = records
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|fields| fields.keys().map(String::as_str))
        .collect();
    columns.into_iter().map(str::to_string).collect()
}

/// Render records as CSV (RFC 4180, CRLF line endings) with a header row.
///
/// When `columns` is `None` the columns are [`infer_columns`]. Strings are
/// written raw, null/missing as an empty cell, and nested objects/arrays
/// as compact JSON.
pub fn to_csv(records: &[Record], columns: Option<&[String]>) -> String {
    let inferred;
    let columns: &[String] = match columns {
        Some(columns) => columns,
        None => {
            inferred = infer_columns(records);
            inferred.as_slice()
        }
    };

    let mut out = String::new();
    write_row(&mut out, columns.iter().map(String::as_str));

    for record in records {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| cell_text(record.get(column)))
            .collect();
        write_row(&mut out, cells.iter().map(String::as_str));
    }
    out
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn write_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_cell(cell));
    }
    out.push_str("\r\n");
}

fn escape_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_columns_is_sorted_union() {
        let records = vec![json!({"title": "a", "id": 1}), json!({"id": 2, "link": "x"})];
        assert_eq!(infer_columns(&records), vec!["id", "link", "title"]);
    }

    #[test]
    fn test_csv_header_and_missing_cells() {
        let records = vec![json!({"id": 1, "title": "Koi"}), json!({"id": 2, "note": null})];
        let csv = to_csv(&records, None);
        assert_eq!(csv, "id,note,title\r\n1,,Koi\r\n2,,\r\n");
    }

    #[test]
    fn test_csv_quotes_special_characters() {
        let records = vec![json!({"title": "Rose, red", "desc": "say \"hi\"\nbye"})];
        let csv = to_csv(&records, None);
        assert_eq!(csv, "desc,title\r\n\"say \"\"hi\"\"\nbye\",\"Rose, red\"\r\n");
    }

    #[test]
    fn test_csv_explicit_columns_and_nested_values() {
        let records = vec![json!({"id": "o1", "items": [1, 2], "customer": {"name": "Ana"}})];
        let columns = vec!["customer".to_string(), "id".to_string()];
        let csv = to_csv(&records, Some(&columns));
        assert_eq!(csv, "customer,id\r\n\"{\"\"name\"\":\"\"Ana\"\"}\",o1\r\n");
    }

    #[test]
    fn test_to_json_compact_and_pretty() {
        let records = vec![json!({"id": 1})];
        assert_eq!(to_json(&records, false).unwrap(), r#"[{"id":1}]"#);
        assert!(to_json(&records, true).unwrap().contains('\n'));
    }
}

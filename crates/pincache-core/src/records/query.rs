//! Search, filter, sort, and paginate a loaded record set.
//!
//! Field paths are dotted (`board.name`). Matching is case-insensitive.
//! Search looks at every scalar field of a record, plus scalars one level
//! down in nested objects and inside arrays of scalars (tags, keywords).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use pincache_types::chunk::Record;
use serde_json::Value;

/// Default page size when none is given.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Exact (case-insensitive) match on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

impl FieldFilter {
    /// Parse `field=value` or `field:value`.
    ///
    /// The first separator wins, so values may contain either character.
    pub fn parse(raw: &str) -> Option<Self> {
        let split_at = raw.find(['=', ':'])?;
        let (field, value) = (raw[..split_at].trim(), &raw[split_at + 1..]);
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            value: value.trim().to_string(),
        })
    }

    fn matches(&self, record: &Record) -> bool {
        lookup(record, &self.field)
            .and_then(scalar_text)
            .is_some_and(|text| text.to_lowercase() == self.value.to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

/// A query over a record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub filters: Vec<FieldFilter>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    /// 1-based page number. 0 is treated as 1.
    #[serde(default = "default_page")]
    pub page: usize,
    /// Records per page. 0 returns everything on one page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            search: None,
            filters: Vec::new(),
            sort: None,
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<Record>,
    /// Matching records across all pages.
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

impl RecordQuery {
    /// Records matching search and filters, sorted, without pagination.
    pub fn matching<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        let needle = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut matched: Vec<&Record> = records
            .iter()
            .filter(|r| needle.as_deref().is_none_or(|n| search_matches(r, n)))
            .filter(|r| self.filters.iter().all(|f| f.matches(r)))
            .collect();

        if let Some(sort) = &self.sort {
            matched.sort_by(|a, b| compare_by_field(a, b, sort));
        }
        matched
    }

    pub fn apply(&self, records: &[Record]) -> Page {
        let matched = self.matching(records);
        let total = matched.len();
        let page = self.page.max(1);

        if self.page_size == 0 {
            return Page {
                items: matched.into_iter().cloned().collect(),
                total,
                page: 1,
                page_size: 0,
                total_pages: usize::from(total > 0),
            };
        }

        let total_pages = total.div_ceil(self.page_size);
        let items = matched
            .into_iter()
            .skip((page - 1).saturating_mul(self.page_size))
            .take(self.page_size)
            .cloned()
            .collect();

        Page {
            items,
            total,
            page,
            page_size: self.page_size,
            total_pages,
        }
    }
}

/// Resolve a dotted path inside a record.
pub fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |value, segment| value.get(segment))
        .filter(|v| !v.is_null())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(scalar_text)
            .any(|t| t.to_lowercase().contains(needle)),
        other => scalar_text(other).is_some_and(|t| t.to_lowercase().contains(needle)),
    }
}

fn search_matches(record: &Record, needle: &str) -> bool {
    let Some(fields) = record.as_object() else {
        return scalar_contains(record, needle);
    };

    fields.values().any(|value| match value {
        Value::Object(nested) => nested.values().any(|v| scalar_contains(v, needle)),
        other => scalar_contains(other, needle),
    })
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Number(_), _) => Ordering::Less,
        (_, Value::Number(_)) => Ordering::Greater,
        _ => {
            let x = scalar_text(a).unwrap_or_default();
            let y = scalar_text(b).unwrap_or_default();
            x.cmp(&y)
        }
    }
}

/// Records missing the field sort last in either direction.
fn compare_by_field(a: &Record, b: &Record, sort: &SortSpec) -> Ordering {
    match (lookup(a, &sort.field), lookup(b, &sort.field)) {
        (Some(x), Some(y)) => {
            let ordering = compare_values(x, y);
            if sort.descending {
                ordering.reverse()
            } else {
                ordering
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pins() -> Vec<Record> {
        vec![
            json!({"id": "p1", "title": "Koi Tattoo", "saves": 120, "board": {"name": "Japanese"}, "tags": ["ink", "fish"]}),
            json!({"id": "p2", "title": "Rose sleeve", "saves": 45, "board": {"name": "Floral"}, "tags": ["flower"]}),
            json!({"id": "p3", "title": "Dragon back piece", "saves": 300, "board": {"name": "Japanese"}}),
            json!({"id": "p4", "title": "Minimal wave", "board": {"name": "Fine line"}}),
        ]
    }

    fn ids(page: &Page) -> Vec<&str> {
        page.items.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_default_query_returns_first_page() {
        let page = RecordQuery::default().apply(&pins());
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 1);
        assert_eq!(ids(&page), vec!["p1", "p2", "p3", "p4"]);
    }

    #[test]
    fn test_search_is_case_insensitive_and_looks_into_nested_fields() {
        let query = RecordQuery {
            search: Some("KOI".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(&pins())), vec!["p1"]);

        let query = RecordQuery {
            search: Some("japanese".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(&pins())), vec!["p1", "p3"]);

        let query = RecordQuery {
            search: Some("flower".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(&pins())), vec!["p2"]);

        let query = RecordQuery {
            search: Some("300".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(&pins())), vec!["p3"]);
    }

    #[test]
    fn test_blank_search_matches_everything() {
        let query = RecordQuery {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(query.apply(&pins()).total, 4);
    }

    #[test]
    fn test_filters_use_dotted_paths() {
        let query = RecordQuery {
            filters: vec![FieldFilter::parse("board.name=japanese").unwrap()],
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(&pins())), vec!["p1", "p3"]);

        let query = RecordQuery {
            filters: vec![
                FieldFilter::parse("board.name:Japanese").unwrap(),
                FieldFilter::parse("saves=300").unwrap(),
            ],
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(&pins())), vec!["p3"]);
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!(
            FieldFilter::parse("status=paid"),
            Some(FieldFilter {
                field: "status".to_string(),
                value: "paid".to_string()
            })
        );
        let url = FieldFilter::parse("link=https://example.com").unwrap();
        assert_eq!(url.field, "link");
        assert_eq!(url.value, "https://example.com");
        assert_eq!(FieldFilter::parse("no-separator"), None);
        assert_eq!(FieldFilter::parse("=value"), None);
    }

    #[test]
    fn test_sort_numeric_with_missing_last() {
        let query = RecordQuery {
            sort: Some(SortSpec {
                field: "saves".to_string(),
                descending: false,
            }),
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(&pins())), vec!["p2", "p1", "p3", "p4"]);

        let query = RecordQuery {
            sort: Some(SortSpec {
                field: "saves".to_string(),
                descending: true,
            }),
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(&pins())), vec!["p3", "p1", "p2", "p4"]);
    }

    #[test]
    fn test_sort_strings_is_stable() {
        let query = RecordQuery {
            sort: Some(SortSpec {
                field: "board.name".to_string(),
                descending: false,
            }),
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(&pins())), vec!["p4", "p2", "p1", "p3"]);
    }

    #[test]
    fn test_pagination() {
        let query = RecordQuery {
            page: 2,
            page_size: 3,
            ..Default::default()
        };
        let page = query.apply(&pins());
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        assert_eq!(ids(&page), vec!["p4"]);

        let query = RecordQuery {
            page: 0,
            page_size: 3,
            ..Default::default()
        };
        assert_eq!(query.apply(&pins()).page, 1);

        let query = RecordQuery {
            page: 9,
            page_size: 3,
            ..Default::default()
        };
        assert!(query.apply(&pins()).items.is_empty());
    }

    #[test]
    fn test_page_size_zero_returns_everything() {
        let query = RecordQuery {
            page_size: 0,
            ..Default::default()
        };
        let page = query.apply(&pins());
        assert_eq!(page.items.len(), 4);
        assert_eq!(page.total_pages, 1);

        let empty = query.apply(&[]);
        assert_eq!(empty.total_pages, 0);
    }
}

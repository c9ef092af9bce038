//! Query parameter extractors for the records endpoint.

use serde::Deserialize;

use pincache_core::records::query::{DEFAULT_PAGE_SIZE, FieldFilter, RecordQuery, SortSpec};

use crate::http::error::AppError;

/// Largest page a client may request.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Query parameters for `GET /datasets/{name}/records`.
#[derive(Debug, Deserialize, Default)]
pub struct RecordsQuery {
    /// Case-insensitive text search.
    pub search: Option<String>,
    /// Comma-separated `field:value` (or `field=value`) exact matches.
    pub filter: Option<String>,
    /// Sort by field (dotted paths allowed).
    pub sort: Option<String>,
    /// Sort descending.
    #[serde(default)]
    pub desc: bool,
    /// 1-based page number.
    pub page: Option<usize>,
    /// Records per page.
    pub page_size: Option<usize>,
}

impl RecordsQuery {
    /// Validate and convert into a [`RecordQuery`].
    pub fn into_record_query(self) -> Result<RecordQuery, AppError> {
        let filters = match self.filter.as_deref() {
            None => Vec::new(),
            Some(raw) => raw
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(|part| {
                    FieldFilter::parse(part).ok_or_else(|| {
                        AppError::Validation(format!(
                            "Invalid filter '{part}' (expected field:value)"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        Ok(RecordQuery {
            search: self.search,
            filters,
            sort: self
                .sort
                .filter(|s| !s.trim().is_empty())
                .map(|field| SortSpec {
                    field,
                    descending: self.desc,
                }),
            page: self.page.unwrap_or(1),
            page_size,
        })
    }
}

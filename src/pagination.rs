//! Offset pagination shared by every listing.
//!
//! Stores fetch `limit + 1` rows; the extra row only tells us whether another
//! page exists and is dropped before the result leaves the store.

use serde::Serialize;

use crate::config::PaginationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Apply configured default and cap to caller supplied values.
    pub fn clamp(offset: Option<u64>, limit: Option<u64>, config: &PaginationConfig) -> Self {
        let limit = limit
            .unwrap_or(config.default_limit)
            .clamp(1, config.max_limit.max(1));
        Self {
            offset: offset.unwrap_or(0),
            limit,
        }
    }

    /// Rows a store should request to detect a following page.
    pub fn fetch_limit(&self) -> u64 {
        self.limit.saturating_add(1)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::clamp(None, None, &PaginationConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub more: bool,
}

impl<T> Paged<T> {
    /// Build from an over-fetched row set (see [`Page::fetch_limit`]).
    pub fn from_overfetch(mut rows: Vec<T>, page: &Page) -> Self {
        let more = rows.len() as u64 > page.limit;
        if more {
            rows.truncate(page.limit as usize);
        }
        Self { items: rows, more }
    }

    /// Slice an already materialised, ordered collection.
    pub fn from_slice(all: impl IntoIterator<Item = T>, page: &Page) -> Self {
        let rows = all
            .into_iter()
            .skip(page.offset as usize)
            .take(page.fetch_limit() as usize)
            .collect();
        Self::from_overfetch(rows, page)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            more: self.more,
        }
    }
}

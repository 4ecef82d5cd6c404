//! Display-ready pagination facts
//!
//! [`PageNumberState`] is derived from a loaded page and never patched in
//! place: every page load produces a fresh value.
//!
//! # Example
//!
//! ```rust
//! use hypercrud::page_numbers::PageNumberState;
//!
//! let state = PageNumberState::new(2, 10, 25);
//! assert_eq!(state.current_page, 3);
//! assert_eq!(state.total_pages, 3);
//! assert_eq!((state.item_start, state.item_end), (21, 25));
//! ```

use serde::{Deserialize, Serialize};

use crate::collection::CollectionResult;

/// Pagination facts for one loaded page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNumberState {
    /// Zero-based page index
    pub offset: u64,
    /// Items per page
    pub limit: u64,
    /// Total number of items across all pages
    pub total: u64,
    /// One-based page number
    pub current_page: u64,
    /// Total number of pages
    pub total_pages: u64,
    /// One-based index of the first item on this page
    pub item_start: u64,
    /// One-based index of the last item on this page, clamped to `total`
    pub item_end: u64,
    /// Whether the first-page link is offered
    pub can_first: bool,
    /// Whether the previous-page link is offered
    pub can_previous: bool,
    /// Whether the next-page link is offered
    pub can_next: bool,
    /// Whether the last-page link is offered
    pub can_last: bool,
    /// Whether the refresh link is offered
    pub can_refresh: bool,
}

impl PageNumberState {
    /// Derive numbers from raw paging data, with every link disabled
    #[must_use]
    pub fn new(offset: u64, limit: u64, total: u64) -> Self {
        let (item_start, item_end) = item_range(offset, limit, total);
        Self {
            offset,
            limit,
            total,
            current_page: offset.saturating_add(1),
            total_pages: total_pages(total, limit),
            item_start,
            item_end,
            can_first: false,
            can_previous: false,
            can_next: false,
            can_last: false,
            can_refresh: false,
        }
    }

    /// Derive numbers and link availability from a loaded page
    #[must_use]
    pub fn from_result(page: &dyn CollectionResult) -> Self {
        Self {
            can_first: page.can_first(),
            can_previous: page.can_previous(),
            can_next: page.can_next(),
            can_last: page.can_last(),
            can_refresh: page.can_refresh(),
            ..Self::new(page.offset(), page.limit(), page.total())
        }
    }

    /// Whether the underlying set has no items
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Zero-based page indices to render as numbered links.
    ///
    /// At most `width` pages, centred on the current page where possible and
    /// always within `[0, total_pages)`.
    #[must_use]
    pub fn page_window(&self, width: u64) -> Vec<u64> {
        let width = width.min(self.total_pages);
        if width == 0 {
            return Vec::new();
        }

        let mut start = self.offset.saturating_sub(width / 2);
        if start.saturating_add(width) > self.total_pages {
            start = self.total_pages - width;
        }
        (start..start + width).collect()
    }
}

/// Number of pages needed for `total` items, rounding up; 0 when `limit` is 0
#[must_use]
pub fn total_pages(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    total / limit + u64::from(total % limit != 0)
}

/// One-based `(first, last)` item indices shown on page `offset`
#[must_use]
pub fn item_range(offset: u64, limit: u64, total: u64) -> (u64, u64) {
    let start = offset.saturating_mul(limit).saturating_add(1);
    let end = start.saturating_add(limit).saturating_sub(1).min(total);
    (start, end)
}

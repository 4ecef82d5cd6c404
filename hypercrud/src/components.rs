//! Query components: independent contributors to the shared query
//!
//! Each UI concern (paging, sorting, search) owns one component. A component
//! writes its fields into the [`Query`] being composed and fires
//! [`QueryComponent::changed`] whenever its own state changes.
//!
//! Paging and sorting always overwrite the keys they own. Search filters use
//! [`Query::set_if_absent`] so they never clobber a key another component
//! has already written.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::config::CrudConfig;
use crate::events::EventDispatcher;
use crate::page_numbers::PageNumberState;
use crate::query::{Query, SortOrder, LIMIT, OFFSET, ORDER, ORDER_BY};

/// Contributor of fields to the composed query
pub trait QueryComponent: Send + Sync {
    /// Write this component's fields into `query`
    fn setup_query(&self, query: &mut Query);

    /// Fired whenever this component wants the listing reloaded
    fn changed(&self) -> &EventDispatcher<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
struct PagingState {
    offset: u64,
    limit: u64,
}

/// Owns `offset` (zero-based page index) and `limit`
#[derive(Debug)]
pub struct PagingComponent {
    state: Mutex<PagingState>,
    max_limit: u64,
    changed: EventDispatcher<()>,
}

impl PagingComponent {
    /// Start on the first page with `limit` items per page
    #[must_use]
    pub fn new(limit: u64, max_limit: u64) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            state: Mutex::new(PagingState {
                offset: 0,
                limit: limit.clamp(1, max_limit),
            }),
            max_limit,
            changed: EventDispatcher::new(),
        }
    }

    /// Page size and clamp taken from configuration
    #[must_use]
    pub fn from_config(config: &CrudConfig) -> Self {
        Self::new(config.paging.default_limit, config.paging.max_limit)
    }

    /// Current zero-based page index
    #[must_use]
    pub fn offset(&self) -> u64 {
        lock(&self.state).offset
    }

    /// Current page size
    #[must_use]
    pub fn limit(&self) -> u64 {
        lock(&self.state).limit
    }

    /// Jump to page `offset`
    pub fn set_offset(&self, offset: u64) {
        let changed = {
            let mut state = lock(&self.state);
            let changed = state.offset != offset;
            state.offset = offset;
            changed
        };
        if changed {
            self.changed.notify(&());
        }
    }

    /// Change the page size; returns to the first page
    pub fn set_limit(&self, limit: u64) {
        let limit = limit.clamp(1, self.max_limit);
        let changed = {
            let mut state = lock(&self.state);
            let changed = state.limit != limit || state.offset != 0;
            state.limit = limit;
            state.offset = 0;
            changed
        };
        if changed {
            self.changed.notify(&());
        }
    }

    /// Go to the first page
    pub fn first(&self) {
        self.set_offset(0);
    }

    /// Go to the next page
    pub fn next(&self) {
        self.set_offset(self.offset().saturating_add(1));
    }

    /// Go to the previous page (stays on the first page)
    pub fn previous(&self) {
        self.set_offset(self.offset().saturating_sub(1));
    }

    /// Adopt the position of a loaded page without requesting a reload
    pub fn sync_from(&self, numbers: &PageNumberState) {
        let mut state = lock(&self.state);
        state.offset = numbers.offset;
        if numbers.limit > 0 {
            state.limit = numbers.limit;
        }
    }
}

impl QueryComponent for PagingComponent {
    fn setup_query(&self, query: &mut Query) {
        let state = *lock(&self.state);
        query.set(OFFSET, state.offset);
        query.set(LIMIT, state.limit);
    }

    fn changed(&self) -> &EventDispatcher<()> {
        &self.changed
    }
}

/// Owns `orderBy` and `order`
#[derive(Debug, Default)]
pub struct SortComponent {
    state: Mutex<Option<(String, SortOrder)>>,
    changed: EventDispatcher<()>,
}

impl SortComponent {
    /// Start unsorted
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current sort column and direction
    #[must_use]
    pub fn current(&self) -> Option<(String, SortOrder)> {
        lock(&self.state).clone()
    }

    /// Sort by `column` in direction `order`
    pub fn sort_by(&self, column: impl Into<String>, order: SortOrder) {
        self.replace(Some((column.into(), order)));
    }

    /// Same column flips direction, a new column starts ascending
    pub fn toggle(&self, column: &str) {
        let next = match self.current() {
            Some((current, order)) if current == column => order.reversed(),
            _ => SortOrder::Asc,
        };
        self.replace(Some((column.to_string(), next)));
    }

    /// Drop the sort, leaving ordering to the server
    pub fn clear(&self) {
        self.replace(None);
    }

    fn replace(&self, next: Option<(String, SortOrder)>) {
        let changed = {
            let mut state = lock(&self.state);
            let changed = *state != next;
            *state = next;
            changed
        };
        if changed {
            self.changed.notify(&());
        }
    }
}

impl QueryComponent for SortComponent {
    fn setup_query(&self, query: &mut Query) {
        if let Some((column, order)) = self.current() {
            query.set(ORDER_BY, column);
            query.set(ORDER, order.as_str());
        }
    }

    fn changed(&self) -> &EventDispatcher<()> {
        &self.changed
    }
}

/// Contributes free-form filter keys
#[derive(Debug, Default)]
pub struct SearchComponent {
    filters: Mutex<Query>,
    changed: EventDispatcher<()>,
}

impl SearchComponent {
    /// Start with no filters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current filter values
    #[must_use]
    pub fn filters(&self) -> Query {
        lock(&self.filters).clone()
    }

    /// Set one filter value
    pub fn set_filter(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        self.update(|filters| {
            if filters.get(&key) == Some(&value) {
                return false;
            }
            filters.set(key, value);
            true
        });
    }

    /// Remove one filter
    pub fn remove_filter(&self, key: &str) {
        self.update(|filters| filters.remove(key).is_some());
    }

    /// Replace every filter at once, e.g. from a submitted search form
    pub fn set_filters(&self, next: Query) {
        self.update(|filters| {
            if *filters == next {
                return false;
            }
            *filters = next;
            true
        });
    }

    /// Remove every filter
    pub fn clear(&self) {
        self.set_filters(Query::new());
    }

    fn update(&self, apply: impl FnOnce(&mut Query) -> bool) {
        let changed = apply(&mut lock(&self.filters));
        if changed {
            self.changed.notify(&());
        }
    }
}

impl QueryComponent for SearchComponent {
    fn setup_query(&self, query: &mut Query) {
        for (key, value) in lock(&self.filters).iter() {
            if matches!(value, Value::Null) || value.as_str() == Some("") {
                continue;
            }
            query.set_if_absent(key.clone(), value.clone());
        }
    }

    fn changed(&self) -> &EventDispatcher<()> {
        &self.changed
    }
}

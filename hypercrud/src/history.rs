//! Deep-link and history integration
//!
//! The service records where the user is (page query plus an optional
//! in-page path such as `/Edit/42`) through a [`HistoryManager`], and is told
//! about back/forward navigation through a registered [`PopStateHandler`].
//!
//! [`NullHistory`] disables history integration. [`MemoryHistory`] keeps an
//! in-process back/forward stack.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::query::Query;

/// Default first path segment of an edit route
pub const DEFAULT_EDIT_SEGMENT: &str = "Edit";

/// State stored in one history entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryState {
    /// Query that reproduces the listing
    pub query: Query,
    /// Path within the page, e.g. `/Edit/42`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_page_path: Option<String>,
}

impl HistoryState {
    /// Plain listing state
    #[must_use]
    pub fn listing(query: Query) -> Self {
        Self {
            query,
            in_page_path: None,
        }
    }

    /// Listing state with an in-page path
    #[must_use]
    pub fn with_path(query: Query, in_page_path: impl Into<String>) -> Self {
        Self {
            query,
            in_page_path: Some(in_page_path.into()),
        }
    }
}

/// Callback invoked on back/forward navigation
pub type PopStateHandler = Arc<dyn Fn(HistoryState) -> BoxFuture<'static, ()> + Send + Sync>;

/// Browser-history style deep-link store
pub trait HistoryManager: Send + Sync {
    /// Add a new entry for `key`
    fn push_state(&self, key: &str, in_page_path: Option<&str>, query: &Query);

    /// Overwrite the current entry for `key`
    fn replace_state(&self, key: &str, in_page_path: Option<&str>, query: &Query);

    /// State of the current entry, if it belongs to `key`
    fn current_state(&self, key: &str) -> Option<HistoryState>;

    /// Receive pop-state events for `key`
    fn register_handler(&self, key: &str, handler: PopStateHandler);
}

/// Build the in-page path for editing item `id`
#[must_use]
pub fn edit_path(segment: &str, id: &str) -> String {
    format!("/{segment}/{id}")
}

/// Extract the item id from an edit route.
///
/// The first segment must equal `segment` ignoring ASCII case and the second
/// segment is the opaque id.
///
/// ```rust
/// use hypercrud::history::parse_edit_route;
///
/// assert_eq!(parse_edit_route("/edit/42", "Edit"), Some("42".to_string()));
/// assert_eq!(parse_edit_route("/View/42", "Edit"), None);
/// ```
#[must_use]
pub fn parse_edit_route(path: &str, segment: &str) -> Option<String> {
    let mut parts = path.trim_start_matches('/').split('/');
    let first = parts.next()?;
    if !first.eq_ignore_ascii_case(segment) {
        return None;
    }
    parts
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// History manager that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHistory;

impl HistoryManager for NullHistory {
    fn push_state(&self, _key: &str, _in_page_path: Option<&str>, _query: &Query) {}

    fn replace_state(&self, _key: &str, _in_page_path: Option<&str>, _query: &Query) {}

    fn current_state(&self, _key: &str) -> Option<HistoryState> {
        None
    }

    fn register_handler(&self, _key: &str, _handler: PopStateHandler) {}
}

/// Kind of write recorded by [`MemoryHistory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryWriteKind {
    /// New entry
    Push,
    /// Current entry overwritten
    Replace,
}

/// One recorded history write
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryWrite {
    /// Push or replace
    pub kind: HistoryWriteKind,
    /// Page-source key
    pub key: String,
    /// State written
    pub state: HistoryState,
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    state: HistoryState,
}

#[derive(Debug, Default)]
struct Stack {
    entries: Vec<Entry>,
    cursor: usize,
    writes: Vec<HistoryWrite>,
}

/// In-process back/forward stack
#[derive(Default)]
pub struct MemoryHistory {
    stack: Mutex<Stack>,
    handlers: DashMap<String, PopStateHandler>,
}

impl MemoryHistory {
    /// Empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// History whose current entry is a deep link for `key`
    #[must_use]
    pub fn starting_at(key: &str, state: HistoryState) -> Self {
        let history = Self::new();
        history.lock().entries.push(Entry {
            key: key.to_string(),
            state,
        });
        history
    }

    /// Every push/replace made so far, oldest first
    #[must_use]
    pub fn writes(&self) -> Vec<HistoryWrite> {
        self.lock().writes.clone()
    }

    /// Number of push/replace calls made so far
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    /// Number of entries in the stack
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the stack has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Step back one entry and notify its owner. Returns `false` at the start.
    pub async fn back(&self) -> bool {
        let entry = {
            let mut stack = self.lock();
            if stack.cursor == 0 || stack.entries.is_empty() {
                return false;
            }
            stack.cursor -= 1;
            stack.entries[stack.cursor].clone()
        };
        self.dispatch(entry).await;
        true
    }

    /// Step forward one entry and notify its owner. Returns `false` at the end.
    pub async fn forward(&self) -> bool {
        let entry = {
            let mut stack = self.lock();
            if stack.cursor + 1 >= stack.entries.len() {
                return false;
            }
            stack.cursor += 1;
            stack.entries[stack.cursor].clone()
        };
        self.dispatch(entry).await;
        true
    }

    async fn dispatch(&self, entry: Entry) {
        let handler = self.handlers.get(&entry.key).map(|h| h.value().clone());
        match handler {
            Some(handler) => handler(entry.state).await,
            None => tracing::debug!(key = %entry.key, "No pop-state handler registered"),
        }
    }

    fn record(&self, kind: HistoryWriteKind, key: &str, in_page_path: Option<&str>, query: &Query) {
        let state = HistoryState {
            query: query.clone(),
            in_page_path: in_page_path.map(str::to_string),
        };
        let entry = Entry {
            key: key.to_string(),
            state: state.clone(),
        };

        let mut stack = self.lock();
        match kind {
            HistoryWriteKind::Replace if !stack.entries.is_empty() => {
                let cursor = stack.cursor;
                stack.entries[cursor] = entry;
            }
            _ => {
                let keep = if stack.entries.is_empty() {
                    0
                } else {
                    stack.cursor + 1
                };
                stack.entries.truncate(keep);
                stack.entries.push(entry);
                stack.cursor = stack.entries.len() - 1;
            }
        }
        stack.writes.push(HistoryWrite {
            kind,
            key: key.to_string(),
            state,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Stack> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HistoryManager for MemoryHistory {
    fn push_state(&self, key: &str, in_page_path: Option<&str>, query: &Query) {
        self.record(HistoryWriteKind::Push, key, in_page_path, query);
    }

    fn replace_state(&self, key: &str, in_page_path: Option<&str>, query: &Query) {
        self.record(HistoryWriteKind::Replace, key, in_page_path, query);
    }

    fn current_state(&self, key: &str) -> Option<HistoryState> {
        let stack = self.lock();
        stack
            .entries
            .get(stack.cursor)
            .filter(|entry| entry.key == key)
            .map(|entry| entry.state.clone())
    }

    fn register_handler(&self, key: &str, handler: PopStateHandler) {
        self.handlers.insert(key.to_string(), handler);
    }
}

impl fmt::Debug for MemoryHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.lock();
        f.debug_struct("MemoryHistory")
            .field("entries", &stack.entries.len())
            .field("cursor", &stack.cursor)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

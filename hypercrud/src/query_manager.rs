//! Composition of query components into one request query
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hypercrud::components::{PagingComponent, SearchComponent};
//! use hypercrud::query_manager::QueryManager;
//!
//! let manager = QueryManager::new();
//! let search = Arc::new(SearchComponent::new());
//! manager.add_component(Arc::new(PagingComponent::new(10, 100)));
//! manager.add_component(search.clone());
//!
//! search.set_filter("status", "open");
//! let query = manager.setup_query();
//! assert_eq!(query.get_u64("limit"), Some(10));
//! assert_eq!(query.get_str("status"), Some("open"));
//! ```

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use crate::components::QueryComponent;
use crate::events::EventDispatcher;
use crate::query::Query;

struct Inner {
    components: RwLock<Vec<Arc<dyn QueryComponent>>>,
    query_changed: EventDispatcher<Query>,
}

impl Inner {
    fn compose(&self) -> Query {
        let components = self
            .components
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        let mut query = Query::new();
        for component in &components {
            component.setup_query(&mut query);
        }
        query
    }
}

/// Ordered set of query components
///
/// Cloning yields another handle to the same set.
#[derive(Clone)]
pub struct QueryManager {
    inner: Arc<Inner>,
}

impl QueryManager {
    /// Create a manager with no components
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                components: RwLock::new(Vec::new()),
                query_changed: EventDispatcher::new(),
            }),
        }
    }

    /// Register `component` and forward its change events.
    ///
    /// Each change re-fires [`query_changed`](Self::query_changed) with a
    /// freshly composed query.
    pub fn add_component(&self, component: Arc<dyn QueryComponent>) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        component.changed().subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                let query = inner.compose();
                tracing::trace!(keys = query.len(), "Query component changed");
                inner.query_changed.notify(&query);
            }
        });

        self.inner
            .components
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(component);
    }

    /// Fold every component into a fresh query, in registration order
    #[must_use]
    pub fn setup_query(&self) -> Query {
        self.inner.compose()
    }

    /// Aggregated "reload requested" notification
    #[must_use]
    pub fn query_changed(&self) -> &EventDispatcher<Query> {
        &self.inner.query_changed
    }

    /// Number of registered components
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.inner
            .components
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl Default for QueryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryManager")
            .field("components", &self.component_count())
            .finish()
    }
}

//! Hypermedia collection and item contracts
//!
//! A [`CollectionResult`] is one page of a listing that carries its own
//! navigation links (`can_next` / `next`, ...) and optional capabilities
//! (add, schema documents). A [`CrudItem`] is one row, again with optional
//! capabilities (update, delete, refresh).
//!
//! Capabilities form a closed set. Each is a trait exposed through an
//! `as_*` accessor that defaults to `None`, and each has an `is_*`
//! predicate. A missing capability means "operation unsupported", never an
//! error.
//!
//! An action whose `can_*` predicate is false must not be invoked; callers
//! go through [`CollectionResult::follow`], which checks the predicate first.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CrudError, NavLink, Result};
use crate::query::{Query, LIMIT, OFFSET};

/// Shared handle to an item
pub type ItemRef = Arc<dyn CrudItem>;

/// Shared handle to a loaded page
pub type PageRef = Arc<dyn CollectionResult>;

/// Item that accepts edits
#[async_trait]
pub trait Updatable: Send + Sync {
    /// Persist new data for this item
    async fn update(&self, data: Value) -> Result<()>;
}

/// Item that can be removed
#[async_trait]
pub trait Deletable: Send + Sync {
    /// Delete this item
    async fn delete(&self) -> Result<()>;
}

/// Item that can re-fetch itself before being edited
#[async_trait]
pub trait Refreshable: Send + Sync {
    /// Load the latest version of this item
    async fn refresh(&self) -> Result<ItemRef>;
}

/// One row of a collection
pub trait CrudItem: fmt::Debug + Send + Sync {
    /// The item's data as shown to editors
    fn data(&self) -> Value;

    /// Update capability
    fn as_updatable(&self) -> Option<&dyn Updatable> {
        None
    }

    /// Delete capability
    fn as_deletable(&self) -> Option<&dyn Deletable> {
        None
    }

    /// Refresh capability
    fn as_refreshable(&self) -> Option<&dyn Refreshable> {
        None
    }
}

/// Whether `item` accepts updates
#[must_use]
pub fn is_updatable(item: &dyn CrudItem) -> bool {
    item.as_updatable().is_some()
}

/// Whether `item` can be deleted
#[must_use]
pub fn is_deletable(item: &dyn CrudItem) -> bool {
    item.as_deletable().is_some()
}

/// Whether `item` can refresh itself
#[must_use]
pub fn is_refreshable(item: &dyn CrudItem) -> bool {
    item.as_refreshable().is_some()
}

/// Collection that accepts new items
#[async_trait]
pub trait Addable: Send + Sync {
    /// JSON schema for the add form
    async fn add_item_schema(&self) -> Result<Value>;

    /// Create a new item
    async fn add(&self, data: Value) -> Result<ItemRef>;
}

/// Collection that documents the shape of its items for editing
#[async_trait]
pub trait UpdateDocs: Send + Sync {
    /// JSON schema for the edit form
    async fn item_schema(&self) -> Result<Value>;
}

/// Collection that documents its search parameters
#[async_trait]
pub trait ListDocs: Send + Sync {
    /// JSON schema for the search form
    async fn search_schema(&self) -> Result<Value>;
}

/// Collection that documents how to display its items
#[async_trait]
pub trait GetDocs: Send + Sync {
    /// JSON schema for the listing columns
    async fn listing_schema(&self) -> Result<Value>;
}

/// One page of a hypermedia listing
#[async_trait]
pub trait CollectionResult: fmt::Debug + Send + Sync {
    /// Items on this page
    fn items(&self) -> &[ItemRef];

    /// Zero-based page index
    fn offset(&self) -> u64;

    /// Items per page
    fn limit(&self) -> u64;

    /// Total number of items across all pages
    fn total(&self) -> u64;

    /// Query that restores this page when replayed from history
    fn history_payload(&self) -> Query {
        Query::new()
            .with(OFFSET, self.offset())
            .with(LIMIT, self.limit())
    }

    /// Whether the first-page link is offered
    fn can_first(&self) -> bool;
    /// Whether the previous-page link is offered
    fn can_previous(&self) -> bool;
    /// Whether the next-page link is offered
    fn can_next(&self) -> bool;
    /// Whether the last-page link is offered
    fn can_last(&self) -> bool;
    /// Whether the refresh link is offered
    fn can_refresh(&self) -> bool;

    /// Load the first page. Only valid when [`can_first`](Self::can_first) is true.
    async fn first(&self) -> Result<PageRef>;
    /// Load the previous page. Only valid when [`can_previous`](Self::can_previous) is true.
    async fn previous(&self) -> Result<PageRef>;
    /// Load the next page. Only valid when [`can_next`](Self::can_next) is true.
    async fn next(&self) -> Result<PageRef>;
    /// Load the last page. Only valid when [`can_last`](Self::can_last) is true.
    async fn last(&self) -> Result<PageRef>;
    /// Reload this page. Only valid when [`can_refresh`](Self::can_refresh) is true.
    async fn refresh(&self) -> Result<PageRef>;

    /// Add capability
    fn as_addable(&self) -> Option<&dyn Addable> {
        None
    }

    /// Item schema capability
    fn as_update_docs(&self) -> Option<&dyn UpdateDocs> {
        None
    }

    /// Search schema capability
    fn as_list_docs(&self) -> Option<&dyn ListDocs> {
        None
    }

    /// Listing schema capability
    fn as_get_docs(&self) -> Option<&dyn GetDocs> {
        None
    }

    /// Whether `link` is currently offered
    fn can(&self, link: NavLink) -> bool {
        match link {
            NavLink::First => self.can_first(),
            NavLink::Previous => self.can_previous(),
            NavLink::Next => self.can_next(),
            NavLink::Last => self.can_last(),
            NavLink::Refresh => self.can_refresh(),
        }
    }

    /// Follow `link` if it is offered
    async fn follow(&self, link: NavLink) -> Result<PageRef> {
        if !self.can(link) {
            return Err(CrudError::NavigationUnavailable { link });
        }
        match link {
            NavLink::First => self.first().await,
            NavLink::Previous => self.previous().await,
            NavLink::Next => self.next().await,
            NavLink::Last => self.last().await,
            NavLink::Refresh => self.refresh().await,
        }
    }
}

/// Whether `page` accepts new items
#[must_use]
pub fn is_addable(page: &dyn CollectionResult) -> bool {
    page.as_addable().is_some()
}

/// Whether `page` documents its item schema
#[must_use]
pub fn is_update_docs(page: &dyn CollectionResult) -> bool {
    page.as_update_docs().is_some()
}

/// Whether `page` documents its search schema
#[must_use]
pub fn is_list_docs(page: &dyn CollectionResult) -> bool {
    page.as_list_docs().is_some()
}

/// Whether `page` documents its listing schema
#[must_use]
pub fn is_get_docs(page: &dyn CollectionResult) -> bool {
    page.as_get_docs().is_some()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug)]
    struct PlainItem;

    impl CrudItem for PlainItem {
        fn data(&self) -> Value {
            json!({"id": "1"})
        }
    }

    #[derive(Debug)]
    struct LonePage;

    #[async_trait]
    impl CollectionResult for LonePage {
        fn items(&self) -> &[ItemRef] {
            &[]
        }
        fn offset(&self) -> u64 {
            3
        }
        fn limit(&self) -> u64 {
            10
        }
        fn total(&self) -> u64 {
            0
        }
        fn can_first(&self) -> bool {
            false
        }
        fn can_previous(&self) -> bool {
            false
        }
        fn can_next(&self) -> bool {
            false
        }
        fn can_last(&self) -> bool {
            false
        }
        fn can_refresh(&self) -> bool {
            false
        }
        async fn first(&self) -> Result<PageRef> {
            unreachable!("first is never offered")
        }
        async fn previous(&self) -> Result<PageRef> {
            unreachable!("previous is never offered")
        }
        async fn next(&self) -> Result<PageRef> {
            unreachable!("next is never offered")
        }
        async fn last(&self) -> Result<PageRef> {
            unreachable!("last is never offered")
        }
        async fn refresh(&self) -> Result<PageRef> {
            unreachable!("refresh is never offered")
        }
    }

    #[test]
    fn test_capabilities_default_to_absent() {
        let item = PlainItem;
        assert!(!is_updatable(&item));
        assert!(!is_deletable(&item));
        assert!(!is_refreshable(&item));

        let page = LonePage;
        assert!(!is_addable(&page));
        assert!(!is_update_docs(&page));
        assert!(!is_list_docs(&page));
        assert!(!is_get_docs(&page));
    }

    #[test]
    fn test_default_history_payload() {
        let payload = LonePage.history_payload();
        assert_eq!(payload.get_u64(OFFSET), Some(3));
        assert_eq!(payload.get_u64(LIMIT), Some(10));
    }

    #[tokio::test]
    async fn test_follow_checks_predicate_before_acting() {
        let err = LonePage.follow(NavLink::Next).await.unwrap_err();
        assert!(matches!(
            err,
            CrudError::NavigationUnavailable {
                link: NavLink::Next
            }
        ));
    }
}

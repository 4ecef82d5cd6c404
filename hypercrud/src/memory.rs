//! In-memory hypermedia collection
//!
//! [`MemoryStore`] holds JSON records (objects with an `id` field) and serves
//! them as hypermedia pages. Every page is a snapshot: its links and
//! capabilities reflect the store's permissions at the time it was listed.
//!
//! Query handling:
//! - `offset` / `limit` select the page (zero-based page index),
//! - `orderBy` / `order` sort the records,
//! - every other key is an equality filter.
//!
//! # Example
//!
//! ```rust
//! use hypercrud::collection::CollectionResult;
//! use hypercrud::memory::{MemoryStore, Permissions};
//! use hypercrud::query::Query;
//! use hypercrud::source::{PageSource, PageSourceOptions};
//! use serde_json::json;
//!
//! let store = MemoryStore::new(PageSourceOptions::new("people"), 2)
//!     .with_permissions(Permissions::all());
//! store.insert(json!({"id": "1", "name": "Ann"}));
//! store.insert(json!({"id": "2", "name": "Bob"}));
//! store.insert(json!({"id": "3", "name": "Cy"}));
//!
//! let page = futures::executor::block_on(store.list(Query::new())).unwrap();
//! assert_eq!(page.items().len(), 2);
//! assert!(page.can_next());
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::collection::{
    Addable, CollectionResult, CrudItem, Deletable, GetDocs, ItemRef, ListDocs, PageRef,
    Refreshable, UpdateDocs, Updatable,
};
use crate::error::{CrudError, Result};
use crate::page_numbers::total_pages;
use crate::query::{Query, SortOrder, LIMIT, OFFSET, ORDER, ORDER_BY};
use crate::source::{PageSource, PageSourceOptions};

/// Failure raised by the in-memory store itself
#[derive(Debug, Error)]
#[error("memory store: {0}")]
pub struct StoreError(pub String);

/// Operations the store offers on the pages and items it returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    /// Listing is permitted
    pub list: bool,
    /// Pages are add-capable
    pub add: bool,
    /// Items are update-capable
    pub update: bool,
    /// Items are delete-capable
    pub delete: bool,
    /// Items can refresh themselves
    pub refresh: bool,
}

impl Permissions {
    /// List only
    #[must_use]
    pub const fn read_only() -> Self {
        Self {
            list: true,
            add: false,
            update: false,
            delete: false,
            refresh: false,
        }
    }

    /// Everything permitted
    #[must_use]
    pub const fn all() -> Self {
        Self {
            list: true,
            add: true,
            update: true,
            delete: true,
            refresh: true,
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::read_only()
    }
}

/// JSON schema documents published by the store's pages
#[derive(Debug, Clone, Default)]
pub struct Schemas {
    /// Edit form schema
    pub item: Option<Value>,
    /// Add form schema
    pub add_item: Option<Value>,
    /// Search form schema
    pub search: Option<Value>,
    /// Listing columns schema
    pub listing: Option<Value>,
}

struct StoreInner {
    records: RwLock<Vec<Value>>,
    permissions: RwLock<Permissions>,
    schemas: RwLock<Schemas>,
    next_id: AtomicU64,
    list_calls: AtomicUsize,
    fail_next: Mutex<Option<String>>,
    default_limit: u64,
}

impl StoreInner {
    fn list_now(self: &Arc<Self>, query: &Query) -> Result<PageRef> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(CrudError::upstream(StoreError(message)));
        }

        let permissions = *read(&self.permissions);
        if !permissions.list {
            return Err(CrudError::ListingNotPermitted);
        }

        let mut matching: Vec<Value> = read(&self.records)
            .iter()
            .filter(|record| matches_filters(record, query))
            .cloned()
            .collect();

        if let Some(column) = query.get_str(ORDER_BY) {
            let order = query
                .get_str(ORDER)
                .and_then(SortOrder::parse)
                .unwrap_or_default();
            matching.sort_by(|a, b| {
                let ordering = compare_values(&a[column], &b[column]);
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        let limit = query.get_u64(LIMIT).unwrap_or(self.default_limit).max(1);
        let offset = query.get_u64(OFFSET).unwrap_or(0);
        let total = matching.len() as u64;

        let start = usize::try_from(offset.saturating_mul(limit)).unwrap_or(usize::MAX);
        let items: Vec<ItemRef> = matching
            .into_iter()
            .skip(start)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|data| {
                Arc::new(MemoryItem {
                    data,
                    store: self.clone(),
                    permissions,
                }) as ItemRef
            })
            .collect();

        let mut page_query = query.clone();
        page_query.set(OFFSET, offset);
        page_query.set(LIMIT, limit);

        Ok(Arc::new(MemoryPage {
            items,
            offset,
            limit,
            total,
            query: page_query,
            permissions,
            schemas: read(&self.schemas).clone(),
            store: self.clone(),
        }))
    }

    fn find(&self, id: &str) -> Option<Value> {
        read(&self.records)
            .iter()
            .find(|record| record_id(record).as_deref() == Some(id))
            .cloned()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), other) | (other, Value::String(s)) if !other.is_string() => {
            *s == other.to_string()
        }
        _ => a == b,
    }
}

fn matches_filters(record: &Value, query: &Query) -> bool {
    query
        .iter()
        .filter(|(key, _)| ![OFFSET, LIMIT, ORDER_BY, ORDER].contains(&key.as_str()))
        .all(|(key, expected)| {
            record
                .get(key)
                .is_some_and(|actual| loosely_equal(actual, expected))
        })
}

fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Null, Value::Null) => CmpOrdering::Equal,
        (Value::Null, _) => CmpOrdering::Less,
        (_, Value::Null) => CmpOrdering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Shared in-memory record set serving hypermedia pages
///
/// Cloning yields another handle to the same records.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
    options: PageSourceOptions,
}

impl MemoryStore {
    /// Empty, read-only store serving `default_limit` items per page
    #[must_use]
    pub fn new(options: PageSourceOptions, default_limit: u64) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                records: RwLock::new(Vec::new()),
                permissions: RwLock::new(Permissions::default()),
                schemas: RwLock::new(Schemas::default()),
                next_id: AtomicU64::new(1),
                list_calls: AtomicUsize::new(0),
                fail_next: Mutex::new(None),
                default_limit: default_limit.max(1),
            }),
            options,
        }
    }

    /// Set the permissions for pages listed from now on
    #[must_use]
    pub fn with_permissions(self, permissions: Permissions) -> Self {
        self.set_permissions(permissions);
        self
    }

    /// Set the schema documents for pages listed from now on
    #[must_use]
    pub fn with_schemas(self, schemas: Schemas) -> Self {
        *write(&self.inner.schemas) = schemas;
        self
    }

    /// Change permissions for pages listed from now on
    pub fn set_permissions(&self, permissions: Permissions) {
        *write(&self.inner.permissions) = permissions;
    }

    /// Add a record, assigning an `id` if it has none. Returns the id.
    pub fn insert(&self, mut record: Value) -> String {
        let id = match record_id(&record) {
            Some(id) => id,
            None => {
                let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst).to_string();
                if let Value::Object(map) = &mut record {
                    map.insert("id".to_string(), Value::String(id.clone()));
                }
                id
            }
        };
        write(&self.inner.records).push(record);
        id
    }

    /// Current data of record `id`
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Value> {
        self.inner.find(id)
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.inner.records).len()
    }

    /// Whether the store has no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.inner.records).is_empty()
    }

    /// Number of list requests served so far, including failed ones
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.inner.list_calls.load(Ordering::SeqCst)
    }

    /// Make the next list request fail with an upstream error
    pub fn fail_next_list(&self, message: impl Into<String>) {
        *self
            .inner
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.options.unique_name)
            .field("records", &self.len())
            .finish()
    }
}

#[async_trait]
impl PageSource for MemoryStore {
    async fn list(&self, query: Query) -> Result<PageRef> {
        self.inner.list_now(&query)
    }

    fn can_list(&self) -> bool {
        read(&self.inner.permissions).list
    }

    fn delete_prompt(&self, item: &dyn CrudItem) -> String {
        match self.item_id(item) {
            Some(id) => format!("Delete item {id}?"),
            None => "Delete this item?".to_string(),
        }
    }

    fn item_id(&self, item: &dyn CrudItem) -> Option<String> {
        record_id(&item.data())
    }

    fn create_id_query(&self, id: &str) -> Option<Query> {
        Some(Query::new().with("id", id))
    }

    fn options(&self) -> &PageSourceOptions {
        &self.options
    }
}

/// One record served by a [`MemoryStore`]
pub struct MemoryItem {
    data: Value,
    store: Arc<StoreInner>,
    permissions: Permissions,
}

impl fmt::Debug for MemoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryItem").field("data", &self.data).finish()
    }
}

impl MemoryItem {
    fn id(&self) -> Result<String> {
        record_id(&self.data).ok_or_else(|| CrudError::upstream(StoreError("record has no id".into())))
    }
}

impl CrudItem for MemoryItem {
    fn data(&self) -> Value {
        self.data.clone()
    }

    fn as_updatable(&self) -> Option<&dyn Updatable> {
        self.permissions.update.then_some(self as &dyn Updatable)
    }

    fn as_deletable(&self) -> Option<&dyn Deletable> {
        self.permissions.delete.then_some(self as &dyn Deletable)
    }

    fn as_refreshable(&self) -> Option<&dyn Refreshable> {
        self.permissions.refresh.then_some(self as &dyn Refreshable)
    }
}

#[async_trait]
impl Updatable for MemoryItem {
    async fn update(&self, data: Value) -> Result<()> {
        let id = self.id()?;
        let mut records = write(&self.store.records);
        let record = records
            .iter_mut()
            .find(|record| record_id(record).as_deref() == Some(id.as_str()))
            .ok_or_else(|| CrudError::ItemNotFound { id: id.clone() })?;

        let mut next = data;
        if let Value::Object(map) = &mut next {
            map.insert("id".to_string(), Value::String(id));
        }
        *record = next;
        Ok(())
    }
}

#[async_trait]
impl Deletable for MemoryItem {
    async fn delete(&self) -> Result<()> {
        let id = self.id()?;
        let mut records = write(&self.store.records);
        let before = records.len();
        records.retain(|record| record_id(record).as_deref() != Some(id.as_str()));
        if records.len() == before {
            return Err(CrudError::ItemNotFound { id });
        }
        Ok(())
    }
}

#[async_trait]
impl Refreshable for MemoryItem {
    async fn refresh(&self) -> Result<ItemRef> {
        let id = self.id()?;
        let data = self
            .store
            .find(&id)
            .ok_or(CrudError::ItemNotFound { id })?;
        Ok(Arc::new(MemoryItem {
            data,
            store: self.store.clone(),
            permissions: *read(&self.store.permissions),
        }))
    }
}

/// One page served by a [`MemoryStore`]
pub struct MemoryPage {
    items: Vec<ItemRef>,
    offset: u64,
    limit: u64,
    total: u64,
    query: Query,
    permissions: Permissions,
    schemas: Schemas,
    store: Arc<StoreInner>,
}

impl fmt::Debug for MemoryPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPage")
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("total", &self.total)
            .field("items", &self.items.len())
            .finish()
    }
}

impl MemoryPage {
    fn last_offset(&self) -> u64 {
        total_pages(self.total, self.limit).saturating_sub(1)
    }

    fn at(&self, offset: u64) -> Result<PageRef> {
        let mut query = self.query.clone();
        query.set(OFFSET, offset);
        self.store.list_now(&query)
    }
}

#[async_trait]
impl CollectionResult for MemoryPage {
    fn items(&self) -> &[ItemRef] {
        &self.items
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn limit(&self) -> u64 {
        self.limit
    }

    fn total(&self) -> u64 {
        self.total
    }

    fn history_payload(&self) -> Query {
        self.query.clone()
    }

    fn can_first(&self) -> bool {
        self.offset > 0
    }

    fn can_previous(&self) -> bool {
        self.offset > 0
    }

    fn can_next(&self) -> bool {
        self.offset < self.last_offset()
    }

    fn can_last(&self) -> bool {
        self.offset < self.last_offset()
    }

    fn can_refresh(&self) -> bool {
        self.permissions.list
    }

    async fn first(&self) -> Result<PageRef> {
        self.at(0)
    }

    async fn previous(&self) -> Result<PageRef> {
        self.at(self.offset.saturating_sub(1))
    }

    async fn next(&self) -> Result<PageRef> {
        self.at(self.offset + 1)
    }

    async fn last(&self) -> Result<PageRef> {
        self.at(self.last_offset())
    }

    async fn refresh(&self) -> Result<PageRef> {
        self.at(self.offset)
    }

    fn as_addable(&self) -> Option<&dyn Addable> {
        self.permissions.add.then_some(self as &dyn Addable)
    }

    fn as_update_docs(&self) -> Option<&dyn UpdateDocs> {
        self.schemas.item.as_ref().map(|_| self as &dyn UpdateDocs)
    }

    fn as_list_docs(&self) -> Option<&dyn ListDocs> {
        self.schemas.search.as_ref().map(|_| self as &dyn ListDocs)
    }

    fn as_get_docs(&self) -> Option<&dyn GetDocs> {
        self.schemas.listing.as_ref().map(|_| self as &dyn GetDocs)
    }
}

#[async_trait]
impl Addable for MemoryPage {
    async fn add_item_schema(&self) -> Result<Value> {
        Ok(self
            .schemas
            .add_item
            .clone()
            .unwrap_or_else(|| json!({"type": "object"})))
    }

    async fn add(&self, data: Value) -> Result<ItemRef> {
        let mut record = data;
        let id = match record_id(&record) {
            Some(id) => id,
            None => {
                let id = self.store.next_id.fetch_add(1, Ordering::SeqCst).to_string();
                if let Value::Object(map) = &mut record {
                    map.insert("id".to_string(), Value::String(id.clone()));
                }
                id
            }
        };
        write(&self.store.records).push(record.clone());
        tracing::trace!(%id, "Record added to memory store");

        Ok(Arc::new(MemoryItem {
            data: record,
            store: self.store.clone(),
            permissions: self.permissions,
        }))
    }
}

#[async_trait]
impl UpdateDocs for MemoryPage {
    async fn item_schema(&self) -> Result<Value> {
        Ok(self.schemas.item.clone().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ListDocs for MemoryPage {
    async fn search_schema(&self) -> Result<Value> {
        Ok(self.schemas.search.clone().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl GetDocs for MemoryPage {
    async fn listing_schema(&self) -> Result<Value> {
        Ok(self.schemas.listing.clone().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{is_addable, is_deletable, is_updatable};
    use crate::error::NavLink;
    use crate::source::resolve_item;

    fn store_with(count: usize, limit: u64) -> MemoryStore {
        let store = MemoryStore::new(PageSourceOptions::new("people"), limit);
        for i in 0..count {
            store.insert(json!({"name": format!("person-{i:02}"), "age": i % 7}));
        }
        store
    }

    #[tokio::test]
    async fn test_first_page_links() {
        let store = store_with(25, 10);
        let page = store.list(Query::new()).await.unwrap();

        assert_eq!(page.items().len(), 10);
        assert_eq!(page.total(), 25);
        assert!(!page.can_first());
        assert!(!page.can_previous());
        assert!(page.can_next());
        assert!(page.can_last());
        assert!(page.can_refresh());
    }

    #[tokio::test]
    async fn test_walks_to_last_page() {
        let store = store_with(25, 10);
        let first = store.list(Query::new()).await.unwrap();
        let last = first.follow(NavLink::Last).await.unwrap();

        assert_eq!(last.offset(), 2);
        assert_eq!(last.items().len(), 5);
        assert!(!last.can_next());
        assert!(last.can_previous());

        let back = last.follow(NavLink::Previous).await.unwrap();
        assert_eq!(back.offset(), 1);
    }

    #[tokio::test]
    async fn test_filters_and_sorting_are_kept_across_links() {
        let store = store_with(21, 2);
        let query = Query::new()
            .with("age", 3)
            .with(ORDER_BY, "name")
            .with(ORDER, "desc");

        let page = store.list(query).await.unwrap();
        assert_eq!(page.total(), 3);
        assert_eq!(page.items()[0].data()["name"], "person-17");

        let next = page.follow(NavLink::Next).await.unwrap();
        assert_eq!(next.items().len(), 1);
        assert_eq!(next.items()[0].data()["name"], "person-03");
    }

    #[tokio::test]
    async fn test_read_only_pages_have_no_edit_capabilities() {
        let store = store_with(3, 10);
        let page = store.list(Query::new()).await.unwrap();
        assert!(!is_addable(page.as_ref()));
        assert!(!is_updatable(page.items()[0].as_ref()));
        assert!(!is_deletable(page.items()[0].as_ref()));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = store_with(3, 10).with_permissions(Permissions::all());
        let page = store.list(Query::new()).await.unwrap();
        let item = page.items()[0].clone();
        let id = store.item_id(item.as_ref()).unwrap();

        item.as_updatable()
            .unwrap()
            .update(json!({"name": "renamed"}))
            .await
            .unwrap();
        assert_eq!(store.get(&id).unwrap()["name"], "renamed");
        assert_eq!(store.get(&id).unwrap()["id"], id.as_str());

        item.as_deletable().unwrap().delete().await.unwrap();
        assert!(store.get(&id).is_none());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_item_by_id() {
        let store = store_with(5, 2);
        let item = resolve_item(&store, "4").await.unwrap();
        assert_eq!(item.data()["name"], "person-03");

        let err = resolve_item(&store, "99").await.unwrap_err();
        assert!(matches!(err, CrudError::ItemNotFound { id } if id == "99"));
    }

    #[tokio::test]
    async fn test_injected_failure_is_upstream() {
        let store = store_with(1, 10);
        store.fail_next_list("boom");
        let err = store.list(Query::new()).await.unwrap_err();
        assert!(err.is_upstream());
        assert!(store.list(Query::new()).await.is_ok());
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_listing_can_be_forbidden() {
        let store = store_with(1, 10).with_permissions(Permissions {
            list: false,
            ..Permissions::read_only()
        });
        assert!(!store.can_list());
        assert!(matches!(
            store.list(Query::new()).await.unwrap_err(),
            CrudError::ListingNotPermitted
        ));
    }

    #[tokio::test]
    async fn test_add_assigns_id() {
        let store = store_with(0, 10).with_permissions(Permissions::all());
        let page = store.list(Query::new()).await.unwrap();
        let added = page
            .as_addable()
            .unwrap()
            .add(json!({"name": "new"}))
            .await
            .unwrap();
        let id = store.item_id(added.as_ref()).unwrap();
        assert_eq!(store.get(&id).unwrap()["name"], "new");
    }
}

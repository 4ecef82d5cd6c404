//! Page sources: where listings come from

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collection::{CrudItem, ItemRef, PageRef};
use crate::error::{CrudError, Result};
use crate::query::Query;

/// Identity and history behaviour of a page source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSourceOptions {
    /// Key under which history entries for this source are stored
    pub unique_name: String,

    /// Seed the first query from the current history entry instead of the
    /// caller's query
    #[serde(default)]
    pub seed_query_from_history: bool,
}

impl PageSourceOptions {
    /// Options with a caller-supplied key
    #[must_use]
    pub fn new(unique_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            seed_query_from_history: false,
        }
    }

    /// Options with a freshly generated key
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("crudpage-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Enable or disable seeding the first query from history
    #[must_use]
    pub fn with_history_seed(mut self, seed: bool) -> Self {
        self.seed_query_from_history = seed;
        self
    }
}

/// Origin of hypermedia listings
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Load the page described by `query`
    async fn list(&self, query: Query) -> Result<PageRef>;

    /// Whether listing is permitted at all
    fn can_list(&self) -> bool;

    /// Confirmation text shown before deleting `item`
    fn delete_prompt(&self, item: &dyn CrudItem) -> String;

    /// Stable id of `item`, if it has one
    fn item_id(&self, _item: &dyn CrudItem) -> Option<String> {
        None
    }

    /// Query that lists exactly the item with `id`
    fn create_id_query(&self, _id: &str) -> Option<Query> {
        None
    }

    /// Identity and history behaviour
    fn options(&self) -> &PageSourceOptions;
}

/// Look an item up by id through `source`'s id query
pub async fn resolve_item(source: &dyn PageSource, id: &str) -> Result<ItemRef> {
    let not_found = || CrudError::ItemNotFound { id: id.to_string() };

    let query = source.create_id_query(id).ok_or_else(not_found)?;
    let page = source.list(query).await?;
    page.items().first().cloned().ok_or_else(not_found)
}

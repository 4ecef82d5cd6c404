//! The CRUD service contract and its hypermedia implementation
//!
//! [`CrudService`] is what a UI layer talks to: paging, editing and schema
//! discovery, plus the [`CrudEvents`] it raises. [`HypermediaCrudService`]
//! implements it by walking hypermedia collections returned by a
//! [`PageSource`](crate::source::PageSource).
//!
//! # Events
//!
//! | Event                  | Payload                | Raised when                                   |
//! |------------------------|------------------------|-----------------------------------------------|
//! | `data_loading`         | [`PendingPage`]        | a page load starts                            |
//! | `page_loaded`          | [`PageLoaded`]         | a page load result becomes the current page   |
//! | `show_item_editor`     | [`ItemEditorSession`]  | an item should be edited                      |
//! | `show_add_item_editor` | [`AddItemSession`]     | a new item should be entered                  |
//! | `close_item_editor`    | `()`                   | history navigation left the edit route        |
//! | `data_modified`        | [`Modification`]       | an add, update or delete succeeded            |
//! | `main_ui_shown`        | `()`                   | the plain listing is showing                  |
//!
//! Every page load raises `data_loading` before any I/O and resolves the
//! [`PendingPage`] exactly once.

mod hypermedia;
mod pending;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::collection::{CrudItem, ItemRef, PageRef};
use crate::error::Result;
use crate::events::EventDispatcher;
use crate::page_numbers::PageNumberState;
use crate::query::Query;

pub use hypermedia::{HypermediaCrudService, HypermediaCrudServiceBuilder, LoadState};
pub use pending::{PageOutcome, PendingPage};

/// Kind of change reported through `data_modified`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modification {
    /// An item was added
    Added,
    /// An item was updated
    Updated,
    /// An item was deleted
    Deleted,
}

/// Payload of `page_loaded`
#[derive(Debug, Clone)]
pub struct PageLoaded {
    /// The page that is now current
    pub page: PageRef,
    /// Pagination facts derived from it
    pub numbers: PageNumberState,
}

type SaveCallback = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type ClosedCallback = Arc<dyn Fn() + Send + Sync>;

/// An open edit dialog for one item
#[derive(Clone)]
pub struct ItemEditorSession {
    item: ItemRef,
    data: Value,
    on_save: SaveCallback,
    on_closed: ClosedCallback,
}

impl ItemEditorSession {
    /// Create a session with its completion and close callbacks
    pub fn new(
        item: ItemRef,
        data: Value,
        on_save: impl Fn(Value) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
        on_closed: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            item,
            data,
            on_save: Arc::new(on_save),
            on_closed: Arc::new(on_closed),
        }
    }

    /// The item being edited
    #[must_use]
    pub fn item(&self) -> &ItemRef {
        &self.item
    }

    /// Data to populate the form with
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Save edited data
    pub async fn save(&self, data: Value) -> Result<()> {
        (self.on_save)(data).await
    }

    /// Report that the dialog closed, saved or not
    pub fn close(&self) {
        (self.on_closed)();
    }
}

impl fmt::Debug for ItemEditorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemEditorSession")
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// An open dialog for entering a new item
#[derive(Clone)]
pub struct AddItemSession {
    default_item: Value,
    on_save: SaveCallback,
}

impl AddItemSession {
    /// Create a session with its completion callback
    pub fn new(
        default_item: Value,
        on_save: impl Fn(Value) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            default_item,
            on_save: Arc::new(on_save),
        }
    }

    /// Initial form contents
    #[must_use]
    pub fn default_item(&self) -> &Value {
        &self.default_item
    }

    /// Create the item
    pub async fn save(&self, data: Value) -> Result<()> {
        (self.on_save)(data).await
    }
}

impl fmt::Debug for AddItemSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddItemSession")
            .field("default_item", &self.default_item)
            .finish_non_exhaustive()
    }
}

/// Notification channels raised by a [`CrudService`]
#[derive(Debug, Default)]
pub struct CrudEvents {
    /// An item should be shown in the editor
    pub show_item_editor: EventDispatcher<ItemEditorSession>,
    /// The add dialog should be shown
    pub show_add_item_editor: EventDispatcher<AddItemSession>,
    /// Any open editor should close
    pub close_item_editor: EventDispatcher<()>,
    /// A page load started
    pub data_loading: EventDispatcher<PendingPage>,
    /// A new current page is available
    pub page_loaded: EventDispatcher<PageLoaded>,
    /// Data changed on the server
    pub data_modified: EventDispatcher<Modification>,
    /// The plain listing is showing
    pub main_ui_shown: EventDispatcher<()>,
}

/// Page-agnostic operations offered to a UI layer
#[async_trait]
pub trait CrudService: Send + Sync {
    /// Notification channels
    fn events(&self) -> &CrudEvents;

    /// Open the add dialog, pre-filled with `item` or an empty object
    async fn add(&self, item: Option<Value>);

    /// Open the editor for `item`
    async fn edit(&self, item: ItemRef) -> Result<()>;

    /// Delete `item` if it is delete-capable
    async fn del(&self, item: ItemRef) -> Result<()>;

    /// Confirmation text to show before deleting `item`
    fn delete_prompt(&self, item: &dyn CrudItem) -> String;

    /// Load the page described by `query`
    async fn get_page(&self, query: Query) -> Result<PageRef>;

    /// Follow the current page's first link
    async fn first_page(&self) -> Result<PageRef>;

    /// Follow the current page's last link
    async fn last_page(&self) -> Result<PageRef>;

    /// Follow the current page's next link
    async fn next_page(&self) -> Result<PageRef>;

    /// Follow the current page's previous link
    async fn previous_page(&self) -> Result<PageRef>;

    /// Reload the current page
    async fn refresh_page(&self) -> Result<PageRef>;

    /// Edit form schema, once the first page has loaded
    async fn get_item_schema(&self) -> Result<Option<Value>>;

    /// Add form schema, once the first page has loaded
    async fn get_add_item_schema(&self) -> Result<Option<Value>>;

    /// Listing column schema, once the first page has loaded
    async fn get_listing_schema(&self) -> Result<Option<Value>>;

    /// Search form schema, once the first page has loaded
    async fn get_search_schema(&self) -> Result<Option<Value>>;

    /// Last loaded page
    fn current_page(&self) -> Option<PageRef>;

    /// Pagination facts of the last loaded page
    fn page_numbers(&self) -> Option<PageNumberState>;
}

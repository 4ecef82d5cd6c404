//! # hypercrud
//!
//! Query composition and a hypermedia-driven paging/edit state machine for
//! CRUD listings. The crate sits between a UI layer and a backend that
//! returns self-describing pages: pages say which links (first, previous,
//! next, last, refresh) and which operations (add, update, delete) they
//! support, and the service only ever offers what the current page offers.
//!
//! ## Features
//!
//! - **Query composition**: independent [`QueryComponent`](components::QueryComponent)s
//!   (paging, sort, search) merged by a [`QueryManager`](query_manager::QueryManager)
//! - **Hypermedia navigation**: link-driven paging with capability checks
//! - **Edit workflow**: editor and add dialogs as sessions with save/close callbacks
//! - **Deep links**: history integration with `/Edit/<id>` routes and pop-state resync
//! - **Initial-load gate**: schema queries wait for the first successful page
//! - **Configuration**: figment-based, from file, XDG and environment
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use hypercrud::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = CrudConfig::load()?;
//!     let _ = init_tracing(&config);
//!
//!     let store = MemoryStore::new(PageSourceOptions::new("people"), config.paging.default_limit)
//!         .with_permissions(Permissions::all());
//!     store.insert(json!({"name": "Ann"}));
//!
//!     let paging = Arc::new(PagingComponent::from_config(&config));
//!     let manager = QueryManager::new();
//!     manager.add_component(paging.clone());
//!
//!     let service = HypermediaCrudService::builder(Arc::new(store))
//!         .history(Arc::new(MemoryHistory::new()))
//!         .config(config)
//!         .paging(paging.clone())
//!         .build();
//!     service.bind_query_manager(&manager);
//!
//!     service.events().page_loaded.subscribe(|loaded| {
//!         println!(
//!             "items {}-{} of {}",
//!             loaded.numbers.item_start, loaded.numbers.item_end, loaded.numbers.total
//!         );
//!     });
//!
//!     service.get_page(manager.setup_query()).await?;
//!     Ok(())
//! }
//! ```

pub mod collection;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod memory;
pub mod page_numbers;
pub mod query;
pub mod query_manager;
pub mod service;
pub mod source;

#[cfg(feature = "observability")]
pub mod observability;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::collection::{
        is_addable, is_deletable, is_get_docs, is_list_docs, is_refreshable, is_update_docs,
        is_updatable, Addable, CollectionResult, CrudItem, Deletable, GetDocs, ItemRef, ListDocs,
        PageRef, Refreshable, UpdateDocs, Updatable,
    };
    pub use crate::components::{PagingComponent, QueryComponent, SearchComponent, SortComponent};
    pub use crate::config::{CrudConfig, HistoryConfig, LoggingConfig, PagingConfig, SchemaConfig};
    pub use crate::error::{CrudError, NavLink, Result};
    pub use crate::events::{EventDispatcher, SubscriptionId};
    pub use crate::history::{
        HistoryManager, HistoryState, MemoryHistory, NullHistory, PopStateHandler,
    };
    pub use crate::memory::{MemoryStore, Permissions, Schemas};
    pub use crate::page_numbers::PageNumberState;
    pub use crate::query::{Query, SortOrder};
    pub use crate::query_manager::QueryManager;
    pub use crate::service::{
        AddItemSession, CrudEvents, CrudService, HypermediaCrudService, ItemEditorSession,
        LoadState, Modification, PageLoaded, PendingPage,
    };
    pub use crate::source::{PageSource, PageSourceOptions};

    #[cfg(feature = "observability")]
    pub use crate::observability::init_tracing;
}

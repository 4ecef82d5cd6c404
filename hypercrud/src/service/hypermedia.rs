//! CRUD service backed by hypermedia collections
//!
//! State transitions:
//!
//! ```text
//! Uninitialized ──get_page──▶ Loading ──ok──▶ Loaded ──navigate──▶ Loading ──▶ …
//!                                                 │
//!                                              edit/add
//!                                                 ▼
//!                                              Editing ──save/close──▶ Loaded
//! ```
//!
//! Every load carries a request number. A result only becomes the current
//! page if no newer request has already been applied; older results still
//! resolve their own [`PendingPage`].
//!
//! The initial-load gate opens with the first *successful* load. Schema
//! queries wait on it, bounded by `schema.wait_timeout_ms` when configured.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::Instant;

use super::pending::pending_page;
use super::{AddItemSession, CrudEvents, CrudService, ItemEditorSession, Modification, PageLoaded};
use crate::collection::{CrudItem, ItemRef, PageRef};
use crate::components::PagingComponent;
use crate::config::CrudConfig;
use crate::error::{CrudError, NavLink, Result};
use crate::events::SubscriptionId;
use crate::history::{edit_path, parse_edit_route, HistoryManager, HistoryState, NullHistory};
use crate::page_numbers::PageNumberState;
use crate::query::Query;
use crate::query_manager::QueryManager;
use crate::source::{resolve_item, PageSource};

/// Coarse load state of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing loaded and nothing in flight
    Uninitialized,
    /// At least one load is in flight
    Loading,
    /// A page is loaded and nothing is in flight
    Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryWrite {
    Skip,
    Push,
}

#[derive(Default)]
struct PageState {
    current: Option<PageRef>,
    numbers: Option<PageNumberState>,
    applied_seq: u64,
}

struct Inner {
    source: Arc<dyn PageSource>,
    history: Arc<dyn HistoryManager>,
    config: CrudConfig,
    events: CrudEvents,
    page: RwLock<PageState>,
    editing: Mutex<Option<ItemRef>>,
    paging: Option<Arc<PagingComponent>>,
    initial_load: AtomicBool,
    history_seed_pending: AtomicBool,
    gate: watch::Sender<Option<PageRef>>,
    allow_close_history: AtomicBool,
    next_seq: AtomicU64,
    in_flight: AtomicUsize,
}

/// Restores `allow_close_history` when dropped
struct SuppressCloseHistory<'a>(&'a AtomicBool);

impl<'a> SuppressCloseHistory<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(false, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for SuppressCloseHistory<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Decrements the in-flight counter when dropped
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// [`CrudService`] that walks hypermedia collections
///
/// Cloning yields another handle to the same service.
///
/// # Example
///
/// ```rust,ignore
/// let service = HypermediaCrudService::builder(Arc::new(store))
///     .history(Arc::new(MemoryHistory::new()))
///     .config(CrudConfig::load()?)
///     .build();
///
/// service.events().page_loaded.subscribe(|loaded| {
///     println!("page {} of {}", loaded.numbers.current_page, loaded.numbers.total_pages);
/// });
/// service.get_page(Query::new()).await?;
/// ```
#[derive(Clone)]
pub struct HypermediaCrudService {
    inner: Arc<Inner>,
}

/// Builder for [`HypermediaCrudService`]
pub struct HypermediaCrudServiceBuilder {
    source: Arc<dyn PageSource>,
    history: Option<Arc<dyn HistoryManager>>,
    config: Option<CrudConfig>,
    paging: Option<Arc<PagingComponent>>,
}

impl HypermediaCrudServiceBuilder {
    /// Use `history` for deep links. Defaults to [`NullHistory`].
    #[must_use]
    pub fn history(mut self, history: Arc<dyn HistoryManager>) -> Self {
        self.history = Some(history);
        self
    }

    /// Set the configuration. Defaults to `CrudConfig::default()`.
    #[must_use]
    pub fn config(mut self, config: CrudConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Keep `paging` in step with every loaded page
    #[must_use]
    pub fn paging(mut self, paging: Arc<PagingComponent>) -> Self {
        self.paging = Some(paging);
        self
    }

    /// Build the service and register its pop-state handler
    #[must_use]
    pub fn build(self) -> HypermediaCrudService {
        let (gate, _) = watch::channel(None);
        let inner = Arc::new(Inner {
            source: self.source,
            history: self.history.unwrap_or_else(|| Arc::new(NullHistory)),
            config: self.config.unwrap_or_default(),
            events: CrudEvents::default(),
            page: RwLock::new(PageState::default()),
            editing: Mutex::new(None),
            paging: self.paging,
            initial_load: AtomicBool::new(true),
            history_seed_pending: AtomicBool::new(true),
            gate,
            allow_close_history: AtomicBool::new(true),
            next_seq: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        });

        let weak = Arc::downgrade(&inner);
        let key = inner.source.options().unique_name.clone();
        inner.history.register_handler(
            &key,
            Arc::new(move |state: HistoryState| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        HypermediaCrudService { inner }.on_pop_state(state).await;
                    }
                }
                .boxed()
            }),
        );

        tracing::debug!(source = %key, "Hypermedia CRUD service created");
        HypermediaCrudService { inner }
    }
}

impl HypermediaCrudService {
    /// Start building a service over `source`
    #[must_use]
    pub fn builder(source: Arc<dyn PageSource>) -> HypermediaCrudServiceBuilder {
        HypermediaCrudServiceBuilder {
            source,
            history: None,
            config: None,
            paging: None,
        }
    }

    /// Service over `source` with no history integration and default config
    #[must_use]
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self::builder(source).build()
    }

    /// Current load state
    #[must_use]
    pub fn load_state(&self) -> LoadState {
        if self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            LoadState::Loading
        } else if self.read_page().current.is_some() {
            LoadState::Loaded
        } else {
            LoadState::Uninitialized
        }
    }

    /// Whether an editor session is open
    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.lock_editing().is_some()
    }

    /// Whether the first successful load is still outstanding
    #[must_use]
    pub fn is_initial_load(&self) -> bool {
        self.inner.initial_load.load(Ordering::SeqCst)
    }

    /// Reload whenever `manager` reports a query change.
    ///
    /// Reloads are spawned on the current tokio runtime.
    pub fn bind_query_manager(&self, manager: &QueryManager) -> SubscriptionId {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        manager.query_changed().subscribe(move |query| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let service = HypermediaCrudService { inner };
            let query = query.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = service.get_page(query).await {
                            tracing::warn!(error = %e, "Reload after query change failed");
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!("Query changed outside a tokio runtime; reload skipped");
                }
            }
        })
    }

    /// React to back/forward navigation
    pub async fn on_pop_state(&self, state: HistoryState) {
        let edit_id = state
            .in_page_path
            .as_deref()
            .and_then(|path| parse_edit_route(path, &self.inner.config.history.edit_segment));

        if let Some(id) = edit_id {
            tracing::debug!(source = %self.key(), %id, "Pop-state into edit route");
            if let Err(e) = self.edit_by_id(&id).await {
                tracing::warn!(source = %self.key(), %id, error = %e, "Could not reopen editor from history");
            }
            return;
        }

        tracing::debug!(source = %self.key(), "Pop-state into listing");
        if let Err(e) = self.load_query(state.query, HistoryWrite::Skip).await {
            tracing::warn!(source = %self.key(), error = %e, "Listing reload from history failed");
        }

        let was_editing = self.is_editing();
        {
            let _suppress = SuppressCloseHistory::new(&self.inner.allow_close_history);
            self.inner.events.close_item_editor.notify(&());
        }
        // A closed editor has already announced the listing
        if !was_editing || self.is_editing() {
            self.inner.events.main_ui_shown.notify(&());
        }
    }

    fn key(&self) -> &str {
        &self.inner.source.options().unique_name
    }

    fn read_page(&self) -> std::sync::RwLockReadGuard<'_, PageState> {
        self.inner.page.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_editing(&self) -> std::sync::MutexGuard<'_, Option<ItemRef>> {
        self.inner.editing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listing_payload(&self) -> Query {
        self.read_page()
            .current
            .as_ref()
            .map(|page| page.history_payload())
            .unwrap_or_default()
    }

    /// Announce a load, run it, apply its result and resolve the placeholder
    async fn run_load<F>(&self, load: F, history: HistoryWrite) -> Result<PageRef>
    where
        F: Future<Output = Result<PageRef>> + Send,
    {
        let (resolver, pending) = pending_page();
        self.inner.events.data_loading.notify(&pending);

        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = {
            let _in_flight = InFlight::new(&self.inner.in_flight);
            load.await
        };

        match &outcome {
            Ok(page) => self.apply(seq, page, history),
            Err(e) if e.is_precondition() => {
                tracing::debug!(source = %self.key(), error = %e, "Navigation refused");
            }
            Err(e) => {
                tracing::warn!(source = %self.key(), error = %e, "Page load failed");
            }
        }

        resolver.resolve(outcome.clone());
        outcome
    }

    fn apply(&self, seq: u64, page: &PageRef, history: HistoryWrite) {
        let numbers = PageNumberState::from_result(page.as_ref());
        {
            let mut state = self.inner.page.write().unwrap_or_else(PoisonError::into_inner);
            if seq < state.applied_seq {
                tracing::warn!(
                    source = %self.key(),
                    seq,
                    applied = state.applied_seq,
                    "Discarding stale page response"
                );
                return;
            }
            state.applied_seq = seq;
            state.current = Some(page.clone());
            state.numbers = Some(numbers);
        }

        tracing::debug!(
            source = %self.key(),
            offset = numbers.offset,
            limit = numbers.limit,
            total = numbers.total,
            "Page loaded"
        );

        if self
            .inner
            .initial_load
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.gate.send_replace(Some(page.clone()));
            tracing::debug!(source = %self.key(), "Initial load complete");
        }

        if history == HistoryWrite::Push {
            tracing::trace!(source = %self.key(), "Pushing listing history entry");
            self.inner
                .history
                .push_state(self.key(), None, &page.history_payload());
        }

        if let Some(paging) = &self.inner.paging {
            paging.sync_from(&numbers);
        }

        self.inner.events.page_loaded.notify(&PageLoaded {
            page: page.clone(),
            numbers,
        });
    }

    async fn load_query(&self, query: Query, history: HistoryWrite) -> Result<PageRef> {
        let source = self.inner.source.clone();
        self.run_load(
            async move {
                if !source.can_list() {
                    return Err(CrudError::ListingNotPermitted);
                }
                source.list(query).await
            },
            history,
        )
        .await
    }

    async fn navigate(&self, link: NavLink) -> Result<PageRef> {
        let current = self.read_page().current.clone();
        self.run_load(
            async move {
                let page = current.ok_or(CrudError::NoPageLoaded { operation: link })?;
                page.follow(link).await
            },
            HistoryWrite::Push,
        )
        .await
    }

    async fn edit_by_id(&self, id: &str) -> Result<()> {
        let item = resolve_item(self.inner.source.as_ref(), id).await?;
        self.open_editor(item, false).await
    }

    async fn open_editor(&self, item: ItemRef, record_history: bool) -> Result<()> {
        let mut edit_route_pushed = false;
        if record_history {
            match self.inner.source.item_id(item.as_ref()) {
                Some(id) => {
                    let path = edit_path(&self.inner.config.history.edit_segment, &id);
                    tracing::trace!(source = %self.key(), %path, "Pushing edit history entry");
                    self.inner
                        .history
                        .push_state(self.key(), Some(&path), &self.listing_payload());
                    edit_route_pushed = true;
                }
                None => {
                    tracing::debug!(source = %self.key(), "Item has no stable id; edit is not deep-linked");
                }
            }
        }

        let refreshed = match item.as_refreshable() {
            Some(refreshable) => match refreshable.refresh().await {
                Ok(fresh) => Some(fresh),
                Err(e) => {
                    if edit_route_pushed {
                        tracing::debug!(source = %self.key(), error = %e, "Item refresh failed; leaving edit route");
                        self.inner
                            .history
                            .replace_state(self.key(), None, &self.listing_payload());
                    }
                    return Err(e);
                }
            },
            None => None,
        };
        let item = refreshed.unwrap_or(item);

        let weak = Arc::downgrade(&self.inner);
        let save_item = item.clone();
        let on_save = move |data: Value| {
            let weak = weak.clone();
            let item = save_item.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => HypermediaCrudService { inner }.save_item(item, data).await,
                    None => Ok(()),
                }
            }
            .boxed()
        };

        let weak = Arc::downgrade(&self.inner);
        let on_closed = move || {
            if let Some(inner) = weak.upgrade() {
                HypermediaCrudService { inner }.editor_closed();
            }
        };

        let session = ItemEditorSession::new(item.clone(), item.data(), on_save, on_closed);
        *self.lock_editing() = Some(item);
        self.inner.events.show_item_editor.notify(&session);
        Ok(())
    }

    async fn save_item(&self, item: ItemRef, data: Value) -> Result<()> {
        let Some(updatable) = item.as_updatable() else {
            tracing::debug!(source = %self.key(), "Item is not update-capable; save ignored");
            return Ok(());
        };
        updatable.update(data).await?;
        self.inner.events.data_modified.notify(&Modification::Updated);
        self.refresh_page().await?;
        Ok(())
    }

    async fn save_new(&self, data: Value) -> Result<()> {
        let Some(page) = self.read_page().current.clone() else {
            tracing::debug!(source = %self.key(), "No page loaded; add ignored");
            return Ok(());
        };
        let Some(addable) = page.as_addable() else {
            tracing::debug!(source = %self.key(), "Page is not add-capable; add ignored");
            return Ok(());
        };
        addable.add(data).await?;
        self.inner.events.data_modified.notify(&Modification::Added);
        self.refresh_page().await?;
        Ok(())
    }

    fn editor_closed(&self) {
        *self.lock_editing() = None;

        if self.inner.allow_close_history.load(Ordering::SeqCst) {
            tracing::trace!(source = %self.key(), "Restoring listing history entry");
            self.inner
                .history
                .replace_state(self.key(), None, &self.listing_payload());
        } else {
            tracing::trace!(source = %self.key(), "History resync in progress; close not recorded");
        }
        self.inner.events.main_ui_shown.notify(&());
    }

    async fn first_loaded_page(&self) -> Result<PageRef> {
        let mut rx = self.inner.gate.subscribe();
        let wait = async move {
            rx.wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|page| (*page).clone())
        };

        let page = match self.inner.config.schema.wait_timeout() {
            Some(limit) => {
                let started = Instant::now();
                tokio::time::timeout(limit, wait).await.map_err(|_| {
                    CrudError::InitialLoadTimeout {
                        waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    }
                })?
            }
            None => wait.await,
        };

        // The sender lives as long as the service, so a closed gate cannot happen here
        page.ok_or(CrudError::LoadCancelled)?;

        // Schemas describe the latest page, not necessarily the first one
        self.read_page()
            .current
            .clone()
            .ok_or(CrudError::LoadCancelled)
    }
}

#[async_trait]
impl CrudService for HypermediaCrudService {
    fn events(&self) -> &CrudEvents {
        &self.inner.events
    }

    async fn add(&self, item: Option<Value>) {
        let weak = Arc::downgrade(&self.inner);
        let on_save = move |data: Value| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => HypermediaCrudService { inner }.save_new(data).await,
                    None => Ok(()),
                }
            }
            .boxed()
        };

        let session = AddItemSession::new(item.unwrap_or_else(|| json!({})), on_save);
        self.inner.events.show_add_item_editor.notify(&session);
    }

    async fn edit(&self, item: ItemRef) -> Result<()> {
        self.open_editor(item, true).await
    }

    async fn del(&self, item: ItemRef) -> Result<()> {
        let Some(deletable) = item.as_deletable() else {
            tracing::debug!(source = %self.key(), "Item is not delete-capable; delete ignored");
            return Ok(());
        };
        deletable.delete().await?;
        self.inner.events.data_modified.notify(&Modification::Deleted);
        self.refresh_page().await?;
        Ok(())
    }

    fn delete_prompt(&self, item: &dyn CrudItem) -> String {
        self.inner.source.delete_prompt(item)
    }

    async fn get_page(&self, query: Query) -> Result<PageRef> {
        let initial = self.is_initial_load();
        // Only the very first call may be replaced by the history entry
        let seed = self.inner.history_seed_pending.swap(false, Ordering::SeqCst);

        let mut query = query;
        let mut edit_id = None;
        if seed && self.inner.source.options().seed_query_from_history {
            if let Some(state) = self.inner.history.current_state(self.key()) {
                tracing::debug!(source = %self.key(), "Seeding first query from history");
                edit_id = state.in_page_path.as_deref().and_then(|path| {
                    parse_edit_route(path, &self.inner.config.history.edit_segment)
                });
                query = state.query;
            }
        }

        // The entry for the first load already exists
        let history = if initial {
            HistoryWrite::Skip
        } else {
            HistoryWrite::Push
        };

        match edit_id {
            Some(id) => {
                let (listing, editing) =
                    tokio::join!(self.load_query(query, history), self.edit_by_id(&id));
                if let Err(e) = editing {
                    tracing::warn!(source = %self.key(), %id, error = %e, "Could not open deep-linked editor");
                }
                listing
            }
            None => {
                let listing = self.load_query(query, history).await;
                if initial && listing.is_ok() {
                    self.inner.events.main_ui_shown.notify(&());
                }
                listing
            }
        }
    }

    async fn first_page(&self) -> Result<PageRef> {
        self.navigate(NavLink::First).await
    }

    async fn last_page(&self) -> Result<PageRef> {
        self.navigate(NavLink::Last).await
    }

    async fn next_page(&self) -> Result<PageRef> {
        self.navigate(NavLink::Next).await
    }

    async fn previous_page(&self) -> Result<PageRef> {
        self.navigate(NavLink::Previous).await
    }

    async fn refresh_page(&self) -> Result<PageRef> {
        self.navigate(NavLink::Refresh).await
    }

    async fn get_item_schema(&self) -> Result<Option<Value>> {
        let page = self.first_loaded_page().await?;
        match page.as_update_docs() {
            Some(docs) => docs.item_schema().await.map(Some),
            None => Ok(None),
        }
    }

    async fn get_add_item_schema(&self) -> Result<Option<Value>> {
        let page = self.first_loaded_page().await?;
        match page.as_addable() {
            Some(addable) => addable.add_item_schema().await.map(Some),
            None => Ok(None),
        }
    }

    async fn get_listing_schema(&self) -> Result<Option<Value>> {
        let page = self.first_loaded_page().await?;
        match page.as_get_docs() {
            Some(docs) => docs.listing_schema().await.map(Some),
            None => Ok(None),
        }
    }

    async fn get_search_schema(&self) -> Result<Option<Value>> {
        let page = self.first_loaded_page().await?;
        match page.as_list_docs() {
            Some(docs) => docs.search_schema().await.map(Some),
            None => Ok(None),
        }
    }

    fn current_page(&self) -> Option<PageRef> {
        self.read_page().current.clone()
    }

    fn page_numbers(&self) -> Option<PageNumberState> {
        self.read_page().numbers
    }
}

impl std::fmt::Debug for HypermediaCrudService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HypermediaCrudService")
            .field("source", &self.key())
            .field("load_state", &self.load_state())
            .field("editing", &self.is_editing())
            .finish()
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use super::*;
use crate::collection::{CollectionResult, CrudItem, PageRef};
use crate::components::PagingComponent;
use crate::config::CrudConfig;
use crate::error::{CrudError, NavLink};
use crate::events::EventDispatcher;
use crate::history::{HistoryManager, HistoryState, HistoryWriteKind, MemoryHistory};
use crate::memory::{MemoryStore, Permissions, Schemas};
use crate::query::{Query, LIMIT, OFFSET};
use crate::query_manager::QueryManager;
use crate::source::{PageSource, PageSourceOptions};

const KEY: &str = "people";

fn capture<T: Clone + Send + 'static>(dispatcher: &EventDispatcher<T>) -> Arc<Mutex<Vec<T>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    dispatcher.subscribe(move |event: &T| sink.lock().unwrap().push(event.clone()));
    seen
}

fn people(count: usize, limit: u64) -> MemoryStore {
    let store = MemoryStore::new(PageSourceOptions::new(KEY), limit);
    for i in 0..count {
        store.insert(json!({"name": format!("person-{i:02}")}));
    }
    store
}

fn service_over(store: &MemoryStore, history: &Arc<MemoryHistory>) -> HypermediaCrudService {
    HypermediaCrudService::builder(Arc::new(store.clone()))
        .history(history.clone())
        .build()
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_navigation_before_first_load_fails() {
    let store = people(5, 2);
    let service = HypermediaCrudService::new(Arc::new(store.clone()));
    let loading = capture(&service.events().data_loading);

    for result in [
        service.next_page().await,
        service.previous_page().await,
        service.first_page().await,
        service.last_page().await,
        service.refresh_page().await,
    ] {
        assert!(matches!(result.unwrap_err(), CrudError::NoPageLoaded { .. }));
    }

    // Each call still announced and then rejected its load
    let loading = loading.lock().unwrap().clone();
    assert_eq!(loading.len(), 5);
    for pending in loading {
        assert!(pending.is_resolved());
        assert!(pending.wait().await.unwrap_err().is_precondition());
    }
    assert_eq!(service.load_state(), LoadState::Uninitialized);
    assert_eq!(store.list_calls(), 0);
}

#[tokio::test]
async fn test_data_loading_is_raised_before_resolution() {
    let store = people(5, 2);
    let service = HypermediaCrudService::new(Arc::new(store));
    let unresolved_at_notify = Arc::new(AtomicUsize::new(0));
    let counter = unresolved_at_notify.clone();
    service.events().data_loading.subscribe(move |pending| {
        if !pending.is_resolved() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    service.get_page(Query::new()).await.unwrap();
    service.next_page().await.unwrap();
    assert_eq!(unresolved_at_notify.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_first_load_writes_no_history_and_shows_main_ui() {
    let store = people(25, 10);
    let history = Arc::new(MemoryHistory::new());
    let service = service_over(&store, &history);
    let loaded = capture(&service.events().page_loaded);
    let main_ui = capture(&service.events().main_ui_shown);

    let page = service.get_page(Query::new()).await.unwrap();

    assert_eq!(page.items().len(), 10);
    assert_eq!(history.write_count(), 0);
    assert_eq!(main_ui.lock().unwrap().len(), 1);
    assert!(!service.is_initial_load());
    assert_eq!(service.load_state(), LoadState::Loaded);

    let numbers = loaded.lock().unwrap()[0].numbers;
    assert_eq!(numbers.total_pages, 3);
    assert_eq!((numbers.item_start, numbers.item_end), (1, 10));
    assert!(numbers.can_next);
    assert!(!numbers.can_previous);
}

#[tokio::test]
async fn test_navigation_pushes_history_with_page_payload() {
    let store = people(25, 10);
    let history = Arc::new(MemoryHistory::new());
    let service = service_over(&store, &history);

    service.get_page(Query::new()).await.unwrap();
    let next = service.next_page().await.unwrap();
    assert_eq!(next.offset(), 1);

    let last = service.last_page().await.unwrap();
    assert_eq!(last.offset(), 2);

    let writes = history.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|w| w.kind == HistoryWriteKind::Push && w.key == KEY));
    assert_eq!(writes[0].state.query.get_u64(OFFSET), Some(1));
    assert_eq!(writes[1].state.query.get_u64(OFFSET), Some(2));
    assert_eq!(writes[1].state.in_page_path, None);

    let numbers = service.page_numbers().unwrap();
    assert_eq!((numbers.item_start, numbers.item_end), (21, 25));
}

#[tokio::test]
async fn test_unavailable_link_leaves_state_untouched() {
    let store = people(25, 10);
    let history = Arc::new(MemoryHistory::new());
    let service = service_over(&store, &history);

    service.get_page(Query::new()).await.unwrap();
    service.last_page().await.unwrap();
    let before = service.current_page().unwrap();
    let writes_before = history.write_count();

    let err = service.next_page().await.unwrap_err();
    assert!(matches!(
        err,
        CrudError::NavigationUnavailable {
            link: NavLink::Next
        }
    ));

    assert!(Arc::ptr_eq(&before, &service.current_page().unwrap()));
    assert_eq!(history.write_count(), writes_before);
}

#[tokio::test]
async fn test_upstream_failure_is_passed_through() {
    let store = people(5, 2);
    let service = HypermediaCrudService::new(Arc::new(store.clone()));
    let loading = capture(&service.events().data_loading);

    store.fail_next_list("backend down");
    let err = service.get_page(Query::new()).await.unwrap_err();
    assert!(err.is_upstream());
    assert!(err.to_string().contains("backend down"));

    let pending = loading.lock().unwrap()[0].clone();
    assert!(pending.wait().await.unwrap_err().is_upstream());
    assert!(service.current_page().is_none());
}

#[tokio::test]
async fn test_offset_beyond_range_loads_empty_page() {
    let store = people(25, 10);
    let service = HypermediaCrudService::new(Arc::new(store));

    let page = service
        .get_page(Query::new().with(OFFSET, u64::MAX))
        .await
        .unwrap();

    assert!(page.items().is_empty());
    let numbers = service.page_numbers().unwrap();
    assert_eq!(numbers.current_page, u64::MAX);
    assert_eq!(numbers.total_pages, 3);
    assert!(numbers.can_first);
    assert!(!numbers.can_next);
}

#[tokio::test]
async fn test_listing_forbidden_by_source() {
    let store = people(5, 2).with_permissions(Permissions {
        list: false,
        ..Permissions::read_only()
    });
    let service = HypermediaCrudService::new(Arc::new(store.clone()));

    let err = service.get_page(Query::new()).await.unwrap_err();
    assert!(matches!(err, CrudError::ListingNotPermitted));
    assert_eq!(store.list_calls(), 0);
}

// ---------------------------------------------------------------------------
// Initial-load gate
// ---------------------------------------------------------------------------

fn documented(store: MemoryStore) -> MemoryStore {
    store.with_schemas(Schemas {
        item: Some(json!({"title": "Person"})),
        add_item: None,
        search: Some(json!({"title": "Search"})),
        listing: None,
    })
}

#[tokio::test]
async fn test_schema_queries_wait_for_first_load() {
    let store = documented(people(5, 2));
    let service = HypermediaCrudService::new(Arc::new(store));

    let waiting = service.clone();
    let schema = tokio::spawn(async move { waiting.get_item_schema().await });

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!schema.is_finished());

    service.get_page(Query::new()).await.unwrap();

    let schema = schema.await.unwrap().unwrap();
    assert_eq!(schema, Some(json!({"title": "Person"})));

    // After the gate opens, answers reflect the loaded page's capabilities
    assert_eq!(
        service.get_search_schema().await.unwrap(),
        Some(json!({"title": "Search"}))
    );
    assert_eq!(service.get_listing_schema().await.unwrap(), None);
    assert_eq!(service.get_add_item_schema().await.unwrap(), None);
}

#[tokio::test]
async fn test_failed_first_load_keeps_gate_armed() {
    let store = documented(people(5, 2));
    let service = HypermediaCrudService::new(Arc::new(store.clone()));

    let waiting = service.clone();
    let schema = tokio::spawn(async move { waiting.get_item_schema().await });

    store.fail_next_list("flaky");
    assert!(service.get_page(Query::new()).await.is_err());
    assert!(service.is_initial_load());

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!schema.is_finished());

    service.get_page(Query::new()).await.unwrap();
    assert!(schema.await.unwrap().unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_schema_wait_times_out_when_configured() {
    let store = documented(people(5, 2));
    let mut config = CrudConfig::default();
    config.schema.wait_timeout_ms = Some(250);
    let service = HypermediaCrudService::builder(Arc::new(store.clone()))
        .config(config)
        .build();

    store.fail_next_list("down");
    assert!(service.get_page(Query::new()).await.is_err());

    let err = service.get_item_schema().await.unwrap_err();
    assert!(matches!(err, CrudError::InitialLoadTimeout { waited_ms } if waited_ms >= 250));
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

async fn loaded_editable(history: &Arc<MemoryHistory>) -> (MemoryStore, HypermediaCrudService) {
    let store = people(25, 10).with_permissions(Permissions::all());
    let service = service_over(&store, history);
    service.get_page(Query::new()).await.unwrap();
    (store, service)
}

fn first_item(service: &HypermediaCrudService) -> Arc<dyn CrudItem> {
    service.current_page().unwrap().items()[0].clone()
}

#[tokio::test]
async fn test_edit_then_close_restores_listing_entry() {
    let history = Arc::new(MemoryHistory::new());
    let (_store, service) = loaded_editable(&history).await;
    let sessions = capture(&service.events().show_item_editor);

    service.edit(first_item(&service)).await.unwrap();
    assert!(service.is_editing());

    let current = history.current_state(KEY).unwrap();
    assert_eq!(current.in_page_path.as_deref(), Some("/Edit/1"));

    let session = sessions.lock().unwrap()[0].clone();
    assert_eq!(session.data()["name"], "person-00");
    session.close();

    assert!(!service.is_editing());
    let current = history.current_state(KEY).unwrap();
    assert_eq!(current.in_page_path, None);
    assert_eq!(current.query.get_u64(LIMIT), Some(10));

    let writes = history.writes();
    assert_eq!(writes.last().unwrap().kind, HistoryWriteKind::Replace);
}

#[tokio::test]
async fn test_edit_save_updates_and_refreshes() {
    let history = Arc::new(MemoryHistory::new());
    let (store, service) = loaded_editable(&history).await;
    let sessions = capture(&service.events().show_item_editor);
    let modified = capture(&service.events().data_modified);
    let loaded = capture(&service.events().page_loaded);

    service.edit(first_item(&service)).await.unwrap();
    let session = sessions.lock().unwrap()[0].clone();
    session.save(json!({"name": "changed"})).await.unwrap();

    assert_eq!(store.get("1").unwrap()["name"], "changed");
    assert_eq!(*modified.lock().unwrap(), vec![Modification::Updated]);
    assert_eq!(loaded.lock().unwrap().len(), 1);
    assert_eq!(
        service.current_page().unwrap().items()[0].data()["name"],
        "changed"
    );
}

#[tokio::test]
async fn test_edit_without_update_capability_is_silent() {
    let history = Arc::new(MemoryHistory::new());
    let store = people(3, 10);
    let service = service_over(&store, &history);
    service.get_page(Query::new()).await.unwrap();
    let sessions = capture(&service.events().show_item_editor);
    let modified = capture(&service.events().data_modified);

    service.edit(first_item(&service)).await.unwrap();
    let session = sessions.lock().unwrap()[0].clone();
    session.save(json!({"name": "ignored"})).await.unwrap();

    assert_eq!(store.get("1").unwrap()["name"], "person-00");
    assert!(modified.lock().unwrap().is_empty());
}

#[derive(Debug)]
struct AnonymousItem;

impl CrudItem for AnonymousItem {
    fn data(&self) -> Value {
        json!({"name": "no id"})
    }
}

#[tokio::test]
async fn test_edit_without_stable_id_skips_history() {
    let history = Arc::new(MemoryHistory::new());
    let (_store, service) = loaded_editable(&history).await;
    let sessions = capture(&service.events().show_item_editor);

    service.edit(Arc::new(AnonymousItem)).await.unwrap();

    assert_eq!(history.write_count(), 0);
    assert_eq!(sessions.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_edit_refreshes_item_first() {
    let history = Arc::new(MemoryHistory::new());
    let (_store, service) = loaded_editable(&history).await;
    let sessions = capture(&service.events().show_item_editor);

    let stale = first_item(&service);
    stale
        .as_updatable()
        .unwrap()
        .update(json!({"name": "fresh"}))
        .await
        .unwrap();

    service.edit(stale).await.unwrap();
    let session = sessions.lock().unwrap()[0].clone();
    assert_eq!(session.data()["name"], "fresh");
}

#[tokio::test]
async fn test_failed_refresh_leaves_edit_route() {
    let history = Arc::new(MemoryHistory::new());
    let (_store, service) = loaded_editable(&history).await;
    let sessions = capture(&service.events().show_item_editor);

    let gone = first_item(&service);
    gone.as_deletable().unwrap().delete().await.unwrap();

    let err = service.edit(gone).await.unwrap_err();
    assert!(matches!(err, CrudError::ItemNotFound { ref id } if id == "1"));

    let writes = history.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].state.in_page_path.as_deref(), Some("/Edit/1"));
    assert_eq!(writes[1].kind, HistoryWriteKind::Replace);
    assert_eq!(history.current_state(KEY).unwrap().in_page_path, None);
    assert!(sessions.lock().unwrap().is_empty());
    assert!(!service.is_editing());
}

// ---------------------------------------------------------------------------
// Add and delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_add_creates_item_and_refreshes() {
    let history = Arc::new(MemoryHistory::new());
    let (store, service) = loaded_editable(&history).await;
    let sessions = capture(&service.events().show_add_item_editor);
    let modified = capture(&service.events().data_modified);

    service.add(None).await;
    let session = sessions.lock().unwrap()[0].clone();
    assert_eq!(session.default_item(), &json!({}));

    session.save(json!({"name": "newcomer"})).await.unwrap();

    assert_eq!(store.len(), 26);
    assert_eq!(*modified.lock().unwrap(), vec![Modification::Added]);
    assert_eq!(service.page_numbers().unwrap().total, 26);
}

#[tokio::test]
async fn test_add_on_read_only_page_is_silent() {
    let history = Arc::new(MemoryHistory::new());
    let store = people(3, 10);
    let service = service_over(&store, &history);
    service.get_page(Query::new()).await.unwrap();
    let sessions = capture(&service.events().show_add_item_editor);
    let modified = capture(&service.events().data_modified);

    service.add(Some(json!({"name": "draft"}))).await;
    let session = sessions.lock().unwrap()[0].clone();
    assert_eq!(session.default_item()["name"], "draft");
    session.save(json!({"name": "draft"})).await.unwrap();

    assert_eq!(store.len(), 3);
    assert!(modified.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_removes_and_refreshes() {
    let history = Arc::new(MemoryHistory::new());
    let (store, service) = loaded_editable(&history).await;
    let modified = capture(&service.events().data_modified);

    let item = first_item(&service);
    assert_eq!(service.delete_prompt(item.as_ref()), "Delete item 1?");
    service.del(item).await.unwrap();

    assert!(store.get("1").is_none());
    assert_eq!(*modified.lock().unwrap(), vec![Modification::Deleted]);
    assert_eq!(service.page_numbers().unwrap().total, 24);
}

#[tokio::test]
async fn test_delete_without_capability_is_silent() {
    let history = Arc::new(MemoryHistory::new());
    let store = people(3, 10);
    let service = service_over(&store, &history);
    service.get_page(Query::new()).await.unwrap();

    service.del(first_item(&service)).await.unwrap();
    assert_eq!(store.len(), 3);
}

// ---------------------------------------------------------------------------
// History resynchronisation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pop_state_into_edit_route_writes_no_history() {
    let history = Arc::new(MemoryHistory::new());
    let (_store, service) = loaded_editable(&history).await;
    let sessions = capture(&service.events().show_item_editor);

    service.next_page().await.unwrap();
    service.edit(first_item(&service)).await.unwrap();
    service.next_page().await.unwrap();
    let writes_before = history.write_count();

    // Back lands on the /Edit/<id> entry
    assert!(history.back().await);

    assert_eq!(history.write_count(), writes_before);
    let sessions = sessions.lock().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[1].data()["name"], "person-10");
    assert!(service.is_editing());
}

#[tokio::test]
async fn test_pop_state_to_listing_closes_editor_without_replace() {
    let history = Arc::new(MemoryHistory::new());
    let (_store, service) = loaded_editable(&history).await;
    let sessions = capture(&service.events().show_item_editor);

    // The UI closes its dialog when asked, which reports back through the session
    let open = sessions.clone();
    service.events().close_item_editor.subscribe(move |_| {
        if let Some(session) = open.lock().unwrap().last() {
            session.close();
        }
    });

    service.next_page().await.unwrap();
    service.edit(first_item(&service)).await.unwrap();
    let writes_before = history.write_count();
    let main_ui = capture(&service.events().main_ui_shown);

    assert!(history.back().await);

    assert_eq!(history.write_count(), writes_before);
    assert!(!service.is_editing());
    assert_eq!(service.page_numbers().unwrap().offset, 1);
    assert_eq!(main_ui.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pop_state_to_listing_without_editor_shows_main_ui() {
    let history = Arc::new(MemoryHistory::new());
    let (_store, service) = loaded_editable(&history).await;
    service.next_page().await.unwrap();
    service.next_page().await.unwrap();
    let main_ui = capture(&service.events().main_ui_shown);

    assert!(history.back().await);

    assert_eq!(main_ui.lock().unwrap().len(), 1);
    assert_eq!(service.page_numbers().unwrap().offset, 1);
}

#[tokio::test]
async fn test_close_after_pop_state_records_again() {
    let history = Arc::new(MemoryHistory::new());
    let (_store, service) = loaded_editable(&history).await;
    let sessions = capture(&service.events().show_item_editor);

    service
        .on_pop_state(HistoryState::listing(Query::new().with(OFFSET, 1)))
        .await;
    service.edit(first_item(&service)).await.unwrap();
    let writes_before = history.write_count();

    sessions.lock().unwrap()[0].close();
    assert_eq!(history.write_count(), writes_before + 1);
}

#[tokio::test]
async fn test_initial_deep_link_opens_editor_without_history() {
    let query = Query::new().with(OFFSET, 1).with(LIMIT, 10);
    let history = Arc::new(MemoryHistory::starting_at(
        KEY,
        HistoryState::with_path(query, "/edit/2"),
    ));
    let source = MemoryStore::new(
        PageSourceOptions::new(KEY).with_history_seed(true),
        10,
    );
    for i in 0..25 {
        source.insert(json!({"name": format!("person-{i:02}")}));
    }
    let service = HypermediaCrudService::builder(Arc::new(source.clone()))
        .history(history.clone())
        .build();
    let sessions = capture(&service.events().show_item_editor);

    let page = service.get_page(Query::new()).await.unwrap();

    assert_eq!(page.offset(), 1);
    assert_eq!(history.write_count(), 0);
    let sessions = sessions.lock().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].data()["name"], "person-01");
}

#[tokio::test]
async fn test_history_seed_disabled_uses_caller_query() {
    let history = Arc::new(MemoryHistory::starting_at(
        KEY,
        HistoryState::listing(Query::new().with(OFFSET, 2)),
    ));
    let store = people(25, 10);
    let service = service_over(&store, &history);

    let page = service
        .get_page(Query::new().with(OFFSET, 0))
        .await
        .unwrap();
    assert_eq!(page.offset(), 0);
}

// ---------------------------------------------------------------------------
// Query manager integration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_query_change_triggers_reload() {
    let store = people(25, 10);
    let history = Arc::new(MemoryHistory::new());
    let paging = Arc::new(PagingComponent::new(10, 100));
    let manager = QueryManager::new();
    manager.add_component(paging.clone());

    let service = HypermediaCrudService::builder(Arc::new(store.clone()))
        .history(history.clone())
        .paging(paging.clone())
        .build();
    service.bind_query_manager(&manager);

    service.get_page(manager.setup_query()).await.unwrap();
    paging.next();

    tokio::time::timeout(Duration::from_secs(5), async {
        while service.page_numbers().map(|n| n.offset) != Some(1) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("reload after paging change");

    assert_eq!(history.write_count(), 1);
    assert_eq!(paging.offset(), 1);
}

#[tokio::test]
async fn test_paging_component_follows_link_navigation() {
    let store = people(25, 10);
    let paging = Arc::new(PagingComponent::new(10, 100));
    let service = HypermediaCrudService::builder(Arc::new(store))
        .paging(paging.clone())
        .build();

    service.get_page(Query::new()).await.unwrap();
    service.last_page().await.unwrap();
    assert_eq!(paging.offset(), 2);
}

// ---------------------------------------------------------------------------
// Overlapping loads
// ---------------------------------------------------------------------------

/// Source whose list calls block until released, per offset
struct GatedSource {
    store: MemoryStore,
    gates: Mutex<HashMap<u64, oneshot::Receiver<()>>>,
    started: AtomicUsize,
}

impl GatedSource {
    fn new(store: MemoryStore) -> (Arc<Self>, HashMap<u64, oneshot::Sender<()>>) {
        let mut senders = HashMap::new();
        let mut gates = HashMap::new();
        for offset in 0..3 {
            let (tx, rx) = oneshot::channel();
            senders.insert(offset, tx);
            gates.insert(offset, rx);
        }
        let source = Arc::new(Self {
            store,
            gates: Mutex::new(gates),
            started: AtomicUsize::new(0),
        });
        (source, senders)
    }
}

#[async_trait]
impl PageSource for GatedSource {
    async fn list(&self, query: Query) -> crate::error::Result<PageRef> {
        let offset = query.get_u64(OFFSET).unwrap_or(0);
        let gate = self.gates.lock().unwrap().remove(&offset);
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.store.list(query).await
    }

    fn can_list(&self) -> bool {
        true
    }

    fn delete_prompt(&self, item: &dyn CrudItem) -> String {
        self.store.delete_prompt(item)
    }

    fn options(&self) -> &PageSourceOptions {
        self.store.options()
    }
}

async fn wait_started(source: &GatedSource, count: usize) {
    while source.started.load(Ordering::SeqCst) < count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_stale_response_does_not_replace_newer_page() {
    let (source, mut release) = GatedSource::new(people(25, 10));
    let service = HypermediaCrudService::new(source.clone());

    let older = service.clone();
    let first = tokio::spawn(async move { older.get_page(Query::new().with(OFFSET, 0)).await });
    wait_started(&source, 1).await;

    let newer = service.clone();
    let second = tokio::spawn(async move { newer.get_page(Query::new().with(OFFSET, 1)).await });
    wait_started(&source, 2).await;
    assert_eq!(service.load_state(), LoadState::Loading);

    release.remove(&1).unwrap().send(()).unwrap();
    assert_eq!(second.await.unwrap().unwrap().offset(), 1);

    release.remove(&0).unwrap().send(()).unwrap();
    // The older request still resolves for its own caller
    assert_eq!(first.await.unwrap().unwrap().offset(), 0);

    assert_eq!(service.current_page().unwrap().offset(), 1);
    assert_eq!(service.load_state(), LoadState::Loaded);
}

#[tokio::test]
async fn test_history_seed_applies_to_first_call_only() {
    let history = Arc::new(MemoryHistory::starting_at(
        KEY,
        HistoryState::listing(Query::new().with(OFFSET, 0).with(LIMIT, 10)),
    ));
    let store = MemoryStore::new(PageSourceOptions::new(KEY).with_history_seed(true), 10);
    for i in 0..25 {
        store.insert(json!({"name": format!("person-{i:02}")}));
    }
    let (source, mut release) = GatedSource::new(store);
    let service = HypermediaCrudService::builder(source.clone())
        .history(history.clone())
        .build();

    let seeded = service.clone();
    let first = tokio::spawn(async move { seeded.get_page(Query::new()).await });
    wait_started(&source, 1).await;

    // Issued while the seeded load is still in flight
    let caller = service.clone();
    let second = tokio::spawn(async move {
        caller
            .get_page(Query::new().with(OFFSET, 2).with(LIMIT, 10))
            .await
    });
    wait_started(&source, 2).await;

    release.remove(&0).unwrap().send(()).unwrap();
    release.remove(&2).unwrap().send(()).unwrap();

    assert_eq!(first.await.unwrap().unwrap().offset(), 0);
    assert_eq!(second.await.unwrap().unwrap().offset(), 2);
    assert_eq!(service.current_page().unwrap().offset(), 2);
}

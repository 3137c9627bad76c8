use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tillsync_sync::gateway::mock::{GatewayCall, MockGateway};
use tillsync_sync::settings::category;
use tillsync_sync::{
    ChangeOrigin, Collections, DeletionDecision, LocalStateStore, MemoryStore,
    ReconciliationEngine, StoreChange,
};
use tillsync_types::{DataTable, Record, RecordId, SettingsTable, Table, TenantId};
use tokio::sync::broadcast;

const PRODUCTS: Table = Table::Data(DataTable::Products);
const AUDIT_LOGS: Table = Table::Data(DataTable::AuditLogs);
const CATEGORIES: Table = Table::Settings(SettingsTable::Categories);
const BUSINESS: Table = Table::Settings(SettingsTable::BusinessSettings);

fn tenant() -> TenantId {
    TenantId::parse("acme").unwrap()
}

fn product(id: &str) -> Record {
    Record::new(id, json!({ "name": id }))
}

fn rid(id: &str) -> RecordId {
    RecordId::new(id)
}

/// An engine whose products are reconciled to `{a, b, c}` on both sides.
async fn synced_engine() -> (Arc<MockGateway>, Arc<MemoryStore>, ReconciliationEngine) {
    let gateway = Arc::new(MockGateway::new());
    gateway.seed_records(
        &tenant(),
        DataTable::Products,
        &[product("a"), product("b"), product("c")],
    );
    let store = Arc::new(MemoryStore::new());
    let engine = ReconciliationEngine::new(tenant(), gateway.clone(), store.clone());
    engine.full_sync().await.unwrap();
    gateway.clear_calls();
    (gateway, store, engine)
}

// ── Selective deletion ───────────────────────────────────────────

#[tokio::test]
async fn removing_one_record_deletes_exactly_that_id() {
    let (gateway, store, engine) = synced_engine().await;

    assert!(store.remove(PRODUCTS, &rid("b")));
    let report = engine.handle_local_change(PRODUCTS).await.unwrap();

    assert!(!report.seeded);
    assert_eq!(report.decision, DeletionDecision::Delete(vec![rid("b")]));
    assert_eq!(
        gateway.delete_calls(),
        vec![GatewayCall::Delete {
            table: "products".into(),
            ids: vec![rid("b")],
        }]
    );
    assert_eq!(gateway.ids(&tenant(), "products"), vec![rid("a"), rid("c")]);
    assert_eq!(
        engine.snapshot(PRODUCTS),
        Some([rid("a"), rid("c")].into_iter().collect())
    );
}

#[tokio::test]
async fn unchanged_collection_issues_no_calls() {
    let (gateway, _store, engine) = synced_engine().await;

    let report = engine.handle_local_change(PRODUCTS).await.unwrap();

    assert_eq!(report.decision, DeletionDecision::Unchanged);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn additions_to_regular_tables_are_not_pushed_by_diffing() {
    let (gateway, store, engine) = synced_engine().await;

    store.upsert(PRODUCTS, product("d"));
    let report = engine.handle_local_change(PRODUCTS).await.unwrap();

    assert_eq!(report.decision, DeletionDecision::Unchanged);
    assert!(report.pushed.is_empty());
    assert!(gateway.calls().is_empty());
    assert!(engine.snapshot(PRODUCTS).unwrap().contains(&rid("d")));
}

// ── Bulk-wipe protection ─────────────────────────────────────────

#[tokio::test]
async fn wiping_a_collection_deletes_nothing_remotely() {
    let (gateway, store, engine) = synced_engine().await;

    store.set(PRODUCTS, Vec::new(), ChangeOrigin::Local);
    let report = engine.handle_local_change(PRODUCTS).await.unwrap();

    assert_eq!(report.decision, DeletionDecision::SuspectedReset { removed: 3 });
    assert!(gateway.delete_calls().is_empty());
    assert_eq!(gateway.ids(&tenant(), "products").len(), 3);
    assert_eq!(engine.snapshot(PRODUCTS), Some(Default::default()));
}

#[tokio::test]
async fn store_clear_never_reaches_the_backend() {
    let (gateway, store, engine) = synced_engine().await;

    store.clear();
    engine.rescan_local().await;

    assert!(gateway.delete_calls().is_empty());
}

#[tokio::test]
async fn removing_down_to_one_record_is_still_propagated() {
    let (gateway, store, engine) = synced_engine().await;

    store.remove(PRODUCTS, &rid("a"));
    store.remove(PRODUCTS, &rid("b"));
    let report = engine.handle_local_change(PRODUCTS).await.unwrap();

    assert_eq!(report.decision.ids(), &[rid("a"), rid("b")]);
    assert_eq!(gateway.ids(&tenant(), "products"), vec![rid("c")]);
}

// ── First observation and retries ────────────────────────────────

#[tokio::test]
async fn first_observation_only_seeds_the_snapshot() {
    let gateway = Arc::new(MockGateway::new());
    let mut local = Collections::new();
    local.insert(PRODUCTS, vec![product("a")]);
    let store = Arc::new(MemoryStore::with_collections(local));
    let engine = ReconciliationEngine::new(tenant(), gateway.clone(), store.clone());

    let report = engine.handle_local_change(PRODUCTS).await.unwrap();

    assert!(report.seeded);
    assert_eq!(report.decision, DeletionDecision::Unchanged);
    assert!(gateway.calls().is_empty());
    assert_eq!(engine.snapshot(PRODUCTS), Some([rid("a")].into_iter().collect()));
}

#[tokio::test]
async fn failed_delete_is_retried_on_next_observation() {
    let (gateway, store, engine) = synced_engine().await;
    gateway.fail_writes(true);

    store.remove(PRODUCTS, &rid("b"));
    assert!(engine.handle_local_change(PRODUCTS).await.is_err());
    assert_eq!(engine.snapshot(PRODUCTS).unwrap().len(), 3);

    gateway.fail_writes(false);
    let report = engine.handle_local_change(PRODUCTS).await.unwrap();

    assert_eq!(report.decision, DeletionDecision::Delete(vec![rid("b")]));
    assert_eq!(gateway.ids(&tenant(), "products"), vec![rid("a"), rid("c")]);
}

// ── Append-only tables ───────────────────────────────────────────

#[tokio::test]
async fn new_log_entries_are_pushed_when_they_appear() {
    let (gateway, store, engine) = synced_engine().await;
    engine.handle_local_change(AUDIT_LOGS).await.unwrap();

    store.upsert(AUDIT_LOGS, Record::new("log-1", json!({ "action": "sale" })));
    let report = engine.handle_local_change(AUDIT_LOGS).await.unwrap();

    assert_eq!(report.pushed, vec![rid("log-1")]);
    assert_eq!(
        gateway.calls(),
        vec![GatewayCall::Upsert {
            table: "audit_logs".into(),
            ids: vec![rid("log-1")],
        }]
    );

    // a second observation of the same state pushes nothing
    let report = engine.handle_local_change(AUDIT_LOGS).await.unwrap();
    assert!(report.pushed.is_empty());
    assert_eq!(gateway.calls().len(), 1);
}

// ── Settings ─────────────────────────────────────────────────────

#[tokio::test]
async fn categories_are_deleted_by_slug() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let engine = ReconciliationEngine::new(tenant(), gateway.clone(), store.clone());

    store.set(
        CATEGORIES,
        vec![category("New Arrivals"), category("Hot Drinks")],
        ChangeOrigin::Local,
    );
    engine.handle_local_change(CATEGORIES).await.unwrap();

    store.set(CATEGORIES, vec![category("Hot Drinks")], ChangeOrigin::Local);
    let report = engine.handle_local_change(CATEGORIES).await.unwrap();

    assert_eq!(report.decision, DeletionDecision::Delete(vec![rid("new-arrivals")]));
    assert_eq!(
        gateway.delete_calls(),
        vec![GatewayCall::Delete {
            table: "categories".into(),
            ids: vec![rid("new-arrivals")],
        }]
    );
}

#[tokio::test]
async fn renaming_a_category_deletes_the_old_slug() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let engine = ReconciliationEngine::new(tenant(), gateway.clone(), store.clone());

    store.set(
        CATEGORIES,
        vec![category("Snacks"), category("Drinks")],
        ChangeOrigin::Local,
    );
    engine.handle_local_change(CATEGORIES).await.unwrap();

    // same record id, new display name
    let mut renamed = category("Snacks");
    renamed.data = json!({ "name": "Savoury Snacks" });
    store.set(CATEGORIES, vec![renamed, category("Drinks")], ChangeOrigin::Local);
    let report = engine.handle_local_change(CATEGORIES).await.unwrap();

    assert_eq!(report.decision.ids(), &[rid("snacks")]);
}

#[tokio::test]
async fn business_settings_never_issue_deletes() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let engine = ReconciliationEngine::new(tenant(), gateway.clone(), store.clone());

    store.set(
        BUSINESS,
        vec![Record::new("default", json!({ "currency": "EUR" }))],
        ChangeOrigin::Local,
    );
    engine.handle_local_change(BUSINESS).await.unwrap();
    store.set(BUSINESS, Vec::new(), ChangeOrigin::Local);
    let report = engine.handle_local_change(BUSINESS).await.unwrap();

    assert_eq!(report.decision, DeletionDecision::Unchanged);
    assert!(gateway.calls().is_empty());
}

// ── Concurrent sync ──────────────────────────────────────────────

/// Memory store whose next products read returns, then stalls the calling
/// thread before handing the records back.
#[derive(Default)]
struct StallingStore {
    inner: MemoryStore,
    stall_next_read: AtomicBool,
}

impl StallingStore {
    fn stall_next_read(&self) {
        self.stall_next_read.store(true, Ordering::SeqCst);
    }
}

impl LocalStateStore for StallingStore {
    fn get(&self, table: Table) -> Vec<Record> {
        let records = self.inner.get(table);
        if table == PRODUCTS && self.stall_next_read.swap(false, Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(300));
        }
        records
    }

    fn set(&self, table: Table, records: Vec<Record>, origin: ChangeOrigin) {
        self.inner.set(table, records, origin);
    }

    fn replace_all(&self, collections: Collections, origin: ChangeOrigin) {
        self.inner.replace_all(collections, origin);
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.subscribe()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_install_never_widens_a_local_delete() {
    let gateway = Arc::new(MockGateway::new());
    gateway.seed_records(
        &tenant(),
        DataTable::Products,
        &[product("a"), product("b"), product("c")],
    );
    let store = Arc::new(StallingStore::default());
    let engine = Arc::new(ReconciliationEngine::new(
        tenant(),
        gateway.clone(),
        store.clone(),
    ));
    engine.full_sync().await.unwrap();

    // another device adds d while this one removes b
    gateway.seed_records(&tenant(), DataTable::Products, &[product("d")]);
    assert!(store.remove(PRODUCTS, &rid("b")));
    gateway.clear_calls();
    store.stall_next_read();

    let watcher = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.handle_local_change(PRODUCTS).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let outcome = engine.full_sync().await.unwrap();
    let report = watcher.await.unwrap().unwrap();

    assert!(outcome.is_completed());
    assert_eq!(report.decision, DeletionDecision::Delete(vec![rid("b")]));
    assert_eq!(
        gateway.delete_calls(),
        vec![GatewayCall::Delete {
            table: "products".into(),
            ids: vec![rid("b")],
        }]
    );
    assert!(gateway.ids(&tenant(), "products").contains(&rid("d")));
    assert!(store.get(PRODUCTS).iter().any(|r| r.id == rid("d")));
    assert!(engine.snapshot(PRODUCTS).unwrap().contains(&rid("d")));
}

#[tokio::test(start_paused = true)]
async fn sync_during_remote_delete_keeps_its_snapshot() {
    let (gateway, store, engine) = synced_engine().await;
    gateway.seed_records(&tenant(), DataTable::Products, &[product("d")]);
    gateway.set_write_delay(Some(Duration::from_millis(100)));

    assert!(store.remove(PRODUCTS, &rid("b")));
    let (report, outcome) = tokio::join!(
        engine.handle_local_change(PRODUCTS),
        engine.sync_table(PRODUCTS)
    );

    assert_eq!(report.unwrap().decision, DeletionDecision::Delete(vec![rid("b")]));
    assert!(outcome.unwrap().is_completed());
    let snapshot = engine.snapshot(PRODUCTS).unwrap();
    assert!(snapshot.contains(&rid("d")));

    // a removal of the record the sync brought in still reaches the backend
    gateway.set_write_delay(None);
    gateway.clear_calls();
    assert!(store.remove(PRODUCTS, &rid("d")));
    let report = engine.handle_local_change(PRODUCTS).await.unwrap();

    assert_eq!(report.decision, DeletionDecision::Delete(vec![rid("d")]));
    assert!(!gateway.ids(&tenant(), "products").contains(&rid("d")));
}

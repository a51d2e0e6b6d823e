// ABOUTME: Tests for the reconciliation engine's diff cycle.
// ABOUTME: Covers create/update/delete passes, partial failures, and retries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::config::TenantConfig;
use crate::coordinator::LockCoordinator;
use crate::error::{PresenterError, ProviderError};
use crate::model::{Listing, LotteryPhase};
use crate::presenter::Presenter;
use crate::provider::ListingProvider;
use crate::store::RecordStore;

use super::reconcile::ReconciliationEngine;

fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn listing(sub_area: &str, area: &str, ward: u32, plot: u32, price: u64) -> Listing {
    Listing {
        region: "aether".to_string(),
        sub_area: sub_area.to_string(),
        area: area.to_string(),
        ward,
        plot,
        price: Some(price),
        size: Some("medium".to_string()),
        exclusive: None,
        phase: LotteryPhase::Running,
        phase_ends_at: Some(test_now() + Duration::hours(6)),
        entrants: Some(3),
    }
}

fn config(sub_areas: &[&str], areas: &[&str]) -> TenantConfig {
    TenantConfig {
        enabled: true,
        region: "aether".to_string(),
        sub_areas: sub_areas.iter().map(|s| s.to_string()).collect(),
        areas: areas.iter().map(|s| s.to_string()).collect(),
        container_id: "forum-9".to_string(),
        times_per_day: 2,
        interval_minutes: 180,
        notify_targets: vec![],
    }
}

/// Provider serving a scripted listing set per sub-area, with per-sub-area
/// failure injection.
#[derive(Default)]
struct ScriptedProvider {
    listings: std::sync::Mutex<HashMap<String, Vec<Listing>>>,
    failing: std::sync::Mutex<HashSet<String>>,
    fetches: AtomicUsize,
}

impl ScriptedProvider {
    fn set(&self, sub_area: &str, listings: Vec<Listing>) {
        self.listings
            .lock()
            .unwrap()
            .insert(sub_area.to_string(), listings);
    }

    fn fail(&self, sub_area: &str) {
        self.failing.lock().unwrap().insert(sub_area.to_string());
    }

    fn recover(&self, sub_area: &str) {
        self.failing.lock().unwrap().remove(sub_area);
    }
}

#[async_trait]
impl ListingProvider for ScriptedProvider {
    async fn fetch(&self, region: &str, sub_area: &str) -> Result<Vec<Listing>, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(sub_area) {
            return Err(ProviderError::Unavailable {
                region: region.to_string(),
                sub_area: sub_area.to_string(),
                reason: "scripted outage".to_string(),
            });
        }
        Ok(self
            .listings
            .lock()
            .unwrap()
            .get(sub_area)
            .cloned()
            .unwrap_or_default())
    }
}

/// Presenter recording every call, with per-operation failure injection.
#[derive(Default)]
struct MockPresenter {
    next_container: AtomicUsize,
    next_message: AtomicUsize,
    calls: std::sync::Mutex<Vec<String>>,
    failing_ops: std::sync::Mutex<HashSet<&'static str>>,
    dead_containers: std::sync::Mutex<HashSet<String>>,
}

impl MockPresenter {
    fn fail(&self, op: &'static str) {
        self.failing_ops.lock().unwrap().insert(op);
    }

    fn recover(&self, op: &'static str) {
        self.failing_ops.lock().unwrap().remove(op);
    }

    fn kill_container(&self, container_id: &str) {
        self.dead_containers
            .lock()
            .unwrap()
            .insert(container_id.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count_of(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn check(&self, op: &'static str) -> Result<(), PresenterError> {
        if self.failing_ops.lock().unwrap().contains(op) {
            return Err(PresenterError::Operation(anyhow::anyhow!(
                "scripted {op} failure"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Presenter for MockPresenter {
    async fn create_container(
        &self,
        root_id: &str,
        area: &str,
    ) -> Result<String, PresenterError> {
        self.check("create_container")?;
        let id = format!("thread-{}", self.next_container.fetch_add(1, Ordering::SeqCst));
        self.calls
            .lock()
            .unwrap()
            .push(format!("create_container:{root_id}:{area}:{id}"));
        Ok(id)
    }

    async fn resolve_container(
        &self,
        container_id: &str,
    ) -> Result<Option<String>, PresenterError> {
        self.check("resolve_container")?;
        self.calls
            .lock()
            .unwrap()
            .push(format!("resolve_container:{container_id}"));
        if self.dead_containers.lock().unwrap().contains(container_id) {
            return Ok(None);
        }
        Ok(Some(container_id.to_string()))
    }

    async fn post_message(
        &self,
        container_id: &str,
        listing: &Listing,
    ) -> Result<String, PresenterError> {
        self.check("post_message")?;
        let id = format!("msg-{}", self.next_message.fetch_add(1, Ordering::SeqCst));
        self.calls
            .lock()
            .unwrap()
            .push(format!("post_message:{container_id}:{}:{id}", listing.key()));
        Ok(id)
    }

    async fn edit_message(
        &self,
        container_id: &str,
        message_id: &str,
        listing: &Listing,
    ) -> Result<(), PresenterError> {
        self.check("edit_message")?;
        self.calls.lock().unwrap().push(format!(
            "edit_message:{container_id}:{message_id}:{}",
            listing.key()
        ));
        Ok(())
    }

    async fn delete_message(
        &self,
        container_id: &str,
        message_id: &str,
    ) -> Result<(), PresenterError> {
        self.check("delete_message")?;
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete_message:{container_id}:{message_id}"));
        Ok(())
    }
}

struct Fixture {
    provider: Arc<ScriptedProvider>,
    presenter: Arc<MockPresenter>,
    store: Arc<RecordStore>,
    engine: ReconciliationEngine,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::default());
    let presenter = Arc::new(MockPresenter::default());
    let store = Arc::new(RecordStore::new(dir.path().join("records.json")));
    let engine = ReconciliationEngine::new(
        provider.clone(),
        presenter.clone(),
        store.clone(),
        Arc::new(LockCoordinator::new()),
    );
    Fixture {
        provider,
        presenter,
        store,
        engine,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_creates_new_listings_with_one_container_per_area() {
    let fx = fixture();
    let k1 = listing("gilgamesh", "mist", 1, 1, 1_000_000);
    let k2 = listing("gilgamesh", "empyreum", 2, 5, 2_000_000);
    fx.provider.set("gilgamesh", vec![k1.clone(), k2.clone()]);

    let config = config(&["gilgamesh"], &["mist", "empyreum"]);
    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;

    assert_eq!(summary.created, 2);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.errors, 0);

    let state = fx.store.load("g1").await.unwrap();
    assert_eq!(state.container_root_id, "forum-9");
    assert_eq!(state.containers.len(), 2);
    let mist_container = &state.records[&k1.key()].container_id;
    let empyreum_container = &state.records[&k2.key()].container_id;
    assert_ne!(mist_container, empyreum_container);
    assert_eq!(state.records[&k1.key()].content_hash, k1.content_hash());
}

#[tokio::test]
async fn test_second_run_with_unchanged_listings_is_noop() {
    let fx = fixture();
    fx.provider.set(
        "gilgamesh",
        vec![
            listing("gilgamesh", "mist", 1, 1, 1_000_000),
            listing("gilgamesh", "mist", 1, 2, 1_500_000),
        ],
    );
    let config = config(&["gilgamesh"], &["mist"]);

    let first = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(first.created, 2);

    let second = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.deleted, 0);
    assert_eq!(second.errors, 0);
}

#[tokio::test]
async fn test_update_and_delete_in_one_cycle() {
    let fx = fixture();
    let k1 = listing("gilgamesh", "mist", 1, 1, 1_000_000);
    let k2 = listing("gilgamesh", "mist", 1, 2, 1_500_000);
    fx.provider.set("gilgamesh", vec![k1.clone(), k2.clone()]);
    let config = config(&["gilgamesh"], &["mist"]);

    fx.engine.reconcile_at("g1", &config, test_now()).await;

    // K1 disappears, K2's price drops.
    let mut k2_changed = k2.clone();
    k2_changed.price = Some(1_200_000);
    fx.provider.set("gilgamesh", vec![k2_changed.clone()]);

    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.errors, 0);

    let state = fx.store.load("g1").await.unwrap();
    assert!(!state.records.contains_key(&k1.key()));
    assert_eq!(
        state.records[&k2.key()].content_hash,
        k2_changed.content_hash()
    );
}

#[tokio::test]
async fn test_ended_phase_deletes_existing_listing() {
    let fx = fixture();
    let k3 = listing("gilgamesh", "mist", 2, 7, 3_000_000);
    fx.provider.set("gilgamesh", vec![k3.clone()]);
    let config = config(&["gilgamesh"], &["mist"]);

    fx.engine.reconcile_at("g1", &config, test_now()).await;

    // Phase ends one second before the next cycle; the listing is still in
    // the fresh set but must be reaped.
    let mut ended = k3.clone();
    ended.phase_ends_at = Some(test_now() - Duration::seconds(1));
    fx.provider.set("gilgamesh", vec![ended]);

    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.created, 0);

    let state = fx.store.load("g1").await.unwrap();
    assert!(!state.records.contains_key(&k3.key()));
}

#[tokio::test]
async fn test_ended_phase_is_never_created() {
    let fx = fixture();
    let mut ended = listing("gilgamesh", "mist", 2, 7, 3_000_000);
    ended.phase_ends_at = Some(test_now() - Duration::seconds(1));
    fx.provider.set("gilgamesh", vec![ended.clone()]);
    let config = config(&["gilgamesh"], &["mist"]);

    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.created, 0);
    assert_eq!(summary.deleted, 0);

    let state = fx.store.load("g1").await.unwrap();
    assert!(!state.records.contains_key(&ended.key()));
    assert_eq!(fx.presenter.count_of("post_message"), 0);
}

#[tokio::test]
async fn test_provider_outage_keeps_existing_records() {
    let fx = fixture();
    let siren = listing("siren", "mist", 1, 1, 1_000_000);
    let gilga = listing("gilgamesh", "mist", 1, 2, 2_000_000);
    fx.provider.set("siren", vec![siren.clone()]);
    fx.provider.set("gilgamesh", vec![gilga.clone()]);
    let config = config(&["siren", "gilgamesh"], &["mist"]);

    fx.engine.reconcile_at("g1", &config, test_now()).await;

    // Siren's fetch fails; its record must survive the cycle untouched.
    fx.provider.fail("siren");
    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.deleted, 0);

    let state = fx.store.load("g1").await.unwrap();
    assert!(state.records.contains_key(&siren.key()));
    assert!(state.records.contains_key(&gilga.key()));

    // After recovery the listing is still known, not recreated.
    fx.provider.recover("siren");
    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.created, 0);
    assert_eq!(summary.errors, 0);
}

#[tokio::test]
async fn test_unconfigured_area_is_invisible_not_deleted() {
    let fx = fixture();
    let mist = listing("gilgamesh", "mist", 1, 1, 1_000_000);
    fx.provider.set("gilgamesh", vec![mist.clone()]);

    let wide = config(&["gilgamesh"], &["mist"]);
    fx.engine.reconcile_at("g1", &wide, test_now()).await;

    // The tenant narrows its configuration to a different area; the old
    // record must be left alone.
    fx.provider.set("gilgamesh", vec![]);
    let narrow = config(&["gilgamesh"], &["empyreum"]);
    let summary = fx.engine.reconcile_at("g1", &narrow, test_now()).await;
    assert_eq!(summary.deleted, 0);

    let state = fx.store.load("g1").await.unwrap();
    assert!(state.records.contains_key(&mist.key()));
    assert_eq!(fx.presenter.count_of("delete_message"), 0);
}

#[tokio::test]
async fn test_failed_delete_keeps_record_for_retry() {
    let fx = fixture();
    let k1 = listing("gilgamesh", "mist", 1, 1, 1_000_000);
    fx.provider.set("gilgamesh", vec![k1.clone()]);
    let config = config(&["gilgamesh"], &["mist"]);

    fx.engine.reconcile_at("g1", &config, test_now()).await;

    fx.provider.set("gilgamesh", vec![]);
    fx.presenter.fail("delete_message");
    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.errors, 1);
    assert!(
        fx.store
            .load("g1")
            .await
            .unwrap()
            .records
            .contains_key(&k1.key())
    );

    fx.presenter.recover("delete_message");
    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.deleted, 1);
    assert!(fx.store.load("g1").await.unwrap().records.is_empty());
}

#[tokio::test]
async fn test_failed_edit_keeps_old_hash_for_retry() {
    let fx = fixture();
    let k1 = listing("gilgamesh", "mist", 1, 1, 1_000_000);
    fx.provider.set("gilgamesh", vec![k1.clone()]);
    let config = config(&["gilgamesh"], &["mist"]);

    fx.engine.reconcile_at("g1", &config, test_now()).await;

    let mut changed = k1.clone();
    changed.price = Some(900_000);
    fx.provider.set("gilgamesh", vec![changed.clone()]);

    fx.presenter.fail("edit_message");
    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.errors, 1);
    assert_eq!(
        fx.store.load("g1").await.unwrap().records[&k1.key()].content_hash,
        k1.content_hash()
    );

    fx.presenter.recover("edit_message");
    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.updated, 1);
    assert_eq!(
        fx.store.load("g1").await.unwrap().records[&k1.key()].content_hash,
        changed.content_hash()
    );
}

#[tokio::test]
async fn test_failed_post_stores_no_record_and_retries() {
    let fx = fixture();
    let k1 = listing("gilgamesh", "mist", 1, 1, 1_000_000);
    fx.provider.set("gilgamesh", vec![k1.clone()]);
    let config = config(&["gilgamesh"], &["mist"]);

    fx.presenter.fail("post_message");
    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.created, 0);
    assert_eq!(summary.errors, 1);
    assert!(fx.store.load("g1").await.unwrap().records.is_empty());

    fx.presenter.recover("post_message");
    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.created, 1);
}

#[tokio::test]
async fn test_dead_container_is_recreated() {
    let fx = fixture();
    let k1 = listing("gilgamesh", "mist", 1, 1, 1_000_000);
    fx.provider.set("gilgamesh", vec![k1.clone()]);
    let config = config(&["gilgamesh"], &["mist"]);

    fx.engine.reconcile_at("g1", &config, test_now()).await;
    let first_container = fx.store.load("g1").await.unwrap().containers["mist"].clone();

    // The container disappears; the next new listing in that area must get
    // a fresh one.
    fx.presenter.kill_container(&first_container);
    let k2 = listing("gilgamesh", "mist", 1, 2, 2_000_000);
    fx.provider.set("gilgamesh", vec![k1.clone(), k2.clone()]);

    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.created, 1);

    let state = fx.store.load("g1").await.unwrap();
    assert_ne!(state.containers["mist"], first_container);
    assert_eq!(state.records[&k2.key()].container_id, state.containers["mist"]);
}

#[tokio::test]
async fn test_unreadable_store_aborts_cycle() {
    let fx = fixture();
    std::fs::write(fx.store.path(), b"{ not json").unwrap();

    let k1 = listing("gilgamesh", "mist", 1, 1, 1_000_000);
    fx.provider.set("gilgamesh", vec![k1]);
    let config = config(&["gilgamesh"], &["mist"]);

    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.created, 0);
    assert!(fx.presenter.calls().is_empty());
}

#[tokio::test]
async fn test_expires_at_tracks_phase_end() {
    let fx = fixture();
    let k1 = listing("gilgamesh", "mist", 1, 1, 1_000_000);
    fx.provider.set("gilgamesh", vec![k1.clone()]);
    let config = config(&["gilgamesh"], &["mist"]);

    fx.engine.reconcile_at("g1", &config, test_now()).await;
    let state = fx.store.load("g1").await.unwrap();
    assert_eq!(state.records[&k1.key()].expires_at, k1.phase_ends_at);

    // Phase end moves; the stored expiry must follow the update.
    let mut extended = k1.clone();
    extended.phase_ends_at = Some(test_now() + Duration::hours(12));
    fx.provider.set("gilgamesh", vec![extended.clone()]);

    let summary = fx.engine.reconcile_at("g1", &config, test_now()).await;
    assert_eq!(summary.updated, 1);
    let state = fx.store.load("g1").await.unwrap();
    assert_eq!(state.records[&k1.key()].expires_at, extended.phase_ends_at);
}

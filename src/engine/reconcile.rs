// ABOUTME: Diff-based reconciliation of fresh listings against persisted
// ABOUTME: records: reap stale messages, update changed ones, create new
// ABOUTME: ones, then persist. Per-item failures never abort the batch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::TenantConfig;
use crate::coordinator::LockCoordinator;
use crate::error::PresenterError;
use crate::model::{Listing, ListingKey, ListingRecord, TenantStore};
use crate::presenter::Presenter;
use crate::provider::ListingProvider;
use crate::store::RecordStore;

/// Lock key for a tenant's reconciliation runs.
pub fn sync_key(tenant: &str) -> String {
    format!("sync:{tenant}")
}

/// Lock key for a tenant's setup operation.
///
/// Reconciliation declares this as a block-with key, so setup and
/// reconciliation for the same tenant never interleave.
pub fn setup_key(tenant: &str) -> String {
    format!("setup:{tenant}")
}

/// Lock key for a tenant's reset operation, see [`setup_key`].
pub fn reset_key(tenant: &str) -> String {
    format!("reset:{tenant}")
}

/// Outcome counts of one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: usize,
}

/// Keeps a tenant's outward messages converged to the external listing source.
///
/// One `reconcile` call is a full fetch-diff-apply-persist pass, run under
/// the tenant's lock keys so a manual trigger and a scheduler tick can never
/// interleave. The engine is shared across tenants; all per-tenant state
/// lives in the [`RecordStore`] document.
pub struct ReconciliationEngine {
    provider: Arc<dyn ListingProvider>,
    presenter: Arc<dyn Presenter>,
    store: Arc<RecordStore>,
    locks: Arc<LockCoordinator>,
}

impl ReconciliationEngine {
    /// Create an engine over the given collaborators.
    pub fn new(
        provider: Arc<dyn ListingProvider>,
        presenter: Arc<dyn Presenter>,
        store: Arc<RecordStore>,
        locks: Arc<LockCoordinator>,
    ) -> Self {
        Self {
            provider,
            presenter,
            store,
            locks,
        }
    }

    /// The coordinator serializing this engine's runs.
    ///
    /// External setup/reset operations take their own key plus
    /// [`sync_key`] through the same coordinator to block out a
    /// concurrent reconciliation.
    pub fn coordinator(&self) -> &Arc<LockCoordinator> {
        &self.locks
    }

    /// Run one reconciliation cycle for a tenant.
    pub async fn reconcile(&self, tenant: &str, config: &TenantConfig) -> SyncSummary {
        self.reconcile_at(tenant, config, Utc::now()).await
    }

    /// Run one reconciliation cycle with an explicit clock, for tests and
    /// the scheduler.
    pub async fn reconcile_at(
        &self,
        tenant: &str,
        config: &TenantConfig,
        now: DateTime<Utc>,
    ) -> SyncSummary {
        let keys = vec![sync_key(tenant), setup_key(tenant), reset_key(tenant)];
        self.locks.run(keys, self.run_cycle(tenant, config, now)).await
    }

    async fn run_cycle(
        &self,
        tenant: &str,
        config: &TenantConfig,
        now: DateTime<Utc>,
    ) -> SyncSummary {
        let mut summary = SyncSummary::default();

        let mut state = match self.store.load(tenant).await {
            Ok(state) => state,
            Err(err) => {
                // An unreadable store must not be mistaken for a first run:
                // diffing against a wrongly-empty record set would repost
                // every message.
                warn!(tenant, error = %err, "record load failed, skipping cycle");
                summary.errors += 1;
                return summary;
            }
        };
        state.container_root_id = config.container_id.clone();

        let (mut fresh, failed_sub_areas) = self.fetch_fresh(config, &mut summary).await;

        self.reap_pass(
            config,
            now,
            &mut state,
            &mut fresh,
            &failed_sub_areas,
            &mut summary,
        )
        .await;
        self.create_pass(&mut state, fresh, &mut summary).await;

        // Persist unconditionally: the mutated state is the best current
        // knowledge even when individual presenter calls failed.
        if let Err(err) = self.store.save(tenant, &state).await {
            warn!(tenant, error = %err, "record save failed");
            summary.errors += 1;
        }

        debug!(
            tenant,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            errors = summary.errors,
            "reconciliation cycle finished"
        );
        summary
    }

    /// Fetch every configured sub-area, merging listings of configured areas
    /// into one map by key. Failed sub-areas are returned so the reap pass
    /// can leave their records alone for this cycle.
    async fn fetch_fresh(
        &self,
        config: &TenantConfig,
        summary: &mut SyncSummary,
    ) -> (HashMap<ListingKey, Listing>, HashSet<String>) {
        let mut fresh = HashMap::new();
        let mut failed = HashSet::new();

        for sub_area in &config.sub_areas {
            match self.provider.fetch(&config.region, sub_area).await {
                Ok(listings) => {
                    for listing in listings {
                        if !config.has_area(&listing.area) {
                            continue;
                        }
                        fresh.insert(listing.key(), listing);
                    }
                }
                Err(err) => {
                    warn!(sub_area = %sub_area, error = %err, "listing fetch failed, skipping sub-area");
                    failed.insert(sub_area.clone());
                    summary.errors += 1;
                }
            }
        }

        (fresh, failed)
    }

    /// Walk the persisted records: delete what is gone or ended, update what
    /// changed, and drain every represented key out of `fresh` so only
    /// genuinely new listings remain for the create pass.
    async fn reap_pass(
        &self,
        config: &TenantConfig,
        now: DateTime<Utc>,
        state: &mut TenantStore,
        fresh: &mut HashMap<ListingKey, Listing>,
        failed_sub_areas: &HashSet<String>,
        summary: &mut SyncSummary,
    ) {
        let keys: Vec<ListingKey> = state.records.keys().cloned().collect();
        for key in keys {
            // Unconfigured areas are invisible, not deleted.
            if !config.has_area(&key.area) {
                continue;
            }
            // A sub-area whose fetch failed has no authoritative fresh set
            // this cycle; leave its records for the next run.
            if failed_sub_areas.contains(&key.sub_area) {
                continue;
            }

            let Some(record) = state.records.get(&key) else {
                continue;
            };
            let container_id = record.container_id.clone();
            let message_id = record.message_id.clone();
            let stored_hash = record.content_hash.clone();

            match fresh.get(&key).cloned() {
                None => {
                    self.delete_record(state, &key, &container_id, &message_id, summary)
                        .await;
                }
                Some(listing) if listing.phase_ended(now) => {
                    // Already retired; must not be recreated by the create pass.
                    fresh.remove(&key);
                    self.delete_record(state, &key, &container_id, &message_id, summary)
                        .await;
                }
                Some(listing) => {
                    let new_hash = listing.content_hash();
                    if new_hash != stored_hash {
                        match self
                            .presenter
                            .edit_message(&container_id, &message_id, &listing)
                            .await
                        {
                            Ok(()) => {
                                if let Some(record) = state.records.get_mut(&key) {
                                    record.content_hash = new_hash;
                                    record.expires_at = listing.phase_ends_at;
                                }
                                summary.updated += 1;
                            }
                            Err(err) => {
                                // Old hash stays, so the edit is retried
                                // next cycle.
                                warn!(key = %key, error = %err, "message edit failed");
                                summary.errors += 1;
                            }
                        }
                    }
                    fresh.remove(&key);
                }
            }
        }
    }

    async fn delete_record(
        &self,
        state: &mut TenantStore,
        key: &ListingKey,
        container_id: &str,
        message_id: &str,
        summary: &mut SyncSummary,
    ) {
        match self.presenter.delete_message(container_id, message_id).await {
            Ok(()) => {
                state.records.remove(key);
                summary.deleted += 1;
            }
            Err(err) => {
                // Record stays so the delete is retried next cycle.
                warn!(key = %key, error = %err, "message delete failed");
                summary.errors += 1;
            }
        }
    }

    /// Post everything left in `fresh`, grouped by area so each area's
    /// container is resolved or created once.
    async fn create_pass(
        &self,
        state: &mut TenantStore,
        fresh: HashMap<ListingKey, Listing>,
        summary: &mut SyncSummary,
    ) {
        let mut by_area: BTreeMap<String, Vec<Listing>> = BTreeMap::new();
        for (_, listing) in fresh {
            by_area.entry(listing.area.clone()).or_default().push(listing);
        }

        for (area, mut listings) in by_area {
            listings.sort_by_key(|listing| (listing.ward, listing.plot));

            let container_id = match self.area_container(state, &area).await {
                Ok(id) => id,
                Err(err) => {
                    warn!(area = %area, error = %err, "container unavailable, skipping area");
                    summary.errors += listings.len();
                    continue;
                }
            };

            for listing in listings {
                match self.presenter.post_message(&container_id, &listing).await {
                    Ok(message_id) => {
                        state.records.insert(
                            listing.key(),
                            ListingRecord {
                                container_id: container_id.clone(),
                                message_id,
                                content_hash: listing.content_hash(),
                                expires_at: listing.phase_ends_at,
                            },
                        );
                        summary.created += 1;
                    }
                    Err(err) => {
                        // No record stored; the post is retried next cycle.
                        warn!(key = %listing.key(), error = %err, "message post failed");
                        summary.errors += 1;
                    }
                }
            }
        }
    }

    /// Reuse the tracked container for an area if it still resolves,
    /// otherwise create one and record its id.
    async fn area_container(
        &self,
        state: &mut TenantStore,
        area: &str,
    ) -> Result<String, PresenterError> {
        if let Some(existing) = state.containers.get(area).cloned()
            && let Some(resolved) = self.presenter.resolve_container(&existing).await?
        {
            if resolved != existing {
                state.containers.insert(area.to_string(), resolved.clone());
            }
            return Ok(resolved);
        }

        let created = self
            .presenter
            .create_container(&state.container_root_id, area)
            .await?;
        state.containers.insert(area.to_string(), created.clone());
        Ok(created)
    }
}

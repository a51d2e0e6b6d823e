// ABOUTME: Rate-limited recurring scheduler for reconciliation runs.
// ABOUTME: Driven by an external fixed-period tick; state is in-memory only
// ABOUTME: and resets on the UTC day boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{TenantConfig, TenantConfigData};
use crate::engine::ReconciliationEngine;

/// Source of the current tenant configurations, polled once per tick.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// The raw configuration of every known tenant.
    async fn tenants(&self) -> HashMap<String, TenantConfigData>;
}

/// In-memory scheduling state for one tenant.
///
/// Not persisted: after a process restart the worst case is one extra run.
struct TenantSchedule {
    last_run_at: Option<DateTime<Utc>>,
    runs_today: u32,
    day_stamp: NaiveDate,
}

/// Per-tenant periodic trigger for reconciliation.
///
/// Each tick walks every configured tenant and starts a reconciliation run
/// when the tenant is enabled, the minimum inter-run gap has passed, and the
/// daily run cap is not yet reached for the current UTC day. Runs for the
/// same tenant are additionally serialized by the engine's lock keys, so a
/// slow manual trigger and a tick never overlap.
pub struct Scheduler {
    engine: Arc<ReconciliationEngine>,
    state: Mutex<HashMap<String, TenantSchedule>>,
}

impl Scheduler {
    /// Create a scheduler over the given engine.
    pub fn new(engine: Arc<ReconciliationEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Process one tick for all tenants at the current time.
    pub async fn tick(&self, configs: &HashMap<String, TenantConfigData>) {
        self.tick_at(configs, Utc::now()).await;
    }

    /// Process one tick with an explicit clock, for tests.
    pub async fn tick_at(&self, configs: &HashMap<String, TenantConfigData>, now: DateTime<Utc>) {
        for (tenant, data) in configs {
            // Invalid or disabled tenants are skipped silently; this is a
            // configuration state, not an error.
            let Ok(config) = data.validate() else {
                continue;
            };
            if !config.enabled {
                continue;
            }

            if !self.claim_run(tenant, &config, now).await {
                continue;
            }

            let summary = self.engine.reconcile_at(tenant, &config, now).await;
            if summary.errors > 0 {
                warn!(
                    tenant = %tenant,
                    errors = summary.errors,
                    "reconciliation finished with errors"
                );
            } else {
                debug!(
                    tenant = %tenant,
                    created = summary.created,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    "reconciliation finished"
                );
            }

            self.mark_completed(tenant, now).await;
        }
    }

    /// Drive ticks from a fixed-period timer until the task is dropped.
    pub async fn run(&self, source: Arc<dyn ConfigSource>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let configs = source.tenants().await;
            self.tick(&configs).await;
        }
    }

    /// Gap and cap check. Returns true when a run should start now.
    async fn claim_run(
        &self,
        tenant: &str,
        config: &TenantConfig,
        now: DateTime<Utc>,
    ) -> bool {
        let mut state = self.state.lock().await;
        let schedule = state
            .entry(tenant.to_string())
            .or_insert_with(|| TenantSchedule {
                last_run_at: None,
                runs_today: 0,
                day_stamp: now.date_naive(),
            });

        // UTC day rollover resets the cap before the check.
        if schedule.day_stamp != now.date_naive() {
            schedule.day_stamp = now.date_naive();
            schedule.runs_today = 0;
        }

        if schedule.runs_today >= config.times_per_day {
            return false;
        }
        if let Some(last) = schedule.last_run_at
            && now - last < chrono::Duration::minutes(config.interval_minutes)
        {
            return false;
        }
        true
    }

    /// Account for a finished run, regardless of its outcome.
    async fn mark_completed(&self, tenant: &str, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(schedule) = state.get_mut(tenant) {
            if schedule.day_stamp != now.date_naive() {
                schedule.day_stamp = now.date_naive();
                schedule.runs_today = 0;
            }
            schedule.last_run_at = Some(now);
            schedule.runs_today += 1;
        }
    }
}

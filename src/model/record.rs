// ABOUTME: Persisted reconciliation state: per-listing records and the
// ABOUTME: per-tenant store, with wire names matching the JSON document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ListingKey;

/// Persisted state for one mirrored listing.
///
/// At most one live record exists per [`ListingKey`] per tenant. `expires_at`,
/// when present, equals the listing's phase-end timestamp at last sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    #[serde(rename = "threadId")]
    pub container_id: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(rename = "deleteAt", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// All reconciliation state for one tenant.
///
/// Created on first reconciliation, mutated only inside a reconciliation run
/// holding the tenant's lock, never deleted automatically. `containers` maps
/// area names to outward container ids (one container per area).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantStore {
    #[serde(rename = "containerRootId", default)]
    pub container_root_id: String,
    #[serde(rename = "threads", default)]
    pub containers: BTreeMap<String, String>,
    #[serde(rename = "messages", default)]
    pub records: BTreeMap<ListingKey, ListingRecord>,
}

impl TenantStore {
    /// True iff no listing has ever been recorded for this tenant.
    pub fn is_empty(&self) -> bool {
        self.container_root_id.is_empty() && self.containers.is_empty() && self.records.is_empty()
    }
}

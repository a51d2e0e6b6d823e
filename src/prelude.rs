// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use plotsync::prelude::*;` to get started quickly.

pub use crate::config::{TenantConfig, TenantConfigData};
pub use crate::coordinator::LockCoordinator;
pub use crate::engine::{ReconciliationEngine, SyncSummary, reset_key, setup_key, sync_key};
pub use crate::error::{ConfigError, PresenterError, ProviderError, StoreError, SyncError};
pub use crate::model::{Listing, ListingKey, ListingRecord, LotteryPhase, TenantStore};
pub use crate::presenter::Presenter;
pub use crate::provider::ListingProvider;
pub use crate::scheduler::{ConfigSource, Scheduler};
pub use crate::store::RecordStore;

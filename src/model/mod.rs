// ABOUTME: Data model module for listings and persisted reconciliation state.
// ABOUTME: Contains listing identity, content hashing, and record types.

mod listing;
mod record;

pub use listing::{Listing, ListingKey, LotteryPhase, ParseListingKeyError};
pub use record::{ListingRecord, TenantStore};

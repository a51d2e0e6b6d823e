// ABOUTME: Persistence module for reconciliation state.
// ABOUTME: One JSON document on disk, whole-document reads and atomic writes.

mod record_store;

pub use record_store::RecordStore;

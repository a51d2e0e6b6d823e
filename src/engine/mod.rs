// ABOUTME: Reconciliation module keeping outward messages mirrored to the
// ABOUTME: external listing source via a diff of fresh listings vs records.

mod reconcile;

pub use reconcile::{ReconciliationEngine, SyncSummary, reset_key, setup_key, sync_key};

#[cfg(test)]
mod reconcile_test;

// ABOUTME: Coordinator module for serializing named tasks.
// ABOUTME: Contains the keyed lock primitive used around reconciliation runs.

mod lock;

pub use lock::LockCoordinator;

// ABOUTME: Root module for plotsync - listing synchronization engine.
// ABOUTME: Re-exports all public types from submodules.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod model;
pub mod prelude;
pub mod presenter;
pub mod provider;
pub mod scheduler;
pub mod store;

pub use error::SyncError;

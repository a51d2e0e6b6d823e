// ABOUTME: Tenant configuration module with a single parse/validate boundary.
// ABOUTME: Raw serde data becomes a fully-typed config or a skip-state error.

mod tenant;

pub use tenant::{TenantConfig, TenantConfigData};

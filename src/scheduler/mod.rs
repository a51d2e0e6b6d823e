// ABOUTME: Scheduler module driving per-tenant reconciliation on a timer.
// ABOUTME: Enforces a daily run cap and a minimum inter-run gap per tenant.

mod scheduler;

pub use scheduler::{ConfigSource, Scheduler};

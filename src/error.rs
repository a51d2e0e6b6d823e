// ABOUTME: Defines all error types for the plotsync library using thiserror.
// ABOUTME: Each concern has its own error enum, unified under SyncError.

/// Top-level error type for the plotsync library.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Presenter error: {0}")]
    Presenter(#[from] PresenterError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from listing provider fetches.
///
/// Always scoped to a single sub-area: one unavailable sub-area never
/// aborts reconciliation of the others.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider unavailable for {region}/{sub_area}: {reason}")]
    Unavailable {
        region: String,
        sub_area: String,
        reason: String,
    },

    #[error("provider request failed: {0}")]
    Request(#[source] anyhow::Error),
}

/// Errors from outward-message operations.
#[derive(Debug, thiserror::Error)]
pub enum PresenterError {
    #[error("container for area '{area}' could not be created or resolved: {reason}")]
    Container { area: String, reason: String },

    #[error("message operation failed: {0}")]
    Operation(#[source] anyhow::Error),
}

/// Errors from the persisted record document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from tenant configuration validation.
///
/// A tenant with an invalid configuration is skipped for the whole cycle;
/// partially-validated configuration never reaches the engine.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("timesPerDay must be between 1 and 8, got {0}")]
    TimesPerDayOutOfRange(u32),

    #[error("intervalMinutes must be between 180 and 1440, got {0}")]
    IntervalOutOfRange(i64),
}

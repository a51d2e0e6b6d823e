// ABOUTME: Raw and validated tenant configuration types.
// ABOUTME: Validation happens once at the boundary; the engine only sees
// ABOUTME: fully-typed configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bounds for `timesPerDay`.
pub const TIMES_PER_DAY_RANGE: std::ops::RangeInclusive<u32> = 1..=8;
/// Bounds for `intervalMinutes`.
pub const INTERVAL_MINUTES_RANGE: std::ops::RangeInclusive<i64> = 180..=1440;

/// Tenant configuration as stored, before validation.
///
/// Every field is optional or defaultable so that a partially filled-in
/// configuration still deserializes; [`TenantConfigData::validate`] decides
/// whether it is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantConfigData {
    pub enabled: bool,
    pub region: Option<String>,
    pub sub_areas: Vec<String>,
    pub areas: Vec<String>,
    pub container_id: Option<String>,
    pub times_per_day: Option<u32>,
    pub interval_minutes: Option<i64>,
    pub notify_targets: Vec<String>,
}

impl TenantConfigData {
    /// Validate into a fully-typed [`TenantConfig`].
    ///
    /// Returns the first violation found. Callers treat any error as "skip
    /// this tenant"; the distinction between variants is for logging only.
    pub fn validate(&self) -> Result<TenantConfig, ConfigError> {
        let region = match self.region.as_deref() {
            None => return Err(ConfigError::MissingField("region")),
            Some("") => return Err(ConfigError::EmptyField("region")),
            Some(region) => region.to_string(),
        };
        let container_id = match self.container_id.as_deref() {
            None => return Err(ConfigError::MissingField("containerId")),
            Some("") => return Err(ConfigError::EmptyField("containerId")),
            Some(id) => id.to_string(),
        };
        if self.sub_areas.is_empty() {
            return Err(ConfigError::EmptyField("subAreas"));
        }
        if self.areas.is_empty() {
            return Err(ConfigError::EmptyField("areas"));
        }

        let times_per_day = self
            .times_per_day
            .ok_or(ConfigError::MissingField("timesPerDay"))?;
        if !TIMES_PER_DAY_RANGE.contains(&times_per_day) {
            return Err(ConfigError::TimesPerDayOutOfRange(times_per_day));
        }

        let interval_minutes = self
            .interval_minutes
            .ok_or(ConfigError::MissingField("intervalMinutes"))?;
        if !INTERVAL_MINUTES_RANGE.contains(&interval_minutes) {
            return Err(ConfigError::IntervalOutOfRange(interval_minutes));
        }

        Ok(TenantConfig {
            enabled: self.enabled,
            region,
            sub_areas: self.sub_areas.clone(),
            areas: self.areas.clone(),
            container_id,
            times_per_day,
            interval_minutes,
            notify_targets: self.notify_targets.clone(),
        })
    }
}

/// Validated tenant configuration.
///
/// Produced only by [`TenantConfigData::validate`]; every field is present
/// and in range.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantConfig {
    pub enabled: bool,
    pub region: String,
    pub sub_areas: Vec<String>,
    pub areas: Vec<String>,
    pub container_id: String,
    pub times_per_day: u32,
    pub interval_minutes: i64,
    pub notify_targets: Vec<String>,
}

impl TenantConfig {
    /// True iff `area` is part of this tenant's configured scope.
    ///
    /// Unconfigured areas are invisible to reconciliation: never fetched,
    /// never reaped.
    pub fn has_area(&self, area: &str) -> bool {
        self.areas.iter().any(|a| a == area)
    }
}

//! Engine configuration.

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};
use crate::expander::DEFAULT_MAX_OCCURRENCES;

/// Default deadline for one batch commit.
pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 30_000;

/// Tunables shared by the builder, editor and commit coordinator.
///
/// Loaded from JSON; every field is optional and falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// IANA timezone of the facility. Wall-clock times are interpreted in it
    /// and it is carried on every draft sent for persistence.
    pub facility_timezone: String,
    /// Hard cap on dates a single recurrence may generate.
    pub max_occurrences: usize,
    /// Deadline for the batch persistence step.
    pub commit_timeout_ms: u64,
    /// Decrement authorization units across the preview, not just persisted usage.
    pub cumulative_authorization_units: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            facility_timezone: "UTC".to_string(),
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
            commit_timeout_ms: DEFAULT_COMMIT_TIMEOUT_MS,
            cumulative_authorization_units: true,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ScheduleError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`ScheduleError::InvalidConfig`] for an unknown timezone, a zero
    /// occurrence cap or a zero commit timeout.
    pub fn validate(&self) -> Result<()> {
        self.timezone()?;
        if self.max_occurrences == 0 {
            return Err(ScheduleError::InvalidConfig("maxOccurrences must be at least 1".to_string()));
        }
        if self.commit_timeout_ms == 0 {
            return Err(ScheduleError::InvalidConfig("commitTimeoutMs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.facility_timezone
            .parse()
            .map_err(|_| ScheduleError::InvalidConfig(format!("invalid timezone: {}", self.facility_timezone)))
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }
}

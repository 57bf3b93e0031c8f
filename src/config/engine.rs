//! Engine tuning: retries, caching and conversation limits

use chrono::FixedOffset;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::retry::RetryPolicy;

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Retries after the first attempt of an external call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Budget for a single attempt
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// How long fetched availability stays fresh
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Suspended workflows kept per user
    #[serde(default = "default_stack_cap")]
    pub stack_cap: usize,

    /// Turns of history kept per user
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Slots offered per message
    #[serde(default = "default_slot_limit")]
    pub slot_limit: usize,

    /// Days ahead searched for availability
    #[serde(default = "default_search_days")]
    pub search_days: u32,

    /// Clinic wall clock, minutes east of UTC
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl EngineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The clinic's UTC offset
    pub fn offset(&self) -> Result<FixedOffset, ValidationError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(ValidationError::InvalidUtcOffset(self.utc_offset_minutes))
    }

    /// Validate engine configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_retries > 5 {
            return Err(ValidationError::OutOfRange("ENGINE__MAX_RETRIES"));
        }
        if self.backoff_multiplier == 0 {
            return Err(ValidationError::OutOfRange("ENGINE__BACKOFF_MULTIPLIER"));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ValidationError::OutOfRange("ENGINE__INITIAL_DELAY_MS"));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.stack_cap == 0 || self.stack_cap > 20 {
            return Err(ValidationError::OutOfRange("ENGINE__STACK_CAP"));
        }
        if self.history_limit == 0 {
            return Err(ValidationError::OutOfRange("ENGINE__HISTORY_LIMIT"));
        }
        // a list message holds at most ten rows
        if self.slot_limit == 0 || self.slot_limit > 10 {
            return Err(ValidationError::OutOfRange("ENGINE__SLOT_LIMIT"));
        }
        if self.search_days == 0 || self.search_days > 90 {
            return Err(ValidationError::OutOfRange("ENGINE__SEARCH_DAYS"));
        }
        if self.utc_offset_minutes.abs() > 14 * 60 {
            return Err(ValidationError::InvalidUtcOffset(self.utc_offset_minutes));
        }
        self.offset()?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            stack_cap: default_stack_cap(),
            history_limit: default_history_limit(),
            slot_limit: default_slot_limit(),
            search_days: default_search_days(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> u32 {
    2
}

fn default_max_delay_ms() -> u64 {
    4_000
}

fn default_attempt_timeout_ms() -> u64 {
    8_000
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_stack_cap() -> usize {
    5
}

fn default_history_limit() -> usize {
    10
}

fn default_slot_limit() -> usize {
    5
}

fn default_search_days() -> u32 {
    14
}

fn default_utc_offset_minutes() -> i32 {
    -180
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_retry_policy_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_offset_is_minutes_east() {
        let config = EngineConfig::default();
        assert_eq!(config.offset().unwrap(), FixedOffset::west_opt(3 * 3600).unwrap());
    }

    #[test]
    fn test_validation_rejects_zero_stack() {
        let config = EngineConfig {
            stack_cap: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::OutOfRange("ENGINE__STACK_CAP"))
        );
    }

    #[test]
    fn test_validation_rejects_absurd_offset() {
        let config = EngineConfig {
            utc_offset_minutes: 24 * 60,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_delays() {
        let config = EngineConfig {
            initial_delay_ms: 10_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

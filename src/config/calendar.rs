//! Calendar configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Calendar backend and slot grid
///
/// The only backend keeps bookings in process memory, so production has to
/// opt in explicitly.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    /// Length of one bookable slot in minutes
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: i64,

    /// Run the in-memory calendar even in production
    #[serde(default)]
    pub allow_in_memory: bool,
}

impl CalendarConfig {
    /// Validate calendar configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if !(5..=240).contains(&self.slot_minutes) {
            return Err(ValidationError::OutOfRange("CALENDAR__SLOT_MINUTES"));
        }
        if production && !self.allow_in_memory {
            return Err(ValidationError::EphemeralCalendar);
        }
        Ok(())
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            slot_minutes: default_slot_minutes(),
            allow_in_memory: false,
        }
    }
}

fn default_slot_minutes() -> i64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_defaults_are_valid_outside_production() {
        let config = CalendarConfig::default();
        assert_eq!(config.slot_minutes, 30);
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_production_needs_explicit_opt_in() {
        let config = CalendarConfig::default();
        assert_eq!(config.validate(true), Err(ValidationError::EphemeralCalendar));

        let config = CalendarConfig {
            allow_in_memory: true,
            ..Default::default()
        };
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_slot_length_bounds() {
        let config = CalendarConfig {
            slot_minutes: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(false),
            Err(ValidationError::OutOfRange("CALENDAR__SLOT_MINUTES"))
        );
    }
}

//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `CLINIC_CONCIERGE` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use clinic_concierge::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod ai;
mod calendar;
mod clinic;
mod engine;
mod error;
mod payment;
mod server;
mod store;

pub use ai::AiConfig;
pub use calendar::CalendarConfig;
pub use clinic::{CatalogConfig, ClinicConfig};
pub use engine::EngineConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};
pub use store::{StoreBackend, StoreConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a working
/// development setup (in-memory store, mock payments, rules-only routing).
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Context store (memory or Redis)
    #[serde(default)]
    pub store: StoreConfig,

    /// Classification and answer generation
    #[serde(default)]
    pub ai: AiConfig,

    /// Payment links (Stripe)
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Appointment calendar
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Retries, caching and conversation limits
    #[serde(default)]
    pub engine: EngineConfig,

    /// Clinic name and human contact
    #[serde(default)]
    pub clinic: ClinicConfig,

    /// Service catalog location
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `CLINIC_CONCIERGE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `CLINIC_CONCIERGE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `CLINIC_CONCIERGE__STORE__BACKEND=redis` -> `store.backend = redis`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CLINIC_CONCIERGE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Production requires real AI and Stripe keys and an explicit opt-in to
    /// the in-memory calendar; elsewhere they are optional.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let production = self.is_production();
        self.server.validate()?;
        self.store.validate()?;
        self.ai.validate(production)?;
        self.payment.validate(production)?;
        self.calendar.validate(production)?;
        self.engine.validate()?;
        self.clinic.validate()?;
        self.catalog.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

//! Clinic Concierge server: loads configuration, wires adapters and serves
//! the messaging webhook.

use std::error::Error;
use std::sync::Arc;

use axum::http::HeaderValue;
use chrono::FixedOffset;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clinic_concierge::adapters::ai::{MockAIProvider, OpenAIConfig, OpenAIProvider};
use clinic_concierge::adapters::calendar::{InMemoryCalendar, WorkingHours};
use clinic_concierge::adapters::http::{messaging_routes, MessagingHandlers};
use clinic_concierge::adapters::payment::{MockPaymentProvider, StripeConfig, StripePaymentLinks};
use clinic_concierge::adapters::registry::InMemoryPatientRegistry;
use clinic_concierge::adapters::storage::{InMemoryContextStore, RedisContextStore};
use clinic_concierge::application::workflows::WorkflowSettings;
use clinic_concierge::application::{Collaborators, EngineSettings, HandleMessageHandler};
use clinic_concierge::config::{AppConfig, ServerConfig, StoreBackend};
use clinic_concierge::domain::decision::ServiceCatalog;
use clinic_concierge::ports::{AIProvider, CalendarProvider, ContextStore, PaymentProvider};

type BoxError = Box<dyn Error + Send + Sync>;

/// Initialize tracing; `LOG_FORMAT=pretty` for development, JSON otherwise.
/// `RUST_LOG` overrides the configured level.
fn init_tracing(default_filter: &str) {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

async fn context_store(config: &AppConfig) -> Result<Arc<dyn ContextStore>, BoxError> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory context store");
            Ok(Arc::new(InMemoryContextStore::new()))
        }
        StoreBackend::Redis => {
            let url = config.store.redis_url.as_deref().unwrap_or_default();
            let store =
                RedisContextStore::connect(url, config.store.key_prefix.clone(), config.store.timeout())
                    .await?;
            info!(prefix = %config.store.key_prefix, "Using Redis context store");
            Ok(Arc::new(store))
        }
    }
}

fn ai_provider(config: &AppConfig) -> Result<Arc<dyn AIProvider>, BoxError> {
    match &config.ai.api_key {
        Some(key) if config.ai.is_configured() => {
            let provider = OpenAIProvider::new(
                OpenAIConfig::new(key.clone())
                    .with_model(config.ai.model.clone())
                    .with_base_url(config.ai.base_url.clone())
                    .with_timeout(config.ai.timeout()),
            )?;
            let info = provider.provider_info();
            info!(
                provider = %info.name,
                model = %info.model,
                context_tokens = info.max_context_tokens,
                "AI classification enabled"
            );
            Ok(Arc::new(provider))
        }
        _ => {
            warn!("No AI key configured; routing by rules only");
            Ok(Arc::new(MockAIProvider::unavailable("AI provider not configured")))
        }
    }
}

fn calendar(config: &AppConfig, offset: FixedOffset) -> Arc<dyn CalendarProvider> {
    warn!(
        slot_minutes = config.calendar.slot_minutes,
        "Using in-memory calendar; bookings are lost on restart"
    );
    let hours = WorkingHours {
        slot_minutes: config.calendar.slot_minutes,
        ..WorkingHours::default()
    };
    Arc::new(InMemoryCalendar::with_hours(offset, hours))
}

fn payment_provider(config: &AppConfig) -> Arc<dyn PaymentProvider> {
    match &config.payment.stripe_api_key {
        Some(key) if config.payment.is_configured() => {
            if config.payment.is_test_mode() {
                info!("Stripe payment links in test mode");
            }
            Arc::new(StripePaymentLinks::new(StripeConfig::new(
                key.clone(),
                config.payment.currency.clone(),
                config.payment.success_url.clone(),
                config.payment.cancel_url.clone(),
            )))
        }
        _ => {
            warn!("No Stripe key configured; issuing mock payment links");
            Arc::new(MockPaymentProvider::new())
        }
    }
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server.log_level);
    config.validate()?;

    let catalog = match &config.catalog.path {
        Some(path) => ServiceCatalog::load(path)?,
        None => ServiceCatalog::embedded()?,
    };
    info!(
        services = catalog.services.len(),
        providers = catalog.providers.len(),
        "Service catalog loaded"
    );

    let registry = match &config.catalog.patients_path {
        Some(path) => InMemoryPatientRegistry::from_json_file(path)?,
        None => InMemoryPatientRegistry::new(Vec::new()),
    };

    let offset = config.engine.offset()?;
    let collaborators = Collaborators {
        store: context_store(&config).await?,
        ai: ai_provider(&config)?,
        calendar: calendar(&config, offset),
        registry: Arc::new(registry),
        payments: payment_provider(&config),
    };
    let engine = EngineSettings {
        workflow: WorkflowSettings {
            catalog: Arc::new(catalog),
            offset,
            slot_limit: config.engine.slot_limit,
            search_days: config.engine.search_days,
            human_contact: config.clinic.human_contact.clone(),
        },
        clinic_name: config.clinic.name.clone(),
        retry: config.engine.retry_policy(),
        cache_ttl: config.engine.cache_ttl(),
        stack_cap: config.engine.stack_cap,
        history_limit: config.engine.history_limit,
    };
    let handler = Arc::new(HandleMessageHandler::new(collaborators, engine));

    let app = messaging_routes(
        MessagingHandlers::new(handler),
        config.server.request_timeout(),
        cors_layer(&config.server),
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, environment = ?config.server.environment, "Server running");

    axum::serve(listener, app).await?;
    Ok(())
}

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

mod config;
mod handlers;
mod logging;
mod memory;
mod models;
mod payload;
mod routing;
mod services;
mod session;
mod utils;

use config::Settings;
use logging::{ActivityLogger, LoggerConfig};
use memory::backend::{KvBackend, MemoryBackend, RedisBackend};
use memory::registry::RegistryConfig;
use memory::{HistoryBudget, StoreRegistry};
use payload::{BuilderConfig, PayloadBuilder};
use services::{ConversationService, GroqClient, PassthroughRouter};
use session::{RateLimitConfig, SessionLock, SessionRateLimiter};
use utils::Diagnostics;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,assistant_api_server=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("🚀 Starting Assistant API Server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    let diagnostics = Diagnostics::new(settings.debug.strict_invariants);

    // Session store backend, chosen once at startup
    let backend: Arc<dyn KvBackend> = match settings.memory.backend.as_str() {
        "redis" => {
            let url = settings.memory.redis_url.clone().ok_or_else(|| {
                anyhow::anyhow!("memory.backend is \"redis\" but memory.redis_url is not set")
            })?;
            let backend = RedisBackend::connect(&url)?;
            info!("✅ Redis session store connected");
            Arc::new(backend)
        }
        _ => {
            info!("✅ In-memory session store ready");
            Arc::new(MemoryBackend::new())
        }
    };

    let registry = Arc::new(StoreRegistry::new(
        backend,
        RegistryConfig {
            namespace: "assistant".to_string(),
            chat_ttl: Duration::from_secs(settings.memory.chat_ttl_seconds),
            action_ttl: Duration::from_secs(settings.memory.action_ttl_seconds),
            budget: HistoryBudget {
                soft_token_limit: settings.budget.soft_token_limit,
                max_turns: settings.budget.max_turns,
                chars_per_token: settings.budget.chars_per_token,
            },
            max_memory_percent: settings.memory.max_memory_percent,
        },
    ));

    let logger = ActivityLogger::new(LoggerConfig {
        queue_capacity: settings.activity_log.queue_capacity,
        batch_size: settings.activity_log.batch_size,
        batch_timeout_ms: settings.activity_log.batch_timeout_ms,
        file_path: settings.activity_log.file_path.clone().map(PathBuf::from),
    });

    let builder = PayloadBuilder::new(BuilderConfig {
        model: settings.model.name.clone(),
        temperature: settings.model.temperature,
        max_output_tokens: settings.model.max_output_tokens,
        soft_token_limit: settings.budget.soft_token_limit,
        chars_per_token: settings.budget.chars_per_token,
        system_prompt: settings.prompts.system_prompt.clone(),
        clarification_prompt: settings.prompts.clarification_prompt.clone(),
    });

    let service = Arc::new(ConversationService::new(
        registry,
        SessionLock::new(diagnostics),
        SessionRateLimiter::new(RateLimitConfig {
            max_requests: settings.rate_limit.max_requests,
            window: Duration::from_secs(settings.rate_limit.window_seconds),
            per_user: settings.rate_limit.per_user,
        }),
        builder,
        Box::new(GroqClient::new(settings.model.clone())),
        Box::new(PassthroughRouter),
        logger,
        diagnostics,
        chrono::Duration::seconds(settings.memory.confirmation_ttl_seconds),
    ));

    // Build router
    let app = build_router(service);

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_router(service: Arc<ConversationService>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    let api_routes = Router::new()
        .route("/api/assistant/chat", post(handlers::chat::chat_handler))
        .route("/api/admin/stats", get(handlers::admin::stats_handler))
        .route("/api/admin/reset", post(handlers::admin::reset_handler));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Shared state
        .layer(Extension(service))
        // Strict invariant panics surface as 500s instead of dropped sockets
        .layer(CatchPanicLayer::new())
        // CORS
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        // Body limit (chat payloads are small)
        .layer(DefaultBodyLimit::max(256 * 1024))
}

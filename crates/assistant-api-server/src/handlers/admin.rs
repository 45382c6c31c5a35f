use axum::{extract::Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::logging::{ActivityLog, ActivityStatus, ActivityType};
use crate::memory::registry::RegistryStats;
use crate::services::ConversationService;
use crate::session::lock::LockStats;
use crate::session::rate_limiter::RateLimiterStats;
use crate::utils::error::ApiError;

#[derive(Serialize)]
pub struct StatsResponse {
    pub stores: RegistryStats,
    pub locks: LockStats,
    pub rate_limiter: RateLimiterStats,
}

pub async fn stats_handler(
    Extension(service): Extension<Arc<ConversationService>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stores = service.registry().stats().await?;

    Ok(Json(StatsResponse {
        stores,
        locks: service.lock_stats(),
        rate_limiter: service.limiter_stats(),
    }))
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub removed: usize,
}

pub async fn reset_handler(
    Extension(service): Extension<Arc<ConversationService>>,
) -> Result<Json<ResetResponse>, ApiError> {
    let removed = service.registry().reset_all().await?;
    info!("Stores reset, {} entries removed", removed);

    service.logger().log(
        ActivityLog::builder("admin", ActivityType::StoresReset)
            .status(ActivityStatus::Info)
            .build(),
    );

    Ok(Json(ResetResponse { removed }))
}

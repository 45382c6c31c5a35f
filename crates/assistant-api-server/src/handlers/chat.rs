use crate::models::chat::ChatRequest;
use crate::services::{ConversationService, TurnReply};
use crate::utils::error::ApiError;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;

pub async fn chat_handler(
    Extension(service): Extension<Arc<ConversationService>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let session_id = request
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!(
        "Chat request: session={}, message_len={}",
        session_id,
        request.message.len()
    );

    let turn = service
        .handle_turn(&session_id, request.user_id.as_deref(), &request.message)
        .await?;

    match turn {
        TurnReply::Completed(response) => Ok(Json(response).into_response()),
        TurnReply::RateLimited(rejection) => Ok((
            StatusCode::TOO_MANY_REQUESTS,
            rejection.headers(),
            Json(rejection.body()),
        )
            .into_response()),
    }
}

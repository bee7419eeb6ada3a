use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension,
};
use event_bus::MessageContext;
use uuid::Uuid;

use super::{idempotency_key, ApiError, AppState};
use crate::services::refund_service::request_refund;

/// Handler for PUT /ticket-refund/{ticket_id}
///
/// Without an `Idempotency-Key` header every call queues a new refund.
pub async fn refund_ticket(
    State(state): State<AppState>,
    Extension(ctx): Extension<MessageContext>,
    Path(ticket_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let key = idempotency_key(&headers).unwrap_or_else(|| Uuid::new_v4().to_string());
    request_refund(&state.pool, &ctx, &ticket_id, &key).await?;
    Ok(StatusCode::ACCEPTED)
}

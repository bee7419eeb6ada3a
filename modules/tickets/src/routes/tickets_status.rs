use axum::{extract::State, http::HeaderMap, http::StatusCode, Extension, Json};
use event_bus::MessageContext;
use serde::Deserialize;

use super::{idempotency_key, ApiError, AppState, IDEMPOTENCY_KEY_HEADER};
use crate::models::{Money, Ticket};
use crate::services::ticket_status_service::{
    record_status_changes, TicketStatus, TicketStatusChange,
};

#[derive(Debug, Deserialize)]
pub struct TicketsStatusRequest {
    pub tickets: Vec<TicketStatusRequest>,
}

#[derive(Debug, Deserialize)]
pub struct TicketStatusRequest {
    pub ticket_id: String,
    pub status: String,
    pub customer_email: String,
    pub price: Money,
}

/// Handler for POST /tickets-status
pub async fn create_tickets_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<MessageContext>,
    headers: HeaderMap,
    Json(request): Json<TicketsStatusRequest>,
) -> Result<StatusCode, ApiError> {
    let key = idempotency_key(&headers)
        .ok_or_else(|| ApiError::bad_request(format!("{IDEMPOTENCY_KEY_HEADER} header is required")))?;

    let changes = request
        .tickets
        .into_iter()
        .map(|t| {
            Ok(TicketStatusChange {
                status: TicketStatus::parse(&t.status)?,
                ticket: Ticket {
                    ticket_id: t.ticket_id,
                    customer_email: t.customer_email,
                    price: t.price,
                },
            })
        })
        .collect::<Result<Vec<_>, crate::services::ServiceError>>()?;

    record_status_changes(&state.pool, &ctx, &key, &changes).await?;
    Ok(StatusCode::OK)
}

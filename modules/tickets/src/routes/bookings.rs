use axum::{extract::State, http::HeaderMap, http::StatusCode, Extension, Json};
use event_bus::MessageContext;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{idempotency_key, ApiError, AppState};
use crate::models::Booking;
use crate::repos::booking_repo;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub show_id: Uuid,
    pub number_of_tickets: i32,
    pub customer_email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateBookingResponse {
    pub booking_id: Uuid,
}

/// Handler for POST /book-tickets
///
/// 400 when the show has fewer free tickets than requested, 409 when a
/// concurrent booking won the race; the caller may retry the latter.
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(ctx): Extension<MessageContext>,
    headers: HeaderMap,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), ApiError> {
    if request.number_of_tickets <= 0 {
        return Err(ApiError::bad_request("number_of_tickets must be positive"));
    }

    let booking = Booking {
        booking_id: Uuid::new_v4(),
        show_id: request.show_id,
        number_of_tickets: request.number_of_tickets,
        customer_email: request.customer_email,
    };
    let key = idempotency_key(&headers).unwrap_or_else(|| booking.booking_id.to_string());

    booking_repo::book(&state.pool, &ctx, &booking, &key).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            booking_id: booking.booking_id,
        }),
    ))
}

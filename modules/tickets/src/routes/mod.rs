//! HTTP surface
//!
//! Thin request binding over the services. Every route runs behind the
//! correlation middleware, which puts a [`MessageContext`](event_bus::MessageContext)
//! into the request extensions for the services to thread into the
//! messages they write.

pub mod bookings;
pub mod correlation;
pub mod refunds;
pub mod shows;
pub mod tickets;
pub mod tickets_status;

use axum::{
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::health::health;
use crate::repos::{BookingError, ShowRepository, TicketRepository};
use crate::services::ServiceError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub tickets: Arc<dyn TicketRepository>,
    pub shows: Arc<dyn ShowRepository>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Error rendered as `{"error": code, "message": text}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "Request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            // Don't leak internal details
            message: "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.code.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::internal(err)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => Self::bad_request(message),
            other => Self::internal(other),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::ShowNotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: err.to_string(),
            },
            BookingError::NotEnoughTickets { .. } => Self {
                status: StatusCode::BAD_REQUEST,
                code: "not_enough_tickets",
                message: err.to_string(),
            },
            BookingError::Conflict => Self {
                status: StatusCode::CONFLICT,
                code: "conflict",
                message: err.to_string(),
            },
            BookingError::Database(_) | BookingError::Encode(_) => Self::internal(err),
        }
    }
}

/// Non-empty `Idempotency-Key` header value
pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tickets-status", post(tickets_status::create_tickets_status))
        .route("/tickets", get(tickets::list_tickets))
        .route("/shows", post(shows::create_show))
        .route("/book-tickets", post(bookings::create_booking))
        .route("/ticket-refund/{ticket_id}", put(refunds::refund_ticket))
        .with_state(state)
        .layer(middleware::from_fn(correlation::propagate_correlation_id))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

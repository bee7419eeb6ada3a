pub mod refund_service;
pub mod ticket_status_service;

use thiserror::Error;

use crate::events::OutboxError;

/// Errors of the request-side services
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<OutboxError> for ServiceError {
    fn from(err: OutboxError) -> Self {
        match err {
            OutboxError::Database(e) => Self::Database(e),
            OutboxError::Encode(e) => Self::Encode(e),
        }
    }
}

use axum::{extract::State, Json};

use super::{ApiError, AppState};
use crate::models::Ticket;

/// Handler for GET /tickets
pub async fn list_tickets(State(state): State<AppState>) -> Result<Json<Vec<Ticket>>, ApiError> {
    let tickets = state.tickets.list().await?;
    Ok(Json(tickets))
}

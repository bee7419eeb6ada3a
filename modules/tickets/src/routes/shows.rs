use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::models::Show;

#[derive(Debug, Deserialize)]
pub struct CreateShowRequest {
    pub external_show_id: Uuid,
    pub number_of_tickets: i32,
    pub start_time: DateTime<Utc>,
    pub title: String,
    pub venue: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateShowResponse {
    pub show_id: Uuid,
}

/// Handler for POST /shows
pub async fn create_show(
    State(state): State<AppState>,
    Json(request): Json<CreateShowRequest>,
) -> Result<(StatusCode, Json<CreateShowResponse>), ApiError> {
    if request.number_of_tickets <= 0 {
        return Err(ApiError::bad_request("number_of_tickets must be positive"));
    }

    let show = Show {
        show_id: Uuid::new_v4(),
        external_show_id: request.external_show_id,
        number_of_tickets: request.number_of_tickets,
        start_time: request.start_time,
        title: request.title,
        venue: request.venue,
    };
    state.shows.add(&show).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateShowResponse {
            show_id: show.show_id,
        }),
    ))
}

use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn get_pass(
    State(state): State<AppState>,
    Path(pass_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let pass = state.engine.get_pass(pass_id).await?;
    Ok(success(pass, "Pass retrieved"))
}

pub async fn get_venue_partnership(
    State(state): State<AppState>,
    Path((pass_id, venue_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let partnership = state.engine.get_venue_partnership(pass_id, venue_id).await?;
    Ok(success(partnership, "Venue partnership retrieved"))
}

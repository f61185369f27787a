use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::models::ConfirmedOrder;
use crate::services::view;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

/// Called by the payment collaborator once an order line is paid.
pub async fn issue_entitlements(
    State(state): State<AppState>,
    Json(order): Json<ConfirmedOrder>,
) -> Result<Response, AppError> {
    let issued = state.engine.issue_order(&order).await?;
    let now = state.engine.now();
    let views: Vec<_> = issued.iter().map(|e| view(e, now)).collect();
    Ok(created(views, "Entitlements issued"))
}

pub async fn get_entitlement(
    State(state): State<AppState>,
    Path(entitlement_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let now = state.engine.now();
    let view = state.engine.get_entitlement_view(entitlement_id, now).await?;
    Ok(success(view, "Entitlement retrieved"))
}

pub async fn list_customer_entitlements(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let now = state.engine.now();
    let views = state
        .engine
        .list_customer_entitlements(customer_id, now)
        .await?;
    Ok(success(views, "Entitlements retrieved"))
}

pub async fn revoke_entitlement(
    State(state): State<AppState>,
    Path(entitlement_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let view = state.engine.revoke_entitlement(entitlement_id).await?;
    Ok(success(view, "Entitlement revoked"))
}

pub async fn list_redemptions(
    State(state): State<AppState>,
    Path(entitlement_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let events = state.engine.list_redemptions(entitlement_id).await?;
    Ok(success(events, "Redemptions retrieved"))
}

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::{Credential, RedemptionConfirmation, RedemptionOutcome, RejectionReason};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub venue_id: Uuid,
    #[serde(flatten)]
    pub credential: Credential,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub redeemed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<RedemptionConfirmation>,
}

impl From<RedemptionOutcome> for RedeemResponse {
    fn from(outcome: RedemptionOutcome) -> Self {
        match outcome {
            RedemptionOutcome::Redeemed(confirmation) => Self {
                redeemed: true,
                reason: None,
                confirmation: Some(confirmation),
            },
            RedemptionOutcome::Rejected(reason) => Self {
                redeemed: false,
                reason: Some(reason),
                confirmation: None,
            },
        }
    }
}

/// Each scan is a new attempt. Replaying a scan consumes another use if one is left.
pub async fn redeem(
    State(state): State<AppState>,
    Json(request): Json<RedeemRequest>,
) -> Result<Response, AppError> {
    let now = state.engine.now();
    let outcome = state
        .engine
        .redeem(&request.credential, request.venue_id, now)
        .await?;

    let message = if outcome.is_redeemed() {
        "Entry granted"
    } else {
        "Entry refused"
    };
    Ok(success(RedeemResponse::from(outcome), message))
}

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::DiscountKind;
use crate::services::{DiscountRejection, ValidationResult};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct ValidateDiscountRequest {
    pub code: String,
    pub subtotal: Decimal,
    pub customer_id: Option<Uuid>,
    pub pass_id: Option<Uuid>,
}

/// `valid: false` is a business answer, not a failed request.
#[derive(Debug, Serialize)]
pub struct ValidateDiscountResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DiscountRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<DiscountKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<Decimal>,
}

impl From<ValidationResult> for ValidateDiscountResponse {
    fn from(result: ValidationResult) -> Self {
        match result {
            ValidationResult::Valid(applied) => Self {
                valid: true,
                reason: None,
                code: Some(applied.code),
                kind: Some(applied.kind),
                value: Some(applied.value),
                discount_amount: Some(applied.discount_amount),
            },
            ValidationResult::Invalid(reason) => Self {
                valid: false,
                reason: Some(reason),
                code: None,
                kind: None,
                value: None,
                discount_amount: None,
            },
        }
    }
}

pub async fn validate_discount_code(
    State(state): State<AppState>,
    Json(request): Json<ValidateDiscountRequest>,
) -> Result<Response, AppError> {
    let result = state
        .engine
        .validate_discount_code(
            &request.code,
            request.subtotal,
            request.customer_id,
            request.pass_id,
        )
        .await?;

    let message = if result.is_valid() {
        "Discount code applied"
    } else {
        "Discount code not applicable"
    };
    Ok(success(ValidateDiscountResponse::from(result), message))
}

#[derive(Debug, Deserialize)]
pub struct RecordUsageRequest {
    pub code: String,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RecordUsageResponse {
    pub code: String,
    pub customer_id: Option<Uuid>,
}

/// Called by checkout once an order carrying the code is paid.
pub async fn record_discount_usage(
    State(state): State<AppState>,
    Json(request): Json<RecordUsageRequest>,
) -> Result<Response, AppError> {
    let discount = state
        .engine
        .record_discount_usage(&request.code, request.customer_id)
        .await?;

    Ok(created(
        RecordUsageResponse {
            code: discount.code,
            customer_id: request.customer_id,
        },
        "Discount code use recorded",
    ))
}

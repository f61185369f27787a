use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::services::EngineError;
use crate::store::StoreError;
use crate::utils::response::error as error_response;

/// Transport-level failures. Business rejections never travel through here; they are
/// successful responses carrying a reason code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error")]
    DatabaseError(#[from] StoreError),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg) | AppError::NotFound(msg) => {
                tracing::debug!(error = ?self, message = %msg, "Request rejected");
            }
            AppError::Conflict(msg) => {
                tracing::warn!(message = %msg, "Request conflicted");
            }
            AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidInput(msg) => AppError::ValidationError(msg),
            e @ EngineError::PricingOptionMismatch { .. } => {
                AppError::ValidationError(e.to_string())
            }
            e @ (EngineError::PassNotFound(_)
            | EngineError::PartnershipNotFound { .. }
            | EngineError::EntitlementNotFound(_)
            | EngineError::DiscountCodeNotFound(_)) => AppError::NotFound(e.to_string()),
            e @ EngineError::ConcurrentRedemptionConflict { .. } => {
                AppError::Conflict(e.to_string())
            }
            e @ (EngineError::CredentialGenerationExhausted { .. }
            | EngineError::ValidityOutOfRange { .. }) => {
                AppError::InternalServerError(e.to_string())
            }
            EngineError::Store(e) => AppError::DatabaseError(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        };

        error_response(code, public_message, None, status)
    }
}

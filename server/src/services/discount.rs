use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::{Clock, EngineError};
use crate::models::{DiscountCode, DiscountKind};
use crate::store::DiscountCodeStore;

/// Why a code was refused at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountRejection {
    CodeNotFound,
    CodeExpired,
    CodeNotApplicable,
    MinimumNotMet,
    UsageLimitReached,
    CustomerLimitReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedDiscount {
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub discount_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid(AppliedDiscount),
    Invalid(DiscountRejection),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }
}

/// Checks a discount code against a prospective checkout. Validation is a preview:
/// it never consumes a use of the code.
#[derive(Clone)]
pub struct DiscountCodeValidator {
    store: Arc<dyn DiscountCodeStore>,
    clock: Arc<dyn Clock>,
}

impl DiscountCodeValidator {
    pub fn new(store: Arc<dyn DiscountCodeStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn validate(
        &self,
        code: &str,
        subtotal: Decimal,
        customer_id: Option<Uuid>,
        pass_id: Option<Uuid>,
    ) -> Result<ValidationResult, EngineError> {
        let normalized = DiscountCode::normalize(code);
        if normalized.is_empty() {
            return Err(EngineError::InvalidInput("discount code must not be empty".into()));
        }
        if subtotal < Decimal::ZERO {
            return Err(EngineError::InvalidInput("subtotal must not be negative".into()));
        }

        let Some(discount) = self.store.find_code(&normalized).await? else {
            return Ok(reject(&normalized, DiscountRejection::CodeNotFound));
        };

        if !discount.is_within_window(self.clock.now()) {
            return Ok(reject(&normalized, DiscountRejection::CodeExpired));
        }

        if let (Some(scope), Some(pass_id)) = (discount.pass_id, pass_id) {
            if scope != pass_id {
                return Ok(reject(&normalized, DiscountRejection::CodeNotApplicable));
            }
        }

        if let Some(minimum) = discount.minimum_subtotal {
            if subtotal < minimum {
                return Ok(reject(&normalized, DiscountRejection::MinimumNotMet));
            }
        }

        if discount.is_exhausted() {
            return Ok(reject(&normalized, DiscountRejection::UsageLimitReached));
        }

        // Guest checkouts carry no customer id and skip the per-customer limit.
        if let (Some(limit), Some(customer_id)) = (discount.per_customer_limit, customer_id) {
            let used = self.store.customer_usage(discount.id, customer_id).await?;
            if used >= limit {
                return Ok(reject(&normalized, DiscountRejection::CustomerLimitReached));
            }
        }

        Ok(ValidationResult::Valid(AppliedDiscount {
            discount_amount: discount.kind.amount_off(discount.value, subtotal),
            code: discount.code,
            kind: discount.kind,
            value: discount.value,
        }))
    }

    /// Counts one use of the code, and one use by `customer_id` when given. Checkout
    /// calls this after the order is paid; validation never does.
    pub async fn record_usage(
        &self,
        code: &str,
        customer_id: Option<Uuid>,
    ) -> Result<DiscountCode, EngineError> {
        let normalized = DiscountCode::normalize(code);
        if normalized.is_empty() {
            return Err(EngineError::InvalidInput("discount code must not be empty".into()));
        }

        let discount = self
            .store
            .find_code(&normalized)
            .await?
            .ok_or_else(|| EngineError::DiscountCodeNotFound(normalized.clone()))?;
        self.store.record_discount_usage(discount.id, customer_id).await?;

        tracing::info!(
            code = %normalized,
            customer_id = ?customer_id,
            "Discount code use recorded"
        );
        Ok(discount)
    }
}

fn reject(code: &str, reason: DiscountRejection) -> ValidationResult {
    tracing::debug!(code, ?reason, "Discount code rejected");
    ValidationResult::Invalid(reason)
}

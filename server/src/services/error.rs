use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Failures of the pass engine. Business rejections (expired codes, exhausted
/// entitlements, ...) are not errors; they come back inside the operation's outcome.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("pass {0} not found")]
    PassNotFound(Uuid),

    #[error("pass {pass_id} has no partnership with venue {venue_id}")]
    PartnershipNotFound { pass_id: Uuid, venue_id: Uuid },

    #[error("pricing option {pricing_option_id} does not belong to pass {pass_id}")]
    PricingOptionMismatch { pass_id: Uuid, pricing_option_id: Uuid },

    #[error("entitlement {0} not found")]
    EntitlementNotFound(Uuid),

    #[error("discount code {0} not found")]
    DiscountCodeNotFound(String),

    #[error("pricing option {pricing_option_id} grants {days} days, past the representable range")]
    ValidityOutOfRange { pricing_option_id: Uuid, days: u32 },

    #[error("could not generate unique credentials after {attempts} attempts")]
    CredentialGenerationExhausted { attempts: u32 },

    #[error("entitlement {entitlement_id} kept changing; gave up after {attempts} attempts")]
    ConcurrentRedemptionConflict { entitlement_id: Uuid, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

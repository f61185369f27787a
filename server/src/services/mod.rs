//! The pass engine: catalog reads, discount-code validation, entitlement issuance,
//! status resolution and venue redemption.

pub mod catalog;
pub mod clock;
pub mod credentials;
pub mod discount;
pub mod engine;
pub mod error;
pub mod issuer;
pub mod redemption;
pub mod status;

pub use catalog::Catalog;
pub use clock::{Clock, FixedClock, SystemClock};
pub use credentials::{CredentialGenerator, RandomCredentialGenerator};
pub use discount::{AppliedDiscount, DiscountCodeValidator, DiscountRejection, ValidationResult};
pub use engine::{view, EngineSettings, PassEngine};
pub use error::EngineError;
pub use issuer::EntitlementIssuer;
pub use redemption::{
    Credential, RedemptionConfirmation, RedemptionOutcome, RedemptionValidator, RejectionReason,
};
pub use status::effective_status;

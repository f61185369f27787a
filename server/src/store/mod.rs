//! Persistence ports for the pass engine.
//!
//! The engine never touches a database directly. Each record family has a port
//! implemented by [`memory::InMemoryStore`] (tests and local runs) and
//! [`postgres::PgStore`] (production).
//!
//! Entitlement mutations are compare-and-set on `(id, expected_version)`. A writer
//! that lost a race receives [`StoreError::VersionConflict`] and nothing is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{DiscountCode, EntitlementStatus, Pass, PurchasedEntitlement, RedemptionEvent};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(
        "version conflict on entitlement {entitlement_id}: expected {expected}, found {actual}"
    )]
    VersionConflict {
        entitlement_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("credential already in use")]
    DuplicateCredential,

    #[error("record not found: {0}")]
    NotFound(Uuid),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("stored record could not be mapped: {0}")]
    Corrupt(String),
}

/// One redemption to apply atomically: both counters, the event, and the version bump.
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionCommit {
    pub entitlement_id: Uuid,
    pub expected_version: i64,
    pub venue_id: Uuid,
    pub event_id: Uuid,
    pub redeemed_at: DateTime<Utc>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load_pass(&self, pass_id: Uuid) -> Result<Option<Pass>, StoreError>;
}

#[async_trait]
pub trait DiscountCodeStore: Send + Sync {
    /// Looks a code up by its normalised string.
    async fn find_code(&self, code: &str) -> Result<Option<DiscountCode>, StoreError>;

    async fn customer_usage(&self, code_id: Uuid, customer_id: Uuid) -> Result<u32, StoreError>;

    /// Consumes one use of a code. Called by order completion, never by validation.
    async fn record_discount_usage(
        &self,
        code_id: Uuid,
        customer_id: Option<Uuid>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Persists a batch of freshly issued entitlements, all or none. Fails with
    /// `DuplicateCredential` if any activation code is taken, including by another
    /// member of the batch.
    async fn insert_entitlements(
        &self,
        entitlements: &[PurchasedEntitlement],
    ) -> Result<(), StoreError>;

    async fn insert_entitlement(
        &self,
        entitlement: &PurchasedEntitlement,
    ) -> Result<(), StoreError> {
        self.insert_entitlements(std::slice::from_ref(entitlement)).await
    }

    async fn load_entitlement(
        &self,
        id: Uuid,
    ) -> Result<Option<PurchasedEntitlement>, StoreError>;

    async fn find_by_activation_code(
        &self,
        activation_code: &str,
    ) -> Result<Option<PurchasedEntitlement>, StoreError>;

    async fn activation_code_exists(&self, activation_code: &str) -> Result<bool, StoreError>;

    /// Whether an entitlement that is active and unexpired at `now` already uses `pin_code`.
    async fn active_pin_exists(
        &self,
        pin_code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<PurchasedEntitlement>, StoreError>;

    /// Applies a redemption if the stored version still equals `expected_version`.
    /// Returns the entitlement as it stands after the commit.
    async fn commit_redemption(
        &self,
        commit: RedemptionCommit,
    ) -> Result<PurchasedEntitlement, StoreError>;

    /// Overwrites the persisted status under the same version check.
    async fn set_status(
        &self,
        entitlement_id: Uuid,
        expected_version: i64,
        status: EntitlementStatus,
    ) -> Result<PurchasedEntitlement, StoreError>;

    async fn redemption_events(
        &self,
        entitlement_id: Uuid,
    ) -> Result<Vec<RedemptionEvent>, StoreError>;
}

//! Redemption decisions at a partner venue's scanning terminal.
//!
//! A scan resolves the entitlement, checks its effective status and the venue's
//! usage rule, then commits both counters and the redemption event with a
//! compare-and-set on the entitlement version. Losing that race means another
//! writer touched the entitlement after we read it: the whole decision is re-run
//! against fresh state, up to `max_retries` more times.
//!
//! Only the entitlement id is a unit of contention. Scans of different
//! entitlements never wait on each other.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{effective_status, Catalog, EngineError};
use crate::models::{EffectiveStatus, PurchasedEntitlement, UsageRule};
use crate::store::{EntitlementStore, RedemptionCommit, StoreError};

/// What the terminal scanned: the public activation code, optionally confirmed by pin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub activation_code: String,
    #[serde(default)]
    pub pin: Option<String>,
}

impl Credential {
    pub fn new(activation_code: impl Into<String>) -> Self {
        Self {
            activation_code: activation_code.into(),
            pin: None,
        }
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }
}

/// Machine-readable reason a scan was refused. Terminals localise on these codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    EntitlementNotFound,
    CredentialMismatch,
    EntitlementExpired,
    EntitlementExhausted,
    EntitlementRevoked,
    VenueNotPartnered,
    VenueUsageLimitReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionConfirmation {
    pub redemption_id: Uuid,
    pub entitlement_id: Uuid,
    pub venue_id: Uuid,
    pub venue_name: String,
    pub discount_percent: Decimal,
    pub usage_rule: UsageRule,
    pub usage_count: u32,
    pub usage_cap: Option<u32>,
    pub venue_redemptions: u32,
    pub redeemed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionOutcome {
    Redeemed(RedemptionConfirmation),
    Rejected(RejectionReason),
}

impl RedemptionOutcome {
    pub fn is_redeemed(&self) -> bool {
        matches!(self, RedemptionOutcome::Redeemed(_))
    }

    pub fn rejection(&self) -> Option<RejectionReason> {
        match self {
            RedemptionOutcome::Rejected(reason) => Some(*reason),
            RedemptionOutcome::Redeemed(_) => None,
        }
    }
}

/// Result of evaluating one snapshot of the entitlement.
enum Decision {
    Reject(RejectionReason),
    Commit {
        expected_version: i64,
        venue_name: String,
        discount_percent: Decimal,
        usage_rule: UsageRule,
    },
}

#[derive(Clone)]
pub struct RedemptionValidator {
    catalog: Catalog,
    store: Arc<dyn EntitlementStore>,
    max_retries: u32,
}

impl RedemptionValidator {
    pub fn new(catalog: Catalog, store: Arc<dyn EntitlementStore>, max_retries: u32) -> Self {
        Self {
            catalog,
            store,
            max_retries: max_retries.max(1),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub async fn redeem(
        &self,
        credential: &Credential,
        venue_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RedemptionOutcome, EngineError> {
        let activation_code = credential.activation_code.trim();
        if activation_code.is_empty() {
            return Err(EngineError::InvalidInput("activation code is required".into()));
        }

        let attempts = self.max_retries + 1;
        let mut last_seen = None;

        for attempt in 1..=attempts {
            let Some(entitlement) = self.store.find_by_activation_code(activation_code).await?
            else {
                return Ok(rejected(None, venue_id, RejectionReason::EntitlementNotFound));
            };
            last_seen = Some(entitlement.id);

            let (expected_version, venue_name, discount_percent, usage_rule) =
                match self.decide(&entitlement, credential, venue_id, now).await? {
                    Decision::Reject(reason) => {
                        return Ok(rejected(Some(entitlement.id), venue_id, reason));
                    }
                    Decision::Commit {
                        expected_version,
                        venue_name,
                        discount_percent,
                        usage_rule,
                    } => (expected_version, venue_name, discount_percent, usage_rule),
                };

            let commit = RedemptionCommit {
                entitlement_id: entitlement.id,
                expected_version,
                venue_id,
                event_id: Uuid::new_v4(),
                redeemed_at: now,
            };
            let redemption_id = commit.event_id;

            match self.store.commit_redemption(commit).await {
                Ok(updated) => {
                    tracing::info!(
                        entitlement_id = %updated.id,
                        venue_id = %venue_id,
                        usage_count = updated.usage_count,
                        "Redemption granted"
                    );
                    return Ok(RedemptionOutcome::Redeemed(RedemptionConfirmation {
                        redemption_id,
                        entitlement_id: updated.id,
                        venue_id,
                        venue_name,
                        discount_percent,
                        usage_rule,
                        usage_count: updated.usage_count,
                        usage_cap: updated.usage_cap,
                        venue_redemptions: updated.redemptions_at(venue_id),
                        redeemed_at: now,
                    }));
                }
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::debug!(
                        entitlement_id = %entitlement.id,
                        attempt,
                        "Lost redemption race, re-reading entitlement"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        let entitlement_id = last_seen.unwrap_or_default();
        tracing::warn!(
            entitlement_id = %entitlement_id,
            venue_id = %venue_id,
            attempts,
            "Redemption abandoned after repeated conflicts"
        );
        Err(EngineError::ConcurrentRedemptionConflict {
            entitlement_id,
            attempts,
        })
    }

    /// Checks credentials, status, partnership and the venue rule against one snapshot of
    /// the entitlement. Has no side effects.
    async fn decide(
        &self,
        entitlement: &PurchasedEntitlement,
        credential: &Credential,
        venue_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Decision, EngineError> {
        if let Some(pin) = credential.pin.as_deref() {
            if pin.trim() != entitlement.pin_code {
                return Ok(Decision::Reject(RejectionReason::CredentialMismatch));
            }
        }

        match effective_status(entitlement, now) {
            EffectiveStatus::Active => {}
            EffectiveStatus::Expired => {
                return Ok(Decision::Reject(RejectionReason::EntitlementExpired))
            }
            EffectiveStatus::Exhausted => {
                return Ok(Decision::Reject(RejectionReason::EntitlementExhausted))
            }
            EffectiveStatus::Revoked => {
                return Ok(Decision::Reject(RejectionReason::EntitlementRevoked))
            }
        }

        let partnership = match self
            .catalog
            .get_venue_partnership(entitlement.pass_id, venue_id)
            .await
        {
            Ok(partnership) => partnership,
            Err(EngineError::PartnershipNotFound { .. }) | Err(EngineError::PassNotFound(_)) => {
                return Ok(Decision::Reject(RejectionReason::VenueNotPartnered));
            }
            Err(e) => return Err(e),
        };

        if !partnership
            .usage_rule
            .permits(entitlement.redemptions_at(venue_id))
        {
            return Ok(Decision::Reject(RejectionReason::VenueUsageLimitReached));
        }

        Ok(Decision::Commit {
            expected_version: entitlement.version,
            venue_name: partnership.venue_name,
            discount_percent: partnership.discount_percent,
            usage_rule: partnership.usage_rule,
        })
    }
}

fn rejected(
    entitlement_id: Option<Uuid>,
    venue_id: Uuid,
    reason: RejectionReason,
) -> RedemptionOutcome {
    tracing::info!(
        entitlement_id = ?entitlement_id,
        venue_id = %venue_id,
        ?reason,
        "Redemption rejected"
    );
    RedemptionOutcome::Rejected(reason)
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse status persisted on the entitlement. `Expired` and exhaustion are normally
/// derived on read; only administrative actions write this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    Active,
    Expired,
    Revoked,
}

impl EntitlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementStatus::Active => "active",
            EntitlementStatus::Expired => "expired",
            EntitlementStatus::Revoked => "revoked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(EntitlementStatus::Active),
            "expired" => Some(EntitlementStatus::Expired),
            "revoked" => Some(EntitlementStatus::Revoked),
            _ => None,
        }
    }
}

/// Status computed at read time from persisted fields and the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Active,
    Expired,
    Exhausted,
    Revoked,
}

/// The redeemable unit: one pass instance owned by a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchasedEntitlement {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub order_id: Uuid,
    pub pass_id: Uuid,
    pub pricing_option_id: Uuid,
    pub activation_code: String,
    pub pin_code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: EntitlementStatus,
    pub usage_count: u32,
    pub usage_cap: Option<u32>,
    /// Successful redemptions per venue. Venues never redeemed at are absent.
    pub venue_usage: HashMap<Uuid, u32>,
    /// Bumped on every mutation; writers compare against it.
    pub version: i64,
}

impl PurchasedEntitlement {
    pub fn redemptions_at(&self, venue_id: Uuid) -> u32 {
        self.venue_usage.get(&venue_id).copied().unwrap_or(0)
    }

    pub fn remaining_uses(&self) -> Option<u32> {
        self.usage_cap
            .map(|cap| cap.saturating_sub(self.usage_count))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionEventOutcome {
    Granted,
}

/// Append-only record of a granted entry. Counters on the entitlement are a projection of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionEvent {
    pub id: Uuid,
    pub entitlement_id: Uuid,
    pub venue_id: Uuid,
    pub redeemed_at: DateTime<Utc>,
    pub outcome: RedemptionEventOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueUsage {
    pub venue_id: Uuid,
    pub redemptions: u32,
}

/// Read model handed to profile pages, admin tooling and terminals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementView {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub order_id: Uuid,
    pub pass_id: Uuid,
    pub pricing_option_id: Uuid,
    pub activation_code: String,
    pub pin_code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: EntitlementStatus,
    pub effective_status: EffectiveStatus,
    pub usage_count: u32,
    pub usage_cap: Option<u32>,
    pub remaining_uses: Option<u32>,
    pub venue_usage: Vec<VenueUsage>,
}

/// A paid order line handed over by the payment collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedOrder {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub pass_id: Uuid,
    pub pricing_option_id: Uuid,
    pub paid_amount: Decimal,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a sellable pass. Only catalog management moves a pass between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Draft,
    Active,
    Inactive,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Draft => "draft",
            PassStatus::Active => "active",
            PassStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PassStatus::Draft),
            "active" => Some(PassStatus::Active),
            "inactive" => Some(PassStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Adult,
    Child,
    Student,
    Senior,
}

impl AgeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Adult => "adult",
            AgeGroup::Child => "child",
            AgeGroup::Student => "student",
            AgeGroup::Senior => "senior",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "adult" => Some(AgeGroup::Adult),
            "child" => Some(AgeGroup::Child),
            "student" => Some(AgeGroup::Student),
            "senior" => Some(AgeGroup::Senior),
            _ => None,
        }
    }
}

/// Longest validity window a pricing option may grant.
pub const MAX_VALIDITY_DAYS: u32 = 3_660;

/// One purchasable tier of a pass. `days` is the validity window granted at issuance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingOption {
    pub id: Uuid,
    pub days: u32,
    pub age_group: AgeGroup,
    pub base_price: Decimal,
    pub discount_percent: Option<Decimal>,
}

impl PricingOption {
    /// Base price less the optional discount percent, rounded to cents.
    pub fn effective_price(&self) -> Decimal {
        match self.discount_percent {
            Some(percent) if percent > Decimal::ZERO => {
                let off = (self.base_price * percent / Decimal::ONE_HUNDRED).min(self.base_price);
                (self.base_price - off).round_dp(2)
            }
            _ => self.base_price.round_dp(2),
        }
    }
}

/// Per-venue cap on redemptions of a single entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageRule {
    OncePerVenue,
    Unlimited,
    LimitedCount { max: u32 },
}

impl UsageRule {
    /// Highest number of redemptions the rule allows at one venue, `None` when unbounded.
    pub fn limit(&self) -> Option<u32> {
        match self {
            UsageRule::OncePerVenue => Some(1),
            UsageRule::Unlimited => None,
            UsageRule::LimitedCount { max } => Some(*max),
        }
    }

    /// Whether one more redemption is allowed given the venue counter so far.
    pub fn permits(&self, redeemed_at_venue: u32) -> bool {
        self.limit().map_or(true, |limit| redeemed_at_venue < limit)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UsageRule::OncePerVenue => "once_per_venue",
            UsageRule::Unlimited => "unlimited",
            UsageRule::LimitedCount { .. } => "limited_count",
        }
    }

    /// Rebuilds a rule from its stored kind and optional max.
    pub fn from_parts(kind: &str, max: Option<u32>) -> Option<Self> {
        match (kind, max) {
            ("once_per_venue", _) => Some(UsageRule::OncePerVenue),
            ("unlimited", _) => Some(UsageRule::Unlimited),
            ("limited_count", Some(max)) => Some(UsageRule::LimitedCount { max }),
            _ => None,
        }
    }
}

impl fmt::Display for UsageRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageRule::LimitedCount { max } => write!(f, "limited_count({})", max),
            other => f.write_str(other.kind()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenuePartnership {
    pub id: Uuid,
    pub pass_id: Uuid,
    pub venue_id: Uuid,
    pub venue_name: String,
    pub discount_percent: Decimal,
    pub usage_rule: UsageRule,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: PassStatus,
    /// Global redemption cap copied onto every entitlement issued. `None` is unlimited.
    pub usage_cap: Option<u32>,
    pub pricing_options: Vec<PricingOption>,
    pub partnerships: Vec<VenuePartnership>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PassInvariantError {
    #[error("active pass {0} has no pricing options")]
    NoPricingOptions(Uuid),
    #[error("active pass {0} has no venue partnerships")]
    NoPartnerships(Uuid),
    #[error("pricing option {pricing_option_id} grants an invalid validity of {days} days")]
    InvalidValidity { pricing_option_id: Uuid, days: u32 },
    #[error("pass {pass_id} has more than one active partnership for venue {venue_id}")]
    DuplicatePartnership { pass_id: Uuid, venue_id: Uuid },
}

impl Pass {
    pub fn pricing_option(&self, pricing_option_id: Uuid) -> Option<&PricingOption> {
        self.pricing_options
            .iter()
            .find(|option| option.id == pricing_option_id)
    }

    /// The single active partnership binding this pass to `venue_id`, if any.
    pub fn partnership_for(&self, venue_id: Uuid) -> Option<&VenuePartnership> {
        self.partnerships
            .iter()
            .find(|p| p.venue_id == venue_id && p.is_active)
    }

    pub fn validate(&self) -> Result<(), PassInvariantError> {
        if let Some(option) = self
            .pricing_options
            .iter()
            .find(|o| o.days == 0 || o.days > MAX_VALIDITY_DAYS)
        {
            return Err(PassInvariantError::InvalidValidity {
                pricing_option_id: option.id,
                days: option.days,
            });
        }

        let mut seen = HashSet::new();
        for partnership in self.partnerships.iter().filter(|p| p.is_active) {
            if !seen.insert(partnership.venue_id) {
                return Err(PassInvariantError::DuplicatePartnership {
                    pass_id: self.id,
                    venue_id: partnership.venue_id,
                });
            }
        }

        if self.status == PassStatus::Active {
            if self.pricing_options.is_empty() {
                return Err(PassInvariantError::NoPricingOptions(self.id));
            }
            if self.partnerships.is_empty() {
                return Err(PassInvariantError::NoPartnerships(self.id));
            }
        }

        Ok(())
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percent,
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percent => "percent",
            DiscountKind::Fixed => "fixed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "percent" => Some(DiscountKind::Percent),
            "fixed" => Some(DiscountKind::Fixed),
            _ => None,
        }
    }

    /// Amount taken off `subtotal`, never more than the subtotal itself.
    pub fn amount_off(&self, value: Decimal, subtotal: Decimal) -> Decimal {
        let raw = match self {
            DiscountKind::Percent => subtotal * value / Decimal::ONE_HUNDRED,
            DiscountKind::Fixed => value,
        };
        raw.round_dp(2).max(Decimal::ZERO).min(subtotal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: Uuid,
    /// Stored upper-cased; lookups normalise the same way.
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub pass_id: Option<Uuid>,
    pub minimum_subtotal: Option<Decimal>,
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub usage_count: u32,
    pub per_customer_limit: Option<u32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl DiscountCode {
    pub fn normalize(code: &str) -> String {
        code.trim().to_uppercase()
    }

    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        let started = self.starts_at.map_or(true, |start| start <= now);
        let not_ended = self.ends_at.map_or(true, |end| now <= end);
        started && not_ended
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .map_or(false, |limit| self.usage_count >= limit)
    }
}

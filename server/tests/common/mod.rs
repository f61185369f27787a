#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use citypass_server::models::{
    AgeGroup, ConfirmedOrder, DiscountCode, DiscountKind, Pass, PassStatus, PricingOption,
    UsageRule, VenuePartnership,
};
use citypass_server::services::{EngineSettings, FixedClock, PassEngine, RandomCredentialGenerator};
use citypass_server::store::InMemoryStore;
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct Fixture {
    pub engine: PassEngine,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub pass: Pass,
    pub t0: DateTime<Utc>,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 14, 10, 0, 0).unwrap()
}

pub fn pass(venues: &[(Uuid, UsageRule)], usage_cap: Option<u32>) -> Pass {
    let id = Uuid::new_v4();
    Pass {
        id,
        name: "Old Town Pass".to_string(),
        description: Some("Museums, towers and river cruises".to_string()),
        status: PassStatus::Active,
        usage_cap,
        pricing_options: vec![PricingOption {
            id: Uuid::new_v4(),
            days: 3,
            age_group: AgeGroup::Adult,
            base_price: Decimal::new(89, 0),
            discount_percent: None,
        }],
        partnerships: venues
            .iter()
            .enumerate()
            .map(|(i, (venue_id, rule))| VenuePartnership {
                id: Uuid::new_v4(),
                pass_id: id,
                venue_id: *venue_id,
                venue_name: format!("Venue {}", i + 1),
                discount_percent: Decimal::new(100, 0),
                usage_rule: *rule,
                is_active: true,
            })
            .collect(),
        created_at: t0(),
        updated_at: t0(),
    }
}

pub fn percent_code(code: &str, value: i64, minimum: Option<i64>) -> DiscountCode {
    DiscountCode {
        id: Uuid::new_v4(),
        code: code.to_string(),
        kind: DiscountKind::Percent,
        value: Decimal::new(value, 0),
        pass_id: None,
        minimum_subtotal: minimum.map(|m| Decimal::new(m, 0)),
        usage_limit: None,
        usage_count: 0,
        per_customer_limit: None,
        starts_at: None,
        ends_at: None,
    }
}

pub async fn fixture(venues: &[(Uuid, UsageRule)], usage_cap: Option<u32>) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::new(t0()));
    let pass = pass(venues, usage_cap);
    store.put_pass(pass.clone()).await;

    let engine = PassEngine::with_store(
        store.clone(),
        Arc::new(RandomCredentialGenerator::default()),
        clock.clone(),
        EngineSettings::default(),
    );

    Fixture {
        engine,
        store,
        clock,
        pass,
        t0: t0(),
    }
}

impl Fixture {
    pub fn order(&self, quantity: u32) -> ConfirmedOrder {
        ConfirmedOrder {
            order_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            pass_id: self.pass.id,
            pricing_option_id: self.pass.pricing_options[0].id,
            paid_amount: Decimal::new(89, 0),
            quantity,
        }
    }
}

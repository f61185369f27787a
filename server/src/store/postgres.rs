use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use super::{
    CatalogStore, DiscountCodeStore, EntitlementStore, RedemptionCommit, StoreError,
};
use crate::models::{
    AgeGroup, DiscountCode, DiscountKind, EntitlementStatus, Pass, PassStatus,
    PricingOption, PurchasedEntitlement, RedemptionEvent, RedemptionEventOutcome, UsageRule,
    VenuePartnership,
};

const ENTITLEMENT_COLUMNS: &str = "id, customer_id, order_id, pass_id, pricing_option_id, \
     activation_code, pin_code, issued_at, expires_at, status, usage_count, usage_cap, version";

#[derive(FromRow)]
struct PassRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    status: String,
    usage_cap: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct PricingOptionRow {
    id: Uuid,
    days: i32,
    age_group: String,
    base_price: Decimal,
    discount_percent: Option<Decimal>,
}

#[derive(FromRow)]
struct PartnershipRow {
    id: Uuid,
    pass_id: Uuid,
    venue_id: Uuid,
    venue_name: String,
    discount_percent: Decimal,
    usage_rule: String,
    usage_max: Option<i32>,
    is_active: bool,
}

#[derive(FromRow)]
struct DiscountCodeRow {
    id: Uuid,
    code: String,
    kind: String,
    value: Decimal,
    pass_id: Option<Uuid>,
    minimum_subtotal: Option<Decimal>,
    usage_limit: Option<i32>,
    usage_count: i32,
    per_customer_limit: Option<i32>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct EntitlementRow {
    id: Uuid,
    customer_id: Uuid,
    order_id: Uuid,
    pass_id: Uuid,
    pricing_option_id: Uuid,
    activation_code: String,
    pin_code: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    usage_count: i32,
    usage_cap: Option<i32>,
    version: i64,
}

#[derive(FromRow)]
struct RedemptionEventRow {
    id: Uuid,
    entitlement_id: Uuid,
    venue_id: Uuid,
    redeemed_at: DateTime<Utc>,
    outcome: String,
}

fn count(value: i32, field: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", field, value)))
}

fn optional_count(value: Option<i32>, field: &str) -> Result<Option<u32>, StoreError> {
    value.map(|v| count(v, field)).transpose()
}

fn column(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl TryFrom<PricingOptionRow> for PricingOption {
    type Error = StoreError;

    fn try_from(row: PricingOptionRow) -> Result<Self, Self::Error> {
        Ok(PricingOption {
            id: row.id,
            days: count(row.days, "days")?,
            age_group: AgeGroup::parse(&row.age_group)
                .ok_or_else(|| StoreError::Corrupt(format!("age group {}", row.age_group)))?,
            base_price: row.base_price,
            discount_percent: row.discount_percent,
        })
    }
}

impl TryFrom<PartnershipRow> for VenuePartnership {
    type Error = StoreError;

    fn try_from(row: PartnershipRow) -> Result<Self, Self::Error> {
        let max = optional_count(row.usage_max, "usage_max")?;
        Ok(VenuePartnership {
            id: row.id,
            pass_id: row.pass_id,
            venue_id: row.venue_id,
            venue_name: row.venue_name,
            discount_percent: row.discount_percent,
            usage_rule: UsageRule::from_parts(&row.usage_rule, max)
                .ok_or_else(|| StoreError::Corrupt(format!("usage rule {}", row.usage_rule)))?,
            is_active: row.is_active,
        })
    }
}

impl TryFrom<DiscountCodeRow> for DiscountCode {
    type Error = StoreError;

    fn try_from(row: DiscountCodeRow) -> Result<Self, Self::Error> {
        Ok(DiscountCode {
            id: row.id,
            code: DiscountCode::normalize(&row.code),
            kind: DiscountKind::parse(&row.kind)
                .ok_or_else(|| StoreError::Corrupt(format!("discount kind {}", row.kind)))?,
            value: row.value,
            pass_id: row.pass_id,
            minimum_subtotal: row.minimum_subtotal,
            usage_limit: optional_count(row.usage_limit, "usage_limit")?,
            usage_count: count(row.usage_count, "usage_count")?,
            per_customer_limit: optional_count(row.per_customer_limit, "per_customer_limit")?,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
        })
    }
}

impl TryFrom<RedemptionEventRow> for RedemptionEvent {
    type Error = StoreError;

    fn try_from(row: RedemptionEventRow) -> Result<Self, Self::Error> {
        let outcome = match row.outcome.as_str() {
            "granted" => RedemptionEventOutcome::Granted,
            other => return Err(StoreError::Corrupt(format!("redemption outcome {}", other))),
        };
        Ok(RedemptionEvent {
            id: row.id,
            entitlement_id: row.entitlement_id,
            venue_id: row.venue_id,
            redeemed_at: row.redeemed_at,
            outcome,
        })
    }
}

/// Postgres adapter. Entitlement writes run in a transaction guarded by
/// `WHERE version = $expected`, so the row lock taken by the UPDATE serialises
/// concurrent writers per entitlement.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!("Successfully connected to database");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await?;
        tracing::info!("Migrations run successfully");
        Ok(())
    }

    async fn fetch_entitlement(
        conn: &mut PgConnection,
        predicate: &str,
        key: EntitlementKey<'_>,
    ) -> Result<Option<PurchasedEntitlement>, StoreError> {
        let sql = format!(
            "SELECT {} FROM purchased_entitlements WHERE {} = $1",
            ENTITLEMENT_COLUMNS, predicate
        );
        let query = sqlx::query_as::<_, EntitlementRow>(&sql);
        let row = match key {
            EntitlementKey::Id(id) => query.bind(id).fetch_optional(&mut *conn).await?,
            EntitlementKey::ActivationCode(code) => {
                query.bind(code).fetch_optional(&mut *conn).await?
            }
        };

        match row {
            Some(row) => Ok(Some(Self::hydrate(conn, row).await?)),
            None => Ok(None),
        }
    }

    async fn hydrate(
        conn: &mut PgConnection,
        row: EntitlementRow,
    ) -> Result<PurchasedEntitlement, StoreError> {
        let usage: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT venue_id, redemptions FROM entitlement_venue_usage WHERE entitlement_id = $1",
        )
        .bind(row.id)
        .fetch_all(&mut *conn)
        .await?;

        let venue_usage: HashMap<Uuid, u32> = usage
            .into_iter()
            .map(|(venue_id, n)| count(n, "redemptions").map(|n| (venue_id, n)))
            .collect::<Result<_, _>>()?;

        Ok(PurchasedEntitlement {
            id: row.id,
            customer_id: row.customer_id,
            order_id: row.order_id,
            pass_id: row.pass_id,
            pricing_option_id: row.pricing_option_id,
            activation_code: row.activation_code,
            pin_code: row.pin_code,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            status: EntitlementStatus::parse(&row.status)
                .ok_or_else(|| StoreError::Corrupt(format!("entitlement status {}", row.status)))?,
            usage_count: count(row.usage_count, "usage_count")?,
            usage_cap: optional_count(row.usage_cap, "usage_cap")?,
            venue_usage,
            version: row.version,
        })
    }

    /// Distinguishes a stale version from a missing row after a guarded UPDATE matched nothing.
    async fn conflict_or_missing(
        conn: &mut PgConnection,
        entitlement_id: Uuid,
        expected: i64,
    ) -> StoreError {
        let current: Result<Option<(i64,)>, sqlx::Error> =
            sqlx::query_as("SELECT version FROM purchased_entitlements WHERE id = $1")
                .bind(entitlement_id)
                .fetch_optional(&mut *conn)
                .await;

        match current {
            Ok(Some((actual,))) => StoreError::VersionConflict {
                entitlement_id,
                expected,
                actual,
            },
            Ok(None) => StoreError::NotFound(entitlement_id),
            Err(e) => StoreError::Database(e),
        }
    }
}

enum EntitlementKey<'a> {
    Id(Uuid),
    ActivationCode(&'a str),
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn load_pass(&self, pass_id: Uuid) -> Result<Option<Pass>, StoreError> {
        let row: Option<PassRow> = sqlx::query_as(
            "SELECT id, name, description, status, usage_cap, created_at, updated_at
             FROM passes WHERE id = $1",
        )
        .bind(pass_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let options: Vec<PricingOptionRow> = sqlx::query_as(
            "SELECT id, days, age_group, base_price, discount_percent
             FROM pricing_options WHERE pass_id = $1 ORDER BY days, age_group",
        )
        .bind(pass_id)
        .fetch_all(&self.pool)
        .await?;

        let partnerships: Vec<PartnershipRow> = sqlx::query_as(
            "SELECT id, pass_id, venue_id, venue_name, discount_percent, usage_rule, usage_max,
                    is_active
             FROM venue_partnerships WHERE pass_id = $1 ORDER BY venue_name",
        )
        .bind(pass_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Pass {
            id: row.id,
            name: row.name,
            description: row.description,
            status: PassStatus::parse(&row.status)
                .ok_or_else(|| StoreError::Corrupt(format!("pass status {}", row.status)))?,
            usage_cap: optional_count(row.usage_cap, "usage_cap")?,
            pricing_options: options
                .into_iter()
                .map(PricingOption::try_from)
                .collect::<Result<_, _>>()?,
            partnerships: partnerships
                .into_iter()
                .map(VenuePartnership::try_from)
                .collect::<Result<_, _>>()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }
}

#[async_trait]
impl DiscountCodeStore for PgStore {
    async fn find_code(&self, code: &str) -> Result<Option<DiscountCode>, StoreError> {
        let row: Option<DiscountCodeRow> = sqlx::query_as(
            "SELECT id, code, kind, value, pass_id, minimum_subtotal, usage_limit, usage_count,
                    per_customer_limit, starts_at, ends_at
             FROM discount_codes WHERE upper(btrim(code)) = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DiscountCode::try_from).transpose()
    }

    async fn customer_usage(&self, code_id: Uuid, customer_id: Uuid) -> Result<u32, StoreError> {
        let (used,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM discount_code_usages WHERE code_id = $1 AND customer_id = $2",
        )
        .bind(code_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        u32::try_from(used).map_err(|_| StoreError::Corrupt(format!("usage count {}", used)))
    }

    async fn record_discount_usage(
        &self,
        code_id: Uuid,
        customer_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated =
            sqlx::query("UPDATE discount_codes SET usage_count = usage_count + 1 WHERE id = $1")
                .bind(code_id)
                .execute(&mut *tx)
                .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(code_id));
        }

        sqlx::query(
            "INSERT INTO discount_code_usages (id, code_id, customer_id, used_at)
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(code_id)
        .bind(customer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EntitlementStore for PgStore {
    async fn insert_entitlements(
        &self,
        entitlements: &[PurchasedEntitlement],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for entitlement in entitlements {
            let inserted = sqlx::query(
                "INSERT INTO purchased_entitlements
                    (id, customer_id, order_id, pass_id, pricing_option_id, activation_code,
                     pin_code, issued_at, expires_at, status, usage_count, usage_cap, version)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(entitlement.id)
            .bind(entitlement.customer_id)
            .bind(entitlement.order_id)
            .bind(entitlement.pass_id)
            .bind(entitlement.pricing_option_id)
            .bind(&entitlement.activation_code)
            .bind(&entitlement.pin_code)
            .bind(entitlement.issued_at)
            .bind(entitlement.expires_at)
            .bind(entitlement.status.as_str())
            .bind(column(entitlement.usage_count))
            .bind(entitlement.usage_cap.map(column))
            .bind(entitlement.version)
            .execute(&mut *tx)
            .await;

            // Dropping the transaction rolls back the units already inserted.
            match inserted {
                Ok(_) => {}
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    return Err(StoreError::DuplicateCredential);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_entitlement(&self, id: Uuid) -> Result<Option<PurchasedEntitlement>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_entitlement(&mut conn, "id", EntitlementKey::Id(id)).await
    }

    async fn find_by_activation_code(
        &self,
        activation_code: &str,
    ) -> Result<Option<PurchasedEntitlement>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_entitlement(
            &mut conn,
            "activation_code",
            EntitlementKey::ActivationCode(activation_code),
        )
        .await
    }

    async fn activation_code_exists(&self, activation_code: &str) -> Result<bool, StoreError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM purchased_entitlements WHERE activation_code = $1)",
        )
        .bind(activation_code)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn active_pin_exists(
        &self,
        pin_code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(
                SELECT 1 FROM purchased_entitlements
                WHERE pin_code = $1 AND status = 'active' AND expires_at >= $2)",
        )
        .bind(pin_code)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<PurchasedEntitlement>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM purchased_entitlements WHERE customer_id = $1 ORDER BY issued_at DESC",
            ENTITLEMENT_COLUMNS
        );
        let rows: Vec<EntitlementRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut entitlements = Vec::with_capacity(rows.len());
        for row in rows {
            entitlements.push(Self::hydrate(&mut conn, row).await?);
        }
        Ok(entitlements)
    }

    async fn commit_redemption(
        &self,
        commit: RedemptionCommit,
    ) -> Result<PurchasedEntitlement, StoreError> {
        let mut tx = self.pool.begin().await?;

        let bumped = sqlx::query(
            "UPDATE purchased_entitlements
             SET usage_count = usage_count + 1, version = version + 1
             WHERE id = $1 AND version = $2",
        )
        .bind(commit.entitlement_id)
        .bind(commit.expected_version)
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            let err =
                Self::conflict_or_missing(&mut tx, commit.entitlement_id, commit.expected_version)
                    .await;
            tx.rollback().await?;
            return Err(err);
        }

        sqlx::query(
            "INSERT INTO entitlement_venue_usage (entitlement_id, venue_id, redemptions)
             VALUES ($1, $2, 1)
             ON CONFLICT (entitlement_id, venue_id)
             DO UPDATE SET redemptions = entitlement_venue_usage.redemptions + 1",
        )
        .bind(commit.entitlement_id)
        .bind(commit.venue_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO redemption_events (id, entitlement_id, venue_id, redeemed_at, outcome)
             VALUES ($1, $2, $3, $4, 'granted')",
        )
        .bind(commit.event_id)
        .bind(commit.entitlement_id)
        .bind(commit.venue_id)
        .bind(commit.redeemed_at)
        .execute(&mut *tx)
        .await?;

        let key = EntitlementKey::Id(commit.entitlement_id);
        let updated = Self::fetch_entitlement(&mut tx, "id", key)
            .await?
            .ok_or(StoreError::NotFound(commit.entitlement_id))?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn set_status(
        &self,
        entitlement_id: Uuid,
        expected_version: i64,
        status: EntitlementStatus,
    ) -> Result<PurchasedEntitlement, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE purchased_entitlements
             SET status = $3, version = version + 1
             WHERE id = $1 AND version = $2",
        )
        .bind(entitlement_id)
        .bind(expected_version)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let err = Self::conflict_or_missing(&mut tx, entitlement_id, expected_version).await;
            tx.rollback().await?;
            return Err(err);
        }

        let entitlement = Self::fetch_entitlement(&mut tx, "id", EntitlementKey::Id(entitlement_id))
            .await?
            .ok_or(StoreError::NotFound(entitlement_id))?;

        tx.commit().await?;
        Ok(entitlement)
    }

    async fn redemption_events(
        &self,
        entitlement_id: Uuid,
    ) -> Result<Vec<RedemptionEvent>, StoreError> {
        let rows: Vec<RedemptionEventRow> = sqlx::query_as(
            "SELECT id, entitlement_id, venue_id, redeemed_at, outcome
             FROM redemption_events WHERE entitlement_id = $1 ORDER BY redeemed_at, id",
        )
        .bind(entitlement_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RedemptionEvent::try_from).collect()
    }
}

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    CatalogStore, DiscountCodeStore, EntitlementStore, RedemptionCommit, StoreError,
};
use crate::models::{
    DiscountCode, EntitlementStatus, Pass, PassInvariantError, PurchasedEntitlement,
    RedemptionEvent, RedemptionEventOutcome,
};

/// Catalog document accepted by `CATALOG_SEED_PATH`.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub passes: Vec<Pass>,
    #[serde(default)]
    pub discount_codes: Vec<DiscountCode>,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read catalog seed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog seed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invariant(#[from] PassInvariantError),
}

impl CatalogSeed {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        let seed: CatalogSeed = serde_json::from_str(&raw)?;
        for pass in &seed.passes {
            pass.validate()?;
        }
        Ok(seed)
    }
}

#[derive(Default)]
struct EntitlementTable {
    by_id: HashMap<Uuid, PurchasedEntitlement>,
    by_activation_code: HashMap<String, Uuid>,
    events: Vec<RedemptionEvent>,
}

#[derive(Default)]
struct DiscountTable {
    by_code: HashMap<String, DiscountCode>,
    customer_usage: HashMap<(Uuid, Uuid), u32>,
}

/// Process-local store. Every entitlement mutation runs inside one mutex section,
/// which makes the version check and the write a single step.
#[derive(Default)]
pub struct InMemoryStore {
    passes: RwLock<HashMap<Uuid, Pass>>,
    discounts: RwLock<DiscountTable>,
    entitlements: Mutex<EntitlementTable>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        let passes = seed.passes.into_iter().map(|p| (p.id, p)).collect();
        let by_code = seed
            .discount_codes
            .into_iter()
            .map(|mut c| {
                c.code = DiscountCode::normalize(&c.code);
                (c.code.clone(), c)
            })
            .collect();

        Self {
            passes: RwLock::new(passes),
            discounts: RwLock::new(DiscountTable {
                by_code,
                customer_usage: HashMap::new(),
            }),
            entitlements: Mutex::new(EntitlementTable::default()),
        }
    }

    pub async fn put_pass(&self, pass: Pass) {
        self.passes.write().await.insert(pass.id, pass);
    }

    pub async fn put_discount_code(&self, mut code: DiscountCode) {
        code.code = DiscountCode::normalize(&code.code);
        self.discounts
            .write()
            .await
            .by_code
            .insert(code.code.clone(), code);
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn load_pass(&self, pass_id: Uuid) -> Result<Option<Pass>, StoreError> {
        Ok(self.passes.read().await.get(&pass_id).cloned())
    }
}

#[async_trait]
impl DiscountCodeStore for InMemoryStore {
    async fn find_code(&self, code: &str) -> Result<Option<DiscountCode>, StoreError> {
        Ok(self.discounts.read().await.by_code.get(code).cloned())
    }

    async fn customer_usage(&self, code_id: Uuid, customer_id: Uuid) -> Result<u32, StoreError> {
        Ok(self
            .discounts
            .read()
            .await
            .customer_usage
            .get(&(code_id, customer_id))
            .copied()
            .unwrap_or(0))
    }

    async fn record_discount_usage(
        &self,
        code_id: Uuid,
        customer_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut table = self.discounts.write().await;
        let code = table
            .by_code
            .values_mut()
            .find(|c| c.id == code_id)
            .ok_or(StoreError::NotFound(code_id))?;
        code.usage_count += 1;

        if let Some(customer_id) = customer_id {
            *table
                .customer_usage
                .entry((code_id, customer_id))
                .or_insert(0) += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl EntitlementStore for InMemoryStore {
    async fn insert_entitlements(
        &self,
        entitlements: &[PurchasedEntitlement],
    ) -> Result<(), StoreError> {
        let mut table = self.entitlements.lock().await;

        let mut incoming = HashSet::with_capacity(entitlements.len());
        for entitlement in entitlements {
            let code = entitlement.activation_code.as_str();
            if table.by_activation_code.contains_key(code) || !incoming.insert(code) {
                return Err(StoreError::DuplicateCredential);
            }
        }

        for entitlement in entitlements {
            table
                .by_activation_code
                .insert(entitlement.activation_code.clone(), entitlement.id);
            table.by_id.insert(entitlement.id, entitlement.clone());
        }
        Ok(())
    }

    async fn load_entitlement(&self, id: Uuid) -> Result<Option<PurchasedEntitlement>, StoreError> {
        Ok(self.entitlements.lock().await.by_id.get(&id).cloned())
    }

    async fn find_by_activation_code(
        &self,
        activation_code: &str,
    ) -> Result<Option<PurchasedEntitlement>, StoreError> {
        let table = self.entitlements.lock().await;
        Ok(table
            .by_activation_code
            .get(activation_code)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn activation_code_exists(&self, activation_code: &str) -> Result<bool, StoreError> {
        Ok(self
            .entitlements
            .lock()
            .await
            .by_activation_code
            .contains_key(activation_code))
    }

    async fn active_pin_exists(
        &self,
        pin_code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.entitlements.lock().await.by_id.values().any(|e| {
            e.pin_code == pin_code && e.status == EntitlementStatus::Active && e.expires_at >= now
        }))
    }

    async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<PurchasedEntitlement>, StoreError> {
        let mut owned: Vec<_> = self
            .entitlements
            .lock()
            .await
            .by_id
            .values()
            .filter(|e| e.customer_id == customer_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(owned)
    }

    async fn commit_redemption(
        &self,
        commit: RedemptionCommit,
    ) -> Result<PurchasedEntitlement, StoreError> {
        let mut table = self.entitlements.lock().await;
        let entitlement = table
            .by_id
            .get_mut(&commit.entitlement_id)
            .ok_or(StoreError::NotFound(commit.entitlement_id))?;

        if entitlement.version != commit.expected_version {
            return Err(StoreError::VersionConflict {
                entitlement_id: commit.entitlement_id,
                expected: commit.expected_version,
                actual: entitlement.version,
            });
        }

        entitlement.usage_count += 1;
        *entitlement.venue_usage.entry(commit.venue_id).or_insert(0) += 1;
        entitlement.version += 1;
        let updated = entitlement.clone();

        table.events.push(RedemptionEvent {
            id: commit.event_id,
            entitlement_id: commit.entitlement_id,
            venue_id: commit.venue_id,
            redeemed_at: commit.redeemed_at,
            outcome: RedemptionEventOutcome::Granted,
        });

        Ok(updated)
    }

    async fn set_status(
        &self,
        entitlement_id: Uuid,
        expected_version: i64,
        status: EntitlementStatus,
    ) -> Result<PurchasedEntitlement, StoreError> {
        let mut table = self.entitlements.lock().await;
        let entitlement = table
            .by_id
            .get_mut(&entitlement_id)
            .ok_or(StoreError::NotFound(entitlement_id))?;

        if entitlement.version != expected_version {
            return Err(StoreError::VersionConflict {
                entitlement_id,
                expected: expected_version,
                actual: entitlement.version,
            });
        }

        entitlement.status = status;
        entitlement.version += 1;
        Ok(entitlement.clone())
    }

    async fn redemption_events(
        &self,
        entitlement_id: Uuid,
    ) -> Result<Vec<RedemptionEvent>, StoreError> {
        Ok(self
            .entitlements
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.entitlement_id == entitlement_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entitlement(activation_code: &str) -> PurchasedEntitlement {
        let now = Utc::now();
        PurchasedEntitlement {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            pass_id: Uuid::new_v4(),
            pricing_option_id: Uuid::new_v4(),
            activation_code: activation_code.to_string(),
            pin_code: "123456".to_string(),
            issued_at: now,
            expires_at: now + Duration::days(3),
            status: EntitlementStatus::Active,
            usage_count: 0,
            usage_cap: None,
            venue_usage: HashMap::new(),
            version: 0,
        }
    }

    fn commit(e: &PurchasedEntitlement, expected_version: i64, venue_id: Uuid) -> RedemptionCommit {
        RedemptionCommit {
            entitlement_id: e.id,
            expected_version,
            venue_id,
            event_id: Uuid::new_v4(),
            redeemed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_activation_code_rejected() {
        let store = InMemoryStore::new();
        store.insert_entitlement(&entitlement("CP-AAAA")).await.unwrap();

        let err = store
            .insert_entitlement(&entitlement("CP-AAAA"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCredential));
    }

    #[tokio::test]
    async fn test_batch_insert_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store.insert_entitlement(&entitlement("CP-TAKEN")).await.unwrap();

        let clashes_with_store = [entitlement("CP-NEW1"), entitlement("CP-TAKEN")];
        let err = store.insert_entitlements(&clashes_with_store).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCredential));
        assert!(!store.activation_code_exists("CP-NEW1").await.unwrap());

        let clashes_within = [entitlement("CP-NEW2"), entitlement("CP-NEW2")];
        let err = store.insert_entitlements(&clashes_within).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCredential));
        assert!(!store.activation_code_exists("CP-NEW2").await.unwrap());

        let clean = [entitlement("CP-NEW3"), entitlement("CP-NEW4")];
        store.insert_entitlements(&clean).await.unwrap();
        assert!(store.activation_code_exists("CP-NEW3").await.unwrap());
        assert!(store.activation_code_exists("CP-NEW4").await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_redemption_bumps_counters_and_version() {
        let store = InMemoryStore::new();
        let e = entitlement("CP-BBBB");
        store.insert_entitlement(&e).await.unwrap();
        let venue_id = Uuid::new_v4();

        let updated = store.commit_redemption(commit(&e, 0, venue_id)).await.unwrap();
        assert_eq!(updated.usage_count, 1);
        assert_eq!(updated.redemptions_at(venue_id), 1);
        assert_eq!(updated.version, 1);
        assert_eq!(store.redemption_events(e.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_version_writes_nothing() {
        let store = InMemoryStore::new();
        let e = entitlement("CP-CCCC");
        store.insert_entitlement(&e).await.unwrap();
        let venue_id = Uuid::new_v4();
        store.commit_redemption(commit(&e, 0, venue_id)).await.unwrap();

        let err = store
            .commit_redemption(commit(&e, 0, venue_id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict { expected: 0, actual: 1, .. }
        ));

        let stored = store.load_entitlement(e.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
        assert_eq!(store.redemption_events(e.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_active_pin_ignores_revoked_and_expired() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let mut revoked = entitlement("CP-DDDD");
        revoked.pin_code = "111111".to_string();
        revoked.status = EntitlementStatus::Revoked;
        store.insert_entitlement(&revoked).await.unwrap();

        let mut expired = entitlement("CP-EEEE");
        expired.pin_code = "222222".to_string();
        expired.expires_at = now - Duration::hours(1);
        store.insert_entitlement(&expired).await.unwrap();

        assert!(!store.active_pin_exists("111111", now).await.unwrap());
        assert!(!store.active_pin_exists("222222", now).await.unwrap());
        assert!(store.active_pin_exists("123456", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_discount_usage_tracks_customer() {
        let store = InMemoryStore::new();
        let code = DiscountCode {
            id: Uuid::new_v4(),
            code: "welcome".to_string(),
            kind: crate::models::DiscountKind::Fixed,
            value: rust_decimal::Decimal::new(5, 0),
            pass_id: None,
            minimum_subtotal: None,
            usage_limit: Some(10),
            usage_count: 0,
            per_customer_limit: Some(1),
            starts_at: None,
            ends_at: None,
        };
        let code_id = code.id;
        store.put_discount_code(code).await;
        let customer_id = Uuid::new_v4();

        store.record_discount_usage(code_id, Some(customer_id)).await.unwrap();
        store.record_discount_usage(code_id, None).await.unwrap();

        let stored = store.find_code("WELCOME").await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 2);
        assert_eq!(store.customer_usage(code_id, customer_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_example_seed_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/catalog.example.json");
        let seed = CatalogSeed::from_file(path).unwrap();
        let pass_id = seed.passes[0].id;
        let store = InMemoryStore::from_seed(seed);

        let pass = store.load_pass(pass_id).await.unwrap().unwrap();
        assert_eq!(pass.partnerships.len(), 3);
        assert!(store.find_code("SUMMER10").await.unwrap().is_some());
    }
}

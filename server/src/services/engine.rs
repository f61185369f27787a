use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{
    effective_status, Catalog, Clock, Credential, CredentialGenerator, DiscountCodeValidator,
    EngineError, EntitlementIssuer, RedemptionOutcome, RedemptionValidator, ValidationResult,
};
use crate::models::{
    ConfirmedOrder, DiscountCode, EffectiveStatus, EntitlementStatus, EntitlementView, Pass,
    PurchasedEntitlement, RedemptionEvent, VenuePartnership, VenueUsage,
};
use crate::store::{CatalogStore, DiscountCodeStore, EntitlementStore, StoreError};

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub redemption_max_retries: u32,
    pub credential_max_attempts: u32,
    /// Upper bound on units in one order line.
    pub max_order_quantity: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            redemption_max_retries: 3,
            credential_max_attempts: 8,
            max_order_quantity: 20,
        }
    }
}

/// Entry point used by the HTTP layer, admin tooling and terminals.
#[derive(Clone)]
pub struct PassEngine {
    catalog: Catalog,
    discounts: DiscountCodeValidator,
    issuer: EntitlementIssuer,
    redemptions: RedemptionValidator,
    entitlements: Arc<dyn EntitlementStore>,
    clock: Arc<dyn Clock>,
    max_order_quantity: u32,
}

impl PassEngine {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        discounts: Arc<dyn DiscountCodeStore>,
        entitlements: Arc<dyn EntitlementStore>,
        credentials: Arc<dyn CredentialGenerator>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let catalog = Catalog::new(catalog);
        Self {
            discounts: DiscountCodeValidator::new(discounts, clock.clone()),
            issuer: EntitlementIssuer::new(
                entitlements.clone(),
                credentials,
                clock.clone(),
                settings.credential_max_attempts,
            ),
            redemptions: RedemptionValidator::new(
                catalog.clone(),
                entitlements.clone(),
                settings.redemption_max_retries,
            ),
            catalog,
            entitlements,
            clock,
            max_order_quantity: settings.max_order_quantity.max(1),
        }
    }

    /// Builds an engine whose three ports are served by one store.
    pub fn with_store<S>(
        store: Arc<S>,
        credentials: Arc<dyn CredentialGenerator>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self
    where
        S: CatalogStore + DiscountCodeStore + EntitlementStore + 'static,
    {
        Self::new(
            store.clone(),
            store.clone(),
            store,
            credentials,
            clock,
            settings,
        )
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn get_pass(&self, pass_id: Uuid) -> Result<Pass, EngineError> {
        self.catalog.get_pass(pass_id).await
    }

    pub async fn get_venue_partnership(
        &self,
        pass_id: Uuid,
        venue_id: Uuid,
    ) -> Result<VenuePartnership, EngineError> {
        self.catalog.get_venue_partnership(pass_id, venue_id).await
    }

    pub async fn validate_discount_code(
        &self,
        code: &str,
        subtotal: Decimal,
        customer_id: Option<Uuid>,
        pass_id: Option<Uuid>,
    ) -> Result<ValidationResult, EngineError> {
        self.discounts
            .validate(code, subtotal, customer_id, pass_id)
            .await
    }

    /// Counts one completed checkout against a discount code.
    pub async fn record_discount_usage(
        &self,
        code: &str,
        customer_id: Option<Uuid>,
    ) -> Result<DiscountCode, EngineError> {
        self.discounts.record_usage(code, customer_id).await
    }

    pub async fn issue_entitlement(
        &self,
        order: &ConfirmedOrder,
        pass: &Pass,
        pricing_option_id: Uuid,
        customer_id: Uuid,
    ) -> Result<PurchasedEntitlement, EngineError> {
        let pricing_option = pass.pricing_option(pricing_option_id).ok_or(
            EngineError::PricingOptionMismatch {
                pass_id: pass.id,
                pricing_option_id,
            },
        )?;
        self.issuer
            .issue(order, pass, pricing_option, customer_id)
            .await
    }

    /// Issues every unit of a confirmed order line. The units are persisted together or not
    /// at all.
    pub async fn issue_order(
        &self,
        order: &ConfirmedOrder,
    ) -> Result<Vec<PurchasedEntitlement>, EngineError> {
        if !(1..=self.max_order_quantity).contains(&order.quantity) {
            return Err(EngineError::InvalidInput(format!(
                "quantity must be between 1 and {}",
                self.max_order_quantity
            )));
        }
        let pass = self.catalog.get_pass(order.pass_id).await?;
        let pricing_option = pass.pricing_option(order.pricing_option_id).ok_or(
            EngineError::PricingOptionMismatch {
                pass_id: pass.id,
                pricing_option_id: order.pricing_option_id,
            },
        )?;

        self.issuer
            .issue_batch(order, &pass, pricing_option, order.customer_id, order.quantity)
            .await
    }

    pub async fn get_entitlement_view(
        &self,
        entitlement_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<EntitlementView, EngineError> {
        let entitlement = self.load(entitlement_id).await?;
        Ok(view(&entitlement, now))
    }

    pub async fn list_customer_entitlements(
        &self,
        customer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<EntitlementView>, EngineError> {
        let owned = self.entitlements.list_for_customer(customer_id).await?;
        Ok(owned.iter().map(|e| view(e, now)).collect())
    }

    pub async fn list_redemptions(
        &self,
        entitlement_id: Uuid,
    ) -> Result<Vec<RedemptionEvent>, EngineError> {
        self.load(entitlement_id).await?;
        Ok(self.entitlements.redemption_events(entitlement_id).await?)
    }

    pub async fn redeem(
        &self,
        credential: &Credential,
        venue_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RedemptionOutcome, EngineError> {
        self.redemptions.redeem(credential, venue_id, now).await
    }

    /// Administrative revoke. Shares the version check with redemption, so a revoke
    /// racing a scan is ordered strictly before or after it.
    pub async fn revoke_entitlement(
        &self,
        entitlement_id: Uuid,
    ) -> Result<EntitlementView, EngineError> {
        let mut conflicts = 0;
        loop {
            let current = self.load(entitlement_id).await?;
            if current.status == EntitlementStatus::Revoked {
                return Ok(view(&current, self.clock.now()));
            }

            match self
                .entitlements
                .set_status(entitlement_id, current.version, EntitlementStatus::Revoked)
                .await
            {
                Ok(revoked) => {
                    tracing::info!(entitlement_id = %entitlement_id, "Entitlement revoked");
                    return Ok(view(&revoked, self.clock.now()));
                }
                Err(StoreError::VersionConflict { .. }) => {
                    conflicts += 1;
                    if conflicts > self.redemptions_retry_budget() {
                        return Err(EngineError::ConcurrentRedemptionConflict {
                            entitlement_id,
                            attempts: conflicts,
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn redemptions_retry_budget(&self) -> u32 {
        self.redemptions.max_retries()
    }

    async fn load(&self, entitlement_id: Uuid) -> Result<PurchasedEntitlement, EngineError> {
        self.entitlements
            .load_entitlement(entitlement_id)
            .await?
            .ok_or(EngineError::EntitlementNotFound(entitlement_id))
    }
}

/// Read model for an entitlement. The effective status always comes from the resolver.
pub fn view(entitlement: &PurchasedEntitlement, now: DateTime<Utc>) -> EntitlementView {
    let mut venue_usage: Vec<VenueUsage> = entitlement
        .venue_usage
        .iter()
        .map(|(venue_id, redemptions)| VenueUsage {
            venue_id: *venue_id,
            redemptions: *redemptions,
        })
        .collect();
    venue_usage.sort_by_key(|u| u.venue_id);

    let effective = effective_status(entitlement, now);
    EntitlementView {
        id: entitlement.id,
        customer_id: entitlement.customer_id,
        order_id: entitlement.order_id,
        pass_id: entitlement.pass_id,
        pricing_option_id: entitlement.pricing_option_id,
        activation_code: entitlement.activation_code.clone(),
        pin_code: entitlement.pin_code.clone(),
        issued_at: entitlement.issued_at,
        expires_at: entitlement.expires_at,
        status: entitlement.status,
        effective_status: effective,
        usage_count: entitlement.usage_count,
        usage_cap: entitlement.usage_cap,
        remaining_uses: match effective {
            EffectiveStatus::Active | EffectiveStatus::Exhausted => entitlement.remaining_uses(),
            EffectiveStatus::Expired | EffectiveStatus::Revoked => Some(0),
        },
        venue_usage,
    }
}

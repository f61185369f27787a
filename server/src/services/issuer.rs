use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{Clock, CredentialGenerator, EngineError};
use crate::models::{ConfirmedOrder, EntitlementStatus, Pass, PricingOption, PurchasedEntitlement};
use crate::store::{EntitlementStore, StoreError};

/// Turns a paid order line into redeemable entitlements.
///
/// The caller guarantees the order is paid and that the same order line is not
/// issued twice; this component performs no duplicate detection.
#[derive(Clone)]
pub struct EntitlementIssuer {
    store: Arc<dyn EntitlementStore>,
    credentials: Arc<dyn CredentialGenerator>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

/// Fields shared by every unit of one order line.
struct Template<'a> {
    order: &'a ConfirmedOrder,
    pass: &'a Pass,
    pricing_option: &'a PricingOption,
    customer_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Template<'_> {
    fn unit(&self, activation_code: String, pin_code: String) -> PurchasedEntitlement {
        PurchasedEntitlement {
            id: Uuid::new_v4(),
            customer_id: self.customer_id,
            order_id: self.order.order_id,
            pass_id: self.pass.id,
            pricing_option_id: self.pricing_option.id,
            activation_code,
            pin_code,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            status: EntitlementStatus::Active,
            usage_count: 0,
            usage_cap: self.pass.usage_cap,
            venue_usage: HashMap::new(),
            version: 0,
        }
    }
}

/// Credentials already handed to earlier units of the batch being drafted.
#[derive(Default)]
struct Claimed {
    codes: HashSet<String>,
    pins: HashSet<String>,
}

impl EntitlementIssuer {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        credentials: Arc<dyn CredentialGenerator>,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            credentials,
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn issue(
        &self,
        order: &ConfirmedOrder,
        pass: &Pass,
        pricing_option: &PricingOption,
        customer_id: Uuid,
    ) -> Result<PurchasedEntitlement, EngineError> {
        let template = self.template(order, pass, pricing_option, customer_id)?;

        for attempt in 1..=self.max_attempts {
            let entitlement = self.draft(&template, &mut Claimed::default()).await?;
            match self.store.insert_entitlement(&entitlement).await {
                Ok(()) => {
                    log_issued(&entitlement);
                    return Ok(entitlement);
                }
                // Another issuance took the code between the check and the insert.
                Err(StoreError::DuplicateCredential) => {
                    tracing::debug!(attempt, "Activation code taken at insert, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(self.exhausted(order))
    }

    /// Issues `quantity` entitlements for one order line as a single write: either
    /// every unit is persisted or none is.
    pub async fn issue_batch(
        &self,
        order: &ConfirmedOrder,
        pass: &Pass,
        pricing_option: &PricingOption,
        customer_id: Uuid,
        quantity: u32,
    ) -> Result<Vec<PurchasedEntitlement>, EngineError> {
        let template = self.template(order, pass, pricing_option, customer_id)?;

        for attempt in 1..=self.max_attempts {
            let mut claimed = Claimed::default();
            let mut batch = Vec::new();
            for _ in 0..quantity {
                batch.push(self.draft(&template, &mut claimed).await?);
            }

            match self.store.insert_entitlements(&batch).await {
                Ok(()) => {
                    batch.iter().for_each(log_issued);
                    return Ok(batch);
                }
                Err(StoreError::DuplicateCredential) => {
                    tracing::debug!(attempt, "Activation code taken at insert, redrafting batch");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(self.exhausted(order))
    }

    fn template<'a>(
        &self,
        order: &'a ConfirmedOrder,
        pass: &'a Pass,
        pricing_option: &'a PricingOption,
        customer_id: Uuid,
    ) -> Result<Template<'a>, EngineError> {
        if pass.pricing_option(pricing_option.id).is_none() {
            return Err(EngineError::PricingOptionMismatch {
                pass_id: pass.id,
                pricing_option_id: pricing_option.id,
            });
        }

        let issued_at = self.clock.now();
        let expires_at = Duration::try_days(i64::from(pricing_option.days))
            .and_then(|validity| issued_at.checked_add_signed(validity))
            .ok_or(EngineError::ValidityOutOfRange {
                pricing_option_id: pricing_option.id,
                days: pricing_option.days,
            })?;

        Ok(Template {
            order,
            pass,
            pricing_option,
            customer_id,
            issued_at,
            expires_at,
        })
    }

    /// Draws credentials until they clash with neither the store nor `claimed`.
    async fn draft(
        &self,
        template: &Template<'_>,
        claimed: &mut Claimed,
    ) -> Result<PurchasedEntitlement, EngineError> {
        for attempt in 1..=self.max_attempts {
            let activation_code = self.credentials.activation_code();
            let pin_code = self.credentials.pin_code();

            if claimed.codes.contains(&activation_code)
                || claimed.pins.contains(&pin_code)
                || self.store.activation_code_exists(&activation_code).await?
                || self.store.active_pin_exists(&pin_code, template.issued_at).await?
            {
                tracing::debug!(attempt, "Credential collision, regenerating");
                continue;
            }

            claimed.codes.insert(activation_code.clone());
            claimed.pins.insert(pin_code.clone());
            return Ok(template.unit(activation_code, pin_code));
        }

        Err(self.exhausted(template.order))
    }

    fn exhausted(&self, order: &ConfirmedOrder) -> EngineError {
        tracing::warn!(
            order_id = %order.order_id,
            attempts = self.max_attempts,
            "Credential generation exhausted"
        );
        EngineError::CredentialGenerationExhausted {
            attempts: self.max_attempts,
        }
    }
}

fn log_issued(entitlement: &PurchasedEntitlement) {
    tracing::info!(
        entitlement_id = %entitlement.id,
        order_id = %entitlement.order_id,
        pass_id = %entitlement.pass_id,
        expires_at = %entitlement.expires_at,
        "Entitlement issued"
    );
}

use chrono::{DateTime, Utc};

use crate::models::{EffectiveStatus, EntitlementStatus, PurchasedEntitlement};

/// Effective status of an entitlement at `now`.
///
/// Precedence: a persisted revoke wins, then expiry (strictly after `expires_at`),
/// then exhaustion of the global cap. Every read path goes through here; nothing
/// writes the derived states back.
pub fn effective_status(entitlement: &PurchasedEntitlement, now: DateTime<Utc>) -> EffectiveStatus {
    match entitlement.status {
        EntitlementStatus::Revoked => return EffectiveStatus::Revoked,
        EntitlementStatus::Expired => return EffectiveStatus::Expired,
        EntitlementStatus::Active => {}
    }

    if now > entitlement.expires_at {
        return EffectiveStatus::Expired;
    }

    match entitlement.usage_cap {
        Some(cap) if entitlement.usage_count >= cap => EffectiveStatus::Exhausted,
        _ => EffectiveStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Duration;
    use uuid::Uuid;

    use super::*;

    fn entitlement(
        issued_at: DateTime<Utc>,
        usage_count: u32,
        usage_cap: Option<u32>,
    ) -> PurchasedEntitlement {
        PurchasedEntitlement {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            pass_id: Uuid::new_v4(),
            pricing_option_id: Uuid::new_v4(),
            activation_code: "CP-TEST".to_string(),
            pin_code: "0000".to_string(),
            issued_at,
            expires_at: issued_at + Duration::days(3),
            status: EntitlementStatus::Active,
            usage_count,
            usage_cap,
            venue_usage: HashMap::new(),
            version: 0,
        }
    }

    #[test]
    fn test_revoked_wins_over_everything() {
        let t0 = Utc::now();
        let mut e = entitlement(t0, 0, Some(3));
        e.status = EntitlementStatus::Revoked;
        assert_eq!(effective_status(&e, t0 + Duration::hours(1)), EffectiveStatus::Revoked);
        assert_eq!(effective_status(&e, t0 + Duration::days(30)), EffectiveStatus::Revoked);
    }

    #[test]
    fn test_expiry_boundary() {
        let t0 = Utc::now();
        let e = entitlement(t0, 0, None);
        assert_eq!(effective_status(&e, t0 + Duration::days(3)), EffectiveStatus::Active);
        assert_eq!(
            effective_status(&e, t0 + Duration::days(3) + Duration::seconds(1)),
            EffectiveStatus::Expired
        );
    }

    #[test]
    fn test_expired_beats_exhausted() {
        let t0 = Utc::now();
        let e = entitlement(t0, 3, Some(3));
        assert_eq!(effective_status(&e, t0 + Duration::days(4)), EffectiveStatus::Expired);
        assert_eq!(effective_status(&e, t0), EffectiveStatus::Exhausted);
    }

    #[test]
    fn test_no_cap_never_exhausts() {
        let t0 = Utc::now();
        let e = entitlement(t0, 10_000, None);
        assert_eq!(effective_status(&e, t0), EffectiveStatus::Active);
    }

    #[test]
    fn test_persisted_expired_is_expired() {
        let t0 = Utc::now();
        let mut e = entitlement(t0, 0, None);
        e.status = EntitlementStatus::Expired;
        assert_eq!(effective_status(&e, t0), EffectiveStatus::Expired);
    }
}

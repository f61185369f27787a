pub mod discount;
pub mod entitlement;
pub mod pass;

pub use discount::{DiscountCode, DiscountKind};
pub use entitlement::{
    ConfirmedOrder, EffectiveStatus, EntitlementStatus, EntitlementView, PurchasedEntitlement,
    RedemptionEvent, RedemptionEventOutcome, VenueUsage,
};
pub use pass::{
    AgeGroup, Pass, PassInvariantError, PassStatus, PricingOption, UsageRule, VenuePartnership,
    MAX_VALIDITY_DAYS,
};

pub mod discounts;
pub mod entitlements;
pub mod health;
pub mod passes;
pub mod redemptions;

pub use health::health_check;

//! Pass entitlement and redemption service.
//!
//! Sells city passes as entitlements and decides, at a partner venue's terminal,
//! whether a scanned entitlement may be granted entry. The engine lives in
//! [`services`]; [`store`] holds the persistence ports; the rest is the HTTP shell.

pub mod config;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{discounts, entitlements, health_check, passes, redemptions};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.allowed_origins))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/passes/:pass_id", get(passes::get_pass))
        .route(
            "/passes/:pass_id/venues/:venue_id",
            get(passes::get_venue_partnership),
        )
        .route(
            "/discount-codes/validate",
            post(discounts::validate_discount_code),
        )
        .route("/discount-codes/usages", post(discounts::record_discount_usage))
        .route("/entitlements", post(entitlements::issue_entitlements))
        .route("/entitlements/:entitlement_id", get(entitlements::get_entitlement))
        .route(
            "/entitlements/:entitlement_id/revoke",
            post(entitlements::revoke_entitlement),
        )
        .route(
            "/entitlements/:entitlement_id/redemptions",
            get(entitlements::list_redemptions),
        )
        .route(
            "/customers/:customer_id/entitlements",
            get(entitlements::list_customer_entitlements),
        )
        .route("/redemptions", post(redemptions::redeem))
}

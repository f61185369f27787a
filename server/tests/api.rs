mod common;

use std::net::IpAddr;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use citypass_server::config::{Config, StorageBackend};
use citypass_server::models::UsageRule;
use citypass_server::routes::create_routes;
use citypass_server::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{fixture, percent_code, Fixture};

fn config() -> Config {
    Config {
        database_url: String::new(),
        database_max_connections: 1,
        storage: StorageBackend::Memory,
        host: IpAddr::from([127, 0, 0, 1]),
        port: 0,
        catalog_seed_path: None,
        redemption_max_retries: 3,
        credential_max_attempts: 8,
        max_order_quantity: 20,
        pin_length: 6,
        allowed_origins: vec!["http://localhost:5173".to_string()],
        production: false,
    }
}

fn app(f: &Fixture) -> Router {
    create_routes(AppState::new(f.engine.clone()), &config())
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn issue_one(app: &Router, f: &Fixture) -> Value {
    let order = f.order(1);
    let (status, body) = call(
        app,
        "POST",
        "/api/entitlements",
        Some(json!({
            "order_id": order.order_id,
            "customer_id": order.customer_id,
            "pass_id": order.pass_id,
            "pricing_option_id": order.pricing_option_id,
            "paid_amount": "89.00",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"][0].clone()
}

#[tokio::test]
async fn health_reports_service_name() {
    let f = fixture(&[(Uuid::new_v4(), UsageRule::Unlimited)], None).await;
    let (status, body) = call(&app(&f), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["service"], "citypass-api");
}

#[tokio::test]
async fn pass_lookup_and_unknown_pass() {
    let f = fixture(&[(Uuid::new_v4(), UsageRule::OncePerVenue)], Some(3)).await;
    let app = app(&f);

    let (status, body) = call(&app, "GET", &format!("/api/passes/{}", f.pass.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Old Town Pass");

    let (status, body) = call(&app, "GET", &format!("/api/passes/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn venue_partnership_lookup() {
    let venue = Uuid::new_v4();
    let f = fixture(&[(venue, UsageRule::LimitedCount { max: 2 })], None).await;
    let app = app(&f);

    let uri = format!("/api/passes/{}/venues/{}", f.pass.id, venue);
    let (status, body) = call(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["usage_rule"]["kind"], "limited_count");
    assert_eq!(body["data"]["usage_rule"]["max"], 2);

    let uri = format!("/api/passes/{}/venues/{}", f.pass.id, Uuid::new_v4());
    let (status, _) = call(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn discount_rejection_is_a_successful_response() {
    let f = fixture(&[(Uuid::new_v4(), UsageRule::Unlimited)], None).await;
    f.store.put_discount_code(percent_code("WELCOME", 15, Some(100))).await;
    let app = app(&f);

    let (status, body) = call(
        &app,
        "POST",
        "/api/discount-codes/validate",
        Some(json!({ "code": "welcome", "subtotal": "40.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["reason"], "MINIMUM_NOT_MET");

    let (status, body) = call(
        &app,
        "POST",
        "/api/discount-codes/validate",
        Some(json!({ "code": "", "subtotal": "40.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn scan_flow_over_http() {
    let venue = Uuid::new_v4();
    let f = fixture(&[(venue, UsageRule::OncePerVenue)], None).await;
    let app = app(&f);

    let entitlement = issue_one(&app, &f).await;
    assert_eq!(entitlement["effective_status"], "active");
    let code = entitlement["activation_code"].as_str().unwrap().to_string();
    let pin = entitlement["pin_code"].as_str().unwrap().to_string();
    let id = entitlement["id"].as_str().unwrap().to_string();

    let scan = json!({ "venue_id": venue, "activation_code": code, "pin": pin });
    let (status, body) = call(&app, "POST", "/api/redemptions", Some(scan.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["redeemed"], true);
    assert_eq!(body["data"]["confirmation"]["usage_count"], 1);

    let (status, body) = call(&app, "POST", "/api/redemptions", Some(scan)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["redeemed"], false);
    assert_eq!(body["data"]["reason"], "VENUE_USAGE_LIMIT_REACHED");

    let wrong_pin = json!({ "venue_id": venue, "activation_code": code, "pin": "not-it" });
    let (_, body) = call(&app, "POST", "/api/redemptions", Some(wrong_pin)).await;
    assert_eq!(body["data"]["reason"], "CREDENTIAL_MISMATCH");

    let (status, body) = call(
        &app,
        "GET",
        &format!("/api/entitlements/{}/redemptions", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn revoke_over_http() {
    let venue = Uuid::new_v4();
    let f = fixture(&[(venue, UsageRule::Unlimited)], None).await;
    let app = app(&f);

    let entitlement = issue_one(&app, &f).await;
    let id = entitlement["id"].as_str().unwrap().to_string();

    let uri = format!("/api/entitlements/{}/revoke", id);
    let (status, body) = call(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["effective_status"], "revoked");

    let scan = json!({ "venue_id": venue, "activation_code": entitlement["activation_code"] });
    let (_, body) = call(&app, "POST", "/api/redemptions", Some(scan)).await;
    assert_eq!(body["data"]["reason"], "ENTITLEMENT_REVOKED");

    let customer = entitlement["customer_id"].as_str().unwrap().to_string();
    let (_, body) = call(
        &app,
        "GET",
        &format!("/api/customers/{}/entitlements", customer),
        None,
    )
    .await;
    assert_eq!(body["data"][0]["effective_status"], "revoked");
}

#[tokio::test]
async fn unknown_entitlement_is_not_found() {
    let f = fixture(&[(Uuid::new_v4(), UsageRule::Unlimited)], None).await;
    let (status, _) = call(
        &app(&f),
        "GET",
        &format!("/api/entitlements/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let f = fixture(&[(Uuid::new_v4(), UsageRule::Unlimited)], None).await;
    let response = app(&f)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().get("strict-transport-security").is_none());
}

#[tokio::test]
async fn oversized_order_is_rejected_without_issuing() {
    let f = fixture(&[(Uuid::new_v4(), UsageRule::Unlimited)], None).await;
    let app = app(&f);
    let order = f.order(1);

    let (status, body) = call(
        &app,
        "POST",
        "/api/entitlements",
        Some(json!({
            "order_id": order.order_id,
            "customer_id": order.customer_id,
            "pass_id": order.pass_id,
            "pricing_option_id": order.pricing_option_id,
            "paid_amount": "89.00",
            "quantity": u32::MAX,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (_, body) = call(
        &app,
        "GET",
        &format!("/api/customers/{}/entitlements", order.customer_id),
        None,
    )
    .await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn recorded_discount_use_exhausts_the_code() {
    let f = fixture(&[(Uuid::new_v4(), UsageRule::Unlimited)], None).await;
    let mut code = percent_code("SPRING5", 5, None);
    code.usage_limit = Some(1);
    f.store.put_discount_code(code).await;
    let app = app(&f);

    let (status, body) = call(
        &app,
        "POST",
        "/api/discount-codes/usages",
        Some(json!({ "code": "spring5", "customer_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["code"], "SPRING5");

    let (_, body) = call(
        &app,
        "POST",
        "/api/discount-codes/validate",
        Some(json!({ "code": "SPRING5", "subtotal": "40.00" })),
    )
    .await;
    assert_eq!(body["data"]["reason"], "USAGE_LIMIT_REACHED");

    let (status, _) = call(
        &app,
        "POST",
        "/api/discount-codes/usages",
        Some(json!({ "code": "MISSING" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

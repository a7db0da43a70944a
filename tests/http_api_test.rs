//! Request-level tests through the assembled router: status codes, error
//! payload shape, and header handling.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
};
use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    serde_json::from_slice(&bytes).expect("json response")
}

fn authed_request(
    method: Method,
    uri: &str,
    user_id: Uuid,
    store_id: Uuid,
    body: Option<Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user_id.to_string())
        .header("x-store-id", store_id.to_string())
        .header("content-type", "application/json");
    match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn health_endpoint_reports_database() {
    let ctx = common::setup().await;
    let response = ctx
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn checkout_requires_principal_header() {
    let ctx = common::setup().await;
    let response = ctx
        .router()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/checkout-sessions")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn empty_cart_checkout_returns_422() {
    let ctx = common::setup().await;
    let payload = json!({
        "shipping_address": {
            "line1": "1 Market St",
            "city": "San Francisco",
            "region": "CA",
            "postal_code": "94105",
            "country": "US"
        }
    });
    let response = ctx
        .router()
        .oneshot(authed_request(
            Method::POST,
            "/api/v1/checkout-sessions",
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(payload),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn full_checkout_flow_over_http() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let router = ctx.router();

    // Add to cart.
    let response = router
        .clone()
        .oneshot(authed_request(
            Method::POST,
            "/api/v1/carts/items",
            user_id,
            store_id,
            Some(json!({"product_id": product.id, "quantity": 2})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Open the session.
    let response = router
        .clone()
        .oneshot(authed_request(
            Method::POST,
            "/api/v1/checkout-sessions",
            user_id,
            store_id,
            Some(json!({
                "shipping_address": {
                    "line1": "1 Market St",
                    "city": "San Francisco",
                    "region": "CA",
                    "postal_code": "94105",
                    "country": "US"
                }
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session = response_json(response).await;
    assert_eq!(session["status"], "draft");
    let session_id = session["id"].as_str().unwrap().to_string();

    // Choose shipping, then cash on delivery.
    let response = router
        .clone()
        .oneshot(authed_request(
            Method::POST,
            &format!("/api/v1/checkout-sessions/{}/shipping", session_id),
            user_id,
            store_id,
            Some(json!({"method": "standard", "cost": "5.00"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(authed_request(
            Method::POST,
            &format!("/api/v1/checkout-sessions/{}/payment", session_id),
            user_id,
            store_id,
            Some(json!({"method": "cash_on_delivery"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = response_json(response).await;
    assert_eq!(session["status"], "cod");

    // Complete into an order.
    let response = router
        .clone()
        .oneshot(authed_request(
            Method::POST,
            &format!("/api/v1/checkout-sessions/{}/complete", session_id),
            user_id,
            store_id,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = response_json(response).await;
    assert_eq!(order["status"], "pending_payment");
    let order_id = order["id"].as_str().unwrap().to_string();

    // Read it back.
    let response = router
        .clone()
        .oneshot(authed_request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            user_id,
            store_id,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(authed_request(
            Method::GET,
            &format!("/api/v1/orders/{}/items", order_id),
            user_id,
            store_id,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let items = response_json(response).await;
    assert_eq!(items.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn shipping_on_non_draft_session_returns_409() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;
    ctx.services
        .checkout
        .select_payment(
            session.id,
            user_id,
            checkout_api::entities::checkout_session::PaymentMethod::CashOnDelivery,
        )
        .await
        .unwrap();

    let response = ctx
        .router()
        .oneshot(authed_request(
            Method::POST,
            &format!("/api/v1/checkout-sessions/{}/shipping", session.id),
            user_id,
            store_id,
            Some(json!({"method": "standard", "cost": "5.00"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn webhook_endpoint_verifies_signatures() {
    let ctx = common::setup().await;
    let router = ctx.router();

    let body = br#"{"type":"checkout.completed","data":{"payment_intent_id":"pi_unknown"}}"#;
    let ts = Utc::now().timestamp().to_string();

    // Valid signature with an unknown reference still acknowledges.
    let sig = common::sign_webhook(common::TEST_WEBHOOK_SECRET, &ts, body);
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/payments/webhook")
                .header("x-timestamp", &ts)
                .header("x-signature", sig)
                .body(Body::from(body.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Bad signature is refused.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/payments/webhook")
                .header("x-timestamp", &ts)
                .header("x-signature", "deadbeef")
                .body(Body::from(body.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Missing headers are a transport problem.
    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/payments/webhook")
                .body(Body::from(body.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

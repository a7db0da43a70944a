use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{Principal, StoreContext},
    entities::checkout_session::{self, CheckoutSessionStatus, PaymentMethod},
    errors::ServiceError,
    handlers::common::{created_response, success_response, validate_input},
    handlers::orders::OrderResponse,
    models::Address,
    services::checkout::CreateSessionInput,
    AppState,
};

/// Creates the router for checkout session endpoints
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(start_checkout))
        .route("/:session_id", get(get_checkout_session))
        .route("/:session_id/shipping", post(select_shipping))
        .route("/:session_id/payment", post(select_payment))
        .route("/:session_id/complete", post(complete_checkout))
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 255))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub region: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 2, message = "country must be an ISO 3166-1 alpha-2 code"))]
    pub country: String,
}

impl From<AddressRequest> for Address {
    fn from(req: AddressRequest) -> Self {
        Address {
            line1: req.line1,
            line2: req.line2,
            city: req.city,
            region: req.region,
            postal_code: req.postal_code,
            country: req.country,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct StartCheckoutRequest {
    #[validate]
    pub shipping_address: AddressRequest,
    #[validate]
    pub billing_address: Option<AddressRequest>,
    #[validate(length(max = 2000))]
    pub customer_notes: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct SelectShippingRequest {
    #[validate(length(min = 1, max = 100))]
    pub method: String,
    pub cost: Decimal,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SelectPaymentRequest {
    #[schema(value_type = String, example = "online")]
    pub method: PaymentMethod,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutSessionResponse {
    pub id: Uuid,
    #[schema(value_type = String, example = "draft")]
    pub status: CheckoutSessionStatus,
    #[schema(value_type = Object)]
    pub cart_snapshot: serde_json::Value,
    pub shipping_method: Option<String>,
    pub shipping_cost: Option<Decimal>,
    #[schema(value_type = Option<String>, example = "online")]
    pub payment_method: Option<PaymentMethod>,
    pub payment_intent_id: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub order_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<checkout_session::Model> for CheckoutSessionResponse {
    fn from(session: checkout_session::Model) -> Self {
        Self {
            id: session.id,
            status: session.status,
            cart_snapshot: session.cart_snapshot,
            shipping_method: session.shipping_method,
            shipping_cost: session.shipping_cost,
            payment_method: session.payment_method,
            payment_intent_id: session.payment_intent_id,
            shipping_address: session.shipping_address,
            billing_address: session.billing_address,
            order_id: session.order_id,
            expires_at: session.expires_at,
            created_at: session.created_at,
        }
    }
}

/// Start checkout: freeze the current cart into a snapshot and open a Draft
/// session against it.
#[utoipa::path(
    post,
    path = "/api/v1/checkout-sessions",
    request_body = StartCheckoutRequest,
    responses(
        (status = 201, description = "Checkout session created", body = CheckoutSessionResponse),
        (status = 422, description = "Empty cart or invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing principal", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn start_checkout(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    store: StoreContext,
    Json(payload): Json<StartCheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let snapshot = state
        .services
        .snapshots
        .build(principal.user_id, store.store_id)
        .await?;

    let session = state
        .services
        .checkout
        .create(CreateSessionInput {
            user_id: principal.user_id,
            store_id: store.store_id,
            snapshot,
            shipping_address: payload.shipping_address.into(),
            billing_address: payload.billing_address.map(Into::into),
            customer_notes: payload.customer_notes,
        })
        .await?;

    Ok(created_response(CheckoutSessionResponse::from(session)))
}

/// Get checkout session
#[utoipa::path(
    get,
    path = "/api/v1/checkout-sessions/{session_id}",
    params(("session_id" = Uuid, Path, description = "Checkout session id")),
    responses(
        (status = 200, description = "Checkout session", body = CheckoutSessionResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn get_checkout_session(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .services
        .checkout
        .get_session(session_id, principal.user_id)
        .await?;
    Ok(success_response(CheckoutSessionResponse::from(session)))
}

/// Select shipping method and cost for a Draft session
#[utoipa::path(
    post,
    path = "/api/v1/checkout-sessions/{session_id}/shipping",
    params(("session_id" = Uuid, Path, description = "Checkout session id")),
    request_body = SelectShippingRequest,
    responses(
        (status = 200, description = "Shipping recorded", body = CheckoutSessionResponse),
        (status = 409, description = "Session not in draft", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn select_shipping(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SelectShippingRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let session = state
        .services
        .checkout
        .select_shipping(session_id, principal.user_id, payload.method, payload.cost)
        .await?;
    Ok(success_response(CheckoutSessionResponse::from(session)))
}

/// Select the payment method. Cash on delivery moves the session to Cod;
/// Online issues a payment intent reference for the provider.
#[utoipa::path(
    post,
    path = "/api/v1/checkout-sessions/{session_id}/payment",
    params(("session_id" = Uuid, Path, description = "Checkout session id")),
    request_body = SelectPaymentRequest,
    responses(
        (status = 200, description = "Payment method recorded", body = CheckoutSessionResponse),
        (status = 409, description = "Session not in draft", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn select_payment(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SelectPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .services
        .checkout
        .select_payment(session_id, principal.user_id, payload.method)
        .await?;
    Ok(success_response(CheckoutSessionResponse::from(session)))
}

/// Materialize the order for a Paid or Cod session. Idempotent: repeated
/// calls return the same order.
#[utoipa::path(
    post,
    path = "/api/v1/checkout-sessions/{session_id}/complete",
    params(("session_id" = Uuid, Path, description = "Checkout session id")),
    responses(
        (status = 201, description = "Order materialized", body = OrderResponse),
        (status = 409, description = "Session not paid or cod", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn complete_checkout(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    // Ownership gate; the materializer itself is caller-agnostic.
    let session = state
        .services
        .checkout
        .get_session(session_id, principal.user_id)
        .await?;
    let order = state.services.materializer.materialize(session.id).await?;
    Ok(created_response(OrderResponse::from(order)))
}

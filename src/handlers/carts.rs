use std::sync::Arc;

use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{Principal, StoreContext},
    entities::cart_item,
    errors::ServiceError,
    handlers::common::{created_response, success_response, validate_input},
    AppState,
};

/// Creates the router for cart endpoints
pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/current", get(get_current_cart))
        .route("/items", post(add_cart_item))
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

impl From<cart_item::Model> for CartItemResponse {
    fn from(item: cart_item::Model) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub id: Uuid,
    pub items: Vec<CartItemResponse>,
}

/// Get the caller's active cart
#[utoipa::path(
    get,
    path = "/api/v1/carts/current",
    responses(
        (status = 200, description = "Active cart, empty items when none exists", body = CartResponse),
        (status = 401, description = "Missing principal", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn get_current_cart(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    store: StoreContext,
) -> Result<impl IntoResponse, ServiceError> {
    let current = state
        .services
        .carts
        .current_cart(principal.user_id, store.store_id)
        .await?;
    let response = match current {
        Some((cart, items)) => CartResponse {
            id: cart.id,
            items: items.into_iter().map(Into::into).collect(),
        },
        None => CartResponse {
            id: Uuid::nil(),
            items: Vec::new(),
        },
    };
    Ok(success_response(response))
}

/// Add a product to the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/carts/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 201, description = "Line added or accumulated", body = CartItemResponse),
        (status = 404, description = "Product not found in store", body = crate::errors::ErrorResponse),
        (status = 422, description = "Invalid quantity", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn add_cart_item(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    store: StoreContext,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let item = state
        .services
        .carts
        .add_item(
            principal.user_id,
            store.store_id,
            payload.product_id,
            payload.quantity,
        )
        .await?;
    Ok(created_response(CartItemResponse::from(item)))
}

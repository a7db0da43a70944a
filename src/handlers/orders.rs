use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Principal,
    entities::{order, order_item},
    errors::ServiceError,
    handlers::common::success_response,
    AppState,
};

/// Creates the router for order endpoints
pub fn order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:order_id", get(get_order))
        .route("/:order_id/items", get(get_order_items))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    #[schema(value_type = String, example = "paid")]
    pub status: order::OrderStatus,
    pub sub_total: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
    pub shipping_method: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<order::Model> for OrderResponse {
    fn from(order: order::Model) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            sub_total: order.sub_total,
            tax_amount: order.tax_amount,
            shipping_amount: order.shipping_amount,
            total_amount: order.total_amount,
            shipping_method: order.shipping_method,
            shipping_address: order.shipping_address,
            billing_address: order.billing_address,
            payment_transaction_id: order.payment_transaction_id,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub vendor_commission: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(item: order_item::Model) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            vendor_id: item.vendor_id,
            product_name: item.product_name,
            sku: item.sku,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
            vendor_commission: item.vendor_commission,
        }
    }
}

/// Get order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = OrderResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(order_id, principal.user_id)
        .await?;
    Ok(success_response(OrderResponse::from(order)))
}

/// Get order lines
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}/items",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order lines", body = [OrderItemResponse]),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order_items(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state
        .services
        .orders
        .get_order_items(order_id, principal.user_id)
        .await?;
    let items: Vec<OrderItemResponse> = items.into_iter().map(Into::into).collect();
    Ok(success_response(items))
}

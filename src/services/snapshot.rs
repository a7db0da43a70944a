//! Cart Snapshot Builder.
//!
//! Freezes the caller's current cart into an immutable `CartSnapshot` at
//! checkout time: current catalog price, name and sku are copied per line so
//! subsequent catalog changes cannot alter the pending purchase. Reads only;
//! stock is neither checked nor reserved here.

use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{product, Product},
    errors::ServiceError,
    models::{CartSnapshot, SnapshotLine},
    services::cart::CartService,
};

#[derive(Clone)]
pub struct CartSnapshotBuilder {
    db: Arc<DbPool>,
    carts: Arc<CartService>,
    tax_rate: Decimal,
}

impl CartSnapshotBuilder {
    pub fn new(db: Arc<DbPool>, carts: Arc<CartService>, tax_rate: Decimal) -> Self {
        Self {
            db,
            carts,
            tax_rate,
        }
    }

    #[instrument(skip(self))]
    pub async fn build(&self, user_id: Uuid, store_id: Uuid) -> Result<CartSnapshot, ServiceError> {
        let Some((_cart, items)) = self.carts.current_cart(user_id, store_id).await? else {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        };
        if items.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        }

        let mut lines = Vec::with_capacity(items.len());
        let mut sub_total = Decimal::ZERO;

        for item in items {
            let product = self.load_product(item.product_id).await?;
            let line_total = product.price * Decimal::from(item.quantity);
            sub_total += line_total;
            lines.push(SnapshotLine {
                product_id: product.id,
                product_name: product.name,
                sku: product.sku,
                unit_price: product.price,
                quantity: item.quantity,
                line_total,
                vendor_id: product.vendor_id,
                store_id: product.store_id,
            });
        }

        let tax_amount = (sub_total * self.tax_rate).round_dp(4);
        Ok(CartSnapshot {
            lines,
            sub_total,
            tax_amount,
            total_amount: sub_total + tax_amount,
        })
    }

    async fn load_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }
}

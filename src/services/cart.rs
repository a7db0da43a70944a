//! Cart provider.
//!
//! The cart is externally owned, mutable state scoped to a (user, store)
//! pair. The checkout core consumes it through two calls only: a read of the
//! current contents at snapshot time, and a best-effort clear after an order
//! is materialized. The write surface here exists so the checkout flow is
//! drivable end to end.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{cart, cart_item, product, Cart, CartItem, Product},
    errors::ServiceError,
};

#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// The caller's active cart with its items; `None` when no active cart
    /// exists or it is empty of rows.
    #[instrument(skip(self))]
    pub async fn current_cart(
        &self,
        user_id: Uuid,
        store_id: Uuid,
    ) -> Result<Option<(cart::Model, Vec<cart_item::Model>)>, ServiceError> {
        let Some(cart) = self.find_active_cart(user_id, store_id).await? else {
            return Ok(None);
        };
        let items = cart.find_related(CartItem).all(&*self.db).await?;
        Ok(Some((cart, items)))
    }

    /// Add a product to the caller's active cart, creating the cart on first
    /// use. Quantities accumulate onto an existing line for the same product.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        store_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }

        let product = Product::find_by_id(product_id)
            .filter(product::Column::StoreId.eq(store_id))
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let cart = match Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .filter(cart::Column::StoreId.eq(store_id))
            .filter(cart::Column::Status.eq(cart::CartStatus::Active))
            .one(&txn)
            .await?
        {
            Some(cart) => cart,
            None => {
                cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    store_id: Set(store_id),
                    user_id: Set(user_id),
                    status: Set(cart::CartStatus::Active),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .one(&txn)
            .await?;

        let item = match existing {
            Some(line) => {
                let new_quantity = line.quantity + quantity;
                let mut update: cart_item::ActiveModel = line.into();
                update.quantity = Set(new_quantity);
                update.updated_at = Set(now);
                update.update(&txn).await?
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;
        Ok(item)
    }

    /// Mark the active cart converted and drop its lines. Called after order
    /// materialization; the caller treats failure as log-and-continue.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid, store_id: Uuid) -> Result<(), ServiceError> {
        let Some(cart) = self.find_active_cart(user_id, store_id).await? else {
            return Ok(());
        };

        let txn = self.db.begin().await?;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        let cart_id = cart.id;
        let mut update: cart::ActiveModel = cart.into();
        update.status = Set(cart::CartStatus::Converted);
        update.updated_at = Set(Utc::now());
        update.update(&txn).await?;
        txn.commit().await?;

        info!(cart_id = %cart_id, "cart cleared after checkout");
        Ok(())
    }

    async fn find_active_cart(
        &self,
        user_id: Uuid,
        store_id: Uuid,
    ) -> Result<Option<cart::Model>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .filter(cart::Column::StoreId.eq(store_id))
            .filter(cart::Column::Status.eq(cart::CartStatus::Active))
            .one(&*self.db)
            .await?)
    }
}

//! Read access to materialized orders. Creation lives in the materializer;
//! fulfillment is out of scope here.

use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{order, order_item, Order, OrderItem},
    errors::ServiceError,
};

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Owner-scoped read; another user's order reads as absent.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    #[instrument(skip(self))]
    pub async fn get_order_items(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        let order = self.get_order(order_id, user_id).await?;
        Ok(order.find_related(OrderItem).all(&*self.db).await?)
    }
}

//! Order Materializer.
//!
//! Turns a finalized checkout session (`Paid` or `Cod`) into a durable order
//! exactly once. All steps run inside a single transaction with the session
//! row exclusively locked: the `order_id IS NULL` check under that lock is
//! what guarantees that concurrent completion attempts for the same session
//! produce one order and everyone else observes it.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::{lock_exclusive_if_supported, DbPool},
    entities::{
        checkout_session::{self, CheckoutSessionStatus, PaymentMethod},
        order::{self, OrderStatus},
        order_item, product, CheckoutSession, Order, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::CartSnapshot,
    services::cart::CartService,
};

const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct OrderMaterializer {
    db: Arc<DbPool>,
    carts: Arc<CartService>,
    event_sender: Arc<EventSender>,
    vendor_commission_rate: Decimal,
    order_number_prefix: String,
}

impl OrderMaterializer {
    pub fn new(
        db: Arc<DbPool>,
        carts: Arc<CartService>,
        event_sender: Arc<EventSender>,
        vendor_commission_rate: Decimal,
        order_number_prefix: String,
    ) -> Self {
        Self {
            db,
            carts,
            event_sender,
            vendor_commission_rate,
            order_number_prefix,
        }
    }

    /// Materialize the order for a session, or return the one that already
    /// exists. Ownership is the caller's concern; webhook-driven completion
    /// has no acting user.
    ///
    /// Fails with `InvalidState` unless the session is `Paid` or `Cod`, and
    /// with `InsufficientStock` when any line can no longer be covered, in
    /// which case nothing is written and the session stays materializable for
    /// a retry after restock.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn materialize(&self, session_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let session = lock_exclusive_if_supported(
            CheckoutSession::find_by_id(session_id),
            self.db.get_database_backend(),
        )
        .one(&txn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Checkout session {} not found", session_id))
        })?;

        // Duplicate completion: hand back the already-materialized order.
        if let Some(order_id) = session.order_id {
            let existing = Order::find_by_id(order_id).one(&txn).await?.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "session {} references missing order {}",
                    session.id, order_id
                ))
            })?;
            txn.commit().await?;
            info!(order_id = %existing.id, "session already materialized");
            return Ok(existing);
        }

        if !session.status.is_materializable() {
            txn.rollback().await?;
            return Err(ServiceError::InvalidState(format!(
                "session is {:?}, expected paid or cod",
                session.status
            )));
        }

        // Payment already settled; a late completion is honored, not refused.
        let now = Utc::now();
        if session.expires_at < now {
            warn!(session_id = %session.id, expires_at = %session.expires_at,
                "materializing past session deadline");
        }

        let snapshot = session.snapshot()?;
        self.decrement_stock(&txn, &snapshot).await?;

        let order_number = self.unique_order_number(&txn).await?;
        let shipping = session.shipping_cost.unwrap_or(Decimal::ZERO);
        let status = match session.payment_method {
            Some(PaymentMethod::CashOnDelivery) => OrderStatus::PendingPayment,
            _ => OrderStatus::Paid,
        };

        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(session.store_id),
            user_id: Set(session.user_id),
            order_number: Set(order_number),
            status: Set(status),
            sub_total: Set(snapshot.sub_total),
            tax_amount: Set(snapshot.tax_amount),
            shipping_amount: Set(shipping),
            total_amount: Set(snapshot.total_amount + shipping),
            shipping_method: Set(session.shipping_method.clone()),
            shipping_address: Set(session.shipping_address.clone()),
            billing_address: Set(session.billing_address.clone()),
            customer_notes: Set(session.customer_notes.clone()),
            payment_transaction_id: Set(session.payment_intent_id.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for line in &snapshot.lines {
            let commission = (line.line_total * self.vendor_commission_rate).round_dp(4);
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                vendor_id: Set(line.vendor_id),
                store_id: Set(line.store_id),
                product_name: Set(line.product_name.clone()),
                sku: Set(line.sku.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.line_total),
                vendor_commission: Set(commission),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        let user_id = session.user_id;
        let store_id = session.store_id;
        let mut update: checkout_session::ActiveModel = session.into();
        update.status = Set(CheckoutSessionStatus::Completed);
        update.order_id = Set(Some(order.id));
        update.updated_at = Set(now);
        let session = update.update(&txn).await?;

        txn.commit().await?;
        info!(order_id = %order.id, order_number = %order.order_number,
            session_id = %session.id, "order materialized");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderCreated {
                order_id: order.id,
                session_id: session.id,
            })
            .await
        {
            warn!(error = %e, "failed to send order created event");
        }

        // Best effort only; the order stands regardless.
        if let Err(e) = self.carts.clear_cart(user_id, store_id).await {
            warn!(error = %e, user_id = %user_id, "cart clear after checkout failed");
        }

        Ok(order)
    }

    /// Conditional decrement per line: `stock_quantity >= qty` is part of the
    /// UPDATE's WHERE clause, so the row only changes when it can cover the
    /// line. Zero rows affected means the stock moved since snapshot time.
    async fn decrement_stock(
        &self,
        txn: &DatabaseTransaction,
        snapshot: &CartSnapshot,
    ) -> Result<(), ServiceError> {
        for line in &snapshot.lines {
            let result = Product::update_many()
                .col_expr(
                    product::Column::StockQuantity,
                    Expr::col(product::Column::StockQuantity).sub(line.quantity),
                )
                .filter(product::Column::Id.eq(line.product_id))
                .filter(product::Column::StockQuantity.gte(line.quantity))
                .exec(txn)
                .await?;

            if result.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "insufficient stock for product {} ({})",
                    line.product_id, line.sku
                )));
            }
        }
        Ok(())
    }

    /// Human-facing order number, `{prefix}-{10 digits}`. Collisions are
    /// vanishingly rare but regenerated anyway; the unique index on
    /// `order_number` is the last line of defense.
    async fn unique_order_number(
        &self,
        txn: &DatabaseTransaction,
    ) -> Result<String, ServiceError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let suffix: u64 = rand::thread_rng().gen_range(0..10_000_000_000);
            let candidate = format!("{}-{:010}", self.order_number_prefix, suffix);
            let taken = Order::find()
                .filter(order::Column::OrderNumber.eq(candidate.as_str()))
                .one(txn)
                .await?
                .is_some();
            if !taken {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "could not generate a unique order number".to_string(),
        ))
    }
}

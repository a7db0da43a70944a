//! Checkout Session State Machine.
//!
//! Owns the lifecycle of a pending purchase:
//! `Draft -> {Cod, Paid} -> Completed`, `Draft -> Expired`,
//! `Draft -> Failed`. Every mutation runs in its own transaction with the
//! session row locked, so concurrent callers on the same session are
//! serialized and a losing writer observes a precondition failure instead of
//! corrupting state. Callers on different sessions never block each other.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
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
        CheckoutSession,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Address, CartSnapshot},
};

/// Inputs captured at session creation.
#[derive(Debug, Clone)]
pub struct CreateSessionInput {
    pub user_id: Uuid,
    pub store_id: Uuid,
    pub snapshot: CartSnapshot,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub customer_notes: Option<String>,
}

#[derive(Clone)]
pub struct CheckoutSessionService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    session_ttl: Duration,
}

impl CheckoutSessionService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, session_ttl: Duration) -> Self {
        Self {
            db,
            event_sender,
            session_ttl,
        }
    }

    /// Create a session in `Draft` from a frozen cart snapshot.
    ///
    /// The snapshot is embedded as JSON and never overwritten afterwards;
    /// addresses are stored as formatted text so later address-book edits do
    /// not retroactively alter the purchase.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, store_id = %input.store_id))]
    pub async fn create(
        &self,
        input: CreateSessionInput,
    ) -> Result<checkout_session::Model, ServiceError> {
        if input.snapshot.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        }

        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(self.session_ttl)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let billing = input
            .billing_address
            .as_ref()
            .unwrap_or(&input.shipping_address);

        let session = checkout_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(input.store_id),
            user_id: Set(input.user_id),
            cart_snapshot: Set(input.snapshot.to_json()?),
            status: Set(CheckoutSessionStatus::Draft),
            shipping_method: Set(None),
            shipping_cost: Set(None),
            payment_method: Set(None),
            payment_intent_id: Set(None),
            shipping_address: Set(Some(input.shipping_address.formatted())),
            billing_address: Set(Some(billing.formatted())),
            customer_notes: Set(input.customer_notes),
            order_id: Set(None),
            expires_at: Set(expires_at),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(session_id = %session.id, expires_at = %session.expires_at, "checkout session created");
        self.emit(Event::CheckoutSessionCreated {
            session_id: session.id,
            store_id: session.store_id,
            user_id: session.user_id,
        })
        .await;
        Ok(session)
    }

    /// Owner-scoped read. Sessions belonging to another user are
    /// indistinguishable from absent ones.
    #[instrument(skip(self))]
    pub async fn get_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<checkout_session::Model, ServiceError> {
        CheckoutSession::find_by_id(session_id)
            .filter(checkout_session::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Checkout session {} not found", session_id))
            })
    }

    /// Record the shipping choice. Permitted only while `Draft`.
    #[instrument(skip(self))]
    pub async fn select_shipping(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        method: String,
        cost: Decimal,
    ) -> Result<checkout_session::Model, ServiceError> {
        if cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "shipping cost must not be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let session = self.load_owned_for_update(&txn, session_id, user_id).await?;
        self.require_draft(&session)?;

        let mut update: checkout_session::ActiveModel = session.into();
        update.shipping_method = Set(Some(method.clone()));
        update.shipping_cost = Set(Some(cost));
        update.updated_at = Set(Utc::now());
        let session = update.update(&txn).await?;
        txn.commit().await?;

        self.emit(Event::ShippingSelected {
            session_id: session.id,
            method,
        })
        .await;
        Ok(session)
    }

    /// Record the payment choice. Cash on delivery completes the payment leg
    /// immediately (`Draft -> Cod`); Online stays in `Draft` and receives an
    /// external payment-intent reference for the provider to confirm against.
    #[instrument(skip(self))]
    pub async fn select_payment(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        method: PaymentMethod,
    ) -> Result<checkout_session::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let session = self.load_owned_for_update(&txn, session_id, user_id).await?;
        self.require_draft(&session)?;

        let mut update: checkout_session::ActiveModel = session.into();
        update.payment_method = Set(Some(method));
        match method {
            PaymentMethod::CashOnDelivery => {
                update.status = Set(CheckoutSessionStatus::Cod);
                update.payment_intent_id = Set(None);
            }
            PaymentMethod::Online => {
                update.payment_intent_id =
                    Set(Some(format!("pi_{}", Uuid::new_v4().simple())));
            }
        }
        update.updated_at = Set(Utc::now());
        let session = update.update(&txn).await?;
        txn.commit().await?;

        self.emit(Event::PaymentMethodSelected {
            session_id: session.id,
            method: format!("{:?}", method),
        })
        .await;
        Ok(session)
    }

    /// Confirm payment for the session matching an external payment-intent
    /// reference. The caller is the payment gateway, which only knows the
    /// provider's reference, not the session id.
    ///
    /// Idempotent: a session already `Paid` (or `Completed`) under the same
    /// reference is a no-op success, which is what makes the provider's
    /// at-least-once delivery safe.
    #[instrument(skip(self))]
    pub async fn mark_paid(
        &self,
        payment_intent_id: &str,
    ) -> Result<checkout_session::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let session = self.load_by_intent_for_update(&txn, payment_intent_id).await?;

        match session.status {
            CheckoutSessionStatus::Paid | CheckoutSessionStatus::Completed => {
                txn.commit().await?;
                info!(session_id = %session.id, "duplicate payment confirmation ignored");
                Ok(session)
            }
            CheckoutSessionStatus::Draft => {
                let mut update: checkout_session::ActiveModel = session.into();
                update.status = Set(CheckoutSessionStatus::Paid);
                update.updated_at = Set(Utc::now());
                let session = update.update(&txn).await?;
                txn.commit().await?;

                self.emit(Event::SessionPaid {
                    session_id: session.id,
                    payment_intent_id: payment_intent_id.to_string(),
                })
                .await;
                Ok(session)
            }
            status => {
                txn.rollback().await?;
                Err(ServiceError::InvalidState(format!(
                    "session cannot be marked paid from status {:?}",
                    status
                )))
            }
        }
    }

    /// Record a provider-reported payment failure: `Draft -> Failed`,
    /// terminal. Already-`Failed` sessions are a no-op.
    #[instrument(skip(self))]
    pub async fn mark_failed(
        &self,
        payment_intent_id: &str,
    ) -> Result<checkout_session::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let session = self.load_by_intent_for_update(&txn, payment_intent_id).await?;

        match session.status {
            CheckoutSessionStatus::Failed => {
                txn.commit().await?;
                Ok(session)
            }
            CheckoutSessionStatus::Draft => {
                let mut update: checkout_session::ActiveModel = session.into();
                update.status = Set(CheckoutSessionStatus::Failed);
                update.updated_at = Set(Utc::now());
                let session = update.update(&txn).await?;
                txn.commit().await?;

                warn!(session_id = %session.id, "payment failed; session closed");
                self.emit(Event::SessionFailed {
                    session_id: session.id,
                })
                .await;
                Ok(session)
            }
            status => {
                txn.rollback().await?;
                Err(ServiceError::InvalidState(format!(
                    "session cannot be failed from status {:?}",
                    status
                )))
            }
        }
    }

    /// Expire every `Draft` session whose deadline has passed. Bulk,
    /// idempotent, and safe to run concurrently with customer mutations: the
    /// status filter means only rows still in `Draft` are touched, and a row
    /// that concurrently left `Draft` is simply skipped.
    #[instrument(skip(self))]
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = CheckoutSession::update_many()
            .set(checkout_session::ActiveModel {
                status: Set(CheckoutSessionStatus::Expired),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(checkout_session::Column::Status.eq(CheckoutSessionStatus::Draft))
            .filter(checkout_session::Column::ExpiresAt.lt(now))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            self.emit(Event::SessionsExpired {
                count: result.rows_affected,
            })
            .await;
        }
        Ok(result.rows_affected)
    }

    fn require_draft(&self, session: &checkout_session::Model) -> Result<(), ServiceError> {
        if session.status != CheckoutSessionStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "session is {:?}, expected draft",
                session.status
            )));
        }
        Ok(())
    }

    async fn load_owned_for_update(
        &self,
        txn: &DatabaseTransaction,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<checkout_session::Model, ServiceError> {
        lock_exclusive_if_supported(
            CheckoutSession::find_by_id(session_id),
            self.db.get_database_backend(),
        )
        .filter(checkout_session::Column::UserId.eq(user_id))
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Checkout session {} not found", session_id)))
    }

    async fn load_by_intent_for_update(
        &self,
        txn: &DatabaseTransaction,
        payment_intent_id: &str,
    ) -> Result<checkout_session::Model, ServiceError> {
        lock_exclusive_if_supported(CheckoutSession::find(), self.db.get_database_backend())
            .filter(checkout_session::Column::PaymentIntentId.eq(payment_intent_id))
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::UnknownReference(payment_intent_id.to_string()))
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "failed to send checkout event");
        }
    }
}

mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use checkout_api::{
    entities::checkout_session::{CheckoutSessionStatus, PaymentMethod},
    errors::ServiceError,
};

#[tokio::test]
async fn empty_cart_cannot_start_checkout() {
    let ctx = common::setup().await;
    let err = ctx
        .services
        .snapshots
        .build(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn create_opens_draft_with_deadline() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;

    let before = Utc::now();
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 2)]).await;

    assert_eq!(session.status, CheckoutSessionStatus::Draft);
    assert!(session.order_id.is_none());
    assert!(session.payment_intent_id.is_none());

    // Default TTL is two hours.
    let ttl = session.expires_at - before;
    assert!(ttl > Duration::minutes(115) && ttl < Duration::minutes(125));

    let snapshot = session.snapshot().unwrap();
    assert_eq!(snapshot.sub_total, dec!(20.00));
    assert_eq!(snapshot.tax_amount, dec!(1.7500)); // 8.75%
    assert_eq!(snapshot.total_amount, dec!(21.7500));
}

#[tokio::test]
async fn snapshot_is_immune_to_later_price_changes() {
    use sea_orm::{ActiveModelTrait, Set};

    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;

    let mut update: checkout_api::entities::product::ActiveModel = product.into();
    update.price = Set(dec!(99.00));
    update.update(&*ctx.db).await.unwrap();

    let session = ctx
        .services
        .checkout
        .get_session(session.id, user_id)
        .await
        .unwrap();
    let snapshot = session.snapshot().unwrap();
    assert_eq!(snapshot.lines[0].unit_price, dec!(10.00));
    assert_eq!(snapshot.sub_total, dec!(10.00));
}

#[tokio::test]
async fn sessions_are_owner_scoped() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;

    let stranger = Uuid::new_v4();
    assert_matches!(
        ctx.services
            .checkout
            .get_session(session.id, stranger)
            .await
            .unwrap_err(),
        ServiceError::NotFound(_)
    );
    assert_matches!(
        ctx.services
            .checkout
            .select_shipping(session.id, stranger, "standard".into(), dec!(5.00))
            .await
            .unwrap_err(),
        ServiceError::NotFound(_)
    );
}

#[tokio::test]
async fn shipping_selection_requires_draft() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;

    ctx.services
        .checkout
        .select_payment(session.id, user_id, PaymentMethod::CashOnDelivery)
        .await
        .unwrap();

    assert_matches!(
        ctx.services
            .checkout
            .select_shipping(session.id, user_id, "standard".into(), dec!(5.00))
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );
}

#[tokio::test]
async fn negative_shipping_cost_is_rejected() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;

    assert_matches!(
        ctx.services
            .checkout
            .select_shipping(session.id, user_id, "standard".into(), dec!(-1.00))
            .await
            .unwrap_err(),
        ServiceError::ValidationError(_)
    );
}

#[tokio::test]
async fn online_payment_issues_intent_and_stays_draft() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;

    let session = ctx
        .services
        .checkout
        .select_payment(session.id, user_id, PaymentMethod::Online)
        .await
        .unwrap();

    assert_eq!(session.status, CheckoutSessionStatus::Draft);
    let intent = session.payment_intent_id.as_deref().unwrap();
    assert!(intent.starts_with("pi_"));
}

#[tokio::test]
async fn cash_on_delivery_transitions_to_cod() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;

    let session = ctx
        .services
        .checkout
        .select_payment(session.id, user_id, PaymentMethod::CashOnDelivery)
        .await
        .unwrap();

    assert_eq!(session.status, CheckoutSessionStatus::Cod);
    assert!(session.payment_intent_id.is_none());
}

#[tokio::test]
async fn mark_paid_is_idempotent() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;
    let session = ctx
        .services
        .checkout
        .select_payment(session.id, user_id, PaymentMethod::Online)
        .await
        .unwrap();
    let intent = session.payment_intent_id.clone().unwrap();

    let first = ctx.services.checkout.mark_paid(&intent).await.unwrap();
    assert_eq!(first.status, CheckoutSessionStatus::Paid);

    let second = ctx.services.checkout.mark_paid(&intent).await.unwrap();
    assert_eq!(second.status, CheckoutSessionStatus::Paid);
    assert_eq!(second.id, first.id);
}

#[tokio::test]
async fn mark_paid_rejects_unknown_reference() {
    let ctx = common::setup().await;
    assert_matches!(
        ctx.services.checkout.mark_paid("pi_nonexistent").await.unwrap_err(),
        ServiceError::UnknownReference(_)
    );
}

#[tokio::test]
async fn mark_failed_closes_draft_session() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;
    let session = ctx
        .services
        .checkout
        .select_payment(session.id, user_id, PaymentMethod::Online)
        .await
        .unwrap();
    let intent = session.payment_intent_id.clone().unwrap();

    let failed = ctx.services.checkout.mark_failed(&intent).await.unwrap();
    assert_eq!(failed.status, CheckoutSessionStatus::Failed);

    // Terminal: a late confirmation for the same intent is refused.
    assert_matches!(
        ctx.services.checkout.mark_paid(&intent).await.unwrap_err(),
        ServiceError::InvalidState(_)
    );
}

#[tokio::test]
async fn expire_stale_closes_overdue_drafts_once() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 5).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;

    // Not yet overdue.
    let expired = ctx.services.checkout.expire_stale(Utc::now()).await.unwrap();
    assert_eq!(expired, 0);

    let after_deadline = session.expires_at + Duration::seconds(1);
    let expired = ctx
        .services
        .checkout
        .expire_stale(after_deadline)
        .await
        .unwrap();
    assert_eq!(expired, 1);

    let session = ctx
        .services
        .checkout
        .get_session(session.id, user_id)
        .await
        .unwrap();
    assert_eq!(session.status, CheckoutSessionStatus::Expired);

    // Idempotent.
    let expired = ctx
        .services
        .checkout
        .expire_stale(after_deadline)
        .await
        .unwrap();
    assert_eq!(expired, 0);
}

#[tokio::test]
async fn expire_stale_skips_paid_and_cod_sessions() {
    let ctx = common::setup().await;
    let (user_id, store_id) = (Uuid::new_v4(), Uuid::new_v4());
    let product = common::seed_product(&ctx.db, store_id, "widget", dec!(10.00), 9).await;
    let session = common::checkout_to_draft(&ctx, user_id, store_id, &[(&product, 1)]).await;
    let session = ctx
        .services
        .checkout
        .select_payment(session.id, user_id, PaymentMethod::CashOnDelivery)
        .await
        .unwrap();

    let after_deadline = session.expires_at + Duration::hours(1);
    let expired = ctx
        .services
        .checkout
        .expire_stale(after_deadline)
        .await
        .unwrap();
    assert_eq!(expired, 0);

    let session = ctx
        .services
        .checkout
        .get_session(session.id, user_id)
        .await
        .unwrap();
    assert_eq!(session.status, CheckoutSessionStatus::Cod);
}

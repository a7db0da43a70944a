use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        cart::CartService,
        checkout::CheckoutSessionService,
        materializer::OrderMaterializer,
        orders::OrderService,
        payments::{HmacSha256Provider, PaymentWebhookService},
        snapshot::CartSnapshotBuilder,
    },
};

pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod payment_webhooks;

/// All domain services, wired once at startup and shared by the handlers
/// and background tasks.
#[derive(Clone)]
pub struct AppServices {
    pub carts: Arc<CartService>,
    pub snapshots: Arc<CartSnapshotBuilder>,
    pub checkout: Arc<CheckoutSessionService>,
    pub materializer: Arc<OrderMaterializer>,
    pub orders: Arc<OrderService>,
    pub webhooks: Arc<PaymentWebhookService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, config: &AppConfig, event_sender: Arc<EventSender>) -> Self {
        let carts = Arc::new(CartService::new(db.clone()));
        let snapshots = Arc::new(CartSnapshotBuilder::new(
            db.clone(),
            carts.clone(),
            config.tax_rate(),
        ));
        let checkout = Arc::new(CheckoutSessionService::new(
            db.clone(),
            event_sender.clone(),
            Duration::from_secs(config.checkout_session_ttl_secs),
        ));
        let materializer = Arc::new(OrderMaterializer::new(
            db.clone(),
            carts.clone(),
            event_sender,
            config.vendor_commission_rate(),
            config.order_number_prefix.clone(),
        ));
        let orders = Arc::new(OrderService::new(db));
        let provider = Arc::new(HmacSha256Provider::new(
            config.payment_webhook_secret.as_bytes().to_vec(),
            config.payment_webhook_tolerance_secs as i64,
        ));
        let webhooks = Arc::new(PaymentWebhookService::new(
            provider,
            checkout.clone(),
            materializer.clone(),
        ));

        Self {
            carts,
            snapshots,
            checkout,
            materializer,
            orders,
            webhooks,
        }
    }
}

//! Shared test harness: in-memory SQLite with the embedded migrations
//! applied and the full service graph wired against it.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use checkout_api::{
    config::AppConfig,
    db::{establish_connection_with_config, run_migrations, DbConfig, DbPool},
    entities::product,
    events::{Event, EventSender},
    handlers::AppServices,
};

pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret_0123456789";

pub struct TestContext {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub services: AppServices,
    pub event_sender: EventSender,
    pub events: mpsc::Receiver<Event>,
}

impl TestContext {
    /// The full v1 router wired against this context, for request-level
    /// tests.
    pub fn router(&self) -> axum::Router {
        let state = Arc::new(checkout_api::AppState {
            db: self.db.clone(),
            config: self.config.clone(),
            event_sender: self.event_sender.clone(),
            services: self.services.clone(),
        });
        axum::Router::new()
            .nest("/api/v1", checkout_api::api_v1_routes())
            .with_state(state)
    }
}

/// Fresh in-memory database per test. `max_connections` is pinned to 1 so
/// every query sees the same SQLite instance.
pub async fn setup() -> TestContext {
    let db_config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let db = establish_connection_with_config(&db_config)
        .await
        .expect("test database");
    run_migrations(&db).await.expect("migrations");
    let db = Arc::new(db);

    let config = AppConfig::new("sqlite::memory:", TEST_WEBHOOK_SECRET);
    let (tx, rx) = mpsc::channel(64);
    let event_sender = EventSender::new(tx);
    let services = AppServices::new(db.clone(), &config, Arc::new(event_sender.clone()));

    TestContext {
        db,
        config,
        services,
        event_sender,
        events: rx,
    }
}

pub fn test_address() -> checkout_api::models::Address {
    checkout_api::models::Address {
        line1: "1 Market St".to_string(),
        line2: None,
        city: "San Francisco".to_string(),
        region: "CA".to_string(),
        postal_code: "94105".to_string(),
        country: "US".to_string(),
    }
}

/// Put the given lines in the user's cart and open a Draft session over
/// their frozen snapshot.
pub async fn checkout_to_draft(
    ctx: &TestContext,
    user_id: Uuid,
    store_id: Uuid,
    lines: &[(&product::Model, i32)],
) -> checkout_api::entities::checkout_session::Model {
    for (product, quantity) in lines {
        ctx.services
            .carts
            .add_item(user_id, store_id, product.id, *quantity)
            .await
            .expect("add cart item");
    }
    let snapshot = ctx
        .services
        .snapshots
        .build(user_id, store_id)
        .await
        .expect("build snapshot");
    ctx.services
        .checkout
        .create(checkout_api::services::checkout::CreateSessionInput {
            user_id,
            store_id,
            snapshot,
            shipping_address: test_address(),
            billing_address: None,
            customer_notes: None,
        })
        .await
        .expect("create session")
}

/// Sign a webhook body the way the provider would.
pub fn sign_webhook(secret: &str, timestamp: &str, body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    let mut mac =
        Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub async fn seed_product(
    db: &DbPool,
    store_id: Uuid,
    name: &str,
    price: Decimal,
    stock: i32,
) -> product::Model {
    let now = Utc::now();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        store_id: Set(store_id),
        vendor_id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        sku: Set(format!("SKU-{}", name.to_uppercase().replace(' ', "-"))),
        price: Set(price),
        stock_quantity: Set(stock),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed product")
}

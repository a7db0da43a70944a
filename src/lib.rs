//! Checkout API Library
//!
//! Multi-tenant checkout core: carts are frozen into immutable snapshots,
//! staged through a checkout session state machine, reconciled against
//! payment provider webhooks, and materialized into durable orders exactly
//! once.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod services;
pub mod tracing_ctx;

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::json;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Liveness plus a database round trip.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = db::check_connection(&state.db).await.is_ok();
    let status = if db_ok { "healthy" } else { "degraded" };
    Json(json!({
        "status": status,
        "database": db_ok,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Full v1 API surface.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .nest("/carts", handlers::carts::cart_routes())
        .nest("/checkout-sessions", handlers::checkout::checkout_routes())
        .nest("/orders", handlers::orders::order_routes())
        .nest("/payments", handlers::payment_webhooks::webhook_routes())
}

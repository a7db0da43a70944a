use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::payments::{WebhookDisposition, SIGNATURE_HEADER, TIMESTAMP_HEADER},
    AppState,
};

/// Creates the router for payment provider webhooks
pub fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", post(payment_webhook))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
}

/// Receive a payment provider webhook.
///
/// Always answers 200 once the delivery is verified, whether or not it was
/// acted on; 401 is reserved for signature failures and 400 for transport
/// problems, the only cases where a provider retry can help.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = WebhookAck),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let timestamp = header_str(&headers, TIMESTAMP_HEADER)?;
    let signature = header_str(&headers, SIGNATURE_HEADER)?;

    let disposition = state
        .services
        .webhooks
        .process(&body, timestamp, signature)
        .await?;

    let ack = match disposition {
        WebhookDisposition::Processed { order_id } => WebhookAck {
            received: true,
            order_id,
        },
        WebhookDisposition::Ignored | WebhookDisposition::UnknownReference => WebhookAck {
            received: true,
            order_id: None,
        },
    };
    Ok((StatusCode::OK, Json(ack)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ServiceError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!(header = name, "webhook delivery missing required header");
            ServiceError::BadRequest(format!("missing {} header", name))
        })
}

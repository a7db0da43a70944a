//! Payment Reconciliation Gateway.
//!
//! Verifies and interprets asynchronous payment-provider webhooks, then
//! drives the session state machine. The provider delivers at-least-once and
//! out of order; everything here is written so a redelivered or stale event
//! is harmless.

use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::{checkout::CheckoutSessionService, materializer::OrderMaterializer},
};

pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";

type HmacSha256 = Hmac<Sha256>;

/// Decoded provider notification.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub kind: PaymentEventKind,
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventKind {
    CheckoutCompleted,
    CheckoutFailed,
    /// Event types this service does not act on (refunds, disputes, ...).
    Other(String),
}

/// Boundary to the payment provider's webhook format. Implementations verify
/// raw deliveries and decode them into [`PaymentEvent`]s; swapping providers
/// means swapping this implementation, not the reconciliation logic.
pub trait PaymentProvider: Send + Sync {
    /// Verify authenticity of a raw delivery. `timestamp` and `signature`
    /// come from the provider's headers.
    fn verify(&self, body: &[u8], timestamp: &str, signature: &str) -> Result<(), ServiceError>;

    /// Decode a verified payload.
    fn parse(&self, body: &[u8]) -> Result<PaymentEvent, ServiceError>;
}

/// HMAC-SHA256 verification over `"{timestamp}.{body}"` with a shared
/// secret, hex-encoded signature, constant-time comparison, and a bounded
/// timestamp skew to blunt replay.
pub struct HmacSha256Provider {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: WireData,
}

#[derive(Debug, Default, Deserialize)]
struct WireData {
    #[serde(default)]
    payment_intent_id: Option<String>,
}

impl HmacSha256Provider {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }
}

impl PaymentProvider for HmacSha256Provider {
    fn verify(&self, body: &[u8], timestamp: &str, signature: &str) -> Result<(), ServiceError> {
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| ServiceError::BadRequest("invalid webhook timestamp".to_string()))?;

        let age = (Utc::now().timestamp() - ts).abs();
        if age > self.tolerance_secs {
            warn!(age_secs = age, "webhook timestamp outside tolerance");
            return Err(ServiceError::InvalidSignature);
        }

        let expected =
            hex::decode(signature.trim()).map_err(|_| ServiceError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| ServiceError::InvalidSignature)
    }

    fn parse(&self, body: &[u8]) -> Result<PaymentEvent, ServiceError> {
        let payload: WirePayload = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("malformed webhook payload: {}", e)))?;

        let kind = match payload.event_type.as_str() {
            "checkout.completed" => PaymentEventKind::CheckoutCompleted,
            "checkout.failed" => PaymentEventKind::CheckoutFailed,
            other => PaymentEventKind::Other(other.to_string()),
        };
        Ok(PaymentEvent {
            kind,
            payment_intent_id: payload.data.payment_intent_id,
        })
    }
}

/// Outcome of a webhook delivery, as the HTTP layer should report it to the
/// provider. Everything here acknowledges with 200; only verification and
/// transport-level failures push back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// Session transitioned; for completions, the materialized order.
    Processed { order_id: Option<Uuid> },
    /// Verified but intentionally not acted on.
    Ignored,
    /// No session carries this payment reference. Acknowledged so the
    /// provider stops redelivering; the mismatch is an operator concern.
    UnknownReference,
}

pub struct PaymentWebhookService {
    provider: Arc<dyn PaymentProvider>,
    checkout: Arc<CheckoutSessionService>,
    materializer: Arc<OrderMaterializer>,
}

impl PaymentWebhookService {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        checkout: Arc<CheckoutSessionService>,
        materializer: Arc<OrderMaterializer>,
    ) -> Self {
        Self {
            provider,
            checkout,
            materializer,
        }
    }

    /// Verify, decode, and apply one webhook delivery.
    ///
    /// Completion events mark the session paid and immediately materialize
    /// the order. An `InsufficientStock` failure during materialization is
    /// acknowledged anyway: payment is confirmed either way, the session
    /// stays `Paid`, and completion can be retried after restock.
    #[instrument(skip_all)]
    pub async fn process(
        &self,
        body: &[u8],
        timestamp: &str,
        signature: &str,
    ) -> Result<WebhookDisposition, ServiceError> {
        self.provider.verify(body, timestamp, signature)?;
        let event = self.provider.parse(body)?;

        let intent = match event.payment_intent_id.as_deref() {
            Some(intent) => intent,
            None => match event.kind {
                PaymentEventKind::Other(ref t) => {
                    info!(event_type = %t, "ignoring webhook event type");
                    return Ok(WebhookDisposition::Ignored);
                }
                _ => {
                    return Err(ServiceError::BadRequest(
                        "webhook payload missing payment_intent_id".to_string(),
                    ))
                }
            },
        };

        match event.kind {
            PaymentEventKind::CheckoutCompleted => self.apply_completed(intent).await,
            PaymentEventKind::CheckoutFailed => self.apply_failed(intent).await,
            PaymentEventKind::Other(t) => {
                info!(event_type = %t, "ignoring webhook event type");
                Ok(WebhookDisposition::Ignored)
            }
        }
    }

    async fn apply_completed(&self, intent: &str) -> Result<WebhookDisposition, ServiceError> {
        let session = match self.checkout.mark_paid(intent).await {
            Ok(session) => session,
            Err(ServiceError::UnknownReference(r)) => {
                warn!(payment_intent_id = %r, "webhook references no known session");
                return Ok(WebhookDisposition::UnknownReference);
            }
            Err(ServiceError::InvalidState(reason)) => {
                // Stale confirmation for an expired or failed session. The
                // money moved; flag it and stop the provider's retries.
                warn!(payment_intent_id = %intent, %reason,
                    "payment confirmed for a non-payable session");
                return Ok(WebhookDisposition::Ignored);
            }
            Err(e) => return Err(e),
        };

        match self.materializer.materialize(session.id).await {
            Ok(order) => Ok(WebhookDisposition::Processed {
                order_id: Some(order.id),
            }),
            Err(ServiceError::InsufficientStock(reason)) => {
                warn!(session_id = %session.id, %reason,
                    "paid session could not materialize; awaiting restock");
                Ok(WebhookDisposition::Processed { order_id: None })
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_failed(&self, intent: &str) -> Result<WebhookDisposition, ServiceError> {
        match self.checkout.mark_failed(intent).await {
            Ok(_) => Ok(WebhookDisposition::Processed { order_id: None }),
            Err(ServiceError::UnknownReference(r)) => {
                warn!(payment_intent_id = %r, "webhook references no known session");
                Ok(WebhookDisposition::UnknownReference)
            }
            Err(ServiceError::InvalidState(reason)) => {
                warn!(payment_intent_id = %intent, %reason,
                    "failure event for a session no longer in draft");
                Ok(WebhookDisposition::Ignored)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn verify_accepts_valid_signature() {
        let provider = HmacSha256Provider::new(b"test-secret-0123456789".to_vec(), 300);
        let body = br#"{"type":"checkout.completed"}"#;
        let ts = Utc::now().timestamp().to_string();
        let sig = sign(b"test-secret-0123456789", &ts, body);
        assert!(provider.verify(body, &ts, &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let provider = HmacSha256Provider::new(b"test-secret-0123456789".to_vec(), 300);
        let ts = Utc::now().timestamp().to_string();
        let sig = sign(b"test-secret-0123456789", &ts, b"original");
        let err = provider.verify(b"tampered", &ts, &sig).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidSignature));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let provider = HmacSha256Provider::new(b"right-secret-0123456".to_vec(), 300);
        let body = b"{}";
        let ts = Utc::now().timestamp().to_string();
        let sig = sign(b"wrong-secret-0123456", &ts, body);
        assert!(provider.verify(body, &ts, &sig).is_err());
    }

    #[test]
    fn verify_rejects_stale_timestamp() {
        let provider = HmacSha256Provider::new(b"test-secret-0123456789".to_vec(), 300);
        let body = b"{}";
        let ts = (Utc::now().timestamp() - 3600).to_string();
        let sig = sign(b"test-secret-0123456789", &ts, body);
        let err = provider.verify(body, &ts, &sig).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidSignature));
    }

    #[test]
    fn verify_rejects_non_numeric_timestamp() {
        let provider = HmacSha256Provider::new(b"test-secret-0123456789".to_vec(), 300);
        let err = provider.verify(b"{}", "not-a-number", "00").unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[test]
    fn parse_recognizes_event_kinds() {
        let provider = HmacSha256Provider::new(b"test-secret-0123456789".to_vec(), 300);

        let event = provider
            .parse(br#"{"type":"checkout.completed","data":{"payment_intent_id":"pi_abc"}}"#)
            .unwrap();
        assert_eq!(event.kind, PaymentEventKind::CheckoutCompleted);
        assert_eq!(event.payment_intent_id.as_deref(), Some("pi_abc"));

        let event = provider
            .parse(br#"{"type":"checkout.failed","data":{"payment_intent_id":"pi_abc"}}"#)
            .unwrap();
        assert_eq!(event.kind, PaymentEventKind::CheckoutFailed);

        let event = provider.parse(br#"{"type":"refund.created"}"#).unwrap();
        assert_eq!(
            event.kind,
            PaymentEventKind::Other("refund.created".to_string())
        );
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let provider = HmacSha256Provider::new(b"test-secret-0123456789".to_vec(), 300);
        assert!(matches!(
            provider.parse(b"not json").unwrap_err(),
            ServiceError::BadRequest(_)
        ));
    }
}

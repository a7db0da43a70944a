//! Domain events emitted by the checkout core.
//!
//! Events are sent on a bounded in-process channel after the originating
//! transaction commits; a background task consumes and logs them. Delivery is
//! best-effort: a full or closed channel is logged and never fails the
//! operation that produced the event.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutSessionCreated {
        session_id: Uuid,
        store_id: Uuid,
        user_id: Uuid,
    },
    ShippingSelected {
        session_id: Uuid,
        method: String,
    },
    PaymentMethodSelected {
        session_id: Uuid,
        method: String,
    },
    SessionPaid {
        session_id: Uuid,
        payment_intent_id: String,
    },
    SessionFailed {
        session_id: Uuid,
    },
    SessionsExpired {
        count: u64,
    },
    OrderCreated {
        order_id: Uuid,
        session_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; callers treat failure as log-and-continue.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background consumer: logs every event with structured fields.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(event = ?event, "domain event");
    }
    info!("Event channel closed; event processor shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let sender = EventSender::new(tx);
        let result = sender.send(Event::SessionsExpired { count: 1 }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn events_reach_the_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .send(Event::SessionFailed {
                session_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(Event::SessionFailed { .. })));
    }
}

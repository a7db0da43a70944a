//! Session Expiry Sweeper.
//!
//! Background loop that periodically bulk-expires overdue `Draft` sessions.
//! The sweep itself is idempotent, so overlapping runs or missed ticks only
//! delay expiry, never corrupt it. Sessions that expired between ticks are
//! still closed on the next pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::services::checkout::CheckoutSessionService;

pub struct SessionSweeper {
    checkout: Arc<CheckoutSessionService>,
    period: Duration,
}

impl SessionSweeper {
    pub fn new(checkout: Arc<CheckoutSessionService>, period: Duration) -> Self {
        Self { checkout, period }
    }

    /// Run forever; spawn on the runtime at startup.
    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = self.period.as_secs(), "session sweeper started");

        loop {
            ticker.tick().await;
            match self.checkout.expire_stale(Utc::now()).await {
                Ok(0) => debug!("sweep found no stale sessions"),
                Ok(count) => info!(count, "expired stale checkout sessions"),
                // Transient failures are retried on the next tick.
                Err(e) => error!(error = %e, "session sweep failed"),
            }
        }
    }
}

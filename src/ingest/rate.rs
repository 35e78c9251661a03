// src/ingest/rate.rs
//! Shared minimum-delay gate for every outbound request of one instance.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(150);

/// Callers `wait()` before each request. Request starts are spaced at least
/// `min_delay` apart, whether callers are sequential or concurrent; the lock
/// is held across the sleep so waiters queue in order.
#[derive(Debug)]
pub struct RateGate {
    min_delay: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            next_slot: Mutex::new(None),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub async fn wait(&self) {
        let mut next = self.next_slot.lock().await;
        if let Some(at) = *next {
            if at > Instant::now() {
                tokio::time::sleep_until(at).await;
            }
        }
        *next = Some(Instant::now() + self.min_delay);
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY)
    }
}

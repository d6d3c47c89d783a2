//! Minimum spacing between calls to an external service.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Shared call pacer.
///
/// Each caller reserves the next free slot under a short lock and then
/// sleeps outside it, so concurrent workers are spaced `interval` apart
/// without holding the lock across an await.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until this caller's slot comes up.
    pub async fn wait(&self) {
        let slot = self.reserve();
        if slot > Instant::now() {
            tokio::time::sleep_until(slot).await;
        }
    }

    fn reserve(&self) -> Instant {
        let now = Instant::now();
        let mut next = self.next_slot.lock();
        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot
    }
}

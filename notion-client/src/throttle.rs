//! Fixed-interval request throttle

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Slowest spacing a configured rate can produce
const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Enforces a minimum spacing between consecutive requests.
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Throttle allowing at most `requests_per_second` requests per second.
    /// A non-positive rate disables throttling.
    pub fn per_second(requests_per_second: f64) -> Self {
        let interval = if requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second)
                .map(|d| d.min(MAX_INTERVAL))
                .unwrap_or(MAX_INTERVAL)
        } else {
            Duration::ZERO
        };
        Self::with_interval(interval)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next request slot, then claim it.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        *last = Some(Instant::now());
    }
}

//! Per-host token bucket rate limiting: capacity 1, refill rate `1/delay_ms`,
//! matching the fetcher's serialized-per-host policy (§4.1b). The token math
//! follows the token-bucket approach used elsewhere in this codebase's
//! concurrency primitives, scaled down to the single-slot case the spec asks
//! for.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Bucket {
    tokens: f64,
    refill_per_ms: f64,
    last_update: Instant,
}

impl Bucket {
    fn new(delay_ms: u64) -> Self {
        Self {
            tokens: 1.0,
            refill_per_ms: 1.0 / delay_ms.max(1) as f64,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed_ms = self.last_update.elapsed().as_secs_f64() * 1000.0;
        self.tokens = (self.tokens + elapsed_ms * self.refill_per_ms).min(1.0);
        self.last_update = Instant::now();
    }

    /// Returns the wait duration needed before a token is available, or
    /// `None` if a token is immediately consumed.
    fn try_take(&mut self) -> Option<Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_ms / 1000.0))
        }
    }
}

/// Shared per-host state: the token buckets and nothing else, guarded by a
/// single lock since entries are cheap and short-held (§5: "the per-host
/// token buckets ... are the only shared mutable state inside the fetcher").
#[derive(Default)]
pub struct HostBuckets {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl HostBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until a token is available for `host`, consuming it.
    pub async fn acquire(&self, host: &str, delay_ms: u64) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock();
                let bucket = buckets
                    .entry(host.to_string())
                    .or_insert_with(|| Bucket::new(delay_ms));
                bucket.try_take()
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn second_request_waits_for_refill() {
        let buckets = HostBuckets::new();
        let host = "example.com";
        buckets.acquire(host, 1000).await;
        let start = tokio::time::Instant::now();
        buckets.acquire(host, 1000).await;
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}

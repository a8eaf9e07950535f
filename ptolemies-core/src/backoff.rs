//! Exponential backoff with jitter, shared by the Fetcher (§4.1) and the
//! Embedder (§4.5) rather than duplicating the arithmetic in both crates.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    factor: f64,
    max_attempts: u32,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, factor: f64, max_attempts: u32, jitter: f64) -> Self {
        Self {
            base,
            factor,
            max_attempts,
            jitter,
        }
    }

    /// Fetcher policy: base 500ms, factor 2, max 3 attempts, jitter ±25%.
    pub fn fetcher() -> Self {
        Self::new(Duration::from_millis(500), 2.0, 3, 0.25)
    }

    /// Embedder rate-limit policy: base 1s, factor 2, max 5 attempts.
    pub fn embedder_rate_limited() -> Self {
        Self::new(Duration::from_secs(1), 2.0, 5, 0.25)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry attempt `attempt` (1-based: the delay before the
    /// *second* try is `delay_for(1)`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base.as_secs_f64() * self.factor.powi(attempt as i32 - 1);
        let jitter_span = exp * self.jitter;
        let jittered = rand::rng().random_range((exp - jitter_span).max(0.0)..=(exp + jitter_span));
        Duration::from_secs_f64(jittered.max(0.0))
    }

    pub async fn sleep(&self, attempt: u32) {
        tokio::time::sleep(self.delay_for(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempt() {
        let b = Backoff::fetcher();
        let d1 = b.delay_for(1).as_secs_f64();
        let d2 = b.delay_for(2).as_secs_f64();
        // jitter is ±25%, so allow overlap but expect the trend to roughly double
        assert!(d2 > d1 * 1.2);
    }

    #[test]
    fn max_attempts_matches_policy() {
        assert_eq!(Backoff::fetcher().max_attempts(), 3);
        assert_eq!(Backoff::embedder_rate_limited().max_attempts(), 5);
    }
}

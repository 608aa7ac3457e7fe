//! Token bucket rate limiter for the third-party listing service.
//!
//! Tokens refill at a constant rate and are consumed per request; an empty
//! bucket reports how long until the next token. The bucket is injected into
//! the listing check so tests can drive it deterministically.

use tokio::time::{Duration, Instant};

/// Token bucket sized to a requests-per-minute quota. Starts full.
#[derive(Debug)]
pub struct TokenBucket {
    /// Max tokens (= requests per minute).
    capacity: f32,
    tokens: f32,
    /// Tokens added per second.
    refill_rate: f32,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute as f32;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Try to take one token; on failure returns the wait until one frees up.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f32(tokens_needed / self.refill_rate))
        }
    }

    /// Update the quota, preserving (and clamping) the current token count.
    pub fn set_rate_limit(&mut self, requests_per_minute: u32) {
        self.capacity = requests_per_minute as f32;
        self.refill_rate = self.capacity / 60.0;
        self.tokens = self.tokens.min(self.capacity);
    }

    /// Refill the bucket to capacity (tests).
    pub fn reset(&mut self) {
        self.tokens = self.capacity;
        self.last_refill = Instant::now();
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[test]
    fn test_starts_full() {
        let mut bucket = TokenBucket::new(10);
        for _ in 0..10 {
            assert!(bucket.try_acquire().is_ok());
        }
        assert!(bucket.try_acquire().is_err());
    }

    #[test]
    fn test_empty_bucket_reports_wait_time() {
        let mut bucket = TokenBucket::new(10);
        for _ in 0..10 {
            bucket.try_acquire().unwrap();
        }
        let wait = bucket.try_acquire().unwrap_err();
        // At 10 rpm one token takes 6 seconds to refill.
        assert!(wait.as_secs() <= 6);
        assert!(wait.as_millis() > 0);
    }

    #[test]
    fn test_set_rate_limit_clamps_tokens() {
        let mut bucket = TokenBucket::new(10);
        for _ in 0..5 {
            bucket.try_acquire().unwrap();
        }
        bucket.set_rate_limit(3);
        assert_eq!(bucket.capacity, 3.0);
        assert_eq!(bucket.tokens, 3.0);
    }

    #[test]
    fn test_reset_refills() {
        let mut bucket = TokenBucket::new(2);
        bucket.try_acquire().unwrap();
        bucket.try_acquire().unwrap();
        assert!(bucket.try_acquire().is_err());
        bucket.reset();
        assert!(bucket.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn test_refill_over_time() {
        let mut bucket = TokenBucket::new(60); // 1 token per second
        for _ in 0..60 {
            bucket.try_acquire().unwrap();
        }
        sleep(Duration::from_millis(100)).await;
        bucket.refill();
        assert!(bucket.tokens > 0.05);
        assert!(bucket.tokens < 0.2);
    }
}

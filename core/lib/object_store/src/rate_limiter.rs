use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

/// Token bucket state. Refill happens lazily on access.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn consume(&mut self, tokens: f64) -> bool {
        self.refill();
        if self.tokens >= tokens {
            self.tokens -= tokens;
            true
        } else {
            false
        }
    }

    fn wait_time(&mut self, tokens: f64) -> Duration {
        self.refill();
        if self.tokens >= tokens {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((tokens - self.tokens) / self.refill_rate)
    }
}

/// Process-wide request throttle for the object store. Burst capacity is
/// `2 * requests_per_second`; `handle_slowdown` halves the refill rate (floor
/// 1 rps) until `reset_rate` restores it.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_second: f64,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        Self {
            requests_per_second,
            bucket: Mutex::new(TokenBucket::new(
                2.0 * requests_per_second,
                requests_per_second,
            )),
        }
    }

    /// Acquires `tokens`, sleeping until they are available when `wait` is
    /// set; returns whether the tokens were granted.
    pub async fn acquire(&self, tokens: f64, wait: bool) -> bool {
        loop {
            let wait_for = {
                let mut bucket = self.bucket.lock().await;
                if bucket.consume(tokens) {
                    return true;
                }
                if !wait {
                    return false;
                }
                bucket.wait_time(tokens)
            };
            tracing::debug!(wait_secs = wait_for.as_secs_f64(), tokens, "Rate limited, waiting");
            tokio::time::sleep(wait_for).await;
        }
    }

    /// Reacts to an explicit SlowDown from the store: halve the refill rate
    /// and honor any retry-after hint before the caller retries.
    pub async fn handle_slowdown(&self, retry_after: Option<Duration>) {
        let (old_rate, new_rate) = {
            let mut bucket = self.bucket.lock().await;
            let old_rate = bucket.refill_rate;
            bucket.refill_rate = (old_rate * 0.5).max(1.0);
            (old_rate, bucket.refill_rate)
        };
        tracing::warn!(old_rate, new_rate, ?retry_after, "Store SlowDown, reducing request rate");
        if let Some(delay) = retry_after {
            tokio::time::sleep(delay).await;
        }
    }

    pub async fn reset_rate(&self) {
        let mut bucket = self.bucket.lock().await;
        bucket.refill_rate = self.requests_per_second;
    }

    pub async fn current_rate(&self) -> f64 {
        self.bucket.lock().await.refill_rate
    }
}

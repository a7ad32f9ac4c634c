use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use anyhow::{Result, Context};
use tracing::debug;

/// A token-bucket rate limiter gating queries-per-second across the whole
/// process, plus a semaphore bounding in-flight concurrency.
///
/// `RateLimiter::unlimited()` is a zero-overhead pass-through: `acquire()`
/// returns immediately without touching the token bucket at all, so a
/// `--rate-limit 0` run pays no synchronization cost per query.
#[derive(Debug)]
pub struct RateLimiter {
    inner: Option<TokenBucket>,
}

#[derive(Debug)]
struct TokenBucket {
    /// Maximum number of requests allowed in a time period
    capacity: usize,
    /// Current token count
    tokens: Mutex<usize>,
    /// Time period for token replenishment in milliseconds
    refill_time_ms: u64,
    /// Last time tokens were refilled
    last_refill: Mutex<Instant>,
    /// Semaphore to limit concurrent requests
    concurrency_limit: Arc<Semaphore>,
}

impl RateLimiter {
    /// Creates a rate limiter allowing `requests_per_period` requests every
    /// `period_ms` milliseconds, with at most `max_concurrent` requests
    /// in flight at once.
    pub fn new(requests_per_period: usize, period_ms: u64, max_concurrent: usize) -> Self {
        let now = Instant::now();
        Self {
            inner: Some(TokenBucket {
                capacity: requests_per_period,
                tokens: Mutex::new(requests_per_period),
                refill_time_ms: period_ms,
                last_refill: Mutex::new(now),
                concurrency_limit: Arc::new(Semaphore::new(max_concurrent)),
            }),
        }
    }

    /// A rate limiter with no cap at all: `0` in `--rate-limit` maps here.
    pub fn unlimited() -> Self {
        Self { inner: None }
    }

    /// Acquires permission to make a request, waiting if necessary. Returns
    /// a guard that releases the concurrency permit when dropped.
    pub async fn acquire(&self) -> Result<RateLimitGuard> {
        let Some(bucket) = &self.inner else {
            return Ok(RateLimitGuard { _permit: None });
        };

        debug!("Attempting to acquire rate limit permit");

        loop {
            let wait_time = bucket.try_acquire().await;
            if wait_time == Duration::ZERO {
                break;
            }
            debug!("Rate limit reached, waiting for {:?}", wait_time);
            sleep(wait_time).await;
        }

        let permit = bucket
            .concurrency_limit
            .clone()
            .acquire_owned()
            .await
            .context("Failed to acquire concurrency permit")?;

        debug!("Rate limit permit acquired");
        Ok(RateLimitGuard { _permit: Some(permit) })
    }
}

impl TokenBucket {
    /// Tries to acquire a token from the bucket. If no tokens are available,
    /// returns the duration to wait before retrying.
    async fn try_acquire(&self) -> Duration {
        let mut tokens = self.tokens.lock().await;
        let mut last_refill = self.last_refill.lock().await;
        let now = Instant::now();

        let elapsed = now.duration_since(*last_refill).as_millis() as u64;

        if elapsed >= self.refill_time_ms {
            let periods = elapsed / self.refill_time_ms;
            let new_tokens = periods as usize * self.capacity;

            *tokens = (*tokens + new_tokens).min(self.capacity);
            *last_refill = now - Duration::from_millis(elapsed % self.refill_time_ms);
        }

        if *tokens > 0 {
            *tokens -= 1;
            Duration::ZERO
        } else {
            let time_since_last_refill = now.duration_since(*last_refill).as_millis() as u64;
            let time_until_next_token = self.refill_time_ms.saturating_sub(time_since_last_refill);
            Duration::from_millis(time_until_next_token)
        }
    }
}

/// A guard that releases the concurrency permit when dropped. Holds no
/// permit at all when the rate limiter is unlimited.
#[derive(Debug)]
pub struct RateLimitGuard {
    _permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

/// Builds the process-wide rate limiter from the `--rate-limit` value: `0`
/// means unlimited, otherwise `n` queries per second with `4n` (capped)
/// in-flight concurrency headroom.
pub fn from_queries_per_second(rate: u64) -> RateLimiter {
    if rate == 0 {
        RateLimiter::unlimited()
    } else {
        let concurrency = (rate.saturating_mul(4)).clamp(1, 1024) as usize;
        RateLimiter::new(rate as usize, 1000, concurrency)
    }
}

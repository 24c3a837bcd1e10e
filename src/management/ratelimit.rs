use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::AppError;

/// Admission control for expensive endpoints, keyed by client identity.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one request for `key`, or reports how long to wait.
    async fn check(&self, key: &str) -> Result<(), AppError>;
}

/// Process-local fixed-window counter.
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, (Instant, u32)>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn check(&self, key: &str) -> Result<(), AppError> {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();

        if buckets.len() > 10_000 {
            buckets.retain(|_, (start, _)| now.duration_since(*start) < self.window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(bucket.0) >= self.window {
            *bucket = (now, 0);
        }

        if bucket.1 >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(bucket.0));
            tracing::debug!(key, "Rate limit reached");
            return Err(AppError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        bucket.1 += 1;
        Ok(())
    }
}

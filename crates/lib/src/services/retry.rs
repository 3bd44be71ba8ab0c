//! Fixed-delay retry for rate-limited calls.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::services::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_secs(config.delay_secs))
    }

    /// Run `op`, retrying after `delay` while it returns `RateLimited`, at most `max_retries` times.
    /// Every other outcome is returned as is.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(ServiceError::RateLimited) if attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "{}: rate limited, retry {}/{} in {:?}",
                        what,
                        attempt,
                        self.max_retries,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limited_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let started = tokio::time::Instant::now();
        let out = policy
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ServiceError::RateLimited)
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(out, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_secs(1));
        let out: Result<(), _> = policy
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::RateLimited)
            })
            .await;
        assert_eq!(out, Err(ServiceError::RateLimited));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = RetryPolicy::default()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Upstream(500))
            })
            .await;
        assert_eq!(out, Err(ServiceError::Upstream(500)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

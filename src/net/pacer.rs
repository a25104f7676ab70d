//! Request pacing for polite scraping
//!
//! Implements a fixed minimum gap between request starts using the
//! Governor crate. One pacer is shared by every worker so the gap holds
//! across concurrent downloads.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::sync::Arc;
use std::time::Duration;

/// Shared limiter allowing one request per interval
#[derive(Clone)]
pub struct RequestPacer {
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    interval: Duration,
}

impl RequestPacer {
    /// Allow one request every `interval`; a zero interval disables pacing
    ///
    /// # Example
    /// ```
    /// use stockpull::net::RequestPacer;
    /// use std::time::Duration;
    /// let pacer = RequestPacer::new(Duration::from_millis(250));
    /// assert_eq!(pacer.interval(), Duration::from_millis(250));
    /// ```
    pub fn new(interval: Duration) -> Self {
        // with_period returns None for a zero period
        let limiter = Quota::with_period(interval).map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self { limiter, interval }
    }

    /// A pacer that never waits
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Configured gap between requests
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next request may start
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for RequestPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPacer")
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_unpaced_never_blocks() {
        let pacer = RequestPacer::unpaced();
        for _ in 0..100 {
            assert!(timeout(SHORT, pacer.wait()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_single_slot_per_interval() {
        let pacer = RequestPacer::new(Duration::from_secs(60));
        assert!(timeout(SHORT, pacer.wait()).await.is_ok());
        assert!(timeout(SHORT, pacer.wait()).await.is_err());
    }

    #[tokio::test]
    async fn test_wait_spaces_requests() {
        let pacer = RequestPacer::new(Duration::from_millis(50));
        let start = Instant::now();
        for _ in 0..3 {
            pacer.wait().await;
        }
        // First slot is immediate, the next two each wait one interval
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_clones_share_budget() {
        let pacer = RequestPacer::new(Duration::from_secs(60));
        let clone = pacer.clone();
        assert!(timeout(SHORT, pacer.wait()).await.is_ok());
        assert!(timeout(SHORT, clone.wait()).await.is_err());
    }
}

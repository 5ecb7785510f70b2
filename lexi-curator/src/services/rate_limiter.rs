//! Per-provider sliding-window rate limiter
//!
//! At most `max_requests` admissions within any `window`. A full window makes
//! the caller sleep until its oldest entry ages out, then re-check. Requests
//! are never rejected.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct SlidingWindowLimiter {
    name: String,
    max_requests: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// `max_requests` of zero is treated as one
    pub fn new(name: impl Into<String>, max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            name: name.into(),
            max_requests,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until a request may be sent, then record it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut admitted = self.admitted.lock().await;
                let now = Instant::now();
                Self::evict(&mut admitted, now, self.window);

                if admitted.len() < self.max_requests {
                    admitted.push_back(now);
                    return;
                }

                match admitted.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            tracing::debug!(
                provider = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting for window to advance"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Admissions currently counted against the window
    pub async fn in_window(&self) -> usize {
        let mut admitted = self.admitted.lock().await;
        Self::evict(&mut admitted, Instant::now(), self.window);
        admitted.len()
    }

    fn evict(admitted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = admitted.front() {
            if now.saturating_duration_since(*oldest) >= window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_capacity_without_waiting() {
        let limiter = SlidingWindowLimiter::new("test", 3, Duration::from_secs(10));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_request_waits_for_oldest_to_expire() {
        let limiter = SlidingWindowLimiter::new("test", 2, Duration::from_secs(10));
        let start = Instant::now();

        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(4)).await;
        limiter.acquire().await;

        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(10), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(11), "waited {:?}", waited);

        // The window now holds the second and third admissions
        assert_eq!(limiter.in_window().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new("test", 1, Duration::from_secs(5));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(limiter.in_window().await, 0);

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiters_are_independent() {
        let a = SlidingWindowLimiter::new("a", 1, Duration::from_secs(60));
        let b = SlidingWindowLimiter::new("b", 1, Duration::from_secs(60));
        a.acquire().await;

        let start = Instant::now();
        b.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

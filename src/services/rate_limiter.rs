use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Sliding-window limiter: at most `max` acquisitions per `per`
pub struct RateLimiter {
    max: usize,
    per: Duration,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max: u32, per: Duration) -> Self {
        Self {
            max: max.max(1) as usize,
            per,
            window: Mutex::new(VecDeque::new()),
        }
    }

    pub fn per_second(max: u32) -> Self {
        Self::new(max, Duration::from_secs(1))
    }

    /// Waits until one more operation fits in the window
    pub async fn acquire(&self) {
        loop {
            let wake_at = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|started| now.duration_since(*started) >= self.per)
                {
                    window.pop_front();
                }

                if window.len() < self.max {
                    window.push_back(now);
                    return;
                }

                match window.front() {
                    Some(oldest) => *oldest + self.per,
                    None => now,
                }
            };

            sleep_until(wake_at).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limits_operations_per_window() {
        let limiter = RateLimiter::per_second(5);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_spaces_operations() {
        let limiter = RateLimiter::per_second(1);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}

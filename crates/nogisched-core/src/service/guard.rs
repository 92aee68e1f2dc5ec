//! Fetch-rate guard.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Window within which a successful fetch suppresses another one.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Remembers when each cache key was last fetched successfully.
///
/// Independent of cache expiry: an entry may be fresh in the cache and still
/// worth refetching, or expired and still inside the window.
#[derive(Debug)]
pub struct RateGuard {
    interval: Duration,
    last_success: Mutex<HashMap<String, Instant>>,
}

impl Default for RateGuard {
    fn default() -> Self {
        Self::new(MIN_REFRESH_INTERVAL)
    }
}

impl RateGuard {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_success: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.last_success.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_success(&self, key: &str) {
        self.lock().insert(key.to_string(), Instant::now());
    }

    /// Whether `key` was fetched successfully within the window.
    pub fn is_fresh(&self, key: &str) -> bool {
        self.lock()
            .get(key)
            .map(|at| at.elapsed() < self.interval)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_expires() {
        let guard = RateGuard::default();
        assert!(!guard.is_fresh("nogi_schedule_202401"));

        guard.record_success("nogi_schedule_202401");
        assert!(guard.is_fresh("nogi_schedule_202401"));
        assert!(!guard.is_fresh("nogi_schedule_202402"));

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert!(guard.is_fresh("nogi_schedule_202401"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!guard.is_fresh("nogi_schedule_202401"));
    }
}

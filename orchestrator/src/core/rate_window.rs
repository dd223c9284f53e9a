//! Rolling-window request counter

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Counts accepted calls inside a rolling window of fixed span
#[derive(Debug, Clone)]
pub struct RollingWindow {
    span: Duration,
    limit: Option<u32>,
    hits: VecDeque<Instant>,
}

impl RollingWindow {
    pub fn new(span: Duration, limit: Option<u32>) -> Self {
        Self {
            span,
            limit,
            hits: VecDeque::new(),
        }
    }

    pub fn per_minute(limit: Option<u32>) -> Self {
        Self::new(Duration::from_secs(60), limit)
    }

    pub fn per_hour(limit: Option<u32>) -> Self {
        Self::new(Duration::from_secs(60 * 60), limit)
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.hits.front() {
            if now.duration_since(*oldest) >= self.span {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether another call now would exceed the limit
    pub fn is_saturated(&mut self, now: Instant) -> bool {
        self.prune(now);
        match self.limit {
            Some(limit) => self.hits.len() >= limit as usize,
            None => false,
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.prune(now);
        self.hits.push_back(now);
    }

    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.hits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_saturates_and_recovers() {
        let mut window = RollingWindow::per_minute(Some(2));
        let start = Instant::now();

        window.record(start);
        window.record(start + Duration::from_secs(10));
        assert!(window.is_saturated(start + Duration::from_secs(30)));

        // First hit leaves the window at exactly 60s
        assert!(!window.is_saturated(start + Duration::from_secs(60)));
        assert_eq!(window.count(start + Duration::from_secs(60)), 1);
        assert_eq!(window.count(start + Duration::from_secs(71)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_window_never_saturates() {
        let mut window = RollingWindow::per_hour(None);
        let now = Instant::now();
        for _ in 0..1_000 {
            window.record(now);
        }
        assert!(!window.is_saturated(now));
        assert_eq!(window.count(now), 1_000);
    }
}

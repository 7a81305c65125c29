//! Time source for retry waits.
//!
//! Production uses [`TokioClock`]; tests use [`ManualClock`], which advances
//! virtual time instantly on every `sleep` so backoff schedules can be
//! asserted without waiting.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic now.
    fn now(&self) -> Instant;

    /// Wall-clock now, for result timestamps.
    fn wall_now(&self) -> DateTime<Utc>;

    async fn sleep(&self, d: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, d: Duration) {
        if d > Duration::ZERO {
            tokio::time::sleep(d).await;
        }
    }
}

/// Virtual clock. `sleep` records the request, advances time and returns
/// immediately (after yielding once so other tasks get scheduled).
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    wall_start: DateTime<Utc>,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            wall_start: Utc::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    pub fn advance(&self, d: Duration) {
        self.lock().offset += d;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A poisoned clock only means a test panicked mid-sleep; keep the data.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(self.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_start + offset
    }

    async fn sleep(&self, d: Duration) {
        {
            let mut st = self.lock();
            st.offset += d;
            st.sleeps.push(d);
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        let w0 = clock.wall_now();
        clock.sleep(Duration::from_secs(5)).await;
        clock.advance(Duration::from_millis(500));

        assert_eq!(clock.elapsed(), Duration::from_millis(5500));
        assert_eq!(clock.now() - t0, Duration::from_millis(5500));
        assert_eq!((clock.wall_now() - w0).num_milliseconds(), 5500);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }
}

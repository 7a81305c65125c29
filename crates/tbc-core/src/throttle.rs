use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    clock::Clock,
    directory::{DirectoryCapabilities, DirectoryClient, FullInfo, LookupOutcome, RawEntity},
    identifier::Identifier,
};

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Option<Instant>,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self, now: Instant) -> Duration {
        let start = match self.next {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next = Some(start + self.interval);
        start.saturating_duration_since(now)
    }
}

/// DirectoryClient decorator that spaces out outbound calls.
///
/// This keeps a steady pace across all workers so bursts do not trip the
/// service's flood control. It does not replace the retry policy; 429s can
/// still happen and are handled there.
pub struct ThrottledDirectory {
    inner: Arc<dyn DirectoryClient>,
    clock: Arc<dyn Clock>,
    limiter: Mutex<IntervalLimiter>,
}

impl ThrottledDirectory {
    pub fn new(
        inner: Arc<dyn DirectoryClient>,
        clock: Arc<dyn Clock>,
        min_interval: Duration,
    ) -> Self {
        Self {
            inner,
            clock,
            limiter: Mutex::new(IntervalLimiter::new(min_interval)),
        }
    }

    async fn throttle(&self) {
        let wait = { self.limiter.lock().await.reserve(self.clock.now()) };
        if wait > Duration::ZERO {
            self.clock.sleep(wait).await;
        }
    }
}

#[async_trait]
impl DirectoryClient for ThrottledDirectory {
    fn capabilities(&self) -> DirectoryCapabilities {
        self.inner.capabilities()
    }

    async fn resolve(&self, id: &Identifier) -> LookupOutcome<RawEntity> {
        self.throttle().await;
        self.inner.resolve(id).await
    }

    async fn fetch_full_info(&self, entity: &RawEntity) -> LookupOutcome<FullInfo> {
        self.throttle().await;
        self.inner.fetch_full_info(entity).await
    }

    async fn disconnect(&self) {
        self.inner.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingDirectory {
        calls: StdMutex<u32>,
        disconnects: StdMutex<u32>,
    }

    #[async_trait]
    impl DirectoryClient for CountingDirectory {
        fn capabilities(&self) -> DirectoryCapabilities {
            DirectoryCapabilities {
                supports_invite_links: true,
                supports_full_info: true,
            }
        }

        async fn resolve(&self, _id: &Identifier) -> LookupOutcome<RawEntity> {
            *self.calls.lock().unwrap() += 1;
            LookupOutcome::NotFound
        }

        async fn fetch_full_info(&self, _entity: &RawEntity) -> LookupOutcome<FullInfo> {
            *self.calls.lock().unwrap() += 1;
            LookupOutcome::Success(FullInfo::default())
        }

        async fn disconnect(&self) {
            *self.disconnects.lock().unwrap() += 1;
        }
    }

    #[test]
    fn limiter_spaces_reservations() {
        let mut lim = IntervalLimiter::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert_eq!(lim.reserve(t0), Duration::ZERO);
        assert_eq!(lim.reserve(t0), Duration::from_millis(100));
        assert_eq!(lim.reserve(t0), Duration::from_millis(200));
        // After the backlog has passed, no wait.
        assert_eq!(lim.reserve(t0 + Duration::from_secs(1)), Duration::ZERO);
    }

    #[tokio::test]
    async fn throttled_calls_wait_on_the_clock() {
        let inner = Arc::new(CountingDirectory::default());
        let clock = Arc::new(ManualClock::new());
        let interval = Duration::from_millis(250);
        let dir = ThrottledDirectory::new(inner.clone(), clock.clone(), interval);
        let id = Identifier::Username("telegram".to_string());

        for _ in 0..3 {
            dir.resolve(&id).await;
        }
        dir.disconnect().await;

        assert_eq!(*inner.calls.lock().unwrap(), 3);
        assert_eq!(*inner.disconnects.lock().unwrap(), 1);
        // Virtual time advances on each sleep, so every later call waits one interval.
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(250), Duration::from_millis(250)]
        );
    }
}

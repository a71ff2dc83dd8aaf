//! Bounded polling: policy, deadline and clock.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Default interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default overall rollout deadline.
pub const DEFAULT_ROLLOUT_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest rollout budget accepted from configuration.
pub const MAX_ROLLOUT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Source of time for polling loops.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block the current task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock for tests.
///
/// `sleep` returns immediately and advances the clock by the requested
/// duration, so a five-minute rollout runs in microseconds.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move the clock forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    /// Total virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
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
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.advance(duration);
    }
}

/// How often to poll and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed interval between polls.
    pub interval: Duration,

    /// Overall wall-clock budget.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_ROLLOUT_TIMEOUT,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Start the deadline for this policy at `now`.
    ///
    /// A timeout too large to represent as an instant never expires.
    pub fn deadline_from(&self, now: Instant) -> Deadline {
        Deadline {
            started_at: now,
            expires_at: now.checked_add(self.timeout),
        }
    }
}

/// A fixed point in time after which polling stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started_at: Instant,
    expires_at: Option<Instant>,
}

impl Deadline {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        match self.expires_at {
            Some(expires_at) => expires_at.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// The next sleep: the poll interval, clipped so it never overshoots.
    pub fn next_sleep(&self, now: Instant, interval: Duration) -> Duration {
        interval.min(self.remaining(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_policy_default() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(10));
        assert_eq!(policy.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_deadline_expiry_and_clipping() {
        let clock = ManualClock::new();
        let policy = PollPolicy::new(Duration::from_secs(10), Duration::from_secs(25));
        let deadline = policy.deadline_from(clock.now());

        assert!(!deadline.is_expired(clock.now()));
        assert_eq!(
            deadline.next_sleep(clock.now(), policy.interval),
            Duration::from_secs(10)
        );

        clock.advance(Duration::from_secs(20));
        assert_eq!(
            deadline.next_sleep(clock.now(), policy.interval),
            Duration::from_secs(5)
        );

        clock.advance(Duration::from_secs(5));
        assert!(deadline.is_expired(clock.now()));
        assert_eq!(deadline.elapsed(clock.now()), Duration::from_secs(25));
    }

    #[test]
    fn test_unrepresentable_timeout_never_expires() {
        let clock = ManualClock::new();
        let policy = PollPolicy::new(Duration::from_secs(10), Duration::from_secs(u64::MAX));
        let deadline = policy.deadline_from(clock.now());

        clock.advance(Duration::from_secs(3600));
        assert!(!deadline.is_expired(clock.now()));
        assert_eq!(
            deadline.next_sleep(clock.now(), policy.interval),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_time() {
        let clock = ManualClock::new();
        let before = clock.now();

        clock.sleep(Duration::from_secs(10)).await;
        clock.sleep(Duration::from_secs(5)).await;

        assert_eq!(clock.now() - before, Duration::from_secs(15));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(10), Duration::from_secs(5)]
        );
    }
}

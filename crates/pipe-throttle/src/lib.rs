//! # Sliding Window Limiter
//!
//! Admits at most `capacity` calls within any `window`-long span of time.
//! Callers over budget are suspended until the oldest admission leaves the
//! window, then retried until admitted.
//!
//! Limiters are plain values: construct one per budget you want to enforce
//! and share it behind an `Arc`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;

/// Default admissions per window.
pub const DEFAULT_CAPACITY: usize = 25;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1000);

/// Errors returned by the limiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThrottleError {
    /// More slots were requested at once than the window can ever hold.
    #[error("Requested {requested} slots but capacity is {capacity}")]
    ExceedsCapacity { requested: usize, capacity: usize },

    /// The wait was abandoned through the cancellation future.
    #[error("Throttled call was cancelled")]
    Cancelled,
}

/// Sliding-window rate limiter.
///
/// # Algorithm
///
/// - Every admission records its timestamp
/// - Timestamps older than `window` are discarded
/// - A request for `n` slots is admitted when `recorded + n <= capacity`
/// - Otherwise the caller sleeps until enough timestamps expire
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    /// Maximum admissions per window. Zero disables limiting.
    capacity: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// A limiter that admits everything.
    pub fn unlimited() -> Self {
        Self::new(0, DEFAULT_WINDOW)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Try to take `count` slots without waiting.
    ///
    /// On refusal returns how long until the request could be admitted.
    pub fn try_acquire(&self, count: usize) -> Result<(), Duration> {
        if self.capacity == 0 || count == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        self.evict_expired(&mut timestamps, now);

        if timestamps.len() + count <= self.capacity {
            timestamps.extend(std::iter::repeat(now).take(count));
            return Ok(());
        }

        // The entry whose expiry frees exactly enough room.
        let blocking = timestamps.len() + count - self.capacity - 1;
        let wait = timestamps
            .get(blocking)
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(self.window);
        Err(wait.max(Duration::from_millis(1)))
    }

    /// Wait until `count` slots are available and take them.
    pub async fn acquire(&self, count: usize) -> Result<(), ThrottleError> {
        self.acquire_or_cancel(count, std::future::pending()).await
    }

    /// Like [`acquire`](Self::acquire), but gives up when `cancelled` resolves.
    pub async fn acquire_or_cancel<C>(
        &self,
        count: usize,
        cancelled: C,
    ) -> Result<(), ThrottleError>
    where
        C: Future<Output = ()>,
    {
        if self.capacity > 0 && count > self.capacity {
            return Err(ThrottleError::ExceedsCapacity {
                requested: count,
                capacity: self.capacity,
            });
        }

        tokio::pin!(cancelled);
        loop {
            let wait = match self.try_acquire(count) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            trace!(wait_ms = wait.as_millis() as u64, count, "Throttling call");

            tokio::select! {
                _ = &mut cancelled => return Err(ThrottleError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Take one slot, then run `f`.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, ThrottleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire(1).await?;
        Ok(f().await)
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        if self.capacity == 0 {
            return usize::MAX;
        }
        let mut timestamps = self.timestamps.lock();
        self.evict_expired(&mut timestamps, Instant::now());
        self.capacity.saturating_sub(timestamps.len())
    }

    fn evict_expired(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}

/// Pre-configured limiters for common use cases.
pub mod presets {
    use super::{SlidingWindowLimiter, DEFAULT_CAPACITY, DEFAULT_WINDOW};

    /// Blockchain RPC reads (25 per second).
    pub fn blockchain_rpc() -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}

//! Pending Call Table - correlates outbound requests with inbound responses.
//!
//! Flow:
//! 1. `send` generates a [`RequestId`] and calls [`PendingCalls::register`]
//! 2. `send` transmits the envelope (on failure: [`PendingCalls::cancel`])
//! 3. The listening loop calls [`PendingCalls::resolve`] for each Response
//! 4. `send` awaits [`PendingCalls::wait`], which races the response against
//!    the timeout and an interruption (close or abort)
//!
//! Every terminal path removes the entry before acting on it. Whoever removes
//! it owns the outcome; a waiter that loses the race reads the outcome the
//! winner delivered. This makes resolution exactly-once.

use crate::domain::error::PipeError;
use dashmap::DashMap;
use pipe_types::{Method, RequestId, Response};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome delivered to a waiting caller.
pub type CallOutcome = Result<Response, PipeError>;

/// A call waiting for its response
struct PendingCall {
    sender: oneshot::Sender<CallOutcome>,
    created_at: Instant,
    method: Method,
    path: String,
}

/// Statistics for the pending call table
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    /// Calls ended by close, abort or a failed transmission
    pub total_cancelled: AtomicU64,
    /// Responses with no matching entry (late, duplicate or foreign)
    pub total_unmatched: AtomicU64,
}

/// Concurrent map of in-flight calls.
#[derive(Default)]
pub struct PendingCalls {
    pending: DashMap<RequestId, PendingCall>,
    stats: PendingStats,
}

impl PendingCalls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and get the receiver its outcome will arrive on.
    pub fn register(
        &self,
        id: RequestId,
        method: Method,
        path: &str,
    ) -> oneshot::Receiver<CallOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCall {
                sender: tx,
                created_at: Instant::now(),
                method,
                path: path.to_string(),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(request_id = %id, %method, path, "Registered pending call");
        rx
    }

    /// Deliver a response to the call with the same id.
    ///
    /// Returns `false` when no such call is pending.
    pub fn resolve(&self, response: Response) -> bool {
        let id = response.id;
        let Some((_, call)) = self.pending.remove(&id) else {
            self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %id, "Response for unknown, expired or completed call");
            return false;
        };

        let elapsed = call.created_at.elapsed();
        let code = response.code;
        if call.sender.send(Ok(response)).is_ok() {
            self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                request_id = %id,
                method = %call.method,
                path = %call.path,
                code = code.as_u16(),
                response_time_ms = elapsed.as_millis() as u64,
                "Completed pending call"
            );
            true
        } else {
            // Waiter went away
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Drop a call without delivering anything. Used when transmission fails.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let removed = self.pending.remove(id).is_some();
        if removed {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Fail every pending call with the same reason.
    ///
    /// Returns the number of calls failed.
    pub fn cancel_all(&self, reason: PipeError) -> usize {
        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, call)) = self.pending.remove(&id) {
                let _ = call.sender.send(Err(reason.clone()));
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            self.stats
                .total_cancelled
                .fetch_add(cancelled as u64, Ordering::Relaxed);
            debug!(cancelled, reason = %reason, "Cancelled all pending calls");
        }
        cancelled
    }

    /// Wait for the outcome of a registered call.
    ///
    /// `interrupted` resolves to the error to report when the call is cut
    /// short by something other than its own timeout.
    pub async fn wait<I>(
        &self,
        id: RequestId,
        mut rx: oneshot::Receiver<CallOutcome>,
        timeout: Duration,
        interrupted: I,
    ) -> CallOutcome
    where
        I: Future<Output = PipeError>,
    {
        tokio::select! {
            outcome = &mut rx => return flatten(outcome),
            _ = tokio::time::sleep(timeout) => {
                if self.pending.remove(&id).is_some() {
                    self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        request_id = %id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Pending call timed out"
                    );
                    return Err(PipeError::Timeout(timeout));
                }
            }
            reason = interrupted => {
                if self.pending.remove(&id).is_some() {
                    self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                    return Err(reason);
                }
            }
        }

        // Lost the removal race: the winner has delivered or is delivering.
        flatten(rx.await)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

fn flatten(outcome: Result<CallOutcome, oneshot::error::RecvError>) -> CallOutcome {
    outcome.unwrap_or_else(|_| Err(PipeError::Terminated("pending call dropped".into())))
}

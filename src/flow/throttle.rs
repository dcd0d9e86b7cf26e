//! Operation throttle: completion wiring on top of admission control.
//!
//! [`OperationThrottle`] wraps an [`AdmissionController`] and adds the
//! bookkeeping an RPC orchestrator needs around it: a set of in-flight
//! asynchronous retries (tracked for completion, not counted against the
//! byte/count limits), a single completion entry point for response
//! callbacks, and a drain-style [`OperationThrottle::await_completion`]
//! that reports stalls without ever failing on them.

use crate::core::completion::{CancelToken, Completion};
use crate::core::config::AdmissionConfig;
use crate::core::error::ThrottleError;
use crate::core::time::{Clock, SystemClock};
use crate::flow::limiter::{AdmissionController, OperationId};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single park while awaiting completion, so that
/// cancellation is observed promptly even with a long stall interval.
const AWAIT_POLL: Duration = Duration::from_millis(250);

struct ThrottleInner {
    /// Ids of asynchronous retries still in flight.
    retries: HashSet<u64>,
    retry_sequence: u64,
    /// Last instant a completion was observed (or a stall was reported).
    last_progress_ms: u64,
}

struct Shared {
    inner: Mutex<ThrottleInner>,
    progress: Condvar,
}

/// Tracks outstanding operations and retries for a single client.
pub struct OperationThrottle {
    limiter: Arc<AdmissionController>,
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    stall_warning_interval: Duration,
    stall_warnings: AtomicU64,
}

impl OperationThrottle {
    pub fn new(limiter: Arc<AdmissionController>, config: &AdmissionConfig) -> Self {
        Self::with_clock(limiter, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        limiter: Arc<AdmissionController>,
        config: &AdmissionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_ms();
        Self {
            limiter,
            shared: Arc::new(Shared {
                inner: Mutex::new(ThrottleInner {
                    retries: HashSet::new(),
                    retry_sequence: 0,
                    last_progress_ms: now,
                }),
                progress: Condvar::new(),
            }),
            clock,
            stall_warning_interval: config.stall_warning_interval(),
            stall_warnings: AtomicU64::new(0),
        }
    }

    /// Register an operation with the underlying admission controller.
    /// Blocks while the controller is full; see
    /// [`AdmissionController::register_operation`].
    pub fn register_operation(
        &self,
        size: u64,
        cancel: &CancelToken,
    ) -> Result<OperationId, ThrottleError> {
        self.limiter.register_operation(size, cancel)
    }

    /// Track an in-flight asynchronous retry. The retry does not consume
    /// byte/count capacity, but [`OperationThrottle::await_completion`]
    /// will not return until its signal resolves.
    pub fn register_retry<T: Clone + Send + 'static>(&self, signal: &Completion<T>) {
        let retry_id = {
            let mut inner = self.shared.inner.lock();
            inner.retry_sequence += 1;
            let retry_id = inner.retry_sequence;
            inner.retries.insert(retry_id);
            retry_id
        };
        let shared = Arc::clone(&self.shared);
        let clock = Arc::clone(&self.clock);
        signal.on_complete(move |_| {
            let mut inner = shared.inner.lock();
            inner.retries.remove(&retry_id);
            inner.last_progress_ms = clock.now_ms();
            drop(inner);
            shared.progress.notify_all();
        });
    }

    /// Single completion entry point for response callbacks: releases the
    /// admission reservation and wakes any completion waiters.
    pub fn on_operation_completion(&self, id: OperationId) {
        self.limiter.mark_complete(id);
        {
            let mut inner = self.shared.inner.lock();
            inner.last_progress_ms = self.clock.now_ms();
        }
        self.shared.progress.notify_all();
    }

    /// Whether any operations or retries are still in flight.
    pub fn has_inflight(&self) -> bool {
        if self.limiter.has_outstanding() {
            return true;
        }
        !self.shared.inner.lock().retries.is_empty()
    }

    /// Block until the outstanding-operation set and retry set are both
    /// empty.
    ///
    /// While blocked, if no completion has been observed for the
    /// configured stall interval, a diagnostic counter increments and a
    /// warning is logged; the wait itself continues. Useful for spotting
    /// silently stuck RPCs.
    pub fn await_completion(&self, cancel: &CancelToken) -> Result<(), ThrottleError> {
        let mut inner = self.shared.inner.lock();
        loop {
            if inner.retries.is_empty() && !self.limiter.has_outstanding() {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(ThrottleError::Cancelled);
            }
            let park = self.stall_warning_interval.min(AWAIT_POLL);
            self.shared.progress.wait_for(&mut inner, park);

            let idle_ms = self.clock.now_ms().saturating_sub(inner.last_progress_ms);
            if idle_ms >= self.stall_warning_interval.as_millis() as u64 {
                self.stall_warnings.fetch_add(1, Ordering::Relaxed);
                // Reset the window so a long stall warns once per interval.
                inner.last_progress_ms = self.clock.now_ms();
                tracing::warn!(
                    idle_ms,
                    outstanding = self.limiter.has_outstanding(),
                    retries = inner.retries.len(),
                    "no operations completed within the stall interval; still waiting"
                );
            }
        }
    }

    /// Number of stall intervals that elapsed with no observed completion
    /// while a caller was blocked in `await_completion`.
    pub fn stall_warning_count(&self) -> u64 {
        self.stall_warnings.load(Ordering::Relaxed)
    }
}

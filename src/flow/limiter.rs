//! Admission control for outstanding write operations.
//!
//! The [`AdmissionController`] tracks the aggregate serialized size and
//! count of operations that have been registered but not yet completed,
//! and blocks new registrations while either limit is reached. It knows
//! nothing about RPC semantics; the caller pairs every successful
//! [`AdmissionController::register_operation`] with a later
//! [`AdmissionController::mark_complete`].
//!
//! Completions are applied lazily: `mark_complete` only enqueues a notice,
//! and any fullness check drains the notice queue before judging "full".
//! A last-moment completion is therefore never missed, while high-rate
//! completion traffic does not contend on the main state lock.

use crate::core::completion::CancelToken;
use crate::core::config::AdmissionConfig;
use crate::core::error::ThrottleError;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Unique, monotonically increasing identifier for a registered operation.
pub type OperationId = u64;

struct Pending {
    /// Registered-but-not-completed operations and their reserved sizes.
    operations: HashMap<OperationId, u64>,
    outstanding_bytes: u64,
}

/// Byte- and count-based admission controller.
pub struct AdmissionController {
    max_outstanding_bytes: u64,
    max_inflight_ops: usize,
    register_poll: Duration,
    sequence: AtomicU64,
    pending: Mutex<Pending>,
    // Completion notices queue separately from `pending` so that
    // `mark_complete` never waits on a fullness check in progress.
    completions: Mutex<VecDeque<OperationId>>,
    completion_posted: Condvar,
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            max_outstanding_bytes: config.max_outstanding_bytes,
            max_inflight_ops: config.max_inflight_ops,
            register_poll: config.register_poll(),
            sequence: AtomicU64::new(0),
            pending: Mutex::new(Pending {
                operations: HashMap::new(),
                outstanding_bytes: 0,
            }),
            completions: Mutex::new(VecDeque::new()),
            completion_posted: Condvar::new(),
        }
    }

    /// Register an operation of the given serialized size before sending.
    ///
    /// Blocks cooperatively (re-checking capacity every poll interval)
    /// until both the byte and count limits admit the operation, then
    /// atomically reserves the size and one slot. Must be paired with
    /// [`AdmissionController::mark_complete`] to release the reservation.
    ///
    /// Cancellation via `cancel` returns [`ThrottleError::Cancelled`] and
    /// leaves no side effect; the drawn id is simply never registered.
    pub fn register_operation(
        &self,
        size: u64,
        cancel: &CancelToken,
    ) -> Result<OperationId, ThrottleError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        loop {
            {
                let mut pending = self.pending.lock();
                if !self.is_full_locked(&mut pending) {
                    pending.operations.insert(id, size);
                    pending.outstanding_bytes += size;
                    return Ok(id);
                }
            }
            if cancel.is_cancelled() {
                return Err(ThrottleError::Cancelled);
            }
            self.wait_for_completion_notice();
        }
    }

    /// Mark an operation id as complete. Never blocks; the reservation is
    /// released by the next fullness check.
    pub fn mark_complete(&self, id: OperationId) {
        self.completions.lock().push_back(id);
        self.completion_posted.notify_all();
    }

    /// Whether no more operations can currently be admitted, judged after
    /// draining pending completion notices.
    pub fn is_full(&self) -> bool {
        let mut pending = self.pending.lock();
        self.is_full_locked(&mut pending)
    }

    /// Whether any operations are outstanding, judged after draining
    /// pending completion notices.
    pub fn has_outstanding(&self) -> bool {
        let mut pending = self.pending.lock();
        self.drain_locked(&mut pending);
        !pending.operations.is_empty()
    }

    /// Aggregate reserved size of outstanding operations, after draining
    /// pending completion notices.
    pub fn outstanding_bytes(&self) -> u64 {
        let mut pending = self.pending.lock();
        self.drain_locked(&mut pending);
        pending.outstanding_bytes
    }

    pub fn max_outstanding_bytes(&self) -> u64 {
        self.max_outstanding_bytes
    }

    pub fn max_inflight_ops(&self) -> usize {
        self.max_inflight_ops
    }

    fn limits_reached(&self, pending: &Pending) -> bool {
        pending.outstanding_bytes >= self.max_outstanding_bytes
            || pending.operations.len() >= self.max_inflight_ops
    }

    /// Drain-before-decide: only pay the drain cost when the raw counters
    /// claim fullness, then re-judge.
    fn is_full_locked(&self, pending: &mut Pending) -> bool {
        if !self.limits_reached(pending) {
            return false;
        }
        self.drain_locked(pending);
        self.limits_reached(pending)
    }

    fn drain_locked(&self, pending: &mut Pending) {
        let drained: Vec<OperationId> = {
            let mut completions = self.completions.lock();
            completions.drain(..).collect()
        };
        for id in drained {
            match pending.operations.remove(&id) {
                Some(size) => {
                    pending.outstanding_bytes -= size;
                }
                None => {
                    tracing::warn!(
                        operation_id = id,
                        "operation reported multiple completion notifications; ignoring duplicate"
                    );
                }
            }
        }
    }

    /// Park until a completion notice is posted or the poll interval
    /// elapses. The interval bounds registration latency; correctness
    /// comes from re-checking under the state lock.
    fn wait_for_completion_notice(&self) {
        let mut completions = self.completions.lock();
        if completions.is_empty() {
            self.completion_posted
                .wait_for(&mut completions, self.register_poll);
        }
    }
}

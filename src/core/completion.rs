//! Single-assignment completion cells and cancellation tokens.
//!
//! These are the cross-thread signalling primitives shared by the flow
//! control and batching components. A [`Completion`] is written exactly
//! once and observed by any number of waiters or subscribers; control flow
//! never relies on unwinding across thread boundaries. A [`CancelToken`]
//! is the explicit cancellation signal for every blocking call in the
//! crate; cancellation stays observable after it fires so a caller can
//! tell why a wait returned.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

enum State<T> {
    Pending {
        subscribers: Vec<Box<dyn FnOnce(T) + Send>>,
    },
    Done(T),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

/// A single-assignment result cell.
///
/// The first `complete` wins; later completions are rejected. Values are
/// cloned out to waiters and subscribers, so `T` is typically a small
/// `Result` type.
pub struct Completion<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Completion<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending {
                    subscribers: Vec::new(),
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// Resolve the cell. Returns false if it was already resolved; the
    /// original value is kept.
    pub fn complete(&self, value: T) -> bool {
        let subscribers = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Done(_) => return false,
                State::Pending { subscribers } => {
                    let subscribers = std::mem::take(subscribers);
                    *state = State::Done(value.clone());
                    subscribers
                }
            }
        };
        self.inner.ready.notify_all();
        // Subscribers run on the completing thread, outside the cell lock.
        for subscriber in subscribers {
            subscriber(value.clone());
        }
        true
    }

    pub fn is_complete(&self) -> bool {
        matches!(&*self.inner.state.lock(), State::Done(_))
    }

    pub fn try_get(&self) -> Option<T> {
        match &*self.inner.state.lock() {
            State::Done(value) => Some(value.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Block until the cell resolves.
    pub fn wait(&self) -> T {
        let mut state = self.inner.state.lock();
        loop {
            if let State::Done(value) = &*state {
                return value.clone();
            }
            self.inner.ready.wait(&mut state);
        }
    }

    /// Block until the cell resolves or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.inner.state.lock();
        if let State::Done(value) = &*state {
            return Some(value.clone());
        }
        self.inner.ready.wait_for(&mut state, timeout);
        match &*state {
            State::Done(value) => Some(value.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Register a subscriber invoked with the resolved value. Runs
    /// immediately on the calling thread if the cell is already resolved,
    /// otherwise on the completing thread.
    pub fn on_complete(&self, f: impl FnOnce(T) + Send + 'static) {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Done(value) => {
                let value = value.clone();
                drop(state);
                f(value);
            }
            State::Pending { subscribers } => subscribers.push(Box::new(f)),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct CancelInner {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

/// An explicit cancellation signal.
///
/// Blocking calls poll the token at bounded intervals; [`CancelToken::wait_for`]
/// doubles as an interruptible sleep for retry backoff.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cancelled: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// Fire the signal, waking every blocked waiter.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Sleep for up to `timeout`, returning early if cancelled.
    /// Returns true if the token is cancelled.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if *cancelled {
            return true;
        }
        self.inner.cond.wait_for(&mut cancelled, timeout);
        *cancelled
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

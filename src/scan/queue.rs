//! Bounded handoff queue between the stream reader and the merger.
//!
//! The transport thread pushes entries through a [`ResponseFeeder`];
//! the merger drains them. The queue is bounded: a push against a full
//! queue blocks until the merger consumes, which is what bounds how far
//! the transport can run ahead of the consumer.

use crate::core::completion::CancelToken;
use crate::core::error::RpcError;
use crate::scan::row::ScanResponse;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wait slice while blocked on the queue, so cancellation is noticed
/// promptly even under a long read timeout.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// One item handed from the stream reader to the merger.
#[derive(Debug, Clone)]
pub enum QueueEntry {
    /// A response message carrying row fragments.
    Response(ScanResponse),
    /// The stream failed; the merger surfaces this to its caller.
    Error(RpcError),
    /// The stream ended normally. Exactly one per stream, last.
    Complete,
}

/// Outcome of one timed pop.
#[derive(Debug)]
pub(crate) enum Popped {
    Entry(QueueEntry),
    TimedOut,
    Cancelled,
}

struct Inner {
    entries: Mutex<VecDeque<QueueEntry>>,
    capacity: usize,
    ready: Condvar,
    space: Condvar,
}

/// Bounded blocking queue of stream entries. Cloning shares the queue.
#[derive(Clone)]
pub struct ResponseQueue {
    inner: Arc<Inner>,
}

/// Producer handle for the transport side.
#[derive(Clone)]
pub struct ResponseFeeder {
    queue: ResponseQueue,
}

impl ResponseQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(VecDeque::new()),
                capacity,
                ready: Condvar::new(),
                space: Condvar::new(),
            }),
        }
    }

    pub fn feeder(&self) -> ResponseFeeder {
        ResponseFeeder {
            queue: self.clone(),
        }
    }

    /// Entries currently buffered, end-of-stream marker included.
    pub fn available(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Append an entry, blocking while the queue is full.
    pub fn push(&self, entry: QueueEntry) {
        let mut entries = self.inner.entries.lock();
        while entries.len() >= self.inner.capacity {
            self.inner.space.wait(&mut entries);
        }
        entries.push_back(entry);
        drop(entries);
        self.inner.ready.notify_one();
    }

    /// Pop the next entry, waiting up to `timeout`. Checks `cancel`
    /// between short wait slices so an interrupt does not have to wait
    /// out the full timeout.
    pub(crate) fn pop(&self, timeout: Duration, cancel: &CancelToken) -> Popped {
        let deadline = Instant::now() + timeout;
        let mut entries = self.inner.entries.lock();
        loop {
            if let Some(entry) = entries.pop_front() {
                drop(entries);
                self.inner.space.notify_one();
                return Popped::Entry(entry);
            }
            if cancel.is_cancelled() {
                return Popped::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                return Popped::TimedOut;
            }
            let slice = WAIT_SLICE.min(deadline - now);
            self.inner.ready.wait_for(&mut entries, slice);
        }
    }
}

impl ResponseFeeder {
    /// Hand a response message to the merger. Blocks while the queue is
    /// full.
    pub fn response(&self, response: ScanResponse) {
        self.queue.push(QueueEntry::Response(response));
    }

    /// Report a stream failure.
    pub fn error(&self, error: RpcError) {
        self.queue.push(QueueEntry::Error(error));
    }

    /// Mark normal end of stream.
    pub fn complete(&self) {
        self.queue.push(QueueEntry::Complete);
    }
}

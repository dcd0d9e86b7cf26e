//! Write batching and response demultiplexing.
//!
//! [`MutationBatcher`] combines independent single-row writes into one
//! batch request and routes the per-entry statuses of the eventual batch
//! response back onto the result handle returned for each write. The
//! batcher holds no flush policy of its own: the orchestrator watches
//! [`MutationBatcher::approximate_byte_size`] and
//! [`MutationBatcher::entry_count`] and decides when to send.
//!
//! Not internally synchronized; callers serialize access, as they already
//! serialize the surrounding flush decision.

use crate::batch::request::{BatchEntry, BatchWriteRequest, BatchWriteResponse, WriteRequest};
use crate::core::completion::Completion;
use crate::core::error::{MutationError, RpcError, StatusCode};

/// Single-assignment result handle for one batched write.
pub type MutationHandle = Completion<Result<(), MutationError>>;

/// Accumulates write requests into one batch request.
pub struct MutationBatcher {
    table_name: String,
    entries: Vec<BatchEntry>,
    handles: Vec<MutationHandle>,
    approximate_byte_size: u64,
}

impl MutationBatcher {
    pub fn new(table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        // The batch carries the shared target identifier once.
        let approximate_byte_size = table_name.len() as u64 + 2;
        Self {
            table_name,
            entries: Vec::new(),
            handles: Vec::new(),
            approximate_byte_size,
        }
    }

    /// Append one write to the batch and return its result handle.
    /// Non-blocking; the handle resolves when a batch response is routed
    /// through [`MutationBatcher::attach_response`].
    pub fn add(&mut self, request: WriteRequest) -> MutationHandle {
        let handle = MutationHandle::new();
        let entry = BatchEntry {
            row_key: request.row_key,
            mutations: request.mutations,
        };
        self.approximate_byte_size += entry.approximate_size();
        self.entries.push(entry);
        self.handles.push(handle.clone());
        handle
    }

    /// Approximate serialized size of the accumulated batch.
    pub fn approximate_byte_size(&self) -> u64 {
        self.approximate_byte_size
    }

    /// Number of entries accumulated so far.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Produce the accumulated batch as a single wire request. Internal
    /// state is not cleared; the batcher's job ends at the orchestrator's
    /// discretion.
    pub fn to_batch_request(&self) -> BatchWriteRequest {
        BatchWriteRequest {
            table_name: self.table_name.clone(),
            entries: self.entries.clone(),
        }
    }

    /// Wire the batch response onto the result handles of every entry
    /// added so far. Entries added after this call are not covered and
    /// need a later batch of their own.
    pub fn attach_response(&self, response: &Completion<Result<BatchWriteResponse, RpcError>>) {
        let handles = self.handles.clone();
        response.on_complete(move |outcome| demultiplex(&handles, outcome));
    }
}

/// Pair statuses with entry handles positionally, in insertion order.
///
/// Missing statuses resolve their entries with a distinct error; excess
/// statuses indicate a batcher/response mismatch bug and crash loudly.
/// A whole-batch failure is fanned out to every handle.
fn demultiplex(handles: &[MutationHandle], outcome: Result<BatchWriteResponse, RpcError>) {
    match outcome {
        Ok(response) => {
            for (index, handle) in handles.iter().enumerate() {
                match response.statuses.get(index) {
                    Some(status) if status.is_ok() => {
                        handle.complete(Ok(()));
                    }
                    Some(status) => {
                        handle.complete(Err(MutationError::Status {
                            code: StatusCode::from_code_value(status.code),
                            message: status.message.clone(),
                            details: status.details.clone(),
                        }));
                    }
                    None => {
                        tracing::warn!(index, "batch response is missing a status for this entry");
                        handle.complete(Err(MutationError::MissingStatus));
                    }
                }
            }
            if response.statuses.len() > handles.len() {
                let extra = response.statuses.len() - handles.len();
                tracing::error!(
                    extra,
                    entries = handles.len(),
                    "batch response carried more statuses than entries"
                );
                panic!(
                    "batch response carried {} extra statuses for {} entries",
                    extra,
                    handles.len()
                );
            }
        }
        Err(error) => {
            for handle in handles {
                handle.complete(Err(MutationError::BatchFailed(error.clone())));
            }
        }
    }
}

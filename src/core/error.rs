//! Error types for the resilience layer.
//!
//! Each component surfaces its own error enum so that callers can
//! distinguish transient-retryable conditions from terminal ones without
//! string matching. Errors that fan out to multiple waiters (batch entry
//! results, cached credential failures) are `Clone`.
//!
//! Propagation policy: per-operation errors never abort sibling operations.
//! A batch entry's failure does not fail other entries; a scan error is
//! raised only to the thread reading at that moment. Protocol violations
//! (status/entry count mismatch, end-of-stream mid-row) indicate bugs and
//! are never silently swallowed.

use thiserror::Error;

/// gRPC-style status codes as carried in per-entry batch statuses and
/// transport failures. Code 0 (`Ok`) marks a successful entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl StatusCode {
    /// Map a wire code value to a status code. Unrecognized values map to
    /// `Unknown`, matching gRPC semantics.
    pub fn from_code_value(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Cancelled,
            2 => Self::Unknown,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A transport-level RPC failure, as reported by the out-of-scope RPC
/// layer. `Clone` because a whole-batch failure is fanned out to every
/// entry's result handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rpc error ({code}): {message}")]
pub struct RpcError {
    pub code: StatusCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors from the admission control path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrottleError {
    /// Registration or completion wait was cancelled via its token.
    /// No side effect: the operation id is not considered registered.
    #[error("operation registration cancelled")]
    Cancelled,
}

/// Per-entry outcome of a batched write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// The server reported a non-OK status for this entry.
    #[error("mutation failed ({code}): {message}")]
    Status {
        code: StatusCode,
        message: String,
        details: Vec<String>,
    },

    /// The batch response carried fewer statuses than entries; this entry
    /// received none.
    #[error("mutation does not have a status")]
    MissingStatus,

    /// The batch request itself failed; every entry in the batch carries
    /// the same failure.
    #[error("batch request failed: {0}")]
    BatchFailed(RpcError),
}

/// Terminal credential failures, cached until the next successful refresh
/// and returned to every caller that observes them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The token fetch failed permanently, or recoverable failures
    /// exhausted the backoff elapsed-time budget.
    #[error("credential refresh failed: {message}")]
    Refresh { message: String },

    /// The refresh was cancelled while sleeping between retries.
    #[error("credential refresh cancelled")]
    Cancelled,
}

/// Errors surfaced by the streaming row merger.
#[derive(Debug, Error)]
pub enum ScanError {
    /// No queue entry arrived within the configured read timeout.
    /// Distinguishable from other I/O errors so callers can retry the scan.
    #[error("timeout while merging responses")]
    Timeout,

    /// The upstream reported an error at this position in the stream.
    /// The original failure is retained as the cause.
    #[error("error in response stream")]
    Stream {
        #[source]
        source: RpcError,
    },

    /// End-of-stream arrived while a row was partially accumulated.
    /// Protocol violation: the producer must commit or reset before
    /// completing the stream.
    #[error("end of stream marker encountered while merging a row")]
    EndOfStreamMidRow,

    /// The consumer's cancellation token fired while waiting for data.
    /// The token remains observably cancelled for the caller.
    #[error("interrupted while waiting for the next response")]
    Interrupted,
}

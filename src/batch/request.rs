//! Write request and batch response shapes.
//!
//! These are the in-memory forms consumed and produced by the batcher. The
//! wire encoding and the RPC stubs that carry them live in the transport
//! layer, not here; only the approximate serialized sizes matter to this
//! crate, since they drive admission accounting and flush decisions.

use bytes::Bytes;

/// A single mutation against one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Write one cell value.
    SetCell {
        family: String,
        qualifier: Bytes,
        timestamp_micros: i64,
        value: Bytes,
    },
    /// Delete all cells under a qualifier.
    DeleteCells { family: String, qualifier: Bytes },
    /// Delete the entire row.
    DeleteRow,
}

impl Mutation {
    /// Approximate serialized size in bytes. Tracks payload lengths plus a
    /// small fixed framing overhead per mutation.
    pub fn approximate_size(&self) -> u64 {
        const FRAMING: u64 = 4;
        match self {
            Mutation::SetCell {
                family,
                qualifier,
                value,
                ..
            } => FRAMING + family.len() as u64 + qualifier.len() as u64 + value.len() as u64 + 8,
            Mutation::DeleteCells { family, qualifier } => {
                FRAMING + family.len() as u64 + qualifier.len() as u64
            }
            Mutation::DeleteRow => FRAMING,
        }
    }
}

/// An independent single-row write, as issued by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub row_key: Bytes,
    pub mutations: Vec<Mutation>,
}

impl WriteRequest {
    pub fn new(row_key: impl Into<Bytes>, mutations: Vec<Mutation>) -> Self {
        Self {
            row_key: row_key.into(),
            mutations,
        }
    }
}

/// One entry of a batch write request: a row key with its ordered
/// mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub row_key: Bytes,
    pub mutations: Vec<Mutation>,
}

impl BatchEntry {
    pub fn approximate_size(&self) -> u64 {
        self.row_key.len() as u64
            + self
                .mutations
                .iter()
                .map(Mutation::approximate_size)
                .sum::<u64>()
    }
}

/// The accumulated batch as a single wire request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriteRequest {
    pub table_name: String,
    pub entries: Vec<BatchEntry>,
}

/// Per-entry status carried in a batch write response. Code 0 is OK;
/// anything else maps to a [`crate::core::error::MutationError::Status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcStatus {
    pub code: i32,
    pub message: String,
    pub details: Vec<String>,
}

impl RpcStatus {
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: String::new(),
            details: Vec::new(),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// The batch write response: one status per request entry, positionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriteResponse {
    pub statuses: Vec<RpcStatus>,
}

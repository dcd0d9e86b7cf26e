//! Trellis - Client-side resilience layer for a remote tabular store.
//!
//! Trellis sits between application code and the RPC transport of a
//! remote wide-column store. It owns the concerns that make a raw RPC
//! channel safe to use at volume: admission control over outstanding
//! writes, batching with per-entry status demultiplexing, cached
//! self-refreshing credentials, and reassembly of streamed row fragments
//! under bounded buffering.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Application Code                          │
//! │         writes (mutations)        │        reads (scans)        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                    │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Flow & Batching                           │
//! │   AdmissionController │ OperationThrottle │ MutationBatcher     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                    │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Credentials                              │
//! │        CredentialTokenCache │ TokenCacheRegistry │ Backoff      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                    │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Streaming Reads                           │
//! │      ResponseQueue │ StreamingRowMerger │ flow-control pulls    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types for every component
//! - [`core::time`] - Clock abstraction and deterministic time
//! - [`core::completion`] - Single-assignment results and cancellation
//!
//! ## Flow
//! - [`flow::limiter`] - Byte- and count-bounded admission control
//! - [`flow::throttle`] - Completion tracking and flush barriers
//!
//! ## Batch
//! - [`batch::request`] - Mutations, batch requests, per-entry statuses
//! - [`batch::batcher`] - Accumulation and response demultiplexing
//!
//! ## Auth
//! - [`auth::token_cache`] - Cached bearer-token header with refresh
//! - [`auth::registry`] - Per-identity cache registry
//! - [`auth::backoff`] - Time-budgeted exponential backoff
//!
//! ## Scan
//! - [`scan::row`] - Row fragments and reassembled rows
//! - [`scan::queue`] - Bounded handoff queue from the transport
//! - [`scan::merger`] - Row merging and transport request credit
//!
//! # Key Invariants
//!
//! - Admission never exceeds the byte or operation limits; completions
//!   drain lazily before any capacity decision.
//! - Batch statuses pair positionally with entries; excess statuses are a
//!   server contract violation, missing statuses fail only their entries.
//! - A usable cached header is never discarded early; callers block only
//!   when the header is truly expired.
//! - A scan keeps request credit outstanding toward the transport even
//!   while its consumer is blocked.

// Core infrastructure
pub mod core;

// Write admission and completion tracking
pub mod flow;

// Mutation batching
pub mod batch;

// Credential caching
pub mod auth;

// Streaming reads
pub mod scan;

// Re-exports for convenience
pub use self::core::{completion, config, error, time};
pub use self::core::completion::{CancelToken, Completion};
pub use self::core::config::Config;
pub use self::core::error::{
    CredentialError, MutationError, RpcError, ScanError, StatusCode, ThrottleError,
};
pub use auth::{CredentialTokenCache, TokenCacheRegistry, TokenSource};
pub use batch::{BatchWriteRequest, BatchWriteResponse, MutationBatcher, WriteRequest};
pub use flow::{AdmissionController, OperationThrottle};
pub use scan::{Row, ScanResponse, StreamingRowMerger};

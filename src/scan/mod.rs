//! Streaming reads: bounded buffering, flow control, row reassembly.

pub mod merger;
pub mod queue;
pub mod row;

pub use merger::{PullFn, StreamingRowMerger};
pub use queue::{QueueEntry, ResponseFeeder, ResponseQueue};
pub use row::{Cell, CellChunk, Chunk, Column, Family, Row, ScanResponse};

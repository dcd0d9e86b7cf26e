//! Write batching: request accumulation and response demultiplexing.

pub mod batcher;
pub mod request;

pub use batcher::{MutationBatcher, MutationHandle};
pub use request::{
    BatchEntry, BatchWriteRequest, BatchWriteResponse, Mutation, RpcStatus, WriteRequest,
};

//! Core infrastructure: configuration, errors, time, and signalling.

pub mod completion;
pub mod config;
pub mod error;
pub mod time;

//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use trellis::auth::{AccessToken, FetchError, TokenSource};
use trellis::core::config::Config;
use trellis::scan::{CellChunk, Chunk, ScanResponse};

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    let config_content = r#"
[admission]
max_outstanding_bytes = 1048576
max_inflight_ops = 8

[auth]
stale_offset_ms = 75000
expire_offset_ms = 45000

[scan]
read_timeout_ms = 500
capacity_cap = 8
pull_batch_size = 4
"#;

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a configuration with custom admission limits.
pub fn create_admission_config(max_bytes: u64, max_ops: usize) -> NamedTempFile {
    let config_content = format!(
        r#"
[admission]
max_outstanding_bytes = {}
max_inflight_ops = {}
"#,
        max_bytes, max_ops
    );

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

/// Token source that returns a fixed token and counts fetches.
pub struct CountingSource {
    token: AccessToken,
    fetches: AtomicUsize,
}

impl CountingSource {
    pub fn new(value: &str, expires_at_ms: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            token: AccessToken {
                value: value.to_string(),
                expires_at_ms,
            },
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TokenSource for CountingSource {
    fn fetch_token(&self) -> Result<Option<AccessToken>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.token.clone()))
    }
}

/// Token source that fails recoverably a fixed number of times, then
/// succeeds.
pub struct FlakySource {
    failures_left: AtomicUsize,
    token: AccessToken,
}

impl FlakySource {
    pub fn new(failures: usize, value: &str) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            token: AccessToken {
                value: value.to_string(),
                expires_at_ms: None,
            },
        })
    }
}

impl TokenSource for FlakySource {
    fn fetch_token(&self) -> Result<Option<AccessToken>, FetchError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(FetchError::Recoverable("transient outage".into()));
        }
        Ok(Some(self.token.clone()))
    }
}

/// Token source that always fails permanently.
pub struct BrokenSource;

impl TokenSource for BrokenSource {
    fn fetch_token(&self) -> Result<Option<AccessToken>, FetchError> {
        Err(FetchError::Permanent("invalid credentials".into()))
    }
}

/// Build a content chunk for scan tests.
pub fn content_chunk(family: &str, qualifier: &'static [u8], value: &'static [u8]) -> Chunk {
    Chunk::Content(CellChunk {
        family: family.to_string(),
        qualifier: Some(bytes::Bytes::from_static(qualifier)),
        timestamp_micros: 1_000,
        value: bytes::Bytes::from_static(value),
    })
}

/// Build a scan response for a row key.
pub fn scan_response(row_key: &'static [u8], chunks: Vec<Chunk>) -> ScanResponse {
    ScanResponse {
        row_key: bytes::Bytes::from_static(row_key),
        chunks,
    }
}

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}

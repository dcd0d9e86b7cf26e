//! Core infrastructure tests.

mod common;

use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use trellis::core::completion::{CancelToken, Completion};
use trellis::core::config::Config;

// ============================================================================
// Config tests
// ============================================================================

#[test]
fn parse_minimal_config() {
    let file = common::create_minimal_config();
    let config = common::load_config(&file);
    assert_eq!(config.admission.max_outstanding_bytes, 1_048_576);
    assert_eq!(config.admission.max_inflight_ops, 8);
    assert_eq!(config.scan.capacity_cap, 8);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[admission]\nmax_inflight_ops = 3\n")
        .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.admission.max_inflight_ops, 3);
    assert_eq!(config.auth.stale_offset_ms, 75_000);
    assert_eq!(config.scan.read_timeout_ms, 10_000);
}

#[test]
fn validate_rejects_inverted_freshness_offsets() {
    let config_content = r#"
[auth]
stale_offset_ms = 40000
expire_offset_ms = 45000
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config_content.as_bytes()).unwrap();

    let result = Config::from_file(file.path());
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("stale_offset_ms"));
}

#[test]
fn validate_rejects_pull_batch_above_capacity() {
    let config_content = r#"
[scan]
capacity_cap = 4
pull_batch_size = 5
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config_content.as_bytes()).unwrap();

    let result = Config::from_file(file.path());
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("pull_batch_size"));
}

// ============================================================================
// Completion tests
// ============================================================================

#[test]
fn completion_fans_out_to_multiple_waiters() {
    let cell: Completion<u32> = Completion::new();
    let mut readers = Vec::new();
    for _ in 0..4 {
        let reader = cell.clone();
        readers.push(std::thread::spawn(move || reader.wait()));
    }
    std::thread::sleep(Duration::from_millis(20));
    cell.complete(9);
    for reader in readers {
        assert_eq!(reader.join().unwrap(), 9);
    }
}

#[test]
fn completion_subscribers_and_waiters_agree() {
    let cell: Completion<&'static str> = Completion::new();
    let observed: Completion<&'static str> = Completion::new();
    let observer = observed.clone();
    cell.on_complete(move |v| {
        observer.complete(v);
    });
    cell.complete("value");
    assert_eq!(cell.try_get(), Some("value"));
    assert_eq!(observed.wait_timeout(Duration::from_secs(1)), Some("value"));
}

#[test]
fn cancel_token_is_sticky() {
    let token = CancelToken::new();
    token.cancel();
    assert!(token.is_cancelled());
    // Already-cancelled waits return immediately.
    assert!(token.wait_for(Duration::from_secs(10)));
    assert!(token.is_cancelled());
}

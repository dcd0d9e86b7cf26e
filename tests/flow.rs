//! Flow control tests: admission limits, completion tracking, flush waits.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};
use trellis::core::completion::{CancelToken, Completion};
use trellis::core::error::ThrottleError;
use trellis::flow::{AdmissionController, OperationThrottle};

fn controller(max_bytes: u64, max_ops: usize) -> Arc<AdmissionController> {
    let file = common::create_admission_config(max_bytes, max_ops);
    let config = common::load_config(&file);
    Arc::new(AdmissionController::new(&config.admission))
}

// ============================================================================
// AdmissionController tests
// ============================================================================

#[test]
fn registration_blocks_until_a_completion_frees_capacity() {
    let limiter = controller(10, 16);
    let cancel = CancelToken::new();
    let first = limiter.register_operation(10, &cancel).unwrap();
    assert!(limiter.is_full());

    let blocked = {
        let limiter = Arc::clone(&limiter);
        std::thread::spawn(move || {
            let cancel = CancelToken::new();
            let start = Instant::now();
            let id = limiter.register_operation(4, &cancel).unwrap();
            (id, start.elapsed())
        })
    };
    // Let the registering thread actually block on the full limiter.
    std::thread::sleep(Duration::from_millis(50));
    limiter.mark_complete(first);

    let (id, waited) = blocked.join().unwrap();
    assert!(id > first);
    assert!(waited >= Duration::from_millis(40));
    assert_eq!(limiter.outstanding_bytes(), 4);
}

#[test]
fn oversized_operation_admits_alone_on_an_empty_limiter() {
    let limiter = controller(10, 16);
    let cancel = CancelToken::new();
    // Larger than the byte limit; admitted because nothing is outstanding.
    let id = limiter.register_operation(100, &cancel).unwrap();
    assert!(limiter.is_full());
    limiter.mark_complete(id);
    assert!(!limiter.is_full());
    assert!(!limiter.has_outstanding());
}

#[test]
fn cancellation_unblocks_a_waiting_registration() {
    let limiter = controller(5, 16);
    let cancel = CancelToken::new();
    limiter.register_operation(5, &cancel).unwrap();

    let interrupt = CancelToken::new();
    let blocked = {
        let limiter = Arc::clone(&limiter);
        let interrupt = interrupt.clone();
        std::thread::spawn(move || limiter.register_operation(1, &interrupt))
    };
    std::thread::sleep(Duration::from_millis(30));
    interrupt.cancel();

    assert_eq!(blocked.join().unwrap(), Err(ThrottleError::Cancelled));
    // The cancelled registration reserved nothing.
    assert_eq!(limiter.outstanding_bytes(), 5);
}

// ============================================================================
// OperationThrottle tests
// ============================================================================

#[test]
fn await_completion_returns_once_everything_resolves() {
    let file = common::create_admission_config(1_000, 16);
    let config = common::load_config(&file).admission;
    let throttle = Arc::new(OperationThrottle::new(
        Arc::new(AdmissionController::new(&config)),
        &config,
    ));

    let cancel = CancelToken::new();
    let op = throttle.register_operation(100, &cancel).unwrap();
    let retry: Completion<bool> = Completion::new();
    throttle.register_retry(&retry);
    assert!(throttle.has_inflight());

    let resolver = {
        let throttle = Arc::clone(&throttle);
        let retry = retry.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            throttle.on_operation_completion(op);
            std::thread::sleep(Duration::from_millis(40));
            retry.complete(true);
        })
    };

    let start = Instant::now();
    throttle.await_completion(&cancel).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(70));
    assert!(!throttle.has_inflight());
    resolver.join().unwrap();
}

#[test]
fn await_completion_observes_cancellation() {
    let file = common::create_admission_config(1_000, 16);
    let config = common::load_config(&file).admission;
    let throttle = OperationThrottle::new(Arc::new(AdmissionController::new(&config)), &config);

    let cancel = CancelToken::new();
    throttle.register_operation(1, &cancel).unwrap();

    let interrupt = CancelToken::new();
    interrupt.cancel();
    assert_eq!(
        throttle.await_completion(&interrupt),
        Err(ThrottleError::Cancelled)
    );
}

#[test]
fn await_completion_is_immediate_when_idle() {
    let file = common::create_admission_config(1_000, 16);
    let config = common::load_config(&file).admission;
    let throttle = OperationThrottle::new(Arc::new(AdmissionController::new(&config)), &config);

    let cancel = CancelToken::new();
    let start = Instant::now();
    throttle.await_completion(&cancel).unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(throttle.stall_warning_count(), 0);
}

//! Flow control: admission limits and operation completion tracking.

pub mod limiter;
pub mod throttle;

pub use limiter::{AdmissionController, OperationId};
pub use throttle::OperationThrottle;

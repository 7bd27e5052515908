//! Assertions over completion signals.

use crate::core::Completion;
use crate::errors::FlowError;
use std::time::Duration;

/// How long the waiting assertions allow before failing.
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(5);

/// Asserts that `completion` resolves successfully within [`COMPLETION_TIMEOUT`].
pub async fn assert_completes(completion: &Completion) {
    match tokio::time::timeout(COMPLETION_TIMEOUT, completion.wait()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => panic!("Expected successful completion, got fault: {e}"),
        Err(_) => panic!("Completion did not resolve within {COMPLETION_TIMEOUT:?}"),
    }
}

/// Asserts that `completion` resolves with a fault within [`COMPLETION_TIMEOUT`].
///
/// Returns the fault.
pub async fn assert_faults(completion: &Completion) -> FlowError {
    match tokio::time::timeout(COMPLETION_TIMEOUT, completion.wait()).await {
        Ok(Err(e)) => e,
        Ok(Ok(())) => panic!("Expected a fault, but the completion succeeded"),
        Err(_) => panic!("Completion did not resolve within {COMPLETION_TIMEOUT:?}"),
    }
}

/// Asserts that `completion` has not resolved yet.
pub fn assert_pending(completion: &Completion) {
    assert!(
        !completion.is_completed(),
        "Expected a pending completion, got {:?}",
        completion.outcome()
    );
}

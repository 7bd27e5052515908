//! The error boundary around one callable invocation.

use crate::errors::StageFailure;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Runs `call`, turning both `Err` and panics into a [`StageFailure`].
pub(crate) fn guard<R>(call: impl FnOnce() -> anyhow::Result<R>) -> Result<R, StageFailure> {
    match std::panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StageFailure::new(e)),
        Err(panic) => Err(StageFailure::from_panic(panic)),
    }
}

/// Builds a future with `make` and awaits it, catching `Err` and panics from both steps.
pub(crate) async fn guard_future<R, Fut>(
    make: impl FnOnce() -> Fut,
) -> Result<R, StageFailure>
where
    Fut: Future<Output = anyhow::Result<R>>,
{
    let future = match std::panic::catch_unwind(AssertUnwindSafe(make)) {
        Ok(future) => future,
        Err(panic) => return Err(StageFailure::from_panic(panic)),
    };
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StageFailure::new(e)),
        Err(panic) => Err(StageFailure::from_panic(panic)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_passes_value() {
        assert_eq!(guard(|| Ok(3)).ok(), Some(3));
    }

    #[test]
    fn test_guard_captures_error_and_panic() {
        let err = guard::<()>(|| Err(anyhow::anyhow!("bad"))).err();
        assert_eq!(err.map(|e| e.to_string()), Some("bad".to_string()));

        let panicked = guard::<()>(|| panic!("exploded")).err();
        assert!(panicked.is_some_and(|e| e.is_panic()));
    }

    #[tokio::test]
    async fn test_guard_future_captures_panic_while_polling() {
        let result = guard_future(|| async {
            tokio::task::yield_now().await;
            if true {
                panic!("late");
            }
            Ok(())
        })
        .await;
        assert!(result.is_err_and(|e| e.is_panic()));
    }

    #[tokio::test]
    async fn test_guard_future_captures_panic_while_building() {
        let result: Result<(), _> = guard_future(|| -> futures::future::Ready<anyhow::Result<()>> {
            panic!("early")
        })
        .await;
        assert!(result.is_err_and(|e| e.is_panic()));
    }
}

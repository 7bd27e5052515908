//! Transform and error-handler delegates.

use super::boundary::{guard, guard_future};
use crate::core::Message;
use crate::envelopes::ErrorResult;
use crate::errors::{FlowError, StageFailure};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Synchronous transform.
pub type TransformFn<I, O> = Arc<dyn Fn(&I) -> anyhow::Result<O> + Send + Sync>;

/// Asynchronous transform.
pub type AsyncTransformFn<I, O> =
    Arc<dyn Fn(I) -> BoxFuture<'static, anyhow::Result<O>> + Send + Sync>;

/// Synchronous error handler.
pub type ErrorFn<T> = Arc<dyn Fn(&T, &StageFailure) -> anyhow::Result<()> + Send + Sync>;

/// Asynchronous error handler.
pub type AsyncErrorFn<T> =
    Arc<dyn Fn(T, StageFailure) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A callable mapping an input to an output.
pub enum TransformDelegate<I, O> {
    /// Synchronous transform.
    Sync(TransformFn<I, O>),
    /// Asynchronous transform.
    Async(AsyncTransformFn<I, O>),
}

/// A boolean gate evaluated per item.
pub type GateDelegate<T> = TransformDelegate<T, bool>;

impl<I: Message, O: Message> TransformDelegate<I, O> {
    /// Wraps a synchronous transform.
    #[must_use]
    pub fn from_fn<F>(transform: F) -> Self
    where
        F: Fn(&I) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(transform))
    }

    /// Wraps an asynchronous transform.
    #[must_use]
    pub fn from_async_fn<F, Fut>(transform: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        Self::Async(Arc::new(move |item| transform(item).boxed()))
    }

    /// Resolves a type-erased callable: [`TransformFn`] or [`AsyncTransformFn`].
    ///
    /// # Errors
    ///
    /// Returns an error when `callable` has neither shape.
    pub fn from_any(callable: Box<dyn Any + Send + Sync>) -> Result<Self, FlowError> {
        let callable = match callable.downcast::<TransformFn<I, O>>() {
            Ok(transform) => return Ok(Self::Sync(*transform)),
            Err(other) => other,
        };
        match callable.downcast::<AsyncTransformFn<I, O>>() {
            Ok(transform) => Ok(Self::Async(*transform)),
            Err(_) => Err(FlowError::InvalidDelegate(format!(
                "unsupported callable shape for {} -> {}: expected TransformFn or AsyncTransformFn",
                std::any::type_name::<I>(),
                std::any::type_name::<O>()
            ))),
        }
    }

    /// Runs the transform once behind the error boundary.
    pub async fn apply(&self, item: &I) -> Result<O, StageFailure> {
        match self {
            Self::Sync(transform) => guard(|| transform(item)),
            Self::Async(transform) => guard_future(|| transform(item.clone())).await,
        }
    }
}

impl<I, O> Clone for TransformDelegate<I, O> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

impl<I, O> fmt::Debug for TransformDelegate<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Self::Sync(_) => "sync",
            Self::Async(_) => "async",
        };
        f.debug_tuple("TransformDelegate").field(&shape).finish()
    }
}

/// A callable receiving an item together with the failure it caused.
pub enum ErrorDelegate<T> {
    /// Synchronous handler.
    Sync(ErrorFn<T>),
    /// Asynchronous handler.
    Async(AsyncErrorFn<T>),
}

impl<T: Message> ErrorDelegate<T> {
    /// Wraps a synchronous handler.
    #[must_use]
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&T, &StageFailure) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(handler))
    }

    /// Wraps an asynchronous handler.
    #[must_use]
    pub fn from_async_fn<F, Fut>(handler: F) -> Self
    where
        F: Fn(T, StageFailure) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Async(Arc::new(move |item, error| handler(item, error).boxed()))
    }

    /// Resolves a type-erased callable: [`ErrorFn`] or [`AsyncErrorFn`].
    ///
    /// # Errors
    ///
    /// Returns an error when `callable` has neither shape.
    pub fn from_any(callable: Box<dyn Any + Send + Sync>) -> Result<Self, FlowError> {
        let callable = match callable.downcast::<ErrorFn<T>>() {
            Ok(handler) => return Ok(Self::Sync(*handler)),
            Err(other) => other,
        };
        match callable.downcast::<AsyncErrorFn<T>>() {
            Ok(handler) => Ok(Self::Async(*handler)),
            Err(_) => Err(FlowError::InvalidDelegate(format!(
                "unsupported error handler shape for {}: expected ErrorFn or AsyncErrorFn",
                std::any::type_name::<T>()
            ))),
        }
    }

    /// Runs the handler once behind the error boundary.
    pub async fn apply(&self, record: &ErrorResult<T>) -> Result<(), StageFailure> {
        match self {
            Self::Sync(handler) => guard(|| handler(record.input(), record.error())),
            Self::Async(handler) => {
                guard_future(|| handler(record.input().clone(), record.error().clone())).await
            }
        }
    }
}

impl<T> Clone for ErrorDelegate<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for ErrorDelegate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Self::Sync(_) => "sync",
            Self::Async(_) => "async",
        };
        f.debug_tuple("ErrorDelegate").field(&shape).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transform_sync_and_async() {
        let parse = TransformDelegate::<String, i64>::from_fn(|s| Ok(s.parse()?));
        assert_eq!(parse.apply(&"42".to_string()).await.ok(), Some(42));
        assert!(parse.apply(&"x".to_string()).await.is_err());

        let double = TransformDelegate::<i64, i64>::from_async_fn(|x| async move { Ok(x * 2) });
        assert_eq!(double.apply(&21).await.ok(), Some(42));
    }

    #[tokio::test]
    async fn test_gate_panic_is_failure() {
        let gate: GateDelegate<i32> = TransformDelegate::from_fn(|_| panic!("gate broke"));
        let result = gate.apply(&1).await;
        assert!(result.is_err_and(|e| e.is_panic()));
    }

    #[tokio::test]
    async fn test_error_delegate_receives_pair() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = ErrorDelegate::from_fn(move |item: &i32, error: &StageFailure| {
            sink.lock().push((*item, error.to_string()));
            Ok(())
        });
        let record = ErrorResult::new(-2, StageFailure::msg("negative"));
        assert!(handler.apply(&record).await.is_ok());
        assert_eq!(*seen.lock(), vec![(-2, "negative".to_string())]);
    }

    #[tokio::test]
    async fn test_async_error_delegate_failure() {
        let handler = ErrorDelegate::from_async_fn(|item: i32, _error| async move {
            anyhow::bail!("could not handle {item}")
        });
        let record = ErrorResult::new(9, StageFailure::msg("first"));
        let failure = handler.apply(&record).await.err();
        assert_eq!(failure.map(|e| e.to_string()), Some("could not handle 9".to_string()));
    }

    #[test]
    fn test_from_any_shapes() {
        let transform: TransformFn<i32, bool> = Arc::new(|x| Ok(*x > 0));
        assert!(TransformDelegate::<i32, bool>::from_any(Box::new(transform)).is_ok());
        assert!(TransformDelegate::<i32, bool>::from_any(Box::new(7_u8)).is_err());

        let handler: ErrorFn<i32> = Arc::new(|_, _| Ok(()));
        assert!(ErrorDelegate::<i32>::from_any(Box::new(handler)).is_ok());
        assert!(ErrorDelegate::<i32>::from_any(Box::new(())).is_err());
    }
}

//! Action delegates: callables run once per item.

use super::boundary::{guard, guard_future};
use crate::core::Message;
use crate::envelopes::ActionResult;
use crate::errors::{FlowError, StageFailure};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Synchronous action over a borrowed item.
pub type ActionFn<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Asynchronous action over an owned item.
pub type AsyncActionFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Synchronous action that replaces the item.
pub type MapFn<T> = Arc<dyn Fn(&T) -> anyhow::Result<T> + Send + Sync>;

/// Asynchronous action that replaces the item.
pub type AsyncMapFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

type NarrowedFn<T> =
    Arc<dyn Fn(&T) -> Option<BoxFuture<'static, anyhow::Result<()>>> + Send + Sync>;

/// Views a wide message type as one of its narrower shapes.
///
/// Typically implemented for an enum, returning the payload of one variant.
pub trait Narrow<S> {
    /// Returns the narrowed view, or `None` when the item is some other shape.
    fn narrow(&self) -> Option<&S>;
}

/// An object-safe async handler, for actions that carry their own state.
#[async_trait]
pub trait ItemHandler<T>: Send + Sync {
    /// Handles one item.
    async fn handle(&self, item: &T) -> anyhow::Result<()>;
}

/// A callable run once per item, resolved to one shape at construction.
pub enum ActionDelegate<T> {
    /// Synchronous inspection.
    Sync(ActionFn<T>),
    /// Asynchronous inspection.
    Async(AsyncActionFn<T>),
    /// Synchronous replacement of the item.
    Map(MapFn<T>),
    /// Asynchronous replacement of the item.
    MapAsync(AsyncMapFn<T>),
    /// Runs only for items of one narrower shape; others pass through untouched.
    Narrowed(NarrowedFn<T>),
    /// A handler object.
    Handler(Arc<dyn ItemHandler<T>>),
}

impl<T: Message> ActionDelegate<T> {
    /// Wraps a synchronous action.
    #[must_use]
    pub fn from_fn<F>(action: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(action))
    }

    /// Wraps an asynchronous action.
    #[must_use]
    pub fn from_async_fn<F, Fut>(action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Async(Arc::new(move |item| action(item).boxed()))
    }

    /// Wraps a synchronous action whose result replaces the item.
    #[must_use]
    pub fn map_fn<F>(action: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::Map(Arc::new(action))
    }

    /// Wraps an asynchronous action whose result replaces the item.
    #[must_use]
    pub fn map_async_fn<F, Fut>(action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::MapAsync(Arc::new(move |item| action(item).boxed()))
    }

    /// Wraps a synchronous action over the narrower shape `S`.
    #[must_use]
    pub fn narrowed<S, F>(action: F) -> Self
    where
        T: Narrow<S>,
        S: 'static,
        F: Fn(&S) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Narrowed(Arc::new(move |item: &T| {
            item.narrow()
                .map(|narrowed| futures::future::ready(action(narrowed)).boxed())
        }))
    }

    /// Wraps an asynchronous action over the narrower shape `S`.
    #[must_use]
    pub fn narrowed_async<S, F, Fut>(action: F) -> Self
    where
        T: Narrow<S>,
        S: Message,
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Narrowed(Arc::new(move |item: &T| {
            item.narrow().cloned().map(|narrowed| action(narrowed).boxed())
        }))
    }

    /// Wraps a handler object.
    #[must_use]
    pub fn from_handler(handler: Arc<dyn ItemHandler<T>>) -> Self {
        Self::Handler(handler)
    }

    /// Resolves a type-erased callable.
    ///
    /// Accepts [`ActionFn`], [`AsyncActionFn`], [`MapFn`], [`AsyncMapFn`] or
    /// `Arc<dyn ItemHandler<T>>`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the accepted shapes when `callable` is none of them.
    pub fn from_any(callable: Box<dyn Any + Send + Sync>) -> Result<Self, FlowError> {
        let callable = match callable.downcast::<ActionFn<T>>() {
            Ok(action) => return Ok(Self::Sync(*action)),
            Err(other) => other,
        };
        let callable = match callable.downcast::<AsyncActionFn<T>>() {
            Ok(action) => return Ok(Self::Async(*action)),
            Err(other) => other,
        };
        let callable = match callable.downcast::<MapFn<T>>() {
            Ok(action) => return Ok(Self::Map(*action)),
            Err(other) => other,
        };
        let callable = match callable.downcast::<AsyncMapFn<T>>() {
            Ok(action) => return Ok(Self::MapAsync(*action)),
            Err(other) => other,
        };
        match callable.downcast::<Arc<dyn ItemHandler<T>>>() {
            Ok(handler) => Ok(Self::Handler(*handler)),
            Err(_) => Err(FlowError::InvalidDelegate(format!(
                "unsupported callable shape for {}: expected ActionFn, AsyncActionFn, MapFn, \
                 AsyncMapFn or Arc<dyn ItemHandler>",
                std::any::type_name::<T>()
            ))),
        }
    }

    /// Runs the callable once behind the error boundary.
    ///
    /// Returns the replacement item for map shapes, `None` otherwise.
    pub(crate) async fn run(&self, item: &T) -> Result<Option<T>, StageFailure> {
        match self {
            Self::Sync(action) => guard(|| action(item)).map(|()| None),
            Self::Async(action) => guard_future(|| action(item.clone())).await.map(|()| None),
            Self::Map(action) => guard(|| action(item)).map(Some),
            Self::MapAsync(action) => guard_future(|| action(item.clone())).await.map(Some),
            Self::Narrowed(action) => guard_future(|| async move {
                match action(item) {
                    Some(future) => future.await,
                    None => Ok(()),
                }
            })
            .await
            .map(|()| None),
            Self::Handler(handler) => guard_future(|| handler.handle(item)).await.map(|()| None),
        }
    }

    /// Runs the callable and wraps the outcome in an envelope.
    pub async fn apply(&self, item: T) -> ActionResult<T> {
        let outcome = self.run(&item).await;
        match outcome {
            Ok(Some(next)) => ActionResult::success(next),
            Ok(None) => ActionResult::success(item),
            Err(error) => ActionResult::failure(item, error),
        }
    }
}

impl<T> Clone for ActionDelegate<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
            Self::Map(f) => Self::Map(Arc::clone(f)),
            Self::MapAsync(f) => Self::MapAsync(Arc::clone(f)),
            Self::Narrowed(f) => Self::Narrowed(Arc::clone(f)),
            Self::Handler(h) => Self::Handler(Arc::clone(h)),
        }
    }
}

impl<T> fmt::Debug for ActionDelegate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Self::Sync(_) => "sync",
            Self::Async(_) => "async",
            Self::Map(_) => "map",
            Self::MapAsync(_) => "map_async",
            Self::Narrowed(_) => "narrowed",
            Self::Handler(_) => "handler",
        };
        f.debug_tuple("ActionDelegate").field(&shape).finish()
    }
}

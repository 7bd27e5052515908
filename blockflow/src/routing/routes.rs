//! The five projections an adapter can apply.

use super::adapter::Route;
use crate::core::{Message, Predicate};
use crate::envelopes::{ActionResult, ErrorResult, TransformResult};
use std::marker::PhantomData;
use std::sync::Arc;

fn passes<T>(predicate: Option<&Predicate<T>>, value: &T) -> bool {
    predicate.map_or(true, |predicate| predicate(value))
}

/// Forwards the item of a success whose item satisfies the predicate.
pub struct SuccessRoute<T> {
    predicate: Option<Predicate<T>>,
}

impl<T> SuccessRoute<T> {
    /// Creates the route.
    #[must_use]
    pub fn new(predicate: Option<Predicate<T>>) -> Self {
        Self { predicate }
    }
}

impl<T: Message> Route<ActionResult<T>, T> for SuccessRoute<T> {
    fn name(&self) -> &'static str {
        "success"
    }

    fn route(&self, envelope: &ActionResult<T>) -> Option<T> {
        match envelope {
            ActionResult::Success(item) if passes(self.predicate.as_ref(), item) => {
                Some(item.clone())
            }
            _ => None,
        }
    }
}

/// Forwards the item of any envelope, success or failure, that satisfies the predicate.
pub struct DiscardErrorRoute<T> {
    predicate: Option<Predicate<T>>,
}

impl<T> DiscardErrorRoute<T> {
    /// Creates the route.
    #[must_use]
    pub fn new(predicate: Option<Predicate<T>>) -> Self {
        Self { predicate }
    }
}

impl<T: Message> Route<ActionResult<T>, T> for DiscardErrorRoute<T> {
    fn name(&self) -> &'static str {
        "discard_error"
    }

    fn route(&self, envelope: &ActionResult<T>) -> Option<T> {
        let item = envelope.input();
        passes(self.predicate.as_ref(), item).then(|| item.clone())
    }
}

/// Forwards failures as [`ErrorResult`]s.
pub struct ErrorRoute<T> {
    _marker: PhantomData<fn(T)>,
}

impl<T> ErrorRoute<T> {
    /// Creates the route.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ErrorRoute<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Message> Route<ActionResult<T>, ErrorResult<T>> for ErrorRoute<T> {
    fn name(&self) -> &'static str {
        "error"
    }

    fn route(&self, envelope: &ActionResult<T>) -> Option<ErrorResult<T>> {
        match envelope {
            ActionResult::Failure { input, error } => {
                Some(ErrorResult::new(input.clone(), error.clone()))
            }
            ActionResult::Success(_) => None,
        }
    }
}

/// A total function applied to a transform output before it is forwarded.
pub type Projection<V, O> = Arc<dyn Fn(&V) -> O + Send + Sync>;

/// Forwards the projected output of a success.
///
/// The predicate sees the output before projection. Neither function is
/// guarded: a panic here is a wiring defect and faults the upstream block.
pub struct TransformSuccessRoute<I, V, O> {
    projection: Projection<V, O>,
    predicate: Option<Predicate<V>>,
    _marker: PhantomData<fn(I)>,
}

impl<I, V, O> TransformSuccessRoute<I, V, O> {
    /// Creates the route.
    #[must_use]
    pub fn new(projection: Projection<V, O>, predicate: Option<Predicate<V>>) -> Self {
        Self {
            projection,
            predicate,
            _marker: PhantomData,
        }
    }
}

impl<I, V, O> Route<TransformResult<I, V>, O> for TransformSuccessRoute<I, V, O>
where
    I: Message,
    V: Message,
    O: Message,
{
    fn name(&self) -> &'static str {
        "transform_success"
    }

    fn route(&self, envelope: &TransformResult<I, V>) -> Option<O> {
        match envelope {
            TransformResult::Success(output) if passes(self.predicate.as_ref(), output) => {
                Some((self.projection)(output))
            }
            _ => None,
        }
    }
}

/// Forwards transform failures as [`ErrorResult`]s of the original input.
pub struct TransformErrorRoute<I, V> {
    _marker: PhantomData<fn(I, V)>,
}

impl<I, V> TransformErrorRoute<I, V> {
    /// Creates the route.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<I, V> Default for TransformErrorRoute<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Message, V: Message> Route<TransformResult<I, V>, ErrorResult<I>>
    for TransformErrorRoute<I, V>
{
    fn name(&self) -> &'static str {
        "transform_error"
    }

    fn route(&self, envelope: &TransformResult<I, V>) -> Option<ErrorResult<I>> {
        match envelope {
            TransformResult::Failure { input, error } => {
                Some(ErrorResult::new(input.clone(), error.clone()))
            }
            TransformResult::Success(_) => None,
        }
    }
}

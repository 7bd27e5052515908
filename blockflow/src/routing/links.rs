//! Link functions that interpose an adapter between an envelope source and a target.

use super::adapter::RoutingAdapter;
use super::routes::{
    DiscardErrorRoute, ErrorRoute, Projection, SuccessRoute, TransformErrorRoute,
    TransformSuccessRoute,
};
use crate::core::{LinkHandle, Message, Predicate, Source, Target};
use crate::envelopes::{ActionResult, ErrorResult, TransformResult};
use crate::errors::FlowError;
use std::fmt;
use std::sync::Arc;

/// Options for a routed link.
pub struct RouteOptions<T> {
    /// Complete (or fault) the target when the upstream completes.
    pub propagate_completion: bool,
    /// Only route payloads that satisfy this predicate.
    pub predicate: Option<Predicate<T>>,
}

impl<T> RouteOptions<T> {
    /// Creates options with no predicate and no completion propagation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            propagate_completion: false,
            predicate: None,
        }
    }

    /// Creates options that propagate completion.
    #[must_use]
    pub fn propagate() -> Self {
        Self {
            propagate_completion: true,
            predicate: None,
        }
    }

    /// Sets the payload predicate.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Sets a shared payload predicate.
    #[must_use]
    pub fn with_shared_predicate(mut self, predicate: Option<Predicate<T>>) -> Self {
        self.predicate = predicate;
        self
    }
}

impl<T> Default for RouteOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RouteOptions<T> {
    fn clone(&self) -> Self {
        Self {
            propagate_completion: self.propagate_completion,
            predicate: self.predicate.clone(),
        }
    }
}

impl<T> fmt::Debug for RouteOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("propagate_completion", &self.propagate_completion)
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}

/// Routes the items of successful envelopes to `target`.
///
/// # Errors
///
/// Returns an error if the source refuses the link.
pub fn link_to_next<T, S>(
    source: &Arc<S>,
    target: Arc<dyn Target<T>>,
    options: RouteOptions<T>,
) -> Result<LinkHandle, FlowError>
where
    T: Message,
    S: Source<ActionResult<T>> + 'static,
{
    RoutingAdapter::attach(
        source,
        target,
        SuccessRoute::new(options.predicate),
        options.propagate_completion,
    )
}

/// Routes the item of every envelope to `target`, dropping the failure.
///
/// # Errors
///
/// Returns an error if the source refuses the link.
pub fn link_to_next_discard_error<T, S>(
    source: &Arc<S>,
    target: Arc<dyn Target<T>>,
    options: RouteOptions<T>,
) -> Result<LinkHandle, FlowError>
where
    T: Message,
    S: Source<ActionResult<T>> + 'static,
{
    RoutingAdapter::attach(
        source,
        target,
        DiscardErrorRoute::new(options.predicate),
        options.propagate_completion,
    )
}

/// Routes failed envelopes to `target` as error records.
///
/// # Errors
///
/// Returns an error if the source refuses the link.
pub fn link_to_error<T, S>(
    source: &Arc<S>,
    target: Arc<dyn Target<ErrorResult<T>>>,
    propagate_completion: bool,
) -> Result<LinkHandle, FlowError>
where
    T: Message,
    S: Source<ActionResult<T>> + 'static,
{
    RoutingAdapter::attach(source, target, ErrorRoute::new(), propagate_completion)
}

/// Routes successful transform outputs to `target` after applying `projection`.
///
/// The predicate in `options` sees the output before projection.
///
/// # Errors
///
/// Returns an error if the source refuses the link.
pub fn link_to_transform_next<I, V, O, S, F>(
    source: &Arc<S>,
    target: Arc<dyn Target<O>>,
    projection: F,
    options: RouteOptions<V>,
) -> Result<LinkHandle, FlowError>
where
    I: Message,
    V: Message,
    O: Message,
    S: Source<TransformResult<I, V>> + 'static,
    F: Fn(&V) -> O + Send + Sync + 'static,
{
    let projection: Projection<V, O> = Arc::new(projection);
    RoutingAdapter::attach(
        source,
        target,
        TransformSuccessRoute::new(projection, options.predicate),
        options.propagate_completion,
    )
}

/// Routes failed transforms to `target` as error records of the original input.
///
/// # Errors
///
/// Returns an error if the source refuses the link.
pub fn link_to_transform_error<I, V, S>(
    source: &Arc<S>,
    target: Arc<dyn Target<ErrorResult<I>>>,
    propagate_completion: bool,
) -> Result<LinkHandle, FlowError>
where
    I: Message,
    V: Message,
    S: Source<TransformResult<I, V>> + 'static,
{
    RoutingAdapter::attach(
        source,
        target,
        TransformErrorRoute::<I, V>::new(),
        propagate_completion,
    )
}

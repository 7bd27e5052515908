//! The generic routing adapter.

use crate::core::{
    BlockId, Completion, DataflowBlock, LinkHandle, LinkOptions, Message, MessageHeader,
    MessageStatus, Source, Target,
};
use crate::errors::FlowError;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::error;

/// Projects an upstream envelope into what the bound target expects.
pub trait Route<In, Out>: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the projected value, or `None` when this route does not take the envelope.
    ///
    /// Must be deterministic. A postponed envelope is routed again when the
    /// target consumes it, after the upstream has already given it up.
    fn route(&self, envelope: &In) -> Option<Out>;
}

/// A private tap between one upstream source and one downstream target.
///
/// The adapter does not buffer. Offers are projected and passed straight
/// through, and consume/reserve/release calls from the target go back to
/// the upstream under the adapter's own id, so postponement behaves exactly
/// as if the target were linked directly.
///
/// `complete` and `fault` are forwarded to the target only; the upstream is
/// never signalled. The adapter's completion is the upstream's completion.
pub struct RoutingAdapter<In, Out, R> {
    id: BlockId,
    this: Weak<Self>,
    upstream_id: BlockId,
    upstream: Weak<dyn Source<In>>,
    upstream_completion: Completion,
    target: Arc<dyn Target<Out>>,
    route: R,
}

impl<In, Out, R> RoutingAdapter<In, Out, R>
where
    In: Message,
    Out: Message,
    R: Route<In, Out>,
{
    /// Creates an adapter bound to `upstream` and `target`.
    ///
    /// The adapter is not linked; see [`RoutingAdapter::attach`].
    #[must_use]
    pub fn new<S>(upstream: &Arc<S>, target: Arc<dyn Target<Out>>, route: R) -> Arc<Self>
    where
        S: Source<In> + 'static,
    {
        let weak: Weak<S> = Arc::downgrade(upstream);
        let upstream_weak: Weak<dyn Source<In>> = weak;
        Arc::new_cyclic(|this| Self {
            id: BlockId::new(),
            this: this.clone(),
            upstream_id: upstream.id(),
            upstream: upstream_weak,
            upstream_completion: upstream.completion(),
            target,
            route,
        })
    }

    /// Creates an adapter and links it to `upstream`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream refuses the link.
    pub fn attach<S>(
        upstream: &Arc<S>,
        target: Arc<dyn Target<Out>>,
        route: R,
        propagate_completion: bool,
    ) -> Result<LinkHandle, FlowError>
    where
        S: Source<In> + 'static,
    {
        let adapter = Self::new(upstream, target, route);
        upstream.link_to(
            adapter,
            LinkOptions::new().with_propagate_completion(propagate_completion),
        )
    }

    /// Returns the id of the bound upstream.
    #[must_use]
    pub fn upstream_id(&self) -> BlockId {
        self.upstream_id
    }

    fn reject(&self, violation: FlowError) -> Result<MessageStatus, FlowError> {
        error!(
            adapter = %self.id,
            route = self.route.name(),
            upstream = %self.upstream_id,
            error = %violation,
            "Routing adapter contract violation"
        );
        Err(violation)
    }
}

impl<In, Out, R> DataflowBlock for RoutingAdapter<In, Out, R>
where
    In: Message,
    Out: Message,
    R: Route<In, Out>,
{
    fn id(&self) -> BlockId {
        self.id
    }

    fn completion(&self) -> Completion {
        self.upstream_completion.clone()
    }

    fn complete(&self) {
        self.target.complete();
    }

    fn fault(&self, error: FlowError) {
        self.target.fault(error);
    }
}

impl<In, Out, R> Target<In> for RoutingAdapter<In, Out, R>
where
    In: Message,
    Out: Message,
    R: Route<In, Out>,
{
    fn offer_message(
        &self,
        header: MessageHeader,
        value: &In,
        source: Option<Arc<dyn Source<In>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError> {
        if !header.is_valid() {
            return self.reject(FlowError::InvalidMessageHeader);
        }
        let Some(source) = source else {
            return self.reject(FlowError::MissingSource { target: self.id });
        };
        if source.id() != self.upstream_id {
            return self.reject(FlowError::ForeignSource {
                adapter: self.id,
                expected: self.upstream_id,
                actual: source.id(),
            });
        }

        let Some(projected) = self.route.route(value) else {
            return Ok(MessageStatus::Declined);
        };
        let Some(this) = self.this.upgrade() else {
            return Err(FlowError::Detached(self.id));
        };
        let this: Arc<dyn Source<Out>> = this;
        self.target
            .offer_message(header, &projected, Some(this), consume_to_accept)
    }
}

impl<In, Out, R> Source<Out> for RoutingAdapter<In, Out, R>
where
    In: Message,
    Out: Message,
    R: Route<In, Out>,
{
    fn link_to(
        &self,
        _target: Arc<dyn Target<Out>>,
        _options: LinkOptions<Out>,
    ) -> Result<LinkHandle, FlowError> {
        Err(FlowError::LinkNotSupported("RoutingAdapter"))
    }

    /// Consumes from the upstream and projects the envelope.
    ///
    /// The consume is committed before the route runs, so a route that takes
    /// an envelope on offer must take it again here.
    fn consume_message(&self, header: MessageHeader, _target: BlockId) -> Option<Out> {
        let upstream = self.upstream.upgrade()?;
        let envelope = upstream.consume_message(header, self.id)?;
        let projected = self.route.route(&envelope);
        if projected.is_none() {
            error!(
                adapter = %self.id,
                route = self.route.name(),
                header = %header,
                "Route declined an envelope it had already consumed; the message is lost"
            );
        }
        projected
    }

    fn reserve_message(&self, header: MessageHeader, _target: BlockId) -> bool {
        self.upstream
            .upgrade()
            .is_some_and(|upstream| upstream.reserve_message(header, self.id))
    }

    fn release_reservation(&self, header: MessageHeader, _target: BlockId) {
        if let Some(upstream) = self.upstream.upgrade() {
            upstream.release_reservation(header, self.id);
        }
    }
}

impl<In, Out, R> fmt::Debug for RoutingAdapter<In, Out, R>
where
    In: Message,
    Out: Message,
    R: Route<In, Out>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingAdapter")
            .field("id", &self.id)
            .field("route", &self.route.name())
            .field("upstream", &self.upstream_id)
            .field("target", &self.target.id())
            .finish()
    }
}

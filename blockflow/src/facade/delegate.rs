//! Facades presenting a wired sub-graph as one block.

use crate::core::{
    BlockId, Completion, DataflowBlock, LinkHandle, LinkOptions, Message, MessageHeader,
    MessageStatus, Source, Target,
};
use crate::errors::FlowError;
use crate::pipeline::CompletionPlan;
use std::fmt;
use std::sync::Arc;

/// A sink that forwards everything to the head of a sub-graph.
///
/// Its completion resolves once every block of the sub-graph has completed.
pub struct DelegateTarget<T> {
    head: Arc<dyn Target<T>>,
    completion: Completion,
    plan: Option<CompletionPlan>,
}

impl<T: Message> DelegateTarget<T> {
    /// Creates a new sink facade.
    #[must_use]
    pub fn new(head: Arc<dyn Target<T>>, completion: Completion) -> Self {
        Self {
            head,
            completion,
            plan: None,
        }
    }

    /// Attaches the completion plan the sub-graph was compiled with.
    #[must_use]
    pub fn with_plan(mut self, plan: CompletionPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Returns the completion plan, if the facade came from a pipeline builder.
    #[must_use]
    pub fn plan(&self) -> Option<&CompletionPlan> {
        self.plan.as_ref()
    }
}

impl<T: Message> DataflowBlock for DelegateTarget<T> {
    fn id(&self) -> BlockId {
        self.head.id()
    }

    fn completion(&self) -> Completion {
        self.completion.clone()
    }

    fn complete(&self) {
        self.head.complete();
    }

    fn fault(&self, error: FlowError) {
        self.head.fault(error);
    }
}

impl<T: Message> Target<T> for DelegateTarget<T> {
    fn offer_message(
        &self,
        header: MessageHeader,
        value: &T,
        source: Option<Arc<dyn Source<T>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError> {
        self.head.offer_message(header, value, source, consume_to_accept)
    }
}

impl<T> fmt::Debug for DelegateTarget<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateTarget")
            .field("head", &self.head.id())
            .field("completion", &self.completion)
            .finish_non_exhaustive()
    }
}

/// A propagator whose input is one block and whose output is another.
///
/// Offers go to the head; links and consumption go to the tail.
pub struct DelegatePropagator<T> {
    head: Arc<dyn Target<T>>,
    tail: Arc<dyn Source<T>>,
    completion: Completion,
    plan: Option<CompletionPlan>,
}

impl<T: Message> DelegatePropagator<T> {
    /// Creates a new propagator facade.
    #[must_use]
    pub fn new(head: Arc<dyn Target<T>>, tail: Arc<dyn Source<T>>, completion: Completion) -> Self {
        Self {
            head,
            tail,
            completion,
            plan: None,
        }
    }

    /// Attaches the completion plan the sub-graph was compiled with.
    #[must_use]
    pub fn with_plan(mut self, plan: CompletionPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Returns the completion plan, if the facade came from a pipeline builder.
    #[must_use]
    pub fn plan(&self) -> Option<&CompletionPlan> {
        self.plan.as_ref()
    }

    /// Returns the identity of the block producing this facade's output.
    #[must_use]
    pub fn tail_id(&self) -> BlockId {
        self.tail.id()
    }
}

impl<T: Message> DataflowBlock for DelegatePropagator<T> {
    fn id(&self) -> BlockId {
        self.head.id()
    }

    fn completion(&self) -> Completion {
        self.completion.clone()
    }

    fn complete(&self) {
        self.head.complete();
    }

    fn fault(&self, error: FlowError) {
        self.head.fault(error);
    }
}

impl<T: Message> Target<T> for DelegatePropagator<T> {
    fn offer_message(
        &self,
        header: MessageHeader,
        value: &T,
        source: Option<Arc<dyn Source<T>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError> {
        self.head.offer_message(header, value, source, consume_to_accept)
    }
}

impl<T: Message> Source<T> for DelegatePropagator<T> {
    fn link_to(
        &self,
        target: Arc<dyn Target<T>>,
        options: LinkOptions<T>,
    ) -> Result<LinkHandle, FlowError> {
        self.tail.link_to(target, options)
    }

    fn consume_message(&self, header: MessageHeader, target: BlockId) -> Option<T> {
        self.tail.consume_message(header, target)
    }

    fn reserve_message(&self, header: MessageHeader, target: BlockId) -> bool {
        self.tail.reserve_message(header, target)
    }

    fn release_reservation(&self, header: MessageHeader, target: BlockId) {
        self.tail.release_reservation(header, target);
    }
}

impl<T> fmt::Debug for DelegatePropagator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatePropagator")
            .field("head", &self.head.id())
            .field("tail", &self.tail.id())
            .field("completion", &self.completion)
            .finish_non_exhaustive()
    }
}

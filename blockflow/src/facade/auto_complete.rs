//! A sink facade that completes itself once drained.

use crate::core::{
    BlockId, Completion, DataflowBlock, LinkOptions, Message, MessageHeader, MessageStatus,
    Source, Target,
};
use crate::errors::FlowError;
use crate::pipeline::CompletionPlan;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// In/out counter shared by the facade and its drain tap.
struct DrainState<T> {
    head: Weak<dyn Target<T>>,
    in_flight: AtomicI64,
    drained_any: AtomicBool,
    fired: AtomicBool,
}

impl<T: Message> DrainState<T> {
    /// Removes one item from the count and completes the head the first
    /// time nothing is left in flight after something has drained.
    fn leave(&self) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining > 0 || !self.drained_any.load(Ordering::Acquire) {
            return;
        }
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(head) = self.head.upgrade() {
            debug!(head = %head.id(), "Pipeline drained, completing");
            head.complete();
        }
    }
}

/// A sink that completes its sub-graph once everything posted has come out
/// of the tail.
///
/// Completing early is possible when the pipeline drains faster than it is
/// fed: the first time the in-flight count returns to zero, the head is
/// completed and later offers are declined.
pub struct AutoCompleteTarget<T> {
    head: Arc<dyn Target<T>>,
    state: Arc<DrainState<T>>,
    completion: Completion,
    plan: Option<CompletionPlan>,
}

impl<T: Message> AutoCompleteTarget<T> {
    /// Creates a new self-completing facade and links its drain tap to `tail`.
    ///
    /// # Errors
    ///
    /// Returns an error if `tail` refuses the link.
    pub fn new<S>(
        head: Arc<dyn Target<T>>,
        tail: &Arc<S>,
        completion: Completion,
    ) -> Result<Self, FlowError>
    where
        S: Source<T> + 'static,
    {
        let state = Arc::new(DrainState {
            head: Arc::downgrade(&head),
            in_flight: AtomicI64::new(0),
            drained_any: AtomicBool::new(false),
            fired: AtomicBool::new(false),
        });
        let tap = Arc::new(DrainCounter {
            id: BlockId::new(),
            tail: tail.id(),
            state: Arc::clone(&state),
            completion: Completion::new(),
        });
        tail.link_to(tap, LinkOptions::propagate())?;
        Ok(Self {
            head,
            state,
            completion,
            plan: None,
        })
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

    /// Number of items accepted but not yet out of the tail.
    #[must_use]
    pub fn in_flight(&self) -> i64 {
        self.state.in_flight.load(Ordering::Acquire)
    }
}

impl<T: Message> DataflowBlock for AutoCompleteTarget<T> {
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

impl<T: Message> Target<T> for AutoCompleteTarget<T> {
    fn offer_message(
        &self,
        header: MessageHeader,
        value: &T,
        source: Option<Arc<dyn Source<T>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError> {
        self.state.in_flight.fetch_add(1, Ordering::AcqRel);
        let result = self.head.offer_message(header, value, source, consume_to_accept);
        if !matches!(result, Ok(MessageStatus::Accepted | MessageStatus::Postponed)) {
            self.state.leave();
        }
        result
    }
}

impl<T> fmt::Debug for AutoCompleteTarget<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoCompleteTarget")
            .field("head", &self.head.id())
            .field("in_flight", &self.state.in_flight.load(Ordering::Relaxed))
            .field("completion", &self.completion)
            .finish_non_exhaustive()
    }
}

/// Linked to the tail; takes every item leaving the pipeline and counts it out.
struct DrainCounter<T> {
    id: BlockId,
    tail: BlockId,
    state: Arc<DrainState<T>>,
    completion: Completion,
}

impl<T: Message> DataflowBlock for DrainCounter<T> {
    fn id(&self) -> BlockId {
        self.id
    }

    fn completion(&self) -> Completion {
        self.completion.clone()
    }

    fn complete(&self) {
        self.completion.resolve(Ok(()));
    }

    fn fault(&self, error: FlowError) {
        self.completion.resolve(Err(error));
    }
}

impl<T: Message> Target<T> for DrainCounter<T> {
    fn offer_message(
        &self,
        header: MessageHeader,
        _value: &T,
        source: Option<Arc<dyn Source<T>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError> {
        if !header.is_valid() {
            return Err(FlowError::InvalidMessageHeader);
        }
        let source = source.ok_or(FlowError::MissingSource { target: self.id })?;
        if source.id() != self.tail {
            return Err(FlowError::ForeignSource {
                adapter: self.id,
                expected: self.tail,
                actual: source.id(),
            });
        }
        if consume_to_accept && source.consume_message(header, self.id).is_none() {
            return Ok(MessageStatus::NotAvailable);
        }
        self.state.drained_any.store(true, Ordering::Release);
        self.state.leave();
        Ok(MessageStatus::Accepted)
    }
}

//! The message protocol every block speaks.

use crate::core::{BlockId, Completion, MessageHeader, MessageStatus};
use crate::errors::FlowError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A shared predicate over messages.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Bounds every message type must satisfy.
pub trait Message: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Message for T {}

/// Lifecycle shared by every block.
pub trait DataflowBlock: Send + Sync {
    /// Returns the block identity.
    fn id(&self) -> BlockId;

    /// Returns the block's completion signal.
    fn completion(&self) -> Completion;

    /// Signals that no more messages will be offered.
    fn complete(&self);

    /// Faults the block, dropping buffered messages.
    fn fault(&self, error: FlowError);
}

/// A block that accepts offered messages.
pub trait Target<T>: DataflowBlock {
    /// Offers a message.
    ///
    /// With `consume_to_accept` the target must call back into `source` to
    /// take the message. A `Postponed` answer obliges the target to later
    /// consume or release the message through `source`.
    ///
    /// # Errors
    ///
    /// Returns an error when the offer breaks the protocol contract.
    fn offer_message(
        &self,
        header: MessageHeader,
        value: &T,
        source: Option<Arc<dyn Source<T>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError>;
}

/// A block that offers messages to linked targets.
pub trait Source<T>: DataflowBlock {
    /// Links a target. Links are offered messages in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the block does not support linking.
    fn link_to(
        &self,
        target: Arc<dyn Target<T>>,
        options: LinkOptions<T>,
    ) -> Result<LinkHandle, FlowError>;

    /// Takes a previously offered message.
    fn consume_message(&self, header: MessageHeader, target: BlockId) -> Option<T>;

    /// Reserves a previously offered message for `target`.
    fn reserve_message(&self, header: MessageHeader, target: BlockId) -> bool;

    /// Releases a reservation or a postponement held by `target`.
    fn release_reservation(&self, header: MessageHeader, target: BlockId);
}

/// A block that is both a target of `I` and a source of `O`.
pub trait Propagator<I, O>: Target<I> + Source<O> {}

impl<I, O, B> Propagator<I, O> for B where B: Target<I> + Source<O> + ?Sized {}

/// Options for a link between a source and a target.
pub struct LinkOptions<T> {
    /// Complete (or fault) the target when the source completes.
    pub propagate_completion: bool,
    /// Only offer messages that satisfy this predicate.
    pub filter: Option<Predicate<T>>,
}

impl<T> LinkOptions<T> {
    /// Creates options with no filter and no completion propagation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            propagate_completion: false,
            filter: None,
        }
    }

    /// Creates options that propagate completion.
    #[must_use]
    pub fn propagate() -> Self {
        Self {
            propagate_completion: true,
            filter: None,
        }
    }

    /// Sets completion propagation.
    #[must_use]
    pub fn with_propagate_completion(mut self, propagate: bool) -> Self {
        self.propagate_completion = propagate;
        self
    }

    /// Sets the filter predicate.
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Sets a shared filter predicate.
    #[must_use]
    pub fn with_predicate(mut self, filter: Option<Predicate<T>>) -> Self {
        self.filter = filter;
        self
    }
}

impl<T> Default for LinkOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for LinkOptions<T> {
    fn clone(&self) -> Self {
        Self {
            propagate_completion: self.propagate_completion,
            filter: self.filter.clone(),
        }
    }
}

impl<T> fmt::Debug for LinkOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkOptions")
            .field("propagate_completion", &self.propagate_completion)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// Handle to an established link. Dropping it keeps the link.
pub struct LinkHandle {
    unlink: Option<Box<dyn FnOnce() + Send>>,
}

impl LinkHandle {
    pub(crate) fn new(unlink: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unlink: Some(Box::new(unlink)),
        }
    }

    /// A handle for a link that cannot be removed.
    #[must_use]
    pub fn detached() -> Self {
        Self { unlink: None }
    }

    /// Removes the link.
    pub fn unlink(mut self) {
        if let Some(unlink) = self.unlink.take() {
            unlink();
        }
    }
}

impl fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle")
            .field("removable", &self.unlink.is_some())
            .finish()
    }
}

/// Convenience methods for feeding a target from outside the graph.
#[async_trait]
pub trait TargetExt<T: Message> {
    /// Offers `item` once without a source. Returns whether it was accepted.
    fn post(&self, item: T) -> bool;

    /// Offers `item` until it is accepted, yielding between attempts.
    ///
    /// # Errors
    ///
    /// Returns an error if the target completes or rejects the offer.
    async fn send(&self, item: T) -> Result<(), FlowError>;
}

#[async_trait]
impl<T, B> TargetExt<T> for B
where
    T: Message,
    B: Target<T> + ?Sized,
{
    fn post(&self, item: T) -> bool {
        matches!(
            self.offer_message(MessageHeader::next(), &item, None, false),
            Ok(MessageStatus::Accepted)
        )
    }

    async fn send(&self, item: T) -> Result<(), FlowError> {
        loop {
            match self.offer_message(MessageHeader::next(), &item, None, false)? {
                MessageStatus::Accepted => return Ok(()),
                MessageStatus::DecliningPermanently => {
                    return Err(FlowError::TargetCompleted(self.id()));
                }
                MessageStatus::Declined | MessageStatus::Postponed | MessageStatus::NotAvailable => {
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

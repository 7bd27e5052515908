//! Propagator blocks: `TransformBlock` and `BufferBlock`.

use super::source_core::SourceCore;
use super::target_core::{Job, TargetCore, TargetHooks};
use crate::core::{
    BlockId, BlockOptions, Completion, DataflowBlock, LinkHandle, LinkOptions, Message,
    MessageHeader, MessageStatus, Source, Target,
};
use crate::errors::FlowError;
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Weak};

/// Runs an async function on every message and offers each result downstream.
pub struct TransformBlock<I, O> {
    id: BlockId,
    input: Arc<TargetCore<I>>,
    output: Arc<SourceCore<O>>,
}

impl<I: Message, O: Message> TransformBlock<I, O> {
    /// Creates a transform block from an async function.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid.
    pub fn new<F, Fut>(transform: F, options: BlockOptions) -> Result<Arc<Self>, FlowError>
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        options.validate()?;
        let transform = Arc::new(transform);
        Ok(Arc::new_cyclic(|this: &Weak<Self>| {
            let id = BlockId::new();
            let owner: Weak<dyn Source<O>> = this.clone();
            let name = options.name_or("transform").to_string();
            let output = Arc::new(SourceCore::new(id, name, owner));

            let sink = Arc::clone(&output);
            let job: Job<I> = Arc::new(move |item: I| {
                let transform = Arc::clone(&transform);
                let sink = Arc::clone(&sink);
                async move {
                    let value = transform(item).await;
                    sink.push(value);
                }
                .boxed()
            });

            let drained = Arc::clone(&output);
            let faulted = Arc::clone(&output);
            let hooks = TargetHooks {
                on_drained: Box::new(move || drained.input_completed()),
                on_fault: Box::new(move |e| faulted.fault(e)),
            };
            let input = Arc::new(TargetCore::new(id, options, job, hooks));
            Self { id, input, output }
        }))
    }

    /// Creates a transform block from a synchronous function.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid.
    pub fn from_fn<F>(transform: F, options: BlockOptions) -> Result<Arc<Self>, FlowError>
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);
        Self::new(
            move |item| {
                let transform = Arc::clone(&transform);
                async move { transform(item) }
            },
            options,
        )
    }

    /// Number of accepted messages not yet transformed.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.input.pending()
    }

    /// Number of results waiting to be taken downstream.
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.output.len()
    }
}

impl<I: Message, O: Message> DataflowBlock for TransformBlock<I, O> {
    fn id(&self) -> BlockId {
        self.id
    }

    fn completion(&self) -> Completion {
        self.output.completion()
    }

    fn complete(&self) {
        self.input.complete();
    }

    fn fault(&self, error: FlowError) {
        self.input.fault(error);
    }
}

impl<I: Message, O: Message> Target<I> for TransformBlock<I, O> {
    fn offer_message(
        &self,
        header: MessageHeader,
        value: &I,
        source: Option<Arc<dyn Source<I>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError> {
        self.input.offer(header, value, source, consume_to_accept)
    }
}

impl<I: Message, O: Message> Source<O> for TransformBlock<I, O> {
    fn link_to(
        &self,
        target: Arc<dyn Target<O>>,
        options: LinkOptions<O>,
    ) -> Result<LinkHandle, FlowError> {
        Ok(self.output.link(target, options))
    }

    fn consume_message(&self, header: MessageHeader, target: BlockId) -> Option<O> {
        self.output.consume(header, target)
    }

    fn reserve_message(&self, header: MessageHeader, target: BlockId) -> bool {
        self.output.reserve(header, target)
    }

    fn release_reservation(&self, header: MessageHeader, target: BlockId) {
        self.output.release(header, target);
    }
}

impl<I: Message, O: Message> std::fmt::Debug for TransformBlock<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformBlock")
            .field("id", &self.id)
            .field("name", &self.input.name())
            .finish_non_exhaustive()
    }
}

/// Passes messages through unchanged, buffering them until a linked target takes them.
pub struct BufferBlock<T> {
    inner: Arc<TransformBlock<T, T>>,
}

impl<T: Message> BufferBlock<T> {
    /// Creates a buffer block.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid.
    pub fn new(options: BlockOptions) -> Result<Arc<Self>, FlowError> {
        let options = BlockOptions {
            name: Some(options.name_or("buffer").to_string()),
            ..options
        };
        let inner = TransformBlock::from_fn(|item| item, options)?;
        Ok(Arc::new(Self { inner }))
    }

    /// Number of messages held by the buffer.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.input_count() + self.inner.output_count()
    }
}

impl<T: Message> DataflowBlock for BufferBlock<T> {
    fn id(&self) -> BlockId {
        self.inner.id()
    }

    fn completion(&self) -> Completion {
        self.inner.completion()
    }

    fn complete(&self) {
        self.inner.complete();
    }

    fn fault(&self, error: FlowError) {
        self.inner.fault(error);
    }
}

impl<T: Message> Target<T> for BufferBlock<T> {
    fn offer_message(
        &self,
        header: MessageHeader,
        value: &T,
        source: Option<Arc<dyn Source<T>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError> {
        self.inner.offer_message(header, value, source, consume_to_accept)
    }
}

impl<T: Message> Source<T> for BufferBlock<T> {
    fn link_to(
        &self,
        target: Arc<dyn Target<T>>,
        options: LinkOptions<T>,
    ) -> Result<LinkHandle, FlowError> {
        self.inner.link_to(target, options)
    }

    fn consume_message(&self, header: MessageHeader, target: BlockId) -> Option<T> {
        self.inner.consume_message(header, target)
    }

    fn reserve_message(&self, header: MessageHeader, target: BlockId) -> bool {
        self.inner.reserve_message(header, target)
    }

    fn release_reservation(&self, header: MessageHeader, target: BlockId) {
        self.inner.release_reservation(header, target);
    }
}

impl<T> std::fmt::Debug for BufferBlock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferBlock").field("id", &self.inner.id).finish()
    }
}

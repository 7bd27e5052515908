//! `BatchBlock`: groups messages into fixed-size vectors.

use super::source_core::SourceCore;
use super::target_core::{Job, TargetCore, TargetHooks};
use crate::core::{
    BlockId, BlockOptions, Completion, DataflowBlock, LinkHandle, LinkOptions, Message,
    MessageHeader, MessageStatus, Source, Target,
};
use crate::errors::FlowError;
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Collects `batch_size` messages and offers them as one `Vec`.
///
/// A partial batch is flushed when the block completes.
pub struct BatchBlock<T> {
    id: BlockId,
    batch_size: usize,
    input: Arc<TargetCore<T>>,
    output: Arc<SourceCore<Vec<T>>>,
}

impl<T: Message> BatchBlock<T> {
    /// Creates a batch block using `options.batch_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid.
    pub fn new(options: BlockOptions) -> Result<Arc<Self>, FlowError> {
        options.validate()?;
        let batch_size = options.batch_size;
        Ok(Arc::new_cyclic(|this: &Weak<Self>| {
            let id = BlockId::new();
            let owner: Weak<dyn Source<Vec<T>>> = this.clone();
            let output = Arc::new(SourceCore::new(
                id,
                options.name_or("batch").to_string(),
                owner,
            ));
            let pending = Arc::new(Mutex::new(Vec::with_capacity(batch_size)));

            let sink = Arc::clone(&output);
            let collecting = Arc::clone(&pending);
            let job: Job<T> = Arc::new(move |item: T| {
                let full = {
                    let mut pending = collecting.lock();
                    pending.push(item);
                    (pending.len() >= batch_size).then(|| std::mem::take(&mut *pending))
                };
                if let Some(batch) = full {
                    sink.push(batch);
                }
                futures::future::ready(()).boxed()
            });

            let drained = Arc::clone(&output);
            let faulted = Arc::clone(&output);
            let hooks = TargetHooks {
                on_drained: Box::new(move || {
                    let rest = std::mem::take(&mut *pending.lock());
                    if !rest.is_empty() {
                        drained.push(rest);
                    }
                    drained.input_completed();
                }),
                on_fault: Box::new(move |e| faulted.fault(e)),
            };
            let input = Arc::new(TargetCore::new(id, options, job, hooks));
            Self {
                id,
                batch_size,
                input,
                output,
            }
        }))
    }

    /// Returns the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<T: Message> DataflowBlock for BatchBlock<T> {
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

impl<T: Message> Target<T> for BatchBlock<T> {
    fn offer_message(
        &self,
        header: MessageHeader,
        value: &T,
        source: Option<Arc<dyn Source<T>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError> {
        self.input.offer(header, value, source, consume_to_accept)
    }
}

impl<T: Message> Source<Vec<T>> for BatchBlock<T> {
    fn link_to(
        &self,
        target: Arc<dyn Target<Vec<T>>>,
        options: LinkOptions<Vec<T>>,
    ) -> Result<LinkHandle, FlowError> {
        Ok(self.output.link(target, options))
    }

    fn consume_message(&self, header: MessageHeader, target: BlockId) -> Option<Vec<T>> {
        self.output.consume(header, target)
    }

    fn reserve_message(&self, header: MessageHeader, target: BlockId) -> bool {
        self.output.reserve(header, target)
    }

    fn release_reservation(&self, header: MessageHeader, target: BlockId) {
        self.output.release(header, target);
    }
}

impl<T> std::fmt::Debug for BatchBlock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchBlock")
            .field("id", &self.id)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TargetExt;
    use crate::testing::{assert_completes, CollectingTarget};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_batches_and_flushes_remainder() {
        let batch = BatchBlock::new(BlockOptions::new().with_batch_size(3)).unwrap();
        let sink = CollectingTarget::new();
        batch.link_to(sink.clone(), LinkOptions::propagate()).unwrap();

        for i in 0..7 {
            assert!(batch.post(i));
        }
        batch.complete();
        assert_completes(&sink.completion()).await;

        assert_eq!(sink.items(), vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }

    #[tokio::test]
    async fn test_empty_batch_block_completes() {
        let batch = BatchBlock::<u8>::new(BlockOptions::new().with_batch_size(2)).unwrap();
        let sink = CollectingTarget::new();
        batch.link_to(sink.clone(), LinkOptions::propagate()).unwrap();
        batch.complete();
        assert_completes(&sink.completion()).await;
        assert!(sink.items().is_empty());
        assert_eq!(batch.batch_size(), 2);
    }
}

//! Sink blocks: `ActionBlock` and `NullTarget`.

use super::target_core::{Job, TargetCore, TargetHooks};
use crate::core::{
    BlockId, BlockOptions, Completion, DataflowBlock, Message, MessageHeader, MessageStatus,
    Source, Target,
};
use crate::errors::FlowError;
use futures::FutureExt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Runs an async function on every message.
pub struct ActionBlock<T> {
    id: BlockId,
    input: Arc<TargetCore<T>>,
    completion: Completion,
}

impl<T: Message> ActionBlock<T> {
    /// Creates an action block from an async function.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid.
    pub fn new<F, Fut>(action: F, options: BlockOptions) -> Result<Arc<Self>, FlowError>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        options.validate()?;
        Ok(Self::build(action, options))
    }

    /// Creates an action block from options already known to be valid.
    pub(crate) fn build<F, Fut>(action: F, options: BlockOptions) -> Arc<Self>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = BlockId::new();
        let action = Arc::new(action);
        let job: Job<T> = Arc::new(move |item: T| action(item).boxed());

        let completion = Completion::new();
        let drained = completion.clone();
        let faulted = completion.clone();
        let hooks = TargetHooks {
            on_drained: Box::new(move || {
                drained.resolve(Ok(()));
            }),
            on_fault: Box::new(move |e| {
                faulted.resolve(Err(e));
            }),
        };
        let options = BlockOptions {
            name: Some(options.name_or("action").to_string()),
            ..options
        };
        Arc::new(Self {
            id,
            input: Arc::new(TargetCore::new(id, options, job, hooks)),
            completion,
        })
    }

    /// Creates an action block from a synchronous function.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid.
    pub fn from_fn<F>(action: F, options: BlockOptions) -> Result<Arc<Self>, FlowError>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        Self::new(
            move |item| {
                action(item);
                futures::future::ready(())
            },
            options,
        )
    }

    /// Number of accepted messages not yet processed.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.input.pending()
    }
}

impl<T: Message> DataflowBlock for ActionBlock<T> {
    fn id(&self) -> BlockId {
        self.id
    }

    fn completion(&self) -> Completion {
        self.completion.clone()
    }

    fn complete(&self) {
        self.input.complete();
    }

    fn fault(&self, error: FlowError) {
        self.input.fault(error);
    }
}

impl<T: Message> Target<T> for ActionBlock<T> {
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

impl<T: Message> std::fmt::Debug for ActionBlock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionBlock")
            .field("id", &self.id)
            .field("name", &self.input.name())
            .field("completion", &self.completion)
            .finish()
    }
}

/// Accepts every message and drops it.
pub struct NullTarget<T> {
    id: BlockId,
    completion: Completion,
    _marker: PhantomData<fn(T)>,
}

impl<T: Message> NullTarget<T> {
    /// Creates a discarding target.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: BlockId::new(),
            completion: Completion::new(),
            _marker: PhantomData,
        })
    }
}

impl<T: Message> DataflowBlock for NullTarget<T> {
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

impl<T: Message> Target<T> for NullTarget<T> {
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
        if self.completion.is_completed() {
            return Ok(MessageStatus::DecliningPermanently);
        }
        if consume_to_accept {
            let source = source.ok_or(FlowError::MissingSource { target: self.id })?;
            if source.consume_message(header, self.id).is_none() {
                return Ok(MessageStatus::NotAvailable);
            }
        }
        Ok(MessageStatus::Accepted)
    }
}

impl<T> std::fmt::Debug for NullTarget<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NullTarget").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TargetExt;
    use crate::testing::assert_completes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_action_runs_every_message() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let block = ActionBlock::from_fn(
            move |x: usize| {
                c.fetch_add(x, Ordering::SeqCst);
            },
            BlockOptions::default(),
        )
        .unwrap();

        for i in 1..=4 {
            assert!(block.post(i));
        }
        block.complete();
        assert_completes(&block.completion()).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_late_item_starts_while_first_is_running() {
        let first_started = Arc::new(tokio::sync::Notify::new());
        let second_started = Arc::new(tokio::sync::Notify::new());
        let (first, second) = (first_started.clone(), second_started.clone());
        let block = ActionBlock::new(
            move |x: u32| {
                let first = first.clone();
                let second = second.clone();
                async move {
                    if x == 1 {
                        first.notify_one();
                        second.notified().await;
                    } else {
                        second.notify_one();
                    }
                }
            },
            BlockOptions::new().with_max_degree_of_parallelism(2),
        )
        .unwrap();

        assert!(block.post(1));
        tokio::time::timeout(Duration::from_secs(2), first_started.notified())
            .await
            .expect("first item never started");
        assert!(block.post(2));
        block.complete();
        tokio::time::timeout(Duration::from_secs(2), block.completion().wait())
            .await
            .expect("second item did not start while the first was running")
            .unwrap();
    }

    #[tokio::test]
    async fn test_complete_without_messages() {
        let block = ActionBlock::from_fn(|_: i32| {}, BlockOptions::default()).unwrap();
        block.complete();
        assert_completes(&block.completion()).await;
    }

    #[tokio::test]
    async fn test_fault_resolves_with_error() {
        let block = ActionBlock::from_fn(|_: i32| {}, BlockOptions::default()).unwrap();
        block.fault(FlowError::faulted(anyhow::anyhow!("stop")));
        assert!(block.completion().wait().await.is_err());
        assert_eq!(
            block.offer_message(MessageHeader::next(), &1, None, false).unwrap(),
            MessageStatus::DecliningPermanently
        );
    }

    #[tokio::test]
    async fn test_bounded_action_declines_posts_when_full() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let held = gate.clone();
        let block = ActionBlock::new(
            move |_: i32| {
                let held = held.clone();
                async move { held.notified().await }
            },
            BlockOptions::new().with_bounded_capacity(1),
        )
        .unwrap();

        assert!(block.post(1));
        assert!(!block.post(2));
        gate.notify_one();
        block.complete();
        assert_completes(&block.completion()).await;
    }

    #[test]
    fn test_null_target_accepts_until_complete() {
        let target = NullTarget::<i32>::new();
        assert!(target.post(1));
        target.complete();
        assert!(!target.post(2));
        assert!(target.completion().is_completed());
    }
}

//! Recording targets and delegates.

use crate::core::{
    BlockId, BlockOptions, Completion, DataflowBlock, Message, MessageHeader, MessageStatus,
    Source, Target,
};
use crate::delegates::{ActionDelegate, ErrorDelegate};
use crate::engine::ActionBlock;
use crate::errors::{FlowError, StageFailure};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A sink that keeps every message it receives, in arrival order.
pub struct CollectingTarget<T> {
    items: Arc<Mutex<Vec<T>>>,
    inner: Arc<ActionBlock<T>>,
}

impl<T: Message> CollectingTarget<T> {
    /// Creates a new collecting target.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let items = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&items);
        let inner = ActionBlock::build(
            move |item: T| {
                sink.lock().push(item);
                futures::future::ready(())
            },
            BlockOptions::new().with_name("collector"),
        );
        Arc::new(Self { items, inner })
    }

    /// Returns a copy of everything received so far.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    /// Returns the number of messages received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns whether nothing has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T: Message> DataflowBlock for CollectingTarget<T> {
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

impl<T: Message> Target<T> for CollectingTarget<T> {
    fn offer_message(
        &self,
        header: MessageHeader,
        value: &T,
        source: Option<Arc<dyn Source<T>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError> {
        self.inner
            .offer_message(header, value, source, consume_to_accept)
    }
}

impl<T> std::fmt::Debug for CollectingTarget<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectingTarget")
            .field("received", &self.items.lock().len())
            .finish_non_exhaustive()
    }
}

/// Records every `(input, failure)` pair handed to an error handler.
pub struct ErrorRecorder<T> {
    records: Arc<Mutex<Vec<(T, StageFailure)>>>,
}

impl<T: Message> ErrorRecorder<T> {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns an error delegate that records into this recorder.
    #[must_use]
    pub fn delegate(&self) -> ErrorDelegate<T> {
        let records = Arc::clone(&self.records);
        ErrorDelegate::from_fn(move |item: &T, error: &StageFailure| {
            records.lock().push((item.clone(), error.clone()));
            Ok(())
        })
    }

    /// Returns the recorded inputs.
    #[must_use]
    pub fn inputs(&self) -> Vec<T> {
        self.records.lock().iter().map(|(item, _)| item.clone()).collect()
    }

    /// Returns the recorded failure messages.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|(_, error)| error.to_string()).collect()
    }

    /// Returns the number of handled failures.
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.lock().len()
    }
}

impl<T: Message> Default for ErrorRecorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ErrorRecorder<T> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<T> std::fmt::Debug for ErrorRecorder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRecorder")
            .field("count", &self.records.lock().len())
            .finish()
    }
}

/// An action delegate that records what it sees and can be told to fail.
pub struct RecordingAction<T> {
    seen: Arc<Mutex<Vec<T>>>,
    calls: Arc<AtomicUsize>,
}

impl<T: Message> RecordingAction<T> {
    /// Creates an empty recording action.
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a delegate that records and always succeeds.
    #[must_use]
    pub fn delegate(&self) -> ActionDelegate<T> {
        self.failing_when(|_| false)
    }

    /// Returns a delegate that records, then fails for items matching `predicate`.
    #[must_use]
    pub fn failing_when<F>(&self, predicate: F) -> ActionDelegate<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let seen = Arc::clone(&self.seen);
        let calls = Arc::clone(&self.calls);
        ActionDelegate::from_fn(move |item: &T| {
            calls.fetch_add(1, Ordering::SeqCst);
            seen.lock().push(item.clone());
            anyhow::ensure!(!predicate(item), "recording action rejected the item");
            Ok(())
        })
    }

    /// Returns the items seen so far, in invocation order.
    #[must_use]
    pub fn seen(&self) -> Vec<T> {
        self.seen.lock().clone()
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T: Message> Default for RecordingAction<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RecordingAction<T> {
    fn clone(&self) -> Self {
        Self {
            seen: Arc::clone(&self.seen),
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T> std::fmt::Debug for RecordingAction<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingAction")
            .field("calls", &self.calls.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TargetExt;
    use crate::envelopes::ErrorResult;
    use crate::testing::assert_completes;

    #[tokio::test]
    async fn test_collecting_target_keeps_order() {
        let sink = CollectingTarget::<u8>::new();
        assert!(sink.is_empty());
        for i in 0..3 {
            assert!(sink.post(i));
        }
        sink.complete();
        assert_completes(&sink.completion()).await;
        assert_eq!(sink.items(), vec![0, 1, 2]);
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test]
    async fn test_error_recorder() {
        let recorder = ErrorRecorder::<i32>::new();
        let handler = recorder.delegate();
        handler
            .apply(&ErrorResult::new(4, StageFailure::msg("four")))
            .await
            .unwrap();
        assert_eq!(recorder.inputs(), vec![4]);
        assert_eq!(recorder.messages(), vec!["four".to_string()]);
        assert_eq!(recorder.clone().count(), 1);
    }

    #[tokio::test]
    async fn test_recording_action_failing_when() {
        let action = RecordingAction::<i32>::new();
        let delegate = action.failing_when(|x| *x < 0);
        assert!(delegate.apply(1).await.is_success());
        assert!(!delegate.apply(-1).await.is_success());
        assert_eq!(action.seen(), vec![1, -1]);
        assert_eq!(action.calls(), 2);
    }
}

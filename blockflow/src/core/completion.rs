//! One-shot completion signals and the join used to propagate them.

use crate::core::DataflowBlock;
use crate::errors::FlowError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// The final state of a completed block.
pub type CompletionOutcome = Result<(), FlowError>;

type CompletionCallback = Box<dyn FnOnce(&CompletionOutcome) + Send>;

enum CompletionState {
    Pending(Vec<CompletionCallback>),
    Done(CompletionOutcome),
}

struct CompletionInner {
    state: Mutex<CompletionState>,
    notify: Notify,
}

/// A cloneable handle to a block's completion.
///
/// Resolves exactly once; the first outcome wins. Callbacks registered after
/// resolution run immediately.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

impl Completion {
    /// Creates a pending completion.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                state: Mutex::new(CompletionState::Pending(Vec::new())),
                notify: Notify::new(),
            }),
        }
    }

    /// Creates a completion that has already succeeded.
    #[must_use]
    pub fn completed() -> Self {
        let completion = Self::new();
        completion.resolve(Ok(()));
        completion
    }

    /// Resolves the completion. Returns false if it was already resolved.
    pub(crate) fn resolve(&self, outcome: CompletionOutcome) -> bool {
        let callbacks = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                CompletionState::Done(_) => return false,
                CompletionState::Pending(callbacks) => {
                    let callbacks = std::mem::take(callbacks);
                    *state = CompletionState::Done(outcome.clone());
                    callbacks
                }
            }
        };
        self.inner.notify.notify_waiters();
        for callback in callbacks {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&outcome);
            })) {
                warn!("Completion callback panicked: {:?}", e);
            }
        }
        true
    }

    /// Registers a callback to run once the completion resolves.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&CompletionOutcome) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        match &mut *state {
            CompletionState::Pending(callbacks) => callbacks.push(Box::new(callback)),
            CompletionState::Done(outcome) => {
                let outcome = outcome.clone();
                drop(state);
                callback(&outcome);
            }
        }
    }

    /// Returns the outcome if resolved.
    #[must_use]
    pub fn outcome(&self) -> Option<CompletionOutcome> {
        match &*self.inner.state.lock() {
            CompletionState::Pending(_) => None,
            CompletionState::Done(outcome) => Some(outcome.clone()),
        }
    }

    /// Returns whether the completion has resolved.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(&*self.inner.state.lock(), CompletionState::Done(_))
    }

    /// Returns whether the completion resolved with a fault.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        matches!(&*self.inner.state.lock(), CompletionState::Done(Err(_)))
    }

    /// Waits for the completion to resolve.
    pub async fn wait(&self) -> CompletionOutcome {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Joins several completions into one.
    ///
    /// The joined completion resolves after every input has resolved. It
    /// carries the first fault observed, or succeeds. An empty set resolves
    /// immediately.
    #[must_use]
    pub fn when_all(completions: impl IntoIterator<Item = Self>) -> Self {
        let completions: Vec<Self> = completions.into_iter().collect();
        let joined = Self::new();
        if completions.is_empty() {
            joined.resolve(Ok(()));
            return joined;
        }

        let barrier = Arc::new(JoinBarrier {
            remaining: AtomicUsize::new(completions.len()),
            first_fault: Mutex::new(None),
        });
        for completion in completions {
            let barrier = Arc::clone(&barrier);
            let joined = joined.clone();
            completion.on_complete(move |outcome| {
                if let Err(e) = outcome {
                    barrier.first_fault.lock().get_or_insert_with(|| e.clone());
                }
                if barrier.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let outcome = barrier.first_fault.lock().take().map_or(Ok(()), Err);
                    joined.resolve(outcome);
                }
            });
        }
        joined
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .field("faulted", &self.is_faulted())
            .finish()
    }
}

struct JoinBarrier {
    remaining: AtomicUsize,
    first_fault: Mutex<Option<FlowError>>,
}

/// Completes `block` once every completion in `upstream` has resolved.
///
/// Upstream faults do not fault the block; it is completed normally so it can
/// drain what it already holds.
pub fn propagate_completion_to<B>(block: Arc<B>, upstream: impl IntoIterator<Item = Completion>)
where
    B: DataflowBlock + ?Sized + 'static,
{
    Completion::when_all(upstream).on_complete(move |outcome| {
        if let Err(e) = outcome {
            debug!(block = %block.id(), error = %e, "Upstream faulted, completing dependant");
        }
        block.complete();
    });
}

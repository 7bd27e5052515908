//! Input side of a block: bounded queue, postponement and the worker task.

use crate::core::{BlockId, BlockOptions, Message, MessageHeader, MessageStatus, Source};
use crate::errors::{FlowError, StageFailure};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Processes one accepted message, forwarding any result itself.
pub(crate) type Job<I> = Arc<dyn Fn(I) -> BoxFuture<'static, ()> + Send + Sync>;

/// What the owning block does when its input side finishes.
pub(crate) struct TargetHooks {
    /// Called once after `complete()` when every accepted message is processed.
    pub on_drained: Box<dyn Fn() + Send + Sync>,
    /// Called once when the input side faults.
    pub on_fault: Box<dyn Fn(FlowError) + Send + Sync>,
}

struct PostponedOffer<I> {
    header: MessageHeader,
    source: Arc<dyn Source<I>>,
}

struct TargetState<I> {
    queue: VecDeque<I>,
    in_flight: usize,
    postponed: VecDeque<PostponedOffer<I>>,
    declining: bool,
    worker_running: bool,
    finished: bool,
}

pub(crate) struct TargetCore<I> {
    id: BlockId,
    name: String,
    options: BlockOptions,
    job: Job<I>,
    hooks: TargetHooks,
    state: Mutex<TargetState<I>>,
    /// Wakes a running worker when new input arrives.
    wakeup: Notify,
}

impl<I: Message> TargetCore<I> {
    pub(crate) fn new(id: BlockId, options: BlockOptions, job: Job<I>, hooks: TargetHooks) -> Self {
        Self {
            id,
            name: options.name_or("block").to_string(),
            options,
            job,
            hooks,
            state: Mutex::new(TargetState {
                queue: VecDeque::new(),
                in_flight: 0,
                postponed: VecDeque::new(),
                declining: false,
                worker_running: false,
                finished: false,
            }),
            wakeup: Notify::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Number of accepted messages not yet processed.
    pub(crate) fn pending(&self) -> usize {
        let state = self.state.lock();
        state.queue.len() + state.in_flight
    }

    pub(crate) fn offer(
        self: &Arc<Self>,
        header: MessageHeader,
        value: &I,
        source: Option<Arc<dyn Source<I>>>,
        consume_to_accept: bool,
    ) -> Result<MessageStatus, FlowError> {
        if !header.is_valid() {
            return Err(FlowError::InvalidMessageHeader);
        }
        if consume_to_accept && source.is_none() {
            return Err(FlowError::MissingSource { target: self.id });
        }

        let mut state = self.state.lock();
        if state.declining {
            return Ok(MessageStatus::DecliningPermanently);
        }
        if self.is_full(&state) {
            return Ok(match source {
                Some(source) => {
                    state.postponed.push_back(PostponedOffer { header, source });
                    MessageStatus::Postponed
                }
                None => MessageStatus::Declined,
            });
        }
        if consume_to_accept {
            drop(state);
            let consumed = source.and_then(|source| source.consume_message(header, self.id));
            return Ok(match consumed {
                Some(value) => {
                    self.enqueue(value);
                    MessageStatus::Accepted
                }
                None => MessageStatus::NotAvailable,
            });
        }

        state.queue.push_back(value.clone());
        let spawn = !std::mem::replace(&mut state.worker_running, true);
        drop(state);
        self.start_or_wake(spawn);
        Ok(MessageStatus::Accepted)
    }

    pub(crate) fn complete(&self) {
        let (released, drained) = {
            let mut state = self.state.lock();
            if state.declining {
                return;
            }
            state.declining = true;
            let released: Vec<PostponedOffer<I>> = state.postponed.drain(..).collect();
            (released, Self::take_drained(&mut state))
        };
        self.release_all(released);
        if drained {
            (self.hooks.on_drained)();
        }
    }

    pub(crate) fn fault(&self, error: FlowError) {
        let released = {
            let mut state = self.state.lock();
            if state.finished {
                return;
            }
            state.declining = true;
            state.finished = true;
            state.queue.clear();
            state.postponed.drain(..).collect::<Vec<_>>()
        };
        self.release_all(released);
        (self.hooks.on_fault)(error);
    }

    fn is_full(&self, state: &TargetState<I>) -> bool {
        self.options
            .bounded_capacity
            .is_some_and(|capacity| state.queue.len() + state.in_flight >= capacity)
    }

    fn enqueue(self: &Arc<Self>, value: I) {
        let mut state = self.state.lock();
        if state.finished {
            debug!(block = %self.id, name = %self.name, "Dropping message consumed after finish");
            return;
        }
        state.queue.push_back(value);
        let spawn = !std::mem::replace(&mut state.worker_running, true);
        drop(state);
        self.start_or_wake(spawn);
    }

    fn start_or_wake(self: &Arc<Self>, spawn: bool) {
        if spawn {
            self.spawn_worker();
        } else {
            self.wakeup.notify_one();
        }
    }

    fn release_all(&self, released: Vec<PostponedOffer<I>>) {
        for offer in released {
            offer.source.release_reservation(offer.header, self.id);
        }
    }

    fn take_drained(state: &mut TargetState<I>) -> bool {
        if state.declining
            && !state.finished
            && !state.worker_running
            && state.queue.is_empty()
            && state.in_flight == 0
        {
            state.finished = true;
            return true;
        }
        false
    }

    fn spawn_worker(self: &Arc<Self>) {
        let core = Arc::clone(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(core.run());
            }
            Err(_) => {
                self.state.lock().worker_running = false;
                self.fault(FlowError::NoRuntime(self.id));
            }
        }
    }

    async fn run(self: Arc<Self>) {
        let mut running = FuturesUnordered::new();
        loop {
            let batch: Vec<I> = {
                let mut state = self.state.lock();
                let free = self
                    .options
                    .max_degree_of_parallelism
                    .saturating_sub(running.len());
                let take = free.min(state.queue.len());
                let batch: Vec<I> = state.queue.drain(..take).collect();
                state.in_flight += batch.len();
                if batch.is_empty() && running.is_empty() {
                    state.worker_running = false;
                    let drained = Self::take_drained(&mut state);
                    drop(state);
                    if drained {
                        (self.hooks.on_drained)();
                    }
                    return;
                }
                batch
            };
            for item in batch {
                running.push(AssertUnwindSafe((self.job)(item)).catch_unwind());
            }

            // New input may fill a free slot before any running job finishes.
            let finished = tokio::select! {
                result = running.next() => result,
                () = self.wakeup.notified() => None,
            };
            if let Some(result) = finished {
                {
                    let mut state = self.state.lock();
                    state.in_flight = state.in_flight.saturating_sub(1);
                }
                if let Err(panic) = result {
                    self.fault(FlowError::Faulted(StageFailure::from_panic(panic)));
                    return;
                }
                self.pull_postponed();
            }
        }
    }

    /// Consumes postponed offers while there is room.
    fn pull_postponed(self: &Arc<Self>) {
        loop {
            let next = {
                let mut state = self.state.lock();
                if state.declining || self.is_full(&state) {
                    return;
                }
                state.postponed.pop_front()
            };
            let Some(offer) = next else {
                return;
            };
            if let Some(value) = offer.source.consume_message(offer.header, self.id) {
                self.enqueue(value);
            }
        }
    }
}

//! Output side of a block: ordered offering to linked targets.

use crate::core::{
    BlockId, Completion, LinkHandle, LinkOptions, Message, MessageHeader, MessageStatus, Predicate,
    Source, Target,
};
use crate::errors::{FlowError, StageFailure};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

struct LinkEntry<T> {
    key: u64,
    target: Arc<dyn Target<T>>,
    options: LinkOptions<T>,
}

type LinkSnapshot<T> = (u64, Arc<dyn Target<T>>, Option<Predicate<T>>);

enum OfferOutcome {
    Taken,
    Postponed(BlockId),
    Untaken,
}

struct SourceState<T> {
    queue: VecDeque<(MessageHeader, T)>,
    links: Vec<LinkEntry<T>>,
    next_header: u64,
    next_link: u64,
    offering: bool,
    /// A target postponed the head message; nothing is offered until it
    /// consumes or releases it.
    waiting_on: Option<(MessageHeader, BlockId)>,
    reserved: Option<(MessageHeader, BlockId)>,
    input_done: bool,
    finished: bool,
}

/// Output queue plus the offer loop shared by every source block.
///
/// The head message is offered to links in registration order and stays at
/// the head until some link takes it.
pub(crate) struct SourceCore<T> {
    id: BlockId,
    name: String,
    owner: Weak<dyn Source<T>>,
    state: Mutex<SourceState<T>>,
    completion: Completion,
}

impl<T: Message> SourceCore<T> {
    pub(crate) fn new(id: BlockId, name: String, owner: Weak<dyn Source<T>>) -> Self {
        Self {
            id,
            name,
            owner,
            state: Mutex::new(SourceState {
                queue: VecDeque::new(),
                links: Vec::new(),
                next_header: 0,
                next_link: 0,
                offering: false,
                waiting_on: None,
                reserved: None,
                input_done: false,
                finished: false,
            }),
            completion: Completion::new(),
        }
    }

    pub(crate) fn completion(&self) -> Completion {
        self.completion.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Appends an output message.
    pub(crate) fn push(self: &Arc<Self>, value: T) {
        {
            let mut state = self.state.lock();
            if state.finished {
                debug!(block = %self.id, name = %self.name, "Dropping output of finished block");
                return;
            }
            state.next_header += 1;
            let header = MessageHeader::new(state.next_header);
            state.queue.push_back((header, value));
        }
        self.schedule_offering();
    }

    /// Marks that no more output will be pushed.
    pub(crate) fn input_completed(self: &Arc<Self>) {
        self.state.lock().input_done = true;
        self.schedule_offering();
    }

    pub(crate) fn link(
        self: &Arc<Self>,
        target: Arc<dyn Target<T>>,
        options: LinkOptions<T>,
    ) -> LinkHandle {
        let mut state = self.state.lock();
        if state.finished {
            drop(state);
            if options.propagate_completion {
                match self.completion.outcome() {
                    Some(Err(e)) => target.fault(e),
                    _ => target.complete(),
                }
            }
            return LinkHandle::detached();
        }
        state.next_link += 1;
        let key = state.next_link;
        state.links.push(LinkEntry {
            key,
            target,
            options,
        });
        drop(state);
        self.schedule_offering();

        let core = Arc::downgrade(self);
        LinkHandle::new(move || {
            if let Some(core) = core.upgrade() {
                core.state.lock().links.retain(|link| link.key != key);
            }
        })
    }

    pub(crate) fn consume(self: &Arc<Self>, header: MessageHeader, target: BlockId) -> Option<T> {
        let value = {
            let mut state = self.state.lock();
            if let Some((reserved, holder)) = state.reserved {
                if reserved != header || holder != target {
                    return None;
                }
            }
            if state.queue.front().map(|(h, _)| *h) != Some(header) {
                return None;
            }
            state.reserved = None;
            if state.waiting_on.is_some_and(|(h, _)| h == header) {
                state.waiting_on = None;
            }
            state.queue.pop_front().map(|(_, value)| value)
        };
        self.schedule_offering();
        value
    }

    pub(crate) fn reserve(&self, header: MessageHeader, target: BlockId) -> bool {
        let mut state = self.state.lock();
        if state.reserved.is_some() || state.queue.front().map(|(h, _)| *h) != Some(header) {
            return false;
        }
        state.reserved = Some((header, target));
        true
    }

    pub(crate) fn release(self: &Arc<Self>, header: MessageHeader, target: BlockId) {
        {
            let mut state = self.state.lock();
            if state.reserved == Some((header, target)) {
                state.reserved = None;
            }
            if state.waiting_on.is_some_and(|(h, _)| h == header) {
                state.waiting_on = None;
            }
        }
        self.schedule_offering();
    }

    /// Drops buffered output and resolves the completion with `error`.
    pub(crate) fn fault(&self, error: FlowError) {
        let links = {
            let mut state = self.state.lock();
            if state.finished {
                return;
            }
            state.finished = true;
            state.queue.clear();
            std::mem::take(&mut state.links)
        };
        warn!(block = %self.id, name = %self.name, error = %error, "Block faulted");
        self.completion.resolve(Err(error.clone()));
        for link in links {
            if link.options.propagate_completion {
                link.target.fault(error.clone());
            }
        }
    }

    fn schedule_offering(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.offering || state.finished {
            return;
        }
        let blocked = state.reserved.is_some() || state.waiting_on.is_some();
        if state.queue.is_empty() || blocked {
            let finished = Self::take_finished(&mut state);
            drop(state);
            self.finish(finished);
            return;
        }
        state.offering = true;
        drop(state);

        let core = Arc::clone(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { core.offer_all() });
            }
            Err(_) => core.offer_all(),
        }
    }

    fn offer_all(self: Arc<Self>) {
        let Some(owner) = self.owner.upgrade() else {
            self.state.lock().offering = false;
            self.fault(FlowError::Detached(self.id));
            return;
        };
        loop {
            let (header, value, links) = {
                let mut state = self.state.lock();
                let blocked = state.reserved.is_some() || state.waiting_on.is_some();
                match state.queue.front() {
                    Some((header, value)) if !blocked => {
                        let links: Vec<LinkSnapshot<T>> = state
                            .links
                            .iter()
                            .map(|l| (l.key, Arc::clone(&l.target), l.options.filter.clone()))
                            .collect();
                        (*header, value.clone(), links)
                    }
                    _ => {
                        state.offering = false;
                        let finished = Self::take_finished(&mut state);
                        drop(state);
                        self.finish(finished);
                        return;
                    }
                }
            };

            let (outcome, declining) = Self::offer_to_links(header, &value, &owner, &links);

            let mut state = self.state.lock();
            if !declining.is_empty() {
                state.links.retain(|link| !declining.contains(&link.key));
            }
            let still_head = state.queue.front().map(|(h, _)| *h) == Some(header);
            match outcome {
                Ok(OfferOutcome::Taken) => {
                    if still_head {
                        state.queue.pop_front();
                    }
                }
                Ok(OfferOutcome::Postponed(by)) => {
                    if still_head {
                        state.waiting_on = Some((header, by));
                    }
                }
                Ok(OfferOutcome::Untaken) => {
                    if still_head {
                        state.offering = false;
                        return;
                    }
                }
                Err(e) => {
                    state.offering = false;
                    drop(state);
                    error!(block = %self.id, name = %self.name, header = %header, error = %e, "Offer violated the protocol");
                    owner.fault(e);
                    return;
                }
            }
        }
    }

    fn offer_to_links(
        header: MessageHeader,
        value: &T,
        owner: &Arc<dyn Source<T>>,
        links: &[LinkSnapshot<T>],
    ) -> (Result<OfferOutcome, FlowError>, Vec<u64>) {
        let mut declining = Vec::new();
        for (key, target, filter) in links {
            let attempt = std::panic::catch_unwind(AssertUnwindSafe(|| {
                if let Some(filter) = filter {
                    if !filter(value) {
                        return Ok(MessageStatus::Declined);
                    }
                }
                target.offer_message(header, value, Some(Arc::clone(owner)), false)
            }));
            let status = match attempt {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => return (Err(e), declining),
                Err(panic) => {
                    return (
                        Err(FlowError::Faulted(StageFailure::from_panic(panic))),
                        declining,
                    )
                }
            };
            match status {
                MessageStatus::Accepted => return (Ok(OfferOutcome::Taken), declining),
                MessageStatus::Postponed => {
                    return (Ok(OfferOutcome::Postponed(target.id())), declining)
                }
                MessageStatus::DecliningPermanently => declining.push(*key),
                MessageStatus::Declined | MessageStatus::NotAvailable => {}
            }
        }
        (Ok(OfferOutcome::Untaken), declining)
    }

    fn take_finished(state: &mut SourceState<T>) -> Option<Vec<LinkEntry<T>>> {
        if state.finished || !state.input_done || state.offering || !state.queue.is_empty() {
            return None;
        }
        state.finished = true;
        Some(std::mem::take(&mut state.links))
    }

    fn finish(&self, finished: Option<Vec<LinkEntry<T>>>) {
        let Some(links) = finished else {
            return;
        };
        debug!(block = %self.id, name = %self.name, "Block completed");
        self.completion.resolve(Ok(()));
        for link in links {
            if link.options.propagate_completion {
                link.target.complete();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BufferBlock;
    use crate::testing::assert_faults;

    #[tokio::test]
    async fn test_offering_without_owner_faults() {
        let id = BlockId::new();
        let owner: Weak<dyn Source<i32>> = Weak::<BufferBlock<i32>>::new();
        let core = Arc::new(SourceCore::new(id, "orphan".to_string(), owner));

        core.push(1);
        let fault = assert_faults(&core.completion()).await;
        assert!(matches!(fault, FlowError::Detached(block) if block == id));
        assert_eq!(core.len(), 0);
    }
}

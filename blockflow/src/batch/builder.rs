//! Builder for a sink that batches items per shape.

use crate::core::{BlockOptions, Completion, DataflowBlock, LinkOptions, Message, Source};
use crate::delegates::{target, ActionDelegate, Narrow, StageSpec};
use crate::engine::{BatchBlock, BufferBlock, NullTarget, TransformBlock};
use crate::errors::FlowError;
use crate::facade::DelegateTarget;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds a sink over a wide message type that groups each narrower shape
/// into batches and hands every batch to its own action.
///
/// Items are offered to lanes in the order the lanes were added; the first
/// lane whose shape matches takes the item. Items matching no lane are
/// discarded. Batch action failures are logged and dropped.
pub struct BatchTargetBuilder<T> {
    buffer: Arc<BufferBlock<T>>,
    blocks: Vec<Arc<dyn DataflowBlock>>,
}

impl<T: Message> BatchTargetBuilder<T> {
    /// Creates a new builder whose input buffer uses `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid.
    pub fn new(options: BlockOptions) -> Result<Self, FlowError> {
        let options = BlockOptions {
            name: Some(options.name_or("batch.buffer").to_string()),
            ..options
        };
        Ok(Self {
            buffer: BufferBlock::new(options)?,
            blocks: Vec::new(),
        })
    }

    /// Adds a lane for the shape `S`, batching `batch_size` items per call to `action`.
    ///
    /// # Errors
    ///
    /// Returns an error if `batch_size` is zero or the action options are invalid.
    pub fn batch<S>(
        &mut self,
        batch_size: usize,
        action: impl Into<StageSpec<ActionDelegate<Vec<S>>>>,
    ) -> Result<&mut Self, FlowError>
    where
        T: Narrow<S>,
        S: Message,
    {
        let lane = self.blocks.len() / 3;
        let batch = BatchBlock::<T>::new(
            BlockOptions::new()
                .with_batch_size(batch_size)
                .with_name(format!("batch.lane[{lane}].batch")),
        )?;
        let narrow = TransformBlock::from_fn(
            |items: Vec<T>| {
                items
                    .iter()
                    .filter_map(|item| <T as Narrow<S>>::narrow(item).cloned())
                    .collect::<Vec<S>>()
            },
            BlockOptions::new().with_name(format!("batch.lane[{lane}].narrow")),
        )?;
        let mut spec = action.into();
        if spec.options.name.is_none() {
            spec.options.name = Some(format!("batch.lane[{lane}].action"));
        }
        let action = target(spec)?;

        narrow.link_to(action.clone(), LinkOptions::propagate())?;
        batch.link_to(narrow.clone(), LinkOptions::propagate())?;
        self.buffer.link_to(
            batch.clone(),
            LinkOptions::propagate()
                .with_filter(|item: &T| <T as Narrow<S>>::narrow(item).is_some()),
        )?;

        self.blocks.push(batch);
        self.blocks.push(narrow);
        self.blocks.push(action);
        Ok(self)
    }

    /// Number of lanes added so far.
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.blocks.len() / 3
    }

    /// Finishes the builder.
    ///
    /// The returned sink completes once the buffer and every lane have drained.
    ///
    /// # Errors
    ///
    /// Returns an error if the discard link cannot be added.
    pub fn build(self) -> Result<Arc<DelegateTarget<T>>, FlowError> {
        self.buffer.link_to(NullTarget::<T>::new(), LinkOptions::new())?;

        let completion = Completion::when_all(
            std::iter::once(self.buffer.completion())
                .chain(self.blocks.iter().map(|block| block.completion())),
        );
        debug!(lanes = self.lane_count(), "Built batch target");

        // Lane blocks are otherwise owned only by upstream links, which are
        // dropped as each upstream finishes.
        let lanes = self.blocks;
        completion.on_complete(move |_| drop(lanes));
        Ok(Arc::new(DelegateTarget::new(self.buffer, completion)))
    }
}

impl<T> fmt::Debug for BatchTargetBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchTargetBuilder")
            .field("lanes", &(self.blocks.len() / 3))
            .finish_non_exhaustive()
    }
}

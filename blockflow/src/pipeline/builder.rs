//! Pipeline builder with validation.

use super::branch::WhenBuilder;
use super::compile::{compile, PipelineConfig, QueueFailureRoute};
use crate::core::{BlockOptions, Message, Predicate};
use crate::delegates::{propagator_silent, target, ActionDelegate, ErrorDelegate, StageSpec};
use crate::engine::{NullTarget, TransformBlock};
use crate::errors::FlowError;
use crate::facade::{AutoCompleteTarget, DelegatePropagator, DelegateTarget};
use crate::observability::pipeline_span;
use std::fmt;
use std::sync::Arc;

/// Builder for composed pipelines.
///
/// Stages are configured with the `use_*` methods and compiled by one of the
/// `build_*` methods. Every setter validates its input immediately. A
/// successful build resets the configuration, so the same builder can
/// produce further, fully independent pipelines.
pub struct PipelineBuilder<T> {
    name: String,
    config: PipelineConfig<T>,
}

impl<T: Message> PipelineBuilder<T> {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: PipelineConfig::default(),
        }
    }

    /// Sets the queue stage. Defaults to a pass-through buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage options are invalid.
    pub fn use_queue(
        &mut self,
        queue: impl Into<StageSpec<ActionDelegate<T>>>,
    ) -> Result<&mut Self, FlowError> {
        self.config.queue = Some(validated(queue.into())?);
        Ok(self)
    }

    /// Sets the main action. Defaults to a pass-through.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage options are invalid.
    pub fn use_action(
        &mut self,
        action: impl Into<StageSpec<ActionDelegate<T>>>,
    ) -> Result<&mut Self, FlowError> {
        self.config.action = Some(validated(action.into())?);
        Ok(self)
    }

    /// Adds a conditional branch for items satisfying `predicate`.
    ///
    /// Branches are tried in the order they are added; the first whose
    /// predicate holds takes the item. Items matching none go to the main
    /// action.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `configure` never sets an action,
    /// sets only one of the enter gate and exit stage, or gives a stage
    /// invalid options.
    pub fn use_when<P, C>(&mut self, predicate: P, configure: C) -> Result<&mut Self, FlowError>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
        C: FnOnce(&mut WhenBuilder<T>),
    {
        let mut when = WhenBuilder::new();
        configure(&mut when);
        let predicate: Predicate<T> = Arc::new(predicate);
        let branch = when.into_branch(predicate, self.config.branches.len())?;
        branch.action().options.validate()?;
        if let Some(gate) = branch.gate() {
            gate.enter.options.validate()?;
            gate.exit.options.validate()?;
        }
        self.config.branches.push(branch);
        Ok(self)
    }

    /// Sets the shared error handler.
    ///
    /// Defaults to dropping the failure and passing the item on to the
    /// completion stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage options are invalid.
    pub fn use_exception_handler(
        &mut self,
        handler: impl Into<StageSpec<ErrorDelegate<T>>>,
    ) -> Result<&mut Self, FlowError> {
        self.config.error_handler = Some(validated(handler.into())?);
        Ok(self)
    }

    /// Sets the completion stage that every item finally reaches.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage options are invalid.
    pub fn use_completion(
        &mut self,
        completion: impl Into<StageSpec<ActionDelegate<T>>>,
    ) -> Result<&mut Self, FlowError> {
        self.config.completion = Some(validated(completion.into())?);
        Ok(self)
    }

    /// Chooses where failures of a configured queue stage go.
    pub fn queue_failures(&mut self, route: QueueFailureRoute) -> &mut Self {
        self.config.queue_failures = route;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of configured branches.
    #[must_use]
    pub fn branch_count(&self) -> usize {
        self.config.branches.len()
    }

    /// Compiles the pipeline into a sink.
    ///
    /// # Errors
    ///
    /// Returns an error if a block cannot be created or the graph has a cycle.
    pub fn build_target(&mut self) -> Result<Arc<DelegateTarget<T>>, FlowError> {
        let _span = pipeline_span(&self.name, "target").entered();
        let compiled = match &self.config.completion {
            Some(spec) => {
                let end = target(self.end_spec(spec.clone()))?;
                compile(&self.name, &self.config, &end)?
            }
            None => compile(&self.name, &self.config, &NullTarget::<T>::new())?,
        };
        self.reset();
        Ok(Arc::new(
            DelegateTarget::new(compiled.head, compiled.completion).with_plan(compiled.plan),
        ))
    }

    /// Compiles the pipeline into a propagator whose output is the completion stage's output.
    ///
    /// # Errors
    ///
    /// Returns an error if a block cannot be created or the graph has a cycle.
    pub fn build_propagator(&mut self) -> Result<Arc<DelegatePropagator<T>>, FlowError> {
        let _span = pipeline_span(&self.name, "propagator").entered();
        let end = self.end_propagator()?;
        let compiled = compile(&self.name, &self.config, &end)?;
        self.reset();
        Ok(Arc::new(
            DelegatePropagator::new(compiled.head, end, compiled.completion)
                .with_plan(compiled.plan),
        ))
    }

    /// Compiles the pipeline into a sink that completes itself once everything
    /// posted to it has drained.
    ///
    /// # Errors
    ///
    /// Returns an error if a block cannot be created, linking fails, or the graph has a cycle.
    pub fn build_auto_complete_target(&mut self) -> Result<Arc<AutoCompleteTarget<T>>, FlowError> {
        let _span = pipeline_span(&self.name, "auto_complete").entered();
        let end = self.end_propagator()?;
        let compiled = compile(&self.name, &self.config, &end)?;
        let facade = AutoCompleteTarget::new(compiled.head, &end, compiled.completion)?;
        self.reset();
        Ok(Arc::new(facade.with_plan(compiled.plan)))
    }

    fn end_spec(&self, spec: StageSpec<ActionDelegate<T>>) -> StageSpec<ActionDelegate<T>> {
        if spec.options.name.is_some() {
            return spec;
        }
        let name = format!("{}.completion", self.name);
        spec.with_name(name)
    }

    fn end_propagator(&self) -> Result<Arc<TransformBlock<T, T>>, FlowError> {
        match &self.config.completion {
            Some(spec) => propagator_silent(self.end_spec(spec.clone())),
            None => TransformBlock::from_fn(
                |item: T| item,
                BlockOptions::new().with_name(format!("{}.completion", self.name)),
            ),
        }
    }

    fn reset(&mut self) {
        self.config = PipelineConfig::default();
    }
}

impl<T: Message> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self::new("pipeline")
    }
}

impl<T> fmt::Debug for PipelineBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("queue", &self.config.queue.is_some())
            .field("action", &self.config.action.is_some())
            .field("branches", &self.config.branches.len())
            .field("error_handler", &self.config.error_handler.is_some())
            .field("completion", &self.config.completion.is_some())
            .field("queue_failures", &self.config.queue_failures)
            .finish()
    }
}

fn validated<D>(spec: StageSpec<D>) -> Result<StageSpec<D>, FlowError> {
    spec.options.validate()?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineConfigError;

    fn noop() -> ActionDelegate<i32> {
        ActionDelegate::from_fn(|_: &i32| Ok(()))
    }

    #[test]
    fn test_use_when_without_action_fails_fast() {
        let mut builder = PipelineBuilder::<i32>::new("orders");
        let err = builder.use_when(|x| *x > 0, |_| {}).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Configuration(PipelineConfigError { ref error_info, .. })
                if error_info.code == "PIPELINE-001-MISSING-ACTION"
        ));
        assert_eq!(builder.branch_count(), 0);
    }

    #[test]
    fn test_invalid_options_rejected_by_setter() {
        let mut builder = PipelineBuilder::<i32>::new("orders");
        let spec = StageSpec::new(noop()).with_options(BlockOptions::new().with_batch_size(0));
        assert!(matches!(builder.use_action(spec), Err(FlowError::InvalidOptions(_))));
    }

    #[test]
    fn test_setters_chain() {
        let mut builder = PipelineBuilder::<i32>::default();
        builder
            .use_queue(noop())
            .and_then(|b| b.use_action(noop()))
            .and_then(|b| b.use_when(|x| x % 2 == 0, |w| {
                w.use_action(noop());
            }))
            .unwrap()
            .queue_failures(QueueFailureRoute::ErrorHandler);
        assert_eq!(builder.branch_count(), 1);
        assert_eq!(builder.name(), "pipeline");
        assert!(format!("{builder:?}").contains("ErrorHandler"));
    }

    #[tokio::test]
    async fn test_successful_build_resets_configuration() {
        let mut builder = PipelineBuilder::<i32>::new("orders");
        builder
            .use_when(|x| *x > 0, |w| {
                w.use_action(noop());
            })
            .unwrap();
        let first = builder.build_target().unwrap();
        assert_eq!(builder.branch_count(), 0);
        assert!(first.plan().is_some_and(|plan| plan.names().contains(&"branch[0].action")));

        let second = builder.build_target().unwrap();
        assert!(second.plan().is_some_and(|plan| !plan.names().contains(&"branch[0].action")));
    }
}

//! Compiles a pipeline configuration into a wired graph of blocks.

use super::branch::Branch;
use crate::core::{
    propagate_completion_to, BlockOptions, Completion, DataflowBlock, LinkOptions, Message,
    Predicate, Source, Target,
};
use crate::delegates::{
    error_propagator_silent, propagator, transform_with_item, ActionDelegate, ErrorDelegate,
    StageSpec,
};
use crate::engine::{BufferBlock, TransformBlock};
use crate::envelopes::{ActionResult, ErrorResult, ItemResult};
use crate::errors::{CycleDetectedError, FlowError};
use crate::routing::{
    link_to_error, link_to_next, link_to_next_discard_error, link_to_transform_error,
    link_to_transform_next, RouteOptions,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Where failures of a configured queue stage go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueFailureRoute {
    /// Without branches, failed items continue to the main action as if
    /// they had succeeded. With branches, they skip straight to the
    /// completion stage.
    #[default]
    Topology,
    /// Failed items always go to the error handler.
    ErrorHandler,
}

/// Everything a pipeline builder accumulates.
pub(crate) struct PipelineConfig<T> {
    pub queue: Option<StageSpec<ActionDelegate<T>>>,
    pub action: Option<StageSpec<ActionDelegate<T>>>,
    pub branches: Vec<Branch<T>>,
    pub error_handler: Option<StageSpec<ErrorDelegate<T>>>,
    pub completion: Option<StageSpec<ActionDelegate<T>>>,
    pub queue_failures: QueueFailureRoute,
}

impl<T> Default for PipelineConfig<T> {
    fn default() -> Self {
        Self {
            queue: None,
            action: None,
            branches: Vec::new(),
            error_handler: None,
            completion: None,
            queue_failures: QueueFailureRoute::default(),
        }
    }
}

/// One stage of a compiled pipeline and the stages whose completion it waits for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStage {
    /// Stage name, such as `queue` or `branch[0].action`.
    pub name: String,
    /// Stages directly upstream of this one.
    pub upstream: Vec<String>,
}

/// The completion dependencies of a compiled pipeline.
///
/// Each stage other than the queue is completed once every stage in its
/// `upstream` list has completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionPlan {
    stages: Vec<PlannedStage>,
}

impl CompletionPlan {
    /// Returns the stages in creation order.
    #[must_use]
    pub fn stages(&self) -> &[PlannedStage] {
        &self.stages
    }

    /// Returns the stage names in creation order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the direct upstream stages of `name`.
    #[must_use]
    pub fn upstream_of(&self, name: &str) -> Option<&[String]> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.upstream.as_slice())
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns whether the plan has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// The result of compiling a configuration.
pub(crate) struct CompiledGraph<T> {
    pub head: Arc<dyn Target<T>>,
    pub completion: Completion,
    pub plan: CompletionPlan,
}

/// Stages and edges recorded while wiring.
struct GraphRecorder {
    pipeline: String,
    stages: Vec<(String, Arc<dyn DataflowBlock>)>,
    edges: Vec<(String, String)>,
}

impl GraphRecorder {
    fn new(pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            stages: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn stage(&mut self, name: &str, block: Arc<dyn DataflowBlock>) {
        self.stages.push((name.to_string(), block));
    }

    fn edge(&mut self, from: &str, to: &str) {
        self.edges.push((from.to_string(), to.to_string()));
    }

    /// Names an unnamed stage after the pipeline and its role.
    fn label<D>(&self, mut spec: StageSpec<D>, stage: &str) -> StageSpec<D> {
        if spec.options.name.is_none() {
            spec.options.name = Some(format!("{}.{stage}", self.pipeline));
        }
        spec
    }

    fn options(&self, stage: &str) -> BlockOptions {
        BlockOptions::new().with_name(format!("{}.{stage}", self.pipeline))
    }

    fn upstream_of(&self, name: &str) -> Vec<String> {
        let mut upstream = Vec::new();
        for (from, to) in &self.edges {
            if to == name && !upstream.contains(from) {
                upstream.push(from.clone());
            }
        }
        upstream
    }

    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for (from, to) in &self.edges {
            adjacency.entry(from.as_str()).or_default().push(to.as_str());
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for (name, _) in &self.stages {
            if !visited.contains(name.as_str()) {
                if let Some(cycle) =
                    dfs_cycle(name, &adjacency, &mut visited, &mut rec_stack, &mut path)
                {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }
        Ok(())
    }

    /// Registers one completion barrier per stage with upstream stages and
    /// joins every stage into one completion.
    ///
    /// A stage other than `head` with nothing upstream never receives
    /// input and is completed immediately. Every stage stays alive until the
    /// joined completion resolves.
    fn finish(self, head: &str) -> Result<(Completion, CompletionPlan), CycleDetectedError> {
        self.detect_cycles()?;

        let completions: HashMap<&str, Completion> = self
            .stages
            .iter()
            .map(|(name, block)| (name.as_str(), block.completion()))
            .collect();

        let mut plan = Vec::with_capacity(self.stages.len());
        for (name, block) in &self.stages {
            let upstream = self.upstream_of(name);
            if !upstream.is_empty() {
                let dependencies: Vec<Completion> = upstream
                    .iter()
                    .filter_map(|u| completions.get(u.as_str()).cloned())
                    .collect();
                propagate_completion_to(Arc::clone(block), dependencies);
            } else if name != head {
                block.complete();
            }
            plan.push(PlannedStage {
                name: name.clone(),
                upstream,
            });
        }

        let completion = Completion::when_all(self.stages.iter().map(|(_, b)| b.completion()));
        debug!(
            pipeline = %self.pipeline,
            stages = plan.len(),
            edges = self.edges.len(),
            "Compiled pipeline graph"
        );

        // Links and barriers release their targets once the upstream is done,
        // so the stages are owned here until the whole graph has drained.
        let stages: Vec<Arc<dyn DataflowBlock>> =
            self.stages.into_iter().map(|(_, block)| block).collect();
        completion.on_complete(move |_| drop(stages));
        Ok((completion, CompletionPlan { stages: plan }))
    }
}

fn dfs_cycle<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node.to_string());

    if let Some(next) = adjacency.get(node) {
        for &dep in next {
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(dep, adjacency, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep) {
                let start = path.iter().position(|n| n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].to_vec();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

/// The main action: a plain pass-through or an envelope-producing action.
enum MainStage<T> {
    PassThrough(Arc<BufferBlock<T>>),
    Action(Arc<TransformBlock<T, ActionResult<T>>>),
}

/// Compiles `config` into a graph ending in `end`.
pub(crate) fn compile<T, E>(
    pipeline: &str,
    config: &PipelineConfig<T>,
    end: &Arc<E>,
) -> Result<CompiledGraph<T>, FlowError>
where
    T: Message,
    E: Target<T> + 'static,
{
    let mut graph = GraphRecorder::new(pipeline);
    let end_target: Arc<dyn Target<T>> = end.clone();

    let error: Arc<TransformBlock<ErrorResult<T>, T>> = match &config.error_handler {
        Some(spec) => error_propagator_silent(graph.label(spec.clone(), "error"))?,
        None => TransformBlock::from_fn(ErrorResult::into_input, graph.options("error"))?,
    };
    error.link_to(end_target.clone(), LinkOptions::new())?;
    let error_target: Arc<dyn Target<ErrorResult<T>>> = error.clone();
    graph.edge("error", "completion");

    let main = match &config.action {
        Some(spec) => {
            let action = propagator(graph.label(spec.clone(), "action"))?;
            link_to_error(&action, error_target.clone(), false)?;
            link_to_next(&action, end_target.clone(), RouteOptions::new())?;
            graph.edge("action", "error");
            MainStage::Action(action)
        }
        None => {
            let buffer = BufferBlock::new(graph.options("action"))?;
            buffer.link_to(end_target.clone(), LinkOptions::new())?;
            MainStage::PassThrough(buffer)
        }
    };
    graph.edge("action", "completion");
    let main_target: Arc<dyn Target<T>> = match &main {
        MainStage::PassThrough(buffer) => buffer.clone(),
        MainStage::Action(action) => action.clone(),
    };

    let mut entries: Vec<(Predicate<T>, Arc<dyn Target<T>>, String)> = Vec::new();
    for (index, branch) in config.branches.iter().enumerate() {
        let action_name = format!("branch[{index}].action");
        let action = propagator(graph.label(branch.action().clone(), &action_name))?;
        link_to_error(&action, error_target.clone(), false)?;
        graph.edge(&action_name, "error");

        let entry = match branch.gate() {
            None => {
                link_to_next(&action, main_target.clone(), RouteOptions::new())?;
                graph.edge(&action_name, "action");
                graph.stage(&action_name, action.clone());
                (Arc::clone(branch.predicate()), action as Arc<dyn Target<T>>, action_name)
            }
            Some(gate) => {
                let exit_name = format!("branch[{index}].exit");
                let exit = propagator(graph.label(gate.exit.clone(), &exit_name))?;
                link_to_error(&exit, error_target.clone(), false)?;
                link_to_next(&exit, main_target.clone(), RouteOptions::new())?;
                let exit_target: Arc<dyn Target<T>> = exit.clone();
                link_to_next(&action, exit_target, RouteOptions::new())?;
                graph.edge(&exit_name, "error");
                graph.edge(&exit_name, "action");
                graph.edge(&action_name, &exit_name);

                let enter_name = format!("branch[{index}].enter");
                let enter = transform_with_item(graph.label(gate.enter.clone(), &enter_name))?;
                link_to_transform_error(&enter, error_target.clone(), false)?;
                let action_target: Arc<dyn Target<T>> = action.clone();
                link_to_transform_next(
                    &enter,
                    action_target,
                    |gated: &ItemResult<T, bool>| gated.input().clone(),
                    RouteOptions::new().with_predicate(|gated: &ItemResult<T, bool>| {
                        *gated.value()
                    }),
                )?;
                link_to_transform_next(
                    &enter,
                    main_target.clone(),
                    |gated: &ItemResult<T, bool>| gated.input().clone(),
                    RouteOptions::new().with_predicate(|gated: &ItemResult<T, bool>| {
                        !*gated.value()
                    }),
                )?;
                graph.edge(&enter_name, "error");
                graph.edge(&enter_name, &action_name);
                graph.edge(&enter_name, "action");

                graph.stage(&enter_name, enter.clone());
                graph.stage(&action_name, action);
                graph.stage(&exit_name, exit);
                (Arc::clone(branch.predicate()), enter as Arc<dyn Target<T>>, enter_name)
            }
        };
        entries.push(entry);
    }

    let head: Arc<dyn Target<T>> = match &config.queue {
        None => {
            let queue = BufferBlock::new(graph.options("queue"))?;
            for (predicate, entry, name) in &entries {
                queue.link_to(
                    entry.clone(),
                    LinkOptions::new().with_predicate(Some(Arc::clone(predicate))),
                )?;
                graph.edge("queue", name);
            }
            queue.link_to(main_target.clone(), LinkOptions::new())?;
            graph.stage("queue", queue.clone());
            queue
        }
        Some(spec) => {
            let queue = propagator(graph.label(spec.clone(), "queue"))?;
            if config.queue_failures == QueueFailureRoute::ErrorHandler {
                link_to_error(&queue, error_target.clone(), false)?;
                graph.edge("queue", "error");
            }
            for (predicate, entry, name) in &entries {
                link_to_next(
                    &queue,
                    entry.clone(),
                    RouteOptions::new().with_shared_predicate(Some(Arc::clone(predicate))),
                )?;
                graph.edge("queue", name);
            }
            match (config.queue_failures, entries.is_empty()) {
                (QueueFailureRoute::Topology, true) => {
                    link_to_next_discard_error(&queue, main_target.clone(), RouteOptions::new())?;
                }
                (QueueFailureRoute::Topology, false) => {
                    link_to_next(&queue, main_target.clone(), RouteOptions::new())?;
                    link_to_next_discard_error(&queue, end_target.clone(), RouteOptions::new())?;
                    graph.edge("queue", "completion");
                }
                (QueueFailureRoute::ErrorHandler, _) => {
                    link_to_next(&queue, main_target.clone(), RouteOptions::new())?;
                }
            }
            graph.stage("queue", queue.clone());
            queue
        }
    };
    graph.edge("queue", "action");

    match main {
        MainStage::PassThrough(buffer) => graph.stage("action", buffer),
        MainStage::Action(action) => graph.stage("action", action),
    }
    graph.stage("error", error);
    graph.stage("completion", end.clone());

    let (completion, plan) = graph.finish("queue")?;
    Ok(CompiledGraph {
        head,
        completion,
        plan,
    })
}

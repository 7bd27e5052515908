//! Conditional pipeline segments.

use crate::core::{Message, Predicate};
use crate::delegates::{ActionDelegate, GateDelegate, StageSpec};
use crate::errors::PipelineConfigError;
use std::fmt;

/// The enter gate and exit stage of a gated branch. Always configured together.
pub struct BranchGate<T> {
    /// Decides per item whether the branch action runs.
    pub enter: StageSpec<GateDelegate<T>>,
    /// Runs after the branch action.
    pub exit: StageSpec<ActionDelegate<T>>,
}

impl<T> Clone for BranchGate<T> {
    fn clone(&self) -> Self {
        Self {
            enter: self.enter.clone(),
            exit: self.exit.clone(),
        }
    }
}

/// One conditional segment of a pipeline.
///
/// Items whose predicate holds are routed into the branch. Without a gate
/// the branch is just its action; with one, a gate-false item skips the
/// action and exit and rejoins the main pipeline unchanged.
pub struct Branch<T> {
    predicate: Predicate<T>,
    action: StageSpec<ActionDelegate<T>>,
    gate: Option<BranchGate<T>>,
}

impl<T: Message> Branch<T> {
    /// Creates an ungated branch.
    #[must_use]
    pub fn new(predicate: Predicate<T>, action: StageSpec<ActionDelegate<T>>) -> Self {
        Self {
            predicate,
            action,
            gate: None,
        }
    }

    /// Adds an enter gate and exit stage.
    #[must_use]
    pub fn with_gate(mut self, gate: BranchGate<T>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Returns whether `item` is routed into this branch.
    pub fn matches(&self, item: &T) -> bool {
        (self.predicate)(item)
    }

    /// Returns the routing predicate.
    #[must_use]
    pub fn predicate(&self) -> &Predicate<T> {
        &self.predicate
    }

    /// Returns the action stage.
    #[must_use]
    pub fn action(&self) -> &StageSpec<ActionDelegate<T>> {
        &self.action
    }

    /// Returns the gate, if any.
    #[must_use]
    pub fn gate(&self) -> Option<&BranchGate<T>> {
        self.gate.as_ref()
    }
}

impl<T> Clone for Branch<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            action: self.action.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<T> fmt::Debug for Branch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("action", &self.action.options.name)
            .field("gated", &self.gate.is_some())
            .finish_non_exhaustive()
    }
}

/// Collects the stages of one `use_when` branch.
pub struct WhenBuilder<T> {
    enter: Option<StageSpec<GateDelegate<T>>>,
    action: Option<StageSpec<ActionDelegate<T>>>,
    exit: Option<StageSpec<ActionDelegate<T>>>,
}

impl<T: Message> WhenBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            enter: None,
            action: None,
            exit: None,
        }
    }

    /// Sets the enter gate. Requires [`WhenBuilder::use_completion`].
    pub fn use_conditional_queue(
        &mut self,
        gate: impl Into<StageSpec<GateDelegate<T>>>,
    ) -> &mut Self {
        self.enter = Some(gate.into());
        self
    }

    /// Sets the branch action. Required.
    pub fn use_action(&mut self, action: impl Into<StageSpec<ActionDelegate<T>>>) -> &mut Self {
        self.action = Some(action.into());
        self
    }

    /// Sets the exit stage. Requires [`WhenBuilder::use_conditional_queue`].
    pub fn use_completion(&mut self, exit: impl Into<StageSpec<ActionDelegate<T>>>) -> &mut Self {
        self.exit = Some(exit.into());
        self
    }

    /// Validates the collected stages into a branch.
    pub(crate) fn into_branch(
        self,
        predicate: Predicate<T>,
        index: usize,
    ) -> Result<Branch<T>, PipelineConfigError> {
        let Some(action) = self.action else {
            return Err(PipelineConfigError::missing_branch_action(index));
        };
        let branch = Branch::new(predicate, action);
        match (self.enter, self.exit) {
            (None, None) => Ok(branch),
            (Some(enter), Some(exit)) => Ok(branch.with_gate(BranchGate { enter, exit })),
            (None, Some(_)) => Err(PipelineConfigError::missing_branch_enter(index)),
            (Some(_), None) => Err(PipelineConfigError::missing_branch_exit(index)),
        }
    }
}

impl<T> fmt::Debug for WhenBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhenBuilder")
            .field("enter", &self.enter.is_some())
            .field("action", &self.action.is_some())
            .field("exit", &self.exit.is_some())
            .finish()
    }
}

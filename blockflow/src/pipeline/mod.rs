//! Pipeline composition.
//!
//! This module provides:
//! - [`Branch`] and [`WhenBuilder`] for predicate-gated segments
//! - [`PipelineBuilder`] to configure and compile a pipeline
//! - [`CompletionPlan`] describing the compiled completion dependencies
//!
//! A compiled pipeline is a queue stage, any number of branches, a main
//! action, a shared error handler and a completion stage, wired through
//! routing adapters and presented as one facade block.

mod branch;
mod builder;
mod compile;
mod integration_tests;

pub use branch::{Branch, BranchGate, WhenBuilder};
pub use builder::PipelineBuilder;
pub use compile::{CompletionPlan, PlannedStage, QueueFailureRoute};

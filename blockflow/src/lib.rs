//! # Blockflow
//!
//! Composable dataflow pipelines built from message-passing blocks.
//!
//! Blockflow provides:
//!
//! - **An execution engine**: buffer, transform, action and batch blocks speaking
//!   an offer/consume/reserve protocol on Tokio
//! - **Envelopes**: success and failure records produced by wrapped callables
//! - **Routing adapters**: split envelope streams into success and error paths
//! - **Pipeline compilation**: queue, conditional branches, main action, shared
//!   error handler and completion stage, wired and joined into one block
//! - **Joined completion**: a pipeline completes only once every stage has drained
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blockflow::prelude::*;
//!
//! let mut builder = PipelineBuilder::<i32>::new("orders");
//! builder
//!     .use_action(ActionDelegate::from_fn(|order: &i32| {
//!         anyhow::ensure!(*order > 0, "empty order");
//!         Ok(())
//!     }))?
//!     .use_when(|order| *order > 1000, |when| {
//!         when.use_action(ActionDelegate::map_fn(|order: &i32| Ok(order / 2)));
//!     })?
//!     .use_exception_handler(ErrorDelegate::from_fn(|order: &i32, error: &StageFailure| {
//!         tracing::warn!(order, %error, "Rejected order");
//!         Ok(())
//!     }))?;
//!
//! let pipeline = builder.build_target()?;
//! pipeline.post(42);
//! pipeline.complete();
//! pipeline.completion().wait().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod batch;
pub mod core;
pub mod delegates;
pub mod engine;
pub mod envelopes;
pub mod errors;
pub mod facade;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod testing;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::batch::BatchTargetBuilder;
    pub use crate::core::{
        BlockId, BlockOptions, Completion, DataflowBlock, LinkOptions, Message, MessageHeader,
        MessageStatus, Propagator, Source, Target, TargetExt,
    };
    pub use crate::delegates::{
        ActionDelegate, ErrorDelegate, GateDelegate, ItemHandler, Narrow, StageSpec,
        TransformDelegate,
    };
    pub use crate::engine::{ActionBlock, BatchBlock, BufferBlock, NullTarget, TransformBlock};
    pub use crate::envelopes::{ActionResult, ErrorResult, ItemResult, TransformResult};
    pub use crate::errors::{FlowError, PipelineConfigError, StageFailure};
    pub use crate::facade::{AutoCompleteTarget, DelegatePropagator, DelegateTarget};
    pub use crate::observability::{init_tracing, TracingConfig};
    pub use crate::pipeline::{PipelineBuilder, QueueFailureRoute};
    pub use crate::routing::{link_to_error, link_to_next, RouteOptions};
}

pub use errors::{FlowError, StageFailure};

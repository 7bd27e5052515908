//! Delegates and the factories that wrap them into blocks.
//!
//! This module provides:
//! - [`ActionDelegate`], [`ErrorDelegate`], [`TransformDelegate`] and [`GateDelegate`],
//!   each resolved to one shape when constructed
//! - [`StageSpec`], a delegate paired with its block options
//! - Factories producing envelope-emitting or silent blocks
//!
//! Every delegate invocation runs behind a single error boundary: an `Err`
//! or a panic becomes a [`StageFailure`](crate::errors::StageFailure).

mod action;
mod boundary;
mod factories;
mod spec;
mod transform;

pub use action::{
    ActionDelegate, ActionFn, AsyncActionFn, AsyncMapFn, ItemHandler, MapFn, Narrow,
};
pub use factories::{
    error_propagator, error_propagator_silent, error_target, propagator, propagator_silent,
    target, transform, transform_with_item,
};
pub use spec::StageSpec;
pub use transform::{
    AsyncErrorFn, AsyncTransformFn, ErrorDelegate, ErrorFn, GateDelegate, TransformDelegate,
    TransformFn,
};

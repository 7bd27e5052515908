//! A small in-process execution engine.
//!
//! This module provides:
//! - [`BufferBlock`] and [`TransformBlock`] propagators
//! - [`ActionBlock`] and [`NullTarget`] sinks
//! - [`BatchBlock`] for grouping messages
//!
//! Every block speaks the offer/consume/reserve protocol from [`crate::core`].
//! Work runs on Tokio tasks; offering never blocks the caller.

mod action;
mod batch;
mod source_core;
mod target_core;
mod transform;

pub use action::{ActionBlock, NullTarget};
pub use batch::BatchBlock;
pub use transform::{BufferBlock, TransformBlock};

//! Facades: one block standing in for a wired sub-graph.
//!
//! This module provides:
//! - [`DelegateTarget`]: a sink over a sub-graph head
//! - [`DelegatePropagator`]: a head for input and a tail for output
//! - [`AutoCompleteTarget`]: a sink that completes itself once drained
//!
//! Every facade reports the joined completion of its whole sub-graph.
//! `complete` and `fault` are forwarded to the head.

mod auto_complete;
mod delegate;

pub use auto_complete::AutoCompleteTarget;
pub use delegate::{DelegatePropagator, DelegateTarget};

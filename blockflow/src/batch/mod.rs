//! Shape-routed batching.
//!
//! [`BatchTargetBuilder`] fans a wide message type out to one lane per
//! narrower shape. Each lane batches its items and runs one action per batch.

mod builder;

pub use builder::BatchTargetBuilder;

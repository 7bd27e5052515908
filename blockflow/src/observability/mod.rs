//! Observability utilities.

mod tracing;

pub use tracing::{init_tracing, pipeline_span, TracingConfig};

//! Per-block execution options.

use crate::errors::FlowError;
use serde::{Deserialize, Serialize};

/// Execution options shared by every block kind.
///
/// Defaults: unbounded input, one message processed at a time, batches of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockOptions {
    /// Maximum number of messages buffered or in flight. `None` is unbounded.
    pub bounded_capacity: Option<usize>,
    /// How many messages may be processed concurrently.
    pub max_degree_of_parallelism: usize,
    /// Number of messages grouped by batch blocks.
    pub batch_size: usize,
    /// Name used in log fields.
    pub name: Option<String>,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            bounded_capacity: None,
            max_degree_of_parallelism: 1,
            batch_size: 1,
            name: None,
        }
    }
}

impl BlockOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bounded capacity.
    #[must_use]
    pub fn with_bounded_capacity(mut self, capacity: usize) -> Self {
        self.bounded_capacity = Some(capacity);
        self
    }

    /// Sets the degree of parallelism.
    #[must_use]
    pub fn with_max_degree_of_parallelism(mut self, parallelism: usize) -> Self {
        self.max_degree_of_parallelism = parallelism;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the name, or `fallback` when unnamed.
    #[must_use]
    pub fn name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(fallback)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit is zero.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.bounded_capacity == Some(0) {
            return Err(FlowError::InvalidOptions(
                "bounded_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_degree_of_parallelism == 0 {
            return Err(FlowError::InvalidOptions(
                "max_degree_of_parallelism must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(FlowError::InvalidOptions("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

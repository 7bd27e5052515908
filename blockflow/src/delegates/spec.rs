use crate::core::BlockOptions;
use std::fmt;

/// A delegate together with the options of the block that will run it.
#[derive(Clone)]
pub struct StageSpec<D> {
    /// The callable.
    pub delegate: D,
    /// Options for the block built around it.
    pub options: BlockOptions,
}

impl<D> StageSpec<D> {
    /// Creates a spec with default options.
    #[must_use]
    pub fn new(delegate: D) -> Self {
        Self {
            delegate,
            options: BlockOptions::default(),
        }
    }

    /// Sets the block options.
    #[must_use]
    pub fn with_options(mut self, options: BlockOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the block name used in log fields.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }
}

impl<D> From<D> for StageSpec<D> {
    fn from(delegate: D) -> Self {
        Self::new(delegate)
    }
}

impl<D: fmt::Debug> fmt::Debug for StageSpec<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSpec")
            .field("delegate", &self.delegate)
            .field("options", &self.options)
            .finish()
    }
}

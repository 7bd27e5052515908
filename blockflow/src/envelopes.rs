//! Result envelopes emitted by envelope-producing stages.
//!
//! Envelopes are immutable. Each one is created when a stage finishes one
//! message and is consumed by whichever routing adapter accepts it.

use crate::errors::StageFailure;

/// Outcome of running an action over an item.
#[derive(Debug, Clone)]
pub enum ActionResult<T> {
    /// The action succeeded; carries the item to continue with.
    Success(T),
    /// The action failed; carries the original item and the failure.
    Failure {
        /// The item the action was given.
        input: T,
        /// What went wrong.
        error: StageFailure,
    },
}

impl<T> ActionResult<T> {
    /// Creates a success envelope.
    #[must_use]
    pub const fn success(input: T) -> Self {
        Self::Success(input)
    }

    /// Creates a failure envelope.
    #[must_use]
    pub const fn failure(input: T, error: StageFailure) -> Self {
        Self::Failure { input, error }
    }

    /// Returns whether this is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the carried item.
    #[must_use]
    pub const fn input(&self) -> &T {
        match self {
            Self::Success(input) | Self::Failure { input, .. } => input,
        }
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&StageFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    /// Splits the envelope into its item and optional failure.
    #[must_use]
    pub fn into_parts(self) -> (T, Option<StageFailure>) {
        match self {
            Self::Success(input) => (input, None),
            Self::Failure { input, error } => (input, Some(error)),
        }
    }

    /// Converts a failure into an [`ErrorResult`].
    #[must_use]
    pub fn into_error(self) -> Option<ErrorResult<T>> {
        match self {
            Self::Success(_) => None,
            Self::Failure { input, error } => Some(ErrorResult::new(input, error)),
        }
    }
}

/// An item paired with the failure it caused.
#[derive(Debug, Clone)]
pub struct ErrorResult<T> {
    input: T,
    error: StageFailure,
}

impl<T> ErrorResult<T> {
    /// Creates an error record.
    #[must_use]
    pub const fn new(input: T, error: StageFailure) -> Self {
        Self { input, error }
    }

    /// Returns the item that failed.
    #[must_use]
    pub const fn input(&self) -> &T {
        &self.input
    }

    /// Returns the failure.
    #[must_use]
    pub const fn error(&self) -> &StageFailure {
        &self.error
    }

    /// Splits the record into item and failure.
    #[must_use]
    pub fn into_parts(self) -> (T, StageFailure) {
        (self.input, self.error)
    }

    /// Returns the item, discarding the failure.
    #[must_use]
    pub fn into_input(self) -> T {
        self.input
    }
}

/// Outcome of transforming an item.
///
/// Success carries only the output; failure carries only the input and the
/// failure.
#[derive(Debug, Clone)]
pub enum TransformResult<I, O> {
    /// The transform produced an output.
    Success(O),
    /// The transform failed.
    Failure {
        /// The item the transform was given.
        input: I,
        /// What went wrong.
        error: StageFailure,
    },
}

impl<I, O> TransformResult<I, O> {
    /// Creates a success envelope.
    #[must_use]
    pub const fn success(output: O) -> Self {
        Self::Success(output)
    }

    /// Creates a failure envelope.
    #[must_use]
    pub const fn failure(input: I, error: StageFailure) -> Self {
        Self::Failure { input, error }
    }

    /// Returns whether this is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the output of a success.
    #[must_use]
    pub const fn output(&self) -> Option<&O> {
        match self {
            Self::Success(output) => Some(output),
            Self::Failure { .. } => None,
        }
    }

    /// Returns the input of a failure.
    #[must_use]
    pub const fn input(&self) -> Option<&I> {
        match self {
            Self::Success(_) => None,
            Self::Failure { input, .. } => Some(input),
        }
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&StageFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    /// Splits the envelope into `(input, output, failure)`.
    #[must_use]
    pub fn into_parts(self) -> (Option<I>, Option<O>, Option<StageFailure>) {
        match self {
            Self::Success(output) => (None, Some(output), None),
            Self::Failure { input, error } => (Some(input), None, Some(error)),
        }
    }

    /// Converts a failure into an [`ErrorResult`].
    #[must_use]
    pub fn into_error(self) -> Option<ErrorResult<I>> {
        match self {
            Self::Success(_) => None,
            Self::Failure { input, error } => Some(ErrorResult::new(input, error)),
        }
    }
}

/// An item paired with a value computed from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult<I, V> {
    input: I,
    value: V,
}

impl<I, V> ItemResult<I, V> {
    /// Creates a pair.
    #[must_use]
    pub const fn new(input: I, value: V) -> Self {
        Self { input, value }
    }

    /// Returns the originating item.
    #[must_use]
    pub const fn input(&self) -> &I {
        &self.input
    }

    /// Returns the computed value.
    #[must_use]
    pub const fn value(&self) -> &V {
        &self.value
    }

    /// Splits the pair.
    #[must_use]
    pub fn into_parts(self) -> (I, V) {
        (self.input, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> StageFailure {
        StageFailure::msg("bad item")
    }

    #[test]
    fn test_action_result_variants() {
        let ok = ActionResult::success(4);
        assert!(ok.is_success());
        assert_eq!(*ok.input(), 4);
        assert!(ok.error().is_none());
        assert!(ok.clone().into_error().is_none());

        let err = ActionResult::failure(-2, failure());
        assert!(!err.is_success());
        assert_eq!(*err.input(), -2);
        let record = err.into_error();
        assert_eq!(record.as_ref().map(|r| *r.input()), Some(-2));
        assert_eq!(record.map(|r| r.error().to_string()), Some("bad item".to_string()));
    }

    #[test]
    fn test_transform_result_exactly_one_state() {
        let results: Vec<TransformResult<i32, String>> = vec![
            TransformResult::success("eight".to_string()),
            TransformResult::failure(3, failure()),
        ];
        for result in results {
            let output_set = result.output().is_some();
            let failure_set = result.input().is_some() && result.error().is_some();
            assert!(output_set ^ failure_set);
            assert_eq!(result.is_success(), output_set);
        }
    }

    #[test]
    fn test_deconstruction_is_repeatable() {
        let envelope = TransformResult::<i32, i32>::failure(5, failure());
        let (first_input, first_output, first_error) = envelope.clone().into_parts();
        let (second_input, second_output, second_error) = envelope.into_parts();
        assert_eq!(first_input, second_input);
        assert_eq!(first_output, second_output);
        assert!(first_error
            .zip(second_error)
            .is_some_and(|(a, b)| a.ptr_eq(&b)));

        let pair = ItemResult::new(5, false);
        assert_eq!(pair.clone().into_parts(), pair.into_parts());
    }

    #[test]
    fn test_error_result_always_carries_failure() {
        let record = ErrorResult::new("order-7", failure());
        assert_eq!(record.error().to_string(), "bad item");
        let (input, error) = record.clone().into_parts();
        assert_eq!(input, "order-7");
        assert!(error.ptr_eq(record.error()));
        assert_eq!(record.into_input(), "order-7");
    }
}

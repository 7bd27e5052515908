//! Error types for the blockflow crate.
//!
//! This module provides:
//! - [`FlowError`], returned by protocol calls, factories and the builder
//! - [`StageFailure`], the failure value carried inside result envelopes
//! - [`PipelineConfigError`] and [`CycleDetectedError`] with [`ContractErrorInfo`] diagnostics

use crate::core::BlockId;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The main error type for blockflow operations.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// A message was offered with a header that does not identify a message.
    #[error("Invalid message header: id 0 does not identify a message")]
    InvalidMessageHeader,

    /// An offer that needs a source arrived without one.
    #[error("Offer to block {target} did not carry its source block")]
    MissingSource {
        /// The block that received the offer.
        target: BlockId,
    },

    /// An adapter received an offer from a block other than its bound upstream.
    #[error("Block {adapter} only accepts offers from {expected}, received one from {actual}")]
    ForeignSource {
        /// The adapter that rejected the offer.
        adapter: BlockId,
        /// The bound upstream.
        expected: BlockId,
        /// The block that made the offer.
        actual: BlockId,
    },

    /// The block cannot be linked to further targets.
    #[error("Linking is not supported by {0}")]
    LinkNotSupported(&'static str),

    /// Block options failed validation.
    #[error("Invalid block options: {0}")]
    InvalidOptions(String),

    /// A callable could not be turned into a stage.
    #[error("Invalid delegate: {0}")]
    InvalidDelegate(String),

    /// The pipeline configuration was rejected.
    #[error("{0}")]
    Configuration(#[from] PipelineConfigError),

    /// The compiled stage graph contains a cycle.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A block faulted.
    #[error("Block faulted: {0}")]
    Faulted(StageFailure),

    /// The target has completed and will never accept another message.
    #[error("Target {0} declined permanently")]
    TargetCompleted(BlockId),

    /// A block needed to start work outside of a Tokio runtime.
    #[error("Block {0} cannot schedule work outside of a Tokio runtime")]
    NoRuntime(BlockId),

    /// A block was used after its owner had been dropped.
    #[error("Block {0} is no longer alive")]
    Detached(BlockId),
}

impl FlowError {
    /// Creates a fault error from any failure.
    #[must_use]
    pub fn faulted(error: impl Into<anyhow::Error>) -> Self {
        Self::Faulted(StageFailure::new(error))
    }
}

/// A failure raised by a user callable, or a panic caught at the delegate boundary.
///
/// Cloning is cheap; every clone refers to the same underlying error.
#[derive(Clone)]
pub struct StageFailure {
    inner: Arc<anyhow::Error>,
    panicked: bool,
}

impl StageFailure {
    /// Creates a failure from an error value.
    #[must_use]
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: Arc::new(error.into()),
            panicked: false,
        }
    }

    /// Creates a failure from a message.
    #[must_use]
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::new(anyhow::Error::msg(message))
    }

    /// Creates a failure from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self {
            inner: Arc::new(anyhow::anyhow!("panicked: {message}")),
            panicked: true,
        }
    }

    /// Returns whether this failure came from a panic.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.panicked
    }

    /// Returns the underlying error.
    #[must_use]
    pub fn error(&self) -> &anyhow::Error {
        &self.inner
    }

    /// Attempts to downcast the underlying error.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Returns whether two failures share the same underlying error.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl fmt::Debug for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageFailure")
            .field("error", &self.inner.to_string())
            .field("panicked", &self.panicked)
            .finish()
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPELINE-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::Value::String(self.code.clone()));
        map.insert("summary".to_string(), serde_json::Value::String(self.summary.clone()));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::Value::String(hint.clone()));
        }
        if !self.context.is_empty() {
            let context: serde_json::Map<String, serde_json::Value> = self
                .context
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            map.insert("context".to_string(), serde_json::Value::Object(context));
        }
        map
    }
}

/// Error raised when a pipeline is misconfigured.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineConfigError {
    /// The error message.
    pub message: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl PipelineConfigError {
    /// Creates a configuration error with the given code.
    #[must_use]
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error_info: ContractErrorInfo::new(code, message.clone()),
            message,
        }
    }

    /// A `use_when` branch never configured its action stage.
    #[must_use]
    pub fn missing_branch_action(branch: usize) -> Self {
        let mut err = Self::new(
            "PIPELINE-001-MISSING-ACTION",
            format!("Branch {branch} has no action stage. Call use_action"),
        );
        err.error_info = err
            .error_info
            .with_fix_hint("Call use_action inside the use_when closure.")
            .with_context_entry("branch", branch.to_string());
        err
    }

    /// A branch configured an exit stage without an enter gate.
    #[must_use]
    pub fn missing_branch_enter(branch: usize) -> Self {
        let mut err = Self::new(
            "PIPELINE-002-MISSING-ENTER",
            format!("Branch {branch} has an exit stage but no enter gate. Call use_conditional_queue"),
        );
        err.error_info = err
            .error_info
            .with_fix_hint("Configure use_conditional_queue together with use_completion.")
            .with_context_entry("branch", branch.to_string());
        err
    }

    /// A branch configured an enter gate without an exit stage.
    #[must_use]
    pub fn missing_branch_exit(branch: usize) -> Self {
        let mut err = Self::new(
            "PIPELINE-003-MISSING-EXIT",
            format!("Branch {branch} has an enter gate but no exit stage. Call use_completion"),
        );
        err.error_info = err
            .error_info
            .with_fix_hint("Configure use_completion together with use_conditional_queue.")
            .with_context_entry("branch", branch.to_string());
        err
    }

    /// Returns the error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.error_info.code
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::Value::String(self.message.clone()));
        let info: serde_json::Map<String, serde_json::Value> =
            self.error_info.to_dict().into_iter().collect();
        map.insert("error_info".to_string(), serde_json::Value::Object(info));
        map
    }
}

/// Error raised when a cycle is detected in the compiled stage graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "PIPELINE-004-CYCLE",
            format!("Completion graph contains a cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("A stage may not wait on the completion of a stage downstream of it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_from_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let failure = StageFailure::from_panic(payload);
        assert!(failure.is_panic());
        assert_eq!(failure.to_string(), "panicked: boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(StageFailure::from_panic(payload).to_string(), "panicked: owned boom");
    }

    #[test]
    fn test_stage_failure_clone_shares_error() {
        let failure = StageFailure::msg("bad input");
        let copy = failure.clone();
        assert!(failure.ptr_eq(&copy));
        assert!(!failure.is_panic());
        assert_eq!(copy.to_string(), "bad input");
    }

    #[test]
    fn test_stage_failure_downcast() {
        #[derive(Debug)]
        struct Rejected(u32);
        impl fmt::Display for Rejected {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "rejected {}", self.0)
            }
        }
        impl std::error::Error for Rejected {}

        let failure = StageFailure::new(Rejected(7));
        assert_eq!(failure.downcast_ref::<Rejected>().map(|r| r.0), Some(7));
    }

    #[test]
    fn test_config_error_codes() {
        assert_eq!(PipelineConfigError::missing_branch_action(0).code(), "PIPELINE-001-MISSING-ACTION");
        assert_eq!(PipelineConfigError::missing_branch_enter(1).code(), "PIPELINE-002-MISSING-ENTER");
        assert_eq!(PipelineConfigError::missing_branch_exit(2).code(), "PIPELINE-003-MISSING-EXIT");
    }

    #[test]
    fn test_config_error_to_dict() {
        let err = PipelineConfigError::missing_branch_action(3);
        let dict = err.to_dict();
        assert!(dict.contains_key("message"));
        let info = dict.get("error_info").and_then(|v| v.as_object()).cloned().unwrap_or_default();
        assert_eq!(info.get("code").and_then(|v| v.as_str()), Some("PIPELINE-001-MISSING-ACTION"));
        assert!(info.contains_key("fix_hint"));
    }

    #[test]
    fn test_cycle_error_message() {
        let err = CycleDetectedError::new(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Cycle detected in pipeline: a -> b -> a");
        assert_eq!(err.error_info.code, "PIPELINE-004-CYCLE");
    }

    #[test]
    fn test_flow_error_from_config_error() {
        let err: FlowError = PipelineConfigError::missing_branch_exit(0).into();
        assert!(matches!(err, FlowError::Configuration(_)));
    }
}

//! Core protocol types for blockflow.
//!
//! This module contains the vocabulary every block speaks:
//! - Message headers, offer statuses and block identity
//! - The `DataflowBlock`, `Target`, `Source` and `Propagator` traits
//! - Link options and handles
//! - Completion signals and completion propagation
//! - Per-block execution options

mod block;
mod completion;
mod options;
mod status;

pub use block::{
    DataflowBlock, LinkHandle, LinkOptions, Message, Predicate, Propagator, Source, Target,
    TargetExt,
};
pub use completion::{propagate_completion_to, Completion, CompletionOutcome};
pub use options::BlockOptions;
pub use status::{BlockId, MessageHeader, MessageStatus};

//! Testing utilities for blockflow graphs.
//!
//! This module provides:
//! - A collecting sink and recording delegates
//! - Assertions over completion signals

mod assertions;
mod mocks;

pub use assertions::{assert_completes, assert_faults, assert_pending, COMPLETION_TIMEOUT};
pub use mocks::{CollectingTarget, ErrorRecorder, RecordingAction};

//! Fault injection choices.
//!
//! A pathology is a weighted set of failure modes. A fault server asks the
//! registry for a mode, then asks the mode for a [`FaultPlan`] describing the
//! reply to send.

mod failure_mode;
mod registry;

// Re-export public API
pub use failure_mode::{FailureMode, FailureModeKind, FaultPlan, HttpResponseSpec};
pub use registry::{Pathology, PathologyRegistry};

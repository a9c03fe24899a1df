//! Force-delete orchestration for a single stack
//!
//! [`StackDeleter`] runs the per-stack state machine:
//! attempt an unconstrained delete, diagnose why the stack is still there,
//! classify the delete-failed resources, clean them up (recursing into nested
//! stacks), then delete again retaining what was cleaned.

pub mod classifier;
mod deleter;
pub mod template;

pub use classifier::{BlockingResource, Classification, classify};
pub use deleter::{DeleteOutcome, DeleterSettings, StackDeleter};
pub use template::{StrippedTemplate, strip_retain_policies};

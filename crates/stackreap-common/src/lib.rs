//! stackreap-common - Shared stack and resource model
//!
//! This crate holds the types the force-delete engine reasons about, without
//! any AWS SDK dependencies so they can be used in pure logic and tests.
//!
//! ## Modules
//!
//! - [`defaults`]: Default tunables (retry budgets, batch limits, timeouts)
//! - [`resource_class`]: Closed classification of CloudFormation resource types
//! - [`stack`]: Stack snapshots, resource summaries and statuses

pub mod defaults;
pub mod resource_class;
pub mod stack;

pub use resource_class::ResourceClass;
pub use stack::{
    ResourceStatus, ResourceSummary, StackExport, StackSnapshot, StackStatus, stack_name_from_arn,
};

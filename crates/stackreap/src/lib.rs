//! stackreap - force-delete CloudFormation stacks
//!
//! Deletes target stacks that CloudFormation alone cannot remove: it empties
//! and deletes the resources that block a stack delete (versioned buckets,
//! roles with policies, image repositories, backup vaults, table and vector
//! buckets), recurses into nested stacks, and orders multiple targets by
//! their export/import dependencies.
//!
//! The entry point is [`reaper::Reaper`].

pub mod aws;
pub mod config;
pub mod error;
pub mod graph;
pub mod operator;
pub mod orchestrator;
pub mod reaper;
pub mod retry;
pub mod wait;

pub use config::{AwsConfig, ConfigError, ReapConfig};
pub use error::ReapError;
pub use graph::DeletionReport;
pub use reaper::Reaper;

//! Shared types for the article migration pipeline
//!
//! Holds identifiers, lifecycle enums and snapshot structures used by the
//! orchestrator library, its binary and its tests.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::{
    DetectionRecord, ProviderSnapshot, SessionPoolSnapshot, StageTransition, UsageRecord,
    WorkItemStatus,
};

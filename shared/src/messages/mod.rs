//! Read-only views exposed by the pipeline to callers
//!
//! - `status`: work item, provider and session pool snapshots

pub mod status;

pub use status::{
    DetectionRecord, ProviderSnapshot, SessionPoolSnapshot, StageTransition, UsageRecord,
    WorkItemStatus, hour_bucket,
};

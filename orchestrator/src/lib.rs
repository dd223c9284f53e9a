//! Orchestration core for the article migration pipeline
//!
//! Moves articles through fetch, translate, optimize, detect and publish
//! with bounded per-stage concurrency, weighted provider selection with
//! failover, a leased session pool, and a detection-feedback loop that
//! rewrites content until it scores under the item's threshold.

pub mod adapters;
pub mod config;
pub mod core;
pub mod error;
pub mod executors;
pub mod optimization;
pub mod orchestrator;
pub mod scheduler;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use adapters::AdapterRegistry;
pub use config::PipelineConfig;
pub use core::{StageOutcome, Task, WorkItem};
pub use error::{AdapterError, OrchestratorError, OrchestratorResult};
pub use orchestrator::{IngestOptions, Orchestrator};
pub use scheduler::Scheduler;
pub use traits::{AiProvider, ContentSource, Detector, ProfileGenerator, Publisher, SessionBackend, WorkItemRepository};

//! Core pipeline logic
//!
//! This module contains the work item model, its lifecycle graph and the
//! scheduling data structures. Nothing here performs I/O.

pub mod rate_window;
pub mod state_machine;
pub mod task_queue;
pub mod work_item;

pub use rate_window::RollingWindow;
pub use state_machine::{can_transition, FollowUp, StageOutcome, StateMachine};
pub use task_queue::{Task, TaskQueue};
pub use work_item::{AuditEntry, ContentRevision, WorkItem};

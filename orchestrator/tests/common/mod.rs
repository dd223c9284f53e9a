//! Common test utilities and infrastructure
//!
//! This module provides shared fixtures, scripted adapters and helpers
//! used across all orchestrator test suites.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::{RecordingPublisher, ScriptedDetector, StaticSource, TaggingProvider, TestFixtures};
pub use helpers::{OrchestratorBuilder, TestHelpers};

//! Trait definitions with mockall annotations for testing
//!
//! The orchestrator depends only on these contracts. Concrete adapters for
//! scraping, AI services, detectors, publishing platforms and browser sessions
//! live outside the core; `services::simulated` provides in-process fakes.

use serde::{Deserialize, Serialize};
use shared::{Capability, SessionId, SessionPurpose, StrategyLevel, UsageRecord, WorkItemId};

use crate::core::WorkItem;
use crate::error::{AdapterResult, OrchestratorResult};

/// Identity descriptor a session is bound to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub id: String,
    pub user_agent: String,
    pub locale: String,
    pub viewport: (u32, u32),
}

/// What an executor sees of a leased session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHandle {
    pub id: SessionId,
    pub purpose: SessionPurpose,
    pub profile: IdentityProfile,
}

/// Descriptive metadata returned alongside fetched content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub title: Option<String>,
    pub platform: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedContent {
    pub raw: String,
    pub metadata: ContentMetadata,
}

/// Provider-call parameters derived from the strategy level
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    /// Rewrite intensity in `0.0..=1.0`
    pub intensity: f32,
    pub temperature: f32,
    pub target_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformation {
    pub text: String,
    pub cost_units: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionScore {
    /// Estimated probability (0-100) that the text is machine-written
    pub score: f64,
    pub passed: bool,
}

/// Source of raw articles
#[mockall::automock]
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the article behind `source_ref` using a leased fetch session
    async fn fetch(&self, source_ref: &str, session: &SessionHandle) -> AdapterResult<FetchedContent>;
}

/// External AI service used for translation and rewriting
#[mockall::automock]
#[async_trait::async_trait]
pub trait AiProvider: Send + Sync {
    async fn transform(
        &self,
        capability: Capability,
        content: &str,
        level: StrategyLevel,
        params: &TransformParams,
    ) -> AdapterResult<Transformation>;
}

/// AI-content detector; lower scores read as more human
#[mockall::automock]
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    async fn score(&self, content: &str, session: &SessionHandle) -> AdapterResult<DetectionScore>;
}

/// Publishing platform
#[mockall::automock]
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `content` to `target`, returning the platform's reference
    async fn publish(&self, content: &str, target: &str, session: &SessionHandle) -> AdapterResult<String>;
}

/// Opens and closes browser-driven sessions
#[mockall::automock]
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    async fn open(&self, session: &SessionHandle) -> AdapterResult<()>;

    async fn close(&self, session: &SessionHandle) -> AdapterResult<()>;
}

/// Generates a fresh identity profile for each new session
#[mockall::automock]
pub trait ProfileGenerator: Send + Sync {
    fn generate(&self, purpose: SessionPurpose) -> IdentityProfile;
}

/// Persistence for work items and the usage ledger
///
/// Implementations must refuse to overwrite a record whose stored stage is
/// terminal.
#[mockall::automock]
#[async_trait::async_trait]
pub trait WorkItemRepository: Send + Sync {
    async fn insert(&self, item: WorkItem) -> OrchestratorResult<()>;

    async fn load(&self, id: WorkItemId) -> OrchestratorResult<Option<WorkItem>>;

    async fn save(&self, item: &WorkItem) -> OrchestratorResult<()>;

    /// Non-terminal item already ingested from `source_ref`, if any
    async fn find_active_by_source(&self, source_ref: &str) -> OrchestratorResult<Option<WorkItemId>>;

    async fn list_ids(&self) -> OrchestratorResult<Vec<WorkItemId>>;

    async fn record_usage(&self, record: UsageRecord) -> OrchestratorResult<()>;

    async fn usage(&self) -> OrchestratorResult<Vec<UsageRecord>>;
}

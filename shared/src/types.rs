//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::SharedError;

/// Unique identifier for a work item (one per article)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkItemId(Uuid);

impl WorkItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, SharedError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SharedError::InvalidUuid { input: s.to_string() })
    }
}

impl Default for WorkItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a scheduled task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an automation session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a configured external provider (e.g. "deepl-primary")
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle stage of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Pending,
    Fetching,
    Fetched,
    Translating,
    Translated,
    Optimizing,
    Optimized,
    Detecting,
    Publishing,
    Published,
    Failed,
    Cancelled,
}

impl Stage {
    /// Terminal stages never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Published | Stage::Failed | Stage::Cancelled)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "PENDING",
            Stage::Fetching => "FETCHING",
            Stage::Fetched => "FETCHED",
            Stage::Translating => "TRANSLATING",
            Stage::Translated => "TRANSLATED",
            Stage::Optimizing => "OPTIMIZING",
            Stage::Optimized => "OPTIMIZED",
            Stage::Detecting => "DETECTING",
            Stage::Publishing => "PUBLISHING",
            Stage::Published => "PUBLISHED",
            Stage::Failed => "FAILED",
            Stage::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

/// Pipeline step executed by one stage executor and one worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Fetch,
    Translate,
    Optimize,
    Detect,
    Publish,
}

impl Step {
    pub const ALL: [Step; 5] = [Step::Fetch, Step::Translate, Step::Optimize, Step::Detect, Step::Publish];

    /// Stage the work item is in while this step runs
    pub fn active_stage(&self) -> Stage {
        match self {
            Step::Fetch => Stage::Fetching,
            Step::Translate => Stage::Translating,
            Step::Optimize => Stage::Optimizing,
            Step::Detect => Stage::Detecting,
            Step::Publish => Stage::Publishing,
        }
    }

    /// Provider capability the step consumes, if any
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Step::Fetch => None,
            Step::Translate => Some(Capability::Translate),
            Step::Optimize => Some(Capability::Optimize),
            Step::Detect => Some(Capability::Detect),
            Step::Publish => Some(Capability::Publish),
        }
    }

    /// Session purpose the step leases, if any
    pub fn session_purpose(&self) -> Option<SessionPurpose> {
        match self {
            Step::Fetch => Some(SessionPurpose::Fetch),
            Step::Detect => Some(SessionPurpose::Detect),
            Step::Publish => Some(SessionPurpose::Publish),
            Step::Translate | Step::Optimize => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Translate => "translate",
            Step::Optimize => "optimize",
            Step::Detect => "detect",
            Step::Publish => "publish",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Step {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fetch" => Ok(Step::Fetch),
            "translate" => Ok(Step::Translate),
            "optimize" => Ok(Step::Optimize),
            "detect" => Ok(Step::Detect),
            "publish" => Ok(Step::Publish),
            other => Err(SharedError::UnknownVariant {
                kind: "step".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Capability offered by an external provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Translate,
    Optimize,
    Detect,
    Publish,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Translate => write!(f, "translate"),
            Capability::Optimize => write!(f, "optimize"),
            Capability::Detect => write!(f, "detect"),
            Capability::Publish => write!(f, "publish"),
        }
    }
}

impl FromStr for Capability {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "translate" => Ok(Capability::Translate),
            "optimize" => Ok(Capability::Optimize),
            "detect" => Ok(Capability::Detect),
            "publish" => Ok(Capability::Publish),
            other => Err(SharedError::UnknownVariant {
                kind: "capability".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Task priority; declaration order is ascending urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Rewrite intensity applied to an optimization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyLevel {
    Light,
    Standard,
    Aggressive,
}

impl StrategyLevel {
    /// One level up, saturating at `Aggressive`
    pub fn escalate(self) -> Self {
        match self {
            StrategyLevel::Light => StrategyLevel::Standard,
            StrategyLevel::Standard | StrategyLevel::Aggressive => StrategyLevel::Aggressive,
        }
    }
}

impl fmt::Display for StrategyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyLevel::Light => write!(f, "LIGHT"),
            StrategyLevel::Standard => write!(f, "STANDARD"),
            StrategyLevel::Aggressive => write!(f, "AGGRESSIVE"),
        }
    }
}

/// What a browser-driven session is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPurpose {
    Fetch,
    Detect,
    Publish,
}

impl fmt::Display for SessionPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPurpose::Fetch => write!(f, "fetch"),
            SessionPurpose::Detect => write!(f, "detect"),
            SessionPurpose::Publish => write!(f, "publish"),
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Created,
    Active,
    Idle,
    Closed,
    Error,
}

/// Named content version kept on a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentVersion {
    Raw,
    Translated,
    Optimized,
    Final,
}

impl ContentVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentVersion::Raw => "raw",
            ContentVersion::Translated => "translated",
            ContentVersion::Optimized => "optimized",
            ContentVersion::Final => "final",
        }
    }
}

impl fmt::Display for ContentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content category used to pick per-item policy defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Technical,
    Tutorial,
    News,
    Business,
    Lifestyle,
    Entertainment,
    General,
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentCategory::Technical => "technical",
            ContentCategory::Tutorial => "tutorial",
            ContentCategory::News => "news",
            ContentCategory::Business => "business",
            ContentCategory::Lifestyle => "lifestyle",
            ContentCategory::Entertainment => "entertainment",
            ContentCategory::General => "general",
        };
        write!(f, "{name}")
    }
}

/// Component label attached to structured log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Orchestrator,
    Scheduler,
    Worker(Step),
    ProviderRegistry,
    SessionPool,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Orchestrator => write!(f, "orchestrator"),
            Component::Scheduler => write!(f, "scheduler"),
            Component::Worker(step) => write!(f, "worker_{step}"),
            Component::ProviderRegistry => write!(f, "provider_registry"),
            Component::SessionPool => write!(f, "session_pool"),
        }
    }
}

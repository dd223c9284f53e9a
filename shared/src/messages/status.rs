//! Snapshot structures returned by status queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    Capability, ContentCategory, ProviderId, SessionPurpose, Stage, StrategyLevel, WorkItemId,
};

/// One recorded stage change of a work item
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

/// One AI-detection outcome
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    /// Optimization attempt the scored text came from (0-based)
    pub attempt: u32,
    pub score: f64,
    pub threshold: f64,
    pub passed: bool,
    pub provider: ProviderId,
    pub strategy: Option<StrategyLevel>,
    pub recorded_at: DateTime<Utc>,
}

/// Read-only view of a work item
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkItemStatus {
    pub id: WorkItemId,
    pub source_ref: String,
    pub category: ContentCategory,
    pub stage: Stage,
    pub attempt: u32,
    pub max_attempts: u32,
    pub threshold: f64,
    pub last_score: Option<f64>,
    pub detection_history: Vec<DetectionRecord>,
    pub history: Vec<StageTransition>,
    pub last_error: Option<String>,
    pub published_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// One billed provider call, bucketed by UTC hour
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub provider: ProviderId,
    pub capability: Capability,
    /// `YYYY-MM-DDTHH` in UTC
    pub hour_bucket: String,
    pub cost_units: f64,
    /// `cost_units * cost_per_unit` of the provider at call time
    pub cost: f64,
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        provider: ProviderId,
        capability: Capability,
        cost_units: f64,
        cost_per_unit: f64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider,
            capability,
            hour_bucket: hour_bucket(at),
            cost_units,
            cost: cost_units * cost_per_unit,
            recorded_at: at,
        }
    }
}

/// UTC hour bucket key used by the cost ledger
pub fn hour_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H").to_string()
}

/// Health and load view of one provider
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProviderSnapshot {
    pub id: ProviderId,
    pub capability: Capability,
    pub weight: f64,
    pub healthy: bool,
    pub in_flight: u32,
    pub concurrency_limit: u32,
    pub consecutive_failures: u32,
    pub calls_last_minute: usize,
    pub calls_last_hour: usize,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub avg_latency_ms: f64,
    pub total_cost: f64,
}

/// Occupancy of one session purpose bucket
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionPoolSnapshot {
    pub purpose: SessionPurpose,
    pub capacity: usize,
    pub open: usize,
    pub leased: usize,
    pub idle: usize,
    pub created_total: u64,
    pub disposed_total: u64,
}

//! Pipeline configuration
//!
//! Every policy value lives here. Values come from `PipelineConfig::default()`,
//! an optional JSON file, then `PIPELINE_*` environment overrides (with `.env`
//! support), and are checked by `validate()` before the orchestrator starts.

use serde::{Deserialize, Serialize};
use shared::{Capability, ContentCategory, ProviderId, SessionPurpose, Step};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Worker count per stage pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub fetch: usize,
    pub translate: usize,
    pub optimize: usize,
    pub detect: usize,
    pub publish: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            fetch: 2,
            translate: 3,
            optimize: 3,
            detect: 2,
            publish: 1,
        }
    }
}

impl WorkerConfig {
    pub fn count(&self, step: Step) -> usize {
        match step {
            Step::Fetch => self.fetch,
            Step::Translate => self.translate,
            Step::Optimize => self.optimize,
            Step::Detect => self.detect,
            Step::Publish => self.publish,
        }
    }

    fn set(&mut self, step: Step, count: usize) {
        match step {
            Step::Fetch => self.fetch = count,
            Step::Translate => self.translate = count,
            Step::Optimize => self.optimize = count,
            Step::Detect => self.detect = count,
            Step::Publish => self.publish = count,
        }
    }
}

/// Local retry policy applied inside a stage executor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts on transient errors beyond the first call
    pub max_local_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Alternate providers tried after the first one fails
    pub max_alternates: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_local_retries: 2,
            base_backoff_ms: 100,
            max_backoff_ms: 5_000,
            max_alternates: 2,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the given 0-based retry, capped at `max_backoff_ms`
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.min(16);
        let ms = self.base_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Upper bound on provider calls made for one stage execution
    pub fn max_calls(&self) -> usize {
        1 + self.max_local_retries as usize + self.max_alternates
    }
}

/// Deadlines for external acquire/lease/call operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub acquire_ms: u64,
    pub lease_ms: u64,
    pub call_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            acquire_ms: 5_000,
            lease_ms: 10_000,
            call_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn acquire(&self) -> Duration {
        Duration::from_millis(self.acquire_ms)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn call(&self) -> Duration {
        Duration::from_millis(self.call_ms)
    }
}

/// Provider health policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthPolicy {
    /// Consecutive failures that mark a provider unhealthy
    pub failure_threshold: u32,
    /// Delay before an unhealthy provider is offered a single probe call
    pub cooldown_ms: u64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_ms: 30_000,
        }
    }
}

impl HealthPolicy {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Session pool policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionPoolConfig {
    pub fetch_capacity: usize,
    pub detect_capacity: usize,
    pub publish_capacity: usize,
    /// Operations after which a session is disposed and replaced
    pub max_ops_per_session: u32,
    pub idle_ttl_ms: u64,
    pub reap_interval_ms: u64,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            fetch_capacity: 2,
            detect_capacity: 2,
            publish_capacity: 1,
            max_ops_per_session: 20,
            idle_ttl_ms: 2 * 60 * 60 * 1000,
            reap_interval_ms: 60_000,
        }
    }
}

impl SessionPoolConfig {
    pub fn capacity(&self, purpose: SessionPurpose) -> usize {
        match purpose {
            SessionPurpose::Fetch => self.fetch_capacity,
            SessionPurpose::Detect => self.detect_capacity,
            SessionPurpose::Publish => self.publish_capacity,
        }
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_millis(self.idle_ttl_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

/// Detect/optimize loop policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Score this far above the threshold jumps straight to AGGRESSIVE
    pub aggressive_margin: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self { aggressive_margin: 30.0 }
    }
}

/// Per-item detection policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ItemPolicy {
    pub max_attempts: u32,
    pub score_threshold: f64,
}

impl Default for ItemPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            score_threshold: 25.0,
        }
    }
}

/// Descriptor of one external provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub capability: Capability,
    pub weight: f64,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    pub rate_limit_per_hour: Option<u32>,
    pub concurrency_limit: u32,
    #[serde(default)]
    pub cost_per_unit: f64,
}

impl ProviderConfig {
    pub fn new(id: &str, capability: Capability, weight: f64, concurrency_limit: u32) -> Self {
        Self {
            id: ProviderId::from(id),
            capability,
            weight,
            rate_limit_per_minute: None,
            rate_limit_per_hour: None,
            concurrency_limit,
            cost_per_unit: 0.0,
        }
    }

    pub fn with_rate_limits(mut self, per_minute: Option<u32>, per_hour: Option<u32>) -> Self {
        self.rate_limit_per_minute = per_minute;
        self.rate_limit_per_hour = per_hour;
        self
    }

    pub fn with_cost(mut self, cost_per_unit: f64) -> Self {
        self.cost_per_unit = cost_per_unit;
        self
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: WorkerConfig,
    /// Queue depth per step above which external submissions are rejected
    pub max_queue_depth: usize,
    pub retry: RetryPolicy,
    pub timeouts: TimeoutConfig,
    pub health: HealthPolicy,
    pub sessions: SessionPoolConfig,
    pub optimization: OptimizationConfig,
    pub defaults: ItemPolicy,
    pub categories: HashMap<ContentCategory, ItemPolicy>,
    pub default_publish_target: String,
    /// Language requested from translation providers
    pub target_language: String,
    pub providers: Vec<ProviderConfig>,
    /// Seed for provider selection; entropy when unset
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: WorkerConfig::default(),
            max_queue_depth: 100,
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
            health: HealthPolicy::default(),
            sessions: SessionPoolConfig::default(),
            optimization: OptimizationConfig::default(),
            defaults: ItemPolicy::default(),
            categories: HashMap::new(),
            default_publish_target: "wordpress".to_string(),
            target_language: "zh".to_string(),
            providers: default_providers(),
            seed: None,
        }
    }
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new("deepl", Capability::Translate, 3.0, 4)
            .with_rate_limits(Some(60), Some(2_000))
            .with_cost(0.002),
        ProviderConfig::new("google-translate", Capability::Translate, 1.0, 4)
            .with_rate_limits(Some(120), None)
            .with_cost(0.001),
        ProviderConfig::new("gpt-rewrite", Capability::Optimize, 3.0, 3)
            .with_rate_limits(Some(30), Some(1_000))
            .with_cost(0.01),
        ProviderConfig::new("claude-rewrite", Capability::Optimize, 2.0, 3)
            .with_rate_limits(Some(30), Some(1_000))
            .with_cost(0.012),
        ProviderConfig::new("zerogpt", Capability::Detect, 1.0, 2).with_rate_limits(Some(20), None),
        ProviderConfig::new("wordpress", Capability::Publish, 1.0, 1).with_rate_limits(Some(10), Some(200)),
    ]
}

impl PipelineConfig {
    /// Load configuration from an optional JSON file plus environment overrides
    pub fn load(path: Option<&Path>) -> OrchestratorResult<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str::<PipelineConfig>(&raw)?
            }
            None => PipelineConfig::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PIPELINE_*` overrides from the given lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> OrchestratorResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PIPELINE_MAX_QUEUE_DEPTH") {
            self.max_queue_depth = parse_field("PIPELINE_MAX_QUEUE_DEPTH", &value)?;
        }
        for step in Step::ALL {
            let key = format!("PIPELINE_WORKERS_{}", step.as_str().to_uppercase());
            if let Some(value) = lookup(&key) {
                self.workers.set(step, parse_field(&key, &value)?);
            }
        }
        if let Some(value) = lookup("PIPELINE_MAX_ATTEMPTS") {
            self.defaults.max_attempts = parse_field("PIPELINE_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("PIPELINE_SCORE_THRESHOLD") {
            self.defaults.score_threshold = parse_field("PIPELINE_SCORE_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("PIPELINE_FAILURE_THRESHOLD") {
            self.health.failure_threshold = parse_field("PIPELINE_FAILURE_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("PIPELINE_COOLDOWN_MS") {
            self.health.cooldown_ms = parse_field("PIPELINE_COOLDOWN_MS", &value)?;
        }
        if let Some(value) = lookup("PIPELINE_CALL_TIMEOUT_MS") {
            self.timeouts.call_ms = parse_field("PIPELINE_CALL_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("PIPELINE_PUBLISH_TARGET") {
            self.default_publish_target = value;
        }
        if let Some(value) = lookup("PIPELINE_TARGET_LANGUAGE") {
            self.target_language = value;
        }
        if let Some(value) = lookup("PIPELINE_SEED") {
            self.seed = Some(parse_field("PIPELINE_SEED", &value)?);
        }
        Ok(())
    }

    /// Reject configurations the orchestrator cannot run with
    pub fn validate(&self) -> OrchestratorResult<()> {
        for step in Step::ALL {
            if self.workers.count(step) == 0 {
                return Err(config_error(&format!("workers.{step}"), "must be at least 1"));
            }
        }
        if self.max_queue_depth == 0 {
            return Err(config_error("max_queue_depth", "must be at least 1"));
        }
        if self.health.failure_threshold == 0 {
            return Err(config_error("health.failure_threshold", "must be at least 1"));
        }
        for purpose in [SessionPurpose::Fetch, SessionPurpose::Detect, SessionPurpose::Publish] {
            if self.sessions.capacity(purpose) == 0 {
                return Err(config_error(&format!("sessions.{purpose}_capacity"), "must be at least 1"));
            }
        }
        if self.sessions.max_ops_per_session == 0 {
            return Err(config_error("sessions.max_ops_per_session", "must be at least 1"));
        }
        if !self.defaults.score_threshold.is_finite() {
            return Err(config_error("defaults.score_threshold", "must be finite"));
        }
        for (category, policy) in &self.categories {
            if !policy.score_threshold.is_finite() {
                return Err(config_error(&format!("categories.{category}.score_threshold"), "must be finite"));
            }
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.id.clone()) {
                return Err(config_error(&format!("providers.{}", provider.id), "duplicate provider id"));
            }
            if !(provider.weight.is_finite() && provider.weight > 0.0) {
                return Err(config_error(&format!("providers.{}.weight", provider.id), "must be positive"));
            }
            if provider.concurrency_limit == 0 {
                return Err(config_error(
                    &format!("providers.{}.concurrency_limit", provider.id),
                    "must be at least 1",
                ));
            }
        }

        for capability in [Capability::Translate, Capability::Optimize, Capability::Detect, Capability::Publish] {
            if !self.providers.iter().any(|p| p.capability == capability) {
                return Err(config_error("providers", &format!("no provider configured for {capability}")));
            }
        }
        Ok(())
    }

    /// Item policy for a category, falling back to the defaults
    pub fn policy_for(&self, category: ContentCategory) -> ItemPolicy {
        let mut policy = self.categories.get(&category).copied().unwrap_or(self.defaults);
        policy.max_attempts = policy.max_attempts.max(1);
        policy
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> OrchestratorResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| config_error(field, &format!("cannot parse '{value}'")))
}

fn config_error(field: &str, reason: &str) -> OrchestratorError {
    OrchestratorError::Configuration {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers.translate, 3);
        assert_eq!(config.workers.detect, 2);
        assert_eq!(config.workers.publish, 1);
        assert_eq!(config.defaults.max_attempts, 3);
        assert_eq!(config.defaults.score_threshold, 25.0);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.backoff(0), Duration::from_millis(100));
        assert_eq!(retry.backoff(1), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(800));
        assert_eq!(retry.backoff(30), Duration::from_millis(5_000));
        assert_eq!(retry.max_calls(), 5);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = PipelineConfig::default();
        config.workers.detect = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration { ref field, .. } if field == "workers.detect"));
    }

    #[test]
    fn test_validate_rejects_missing_capability() {
        let mut config = PipelineConfig::default();
        config.providers.retain(|p| p.capability != Capability::Publish);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_category_threshold() {
        let mut config = PipelineConfig::default();
        config.categories.insert(
            ContentCategory::Tutorial,
            ItemPolicy {
                max_attempts: 3,
                score_threshold: f64::NAN,
            },
        );
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, OrchestratorError::Configuration { ref field, .. } if field == "categories.tutorial.score_threshold")
        );
    }

    #[test]
    fn test_validate_rejects_non_positive_weight() {
        let mut config = PipelineConfig::default();
        config.providers[0].weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_apply_and_reject_garbage() {
        let mut config = PipelineConfig::default();
        let vars: HashMap<&str, &str> = [
            ("PIPELINE_WORKERS_TRANSLATE", "5"),
            ("PIPELINE_SCORE_THRESHOLD", "30.5"),
            ("PIPELINE_SEED", "42"),
        ]
        .into_iter()
        .collect();

        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.workers.translate, 5);
        assert_eq!(config.defaults.score_threshold, 30.5);
        assert_eq!(config.seed, Some(42));

        let result = config.apply_overrides(|key| (key == "PIPELINE_MAX_ATTEMPTS").then(|| "three".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_category_policy_and_clamp() {
        let mut config = PipelineConfig::default();
        config.categories.insert(
            ContentCategory::News,
            ItemPolicy {
                max_attempts: 0,
                score_threshold: 15.0,
            },
        );

        let news = config.policy_for(ContentCategory::News);
        assert_eq!(news.max_attempts, 1);
        assert_eq!(news.score_threshold, 15.0);

        let general = config.policy_for(ContentCategory::General);
        assert_eq!(general, ItemPolicy::default());
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "max_queue_depth": 7,
                "workers": {{ "translate": 4 }},
                "categories": {{ "technical": {{ "max_attempts": 5, "score_threshold": 20.0 }} }}
            }}"#
        )
        .unwrap();

        let config = PipelineConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.max_queue_depth, 7);
        assert_eq!(config.workers.translate, 4);
        assert_eq!(config.workers.fetch, 2);
        assert_eq!(config.policy_for(ContentCategory::Technical).max_attempts, 5);
    }
}

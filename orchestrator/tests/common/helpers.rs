//! Test helpers and builder patterns for orchestrator tests
//!
//! `OrchestratorBuilder` assembles an orchestrator over the scripted fakes
//! with a small, fast configuration; tests tweak it through closures.

use orchestrator::config::{PipelineConfig, ProviderConfig};
use orchestrator::services::{InMemoryWorkItemRepository, RandomProfileGenerator, SimulatedSessionBackend, SimulationSettings};
use orchestrator::{AdapterRegistry, Orchestrator};
use shared::{Capability, Stage, WorkItemId, WorkItemStatus};
use std::sync::Arc;
use std::time::Duration;

use super::fixtures::{RecordingPublisher, ScriptedDetector, StaticSource, TaggingProvider, TestFixtures};

/// Builder for test orchestrators with sensible defaults
pub struct OrchestratorBuilder {
    config: PipelineConfig,
    source: Arc<StaticSource>,
    provider: Arc<TaggingProvider>,
    detector: Arc<ScriptedDetector>,
    publisher: Arc<RecordingPublisher>,
    repository: Arc<InMemoryWorkItemRepository>,
}

impl OrchestratorBuilder {
    /// Create a builder whose detector always passes
    pub fn new() -> Self {
        let mut config = PipelineConfig::default();
        config.providers = vec![
            ProviderConfig::new(TestFixtures::TRANSLATOR, Capability::Translate, 1.0, 4).with_cost(0.01),
            ProviderConfig::new(TestFixtures::REWRITER, Capability::Optimize, 1.0, 4).with_cost(0.02),
            ProviderConfig::new(TestFixtures::DETECTOR, Capability::Detect, 1.0, 2),
            ProviderConfig::new(TestFixtures::PUBLISHER, Capability::Publish, 1.0, 1),
        ];
        config.defaults.score_threshold = TestFixtures::THRESHOLD;
        config.retry.base_backoff_ms = 1;
        config.retry.max_backoff_ms = 5;
        config.timeouts.acquire_ms = 1_000;
        config.timeouts.call_ms = 2_000;
        config.seed = Some(TestFixtures::SEED);

        Self {
            config,
            source: Arc::new(StaticSource::new()),
            provider: Arc::new(TaggingProvider::new()),
            detector: Arc::new(ScriptedDetector::new(vec![10.0])),
            publisher: Arc::new(RecordingPublisher::new()),
            repository: Arc::new(InMemoryWorkItemRepository::new()),
        }
    }

    /// Adjust the pipeline configuration
    pub fn with_config<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut PipelineConfig),
    {
        setup(&mut self.config);
        self
    }

    /// Replay these detection scores in order
    pub fn with_scores(mut self, scores: Vec<f64>) -> Self {
        self.detector = Arc::new(ScriptedDetector::new(scores));
        self
    }

    pub fn with_source(mut self, source: Arc<StaticSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<RecordingPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn source(&self) -> Arc<StaticSource> {
        Arc::clone(&self.source)
    }

    pub fn provider(&self) -> Arc<TaggingProvider> {
        Arc::clone(&self.provider)
    }

    pub fn publisher(&self) -> Arc<RecordingPublisher> {
        Arc::clone(&self.publisher)
    }

    pub fn repository(&self) -> Arc<InMemoryWorkItemRepository> {
        Arc::clone(&self.repository)
    }

    /// Build the orchestrator without starting its workers
    pub fn build(self) -> Orchestrator {
        let adapters = AdapterRegistry::new(self.source)
            .with_ai(TestFixtures::TRANSLATOR, self.provider.clone())
            .with_ai(TestFixtures::REWRITER, self.provider)
            .with_detector(TestFixtures::DETECTOR, self.detector)
            .with_publisher(TestFixtures::PUBLISHER, self.publisher);
        let settings = SimulationSettings {
            latency: Duration::ZERO,
            failure_rate: 0.0,
            seed: Some(TestFixtures::SEED),
        };
        Orchestrator::new(
            self.config,
            adapters,
            self.repository,
            Arc::new(SimulatedSessionBackend::new(settings)),
            Arc::new(RandomProfileGenerator::new(Some(TestFixtures::SEED))),
        )
        .expect("test configuration is valid")
    }

    /// Build and start the orchestrator
    pub fn start(self) -> Orchestrator {
        let orchestrator = self.build();
        orchestrator.start();
        orchestrator
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    pub const WAIT: Duration = Duration::from_secs(10);

    /// Wait for a terminal stage, failing the test if the item never gets there
    pub async fn wait_terminal(orchestrator: &Orchestrator, id: WorkItemId) -> WorkItemStatus {
        let status = orchestrator
            .wait_until_terminal(id, Self::WAIT)
            .await
            .expect("work item exists");
        assert!(
            status.stage.is_terminal(),
            "item {id} still in {} after {:?}",
            status.stage,
            Self::WAIT
        );
        status
    }

    /// Poll until the item reaches `stage`
    pub async fn wait_for_stage(orchestrator: &Orchestrator, id: WorkItemId, stage: Stage) {
        let deadline = tokio::time::Instant::now() + Self::WAIT;
        loop {
            let status = orchestrator.get_status(id).await.expect("work item exists");
            if status.stage == stage {
                return;
            }
            assert!(tokio::time::Instant::now() < deadline, "item {id} never reached {stage}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stages the item passed through, in order
    pub fn stage_path(status: &WorkItemStatus) -> Vec<Stage> {
        let mut path: Vec<Stage> = status.history.iter().map(|transition| transition.from).collect();
        if let Some(last) = status.history.last() {
            path.push(last.to);
        }
        path
    }
}

//! Orchestrator facade
//!
//! Wires the provider registry, session pool, executors and scheduler
//! together through dependency injection and exposes the caller-facing
//! operations: ingest, status, cancel and statistics.

use shared::{
    component_debug, component_info, logging, Component, ContentCategory, Priority, ProviderId, ProviderSnapshot,
    SessionPoolSnapshot, Stage, Step, UsageRecord, WorkItemId, WorkItemStatus,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::adapters::AdapterRegistry;
use crate::config::PipelineConfig;
use crate::core::{Task, WorkItem};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::executors::{default_executors, ExecutorDeps, StageExecutor};
use crate::optimization::{EscalatingController, StrategyController};
use crate::scheduler::Scheduler;
use crate::services::{LedgerEntry, ProviderRegistry, SessionPool};
use crate::traits::{ProfileGenerator, SessionBackend, WorkItemRepository};

/// Interval between repository polls in `wait_until_terminal`
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Per-request ingestion options
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    pub category: ContentCategory,
    pub priority: Priority,
    /// Overrides the configured default publish target
    pub publish_target: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            category: ContentCategory::General,
            priority: Priority::Normal,
            publish_target: None,
        }
    }
}

/// Main orchestrator that owns the pipeline
pub struct Orchestrator {
    config: PipelineConfig,
    repository: Arc<dyn WorkItemRepository>,
    registry: Arc<ProviderRegistry>,
    pool: Arc<SessionPool>,
    scheduler: Scheduler,
    /// Serializes ingestion so source deduplication is race-free
    ingest_lock: tokio::sync::Mutex<()>,
    reaper: Mutex<Option<JoinHandle<()>>>,
    reaper_stop: watch::Sender<bool>,
}

impl Orchestrator {
    /// Create an orchestrator with the standard executors and controller
    pub fn new(
        config: PipelineConfig,
        adapters: AdapterRegistry,
        repository: Arc<dyn WorkItemRepository>,
        backend: Arc<dyn SessionBackend>,
        profiles: Arc<dyn ProfileGenerator>,
    ) -> OrchestratorResult<Self> {
        config.validate()?;
        let registry = Arc::new(ProviderRegistry::new(
            config.providers.clone(),
            config.health.clone(),
            config.seed,
        ));
        let pool = Arc::new(SessionPool::new(&config.sessions, backend, profiles));
        let deps = ExecutorDeps {
            registry: Arc::clone(&registry),
            pool: Arc::clone(&pool),
            adapters,
            repository: Arc::clone(&repository),
            retry: config.retry.clone(),
            timeouts: config.timeouts.clone(),
            target_language: config.target_language.clone(),
        };
        let executors = default_executors(&deps);
        let controller = Arc::new(EscalatingController::from_config(&config.optimization));
        Self::with_components(config, repository, registry, pool, executors, controller)
    }

    /// Create an orchestrator from explicitly supplied components
    pub fn with_components(
        config: PipelineConfig,
        repository: Arc<dyn WorkItemRepository>,
        registry: Arc<ProviderRegistry>,
        pool: Arc<SessionPool>,
        executors: HashMap<Step, Arc<dyn StageExecutor>>,
        controller: Arc<dyn StrategyController>,
    ) -> OrchestratorResult<Self> {
        let scheduler = Scheduler::new(Arc::clone(&repository), executors, controller, config.max_queue_depth)?;
        let (reaper_stop, _) = watch::channel(false);
        Ok(Self {
            config,
            repository,
            registry,
            pool,
            scheduler,
            ingest_lock: tokio::sync::Mutex::new(()),
            reaper: Mutex::new(None),
            reaper_stop,
        })
    }

    /// Start the worker pools and the idle session reaper
    pub fn start(&self) {
        logging::log_startup(&Component::Orchestrator, "article pipeline");
        self.scheduler.start(&self.config.workers);

        let mut reaper = self.reaper.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if reaper.is_none() {
            let pool = Arc::clone(&self.pool);
            let period = self.config.sessions.reap_interval();
            let mut stop = self.reaper_stop.subscribe();
            *reaper = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            pool.reap_idle();
                        }
                        _ = stop.changed() => break,
                    }
                }
            }));
        }
        logging::log_success(&Component::Orchestrator, "Pipeline started");
    }

    /// Create a work item for `source_ref` and queue its fetch
    ///
    /// A source that already has a non-terminal work item returns that item's
    /// id instead.
    pub async fn ingest(&self, source_ref: &str, options: IngestOptions) -> OrchestratorResult<WorkItemId> {
        let source_ref = source_ref.trim();
        if source_ref.is_empty() {
            return Err(OrchestratorError::Configuration {
                field: "source_ref".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let _guard = self.ingest_lock.lock().await;
        if let Some(existing) = self.repository.find_active_by_source(source_ref).await? {
            component_debug!(Component::Orchestrator, item = %existing, "Source already in flight: {}", source_ref);
            return Ok(existing);
        }

        // Only external submissions feed the fetch queue, so this check holds until submit
        let depth = self.scheduler.queue_depth(Step::Fetch);
        if depth >= self.config.max_queue_depth {
            return Err(OrchestratorError::QueueSaturated {
                step: Step::Fetch.to_string(),
                depth,
            });
        }

        let policy = self.config.policy_for(options.category);
        let target = options
            .publish_target
            .unwrap_or_else(|| self.config.default_publish_target.clone());
        let item = WorkItem::new(source_ref, options.category, policy, options.priority, target);
        let id = item.id;
        self.repository.insert(item).await?;
        self.scheduler.submit(Task::new(id, Step::Fetch, options.priority))?;

        component_info!(
            Component::Orchestrator,
            item = %id,
            category = %options.category,
            priority = ?options.priority,
            "📥 Ingested {}",
            source_ref
        );
        Ok(id)
    }

    pub async fn get_status(&self, id: WorkItemId) -> OrchestratorResult<WorkItemStatus> {
        Ok(self.get_item(id).await?.status())
    }

    /// Full work item record, including content revisions and the audit log
    pub async fn get_item(&self, id: WorkItemId) -> OrchestratorResult<WorkItem> {
        self.repository
            .load(id)
            .await?
            .ok_or(OrchestratorError::WorkItemNotFound { id })
    }

    pub async fn cancel(&self, id: WorkItemId) -> OrchestratorResult<bool> {
        self.scheduler.cancel(id).await
    }

    pub fn provider_stats(&self) -> Vec<ProviderSnapshot> {
        self.registry.snapshot()
    }

    pub fn session_stats(&self) -> Vec<SessionPoolSnapshot> {
        self.pool.snapshot()
    }

    /// Usage ledger totals per provider and UTC hour
    pub fn ledger(&self) -> Vec<(ProviderId, String, LedgerEntry)> {
        self.registry.ledger().entries()
    }

    /// Persisted usage records
    pub async fn usage(&self) -> OrchestratorResult<Vec<UsageRecord>> {
        self.repository.usage().await
    }

    /// Poll until the item is terminal or `timeout` elapses
    pub async fn wait_until_terminal(&self, id: WorkItemId, timeout: Duration) -> OrchestratorResult<WorkItemStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.get_status(id).await?;
            if status.stage.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Ok(status);
            }
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
        }
    }

    /// Count of work items per stage
    pub async fn stage_counts(&self) -> OrchestratorResult<HashMap<Stage, usize>> {
        let mut counts = HashMap::new();
        for id in self.repository.list_ids().await? {
            if let Some(item) = self.repository.load(id).await? {
                *counts.entry(item.stage).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Stop the workers and the reaper, then close idle sessions
    pub async fn shutdown(&self) {
        logging::log_shutdown(&Component::Orchestrator, "shutdown requested");
        self.scheduler.shutdown().await;

        let _ = self.reaper_stop.send(true);
        let reaper = self
            .reaper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(reaper) = reaper {
            let _ = reaper.await;
        }

        let closed = self.pool.close_idle().await;
        logging::log_success(
            &Component::Orchestrator,
            &format!("Pipeline stopped, closed {closed} idle session(s)"),
        );
    }
}

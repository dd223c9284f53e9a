//! Stage executors
//!
//! One executor per pipeline step. An executor reads a snapshot of the work
//! item, calls a provider through the registry and/or a session from the pool,
//! and returns a `StageOutcome`. It never writes the work item; the scheduler
//! applies the outcome through the state machine.

pub mod detect;
pub mod failover;
pub mod fetch;
pub mod optimize;
pub mod publish;
pub mod translate;

pub use detect::DetectExecutor;
pub use fetch::FetchExecutor;
pub use optimize::OptimizeExecutor;
pub use publish::PublishExecutor;
pub use translate::TranslateExecutor;

use async_trait::async_trait;
use shared::{Step, StrategyLevel};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::adapters::AdapterRegistry;
use crate::config::{RetryPolicy, TimeoutConfig};
use crate::core::{StageOutcome, Task, WorkItem};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::services::{ProviderRegistry, SessionPool};
use crate::traits::WorkItemRepository;

/// Everything an executor sees for one task
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Snapshot taken after the item entered the step's active stage
    pub item: WorkItem,
    pub task: Task,
    /// Strategy chosen by the optimization controller, set for optimize tasks
    pub strategy: Option<StrategyLevel>,
    cancel: Arc<AtomicBool>,
}

impl StageContext {
    pub fn new(item: WorkItem, task: Task, strategy: Option<StrategyLevel>, cancel: Arc<AtomicBool>) -> Self {
        Self {
            item,
            task,
            strategy,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been requested
    pub fn checkpoint(&self) -> OrchestratorResult<()> {
        if self.is_cancelled() {
            return Err(OrchestratorError::Cancelled { id: self.item.id });
        }
        Ok(())
    }
}

/// Performs one pipeline step for a work item
#[mockall::automock]
#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn step(&self) -> Step;

    async fn execute(&self, ctx: &StageContext) -> StageOutcome;
}

/// Shared collaborators handed to every executor
#[derive(Clone)]
pub struct ExecutorDeps {
    pub registry: Arc<ProviderRegistry>,
    pub pool: Arc<SessionPool>,
    pub adapters: AdapterRegistry,
    pub repository: Arc<dyn WorkItemRepository>,
    pub retry: RetryPolicy,
    pub timeouts: TimeoutConfig,
    pub target_language: String,
}

/// Map an executor's internal result onto a stage outcome
pub(crate) fn into_outcome(result: OrchestratorResult<StageOutcome>) -> StageOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(OrchestratorError::Cancelled { .. }) => StageOutcome::Cancelled,
        Err(error) => StageOutcome::Failed(error),
    }
}

/// The standard executor for each step
pub fn default_executors(deps: &ExecutorDeps) -> HashMap<Step, Arc<dyn StageExecutor>> {
    let executors: Vec<Arc<dyn StageExecutor>> = vec![
        Arc::new(FetchExecutor::new(deps.clone())),
        Arc::new(TranslateExecutor::new(deps.clone())),
        Arc::new(OptimizeExecutor::new(deps.clone())),
        Arc::new(DetectExecutor::new(deps.clone())),
        Arc::new(PublishExecutor::new(deps.clone())),
    ];
    executors.into_iter().map(|executor| (executor.step(), executor)).collect()
}

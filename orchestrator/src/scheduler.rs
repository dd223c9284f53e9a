//! Task scheduler
//!
//! One priority queue per step and a fixed pool of workers per step. A worker
//! claims the best ready task whose work item has nothing else in flight, runs
//! the step's executor, applies the outcome through the state machine and
//! enqueues the follow-up task. Claiming and releasing a work item happen
//! under one short-lived lock, which is what keeps two stages of the same item
//! from ever running at once.

use shared::{
    component_debug, component_error, component_info, component_warn, logging, Component, ContentVersion, Stage, Step,
    TaskId, WorkItemId,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::config::WorkerConfig;
use crate::core::{FollowUp, StageOutcome, StateMachine, Task, TaskQueue, WorkItem};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::executors::{StageContext, StageExecutor};
use crate::optimization::StrategyController;
use crate::traits::WorkItemRepository;

#[derive(Debug)]
struct DispatchState {
    queue: TaskQueue,
    /// Work items currently owned by a worker or a cancellation
    busy: HashSet<WorkItemId>,
    /// Cancellation flags of items owned by a worker
    cancel_flags: HashMap<WorkItemId, Arc<AtomicBool>>,
}

struct SchedulerInner {
    state: Mutex<DispatchState>,
    /// Signalled whenever a task becomes claimable
    ready: Notify,
    /// Signalled whenever a work item is released
    released: Notify,
    repository: Arc<dyn WorkItemRepository>,
    executors: HashMap<Step, Arc<dyn StageExecutor>>,
    controller: Arc<dyn StrategyController>,
}

pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        repository: Arc<dyn WorkItemRepository>,
        executors: HashMap<Step, Arc<dyn StageExecutor>>,
        controller: Arc<dyn StrategyController>,
        max_queue_depth: usize,
    ) -> OrchestratorResult<Self> {
        for step in Step::ALL {
            if !executors.contains_key(&step) {
                return Err(OrchestratorError::Configuration {
                    field: format!("executors.{step}"),
                    reason: "no executor registered".to_string(),
                });
            }
        }
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(DispatchState {
                    queue: TaskQueue::new(max_queue_depth),
                    busy: HashSet::new(),
                    cancel_flags: HashMap::new(),
                }),
                ready: Notify::new(),
                released: Notify::new(),
                repository,
                executors,
                controller,
            }),
            shutdown,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the worker pools
    pub fn start(&self, workers: &WorkerConfig) {
        let mut handles = self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !handles.is_empty() {
            return;
        }
        for step in Step::ALL {
            let count = workers.count(step);
            for index in 0..count {
                let inner = Arc::clone(&self.inner);
                let shutdown = self.shutdown.subscribe();
                handles.push(tokio::spawn(worker_loop(inner, step, index, shutdown)));
            }
            logging::log_startup(&Component::Worker(step), &format!("{count} worker(s)"));
        }
    }

    /// Queue an external task; rejected with `QueueSaturated` when the step's
    /// queue is full
    pub fn submit(&self, task: Task) -> OrchestratorResult<TaskId> {
        let id = task.id;
        let step = task.step;
        self.inner.lock().queue.push(task, true)?;
        component_debug!(Component::Scheduler, task = %id, step = %step, "Task queued");
        self.inner.ready.notify_waiters();
        Ok(id)
    }

    /// Cancel a work item
    ///
    /// Queued tasks are dropped. An item owned by a worker gets its
    /// cancellation flag set and this call waits for the worker to let go;
    /// otherwise the item is moved to CANCELLED directly. Returns whether this
    /// call cancelled the item.
    pub async fn cancel(&self, id: WorkItemId) -> OrchestratorResult<bool> {
        enum Plan {
            Signalled { first: bool },
            Reserved,
        }

        let plan = {
            let mut state = self.inner.lock();
            let dropped = state.queue.remove_item(id);
            if dropped > 0 {
                component_debug!(Component::Scheduler, item = %id, dropped = dropped, "Dropped queued tasks");
            }
            if state.busy.contains(&id) {
                let first = state
                    .cancel_flags
                    .get(&id)
                    .is_some_and(|flag| !flag.swap(true, Ordering::SeqCst));
                Plan::Signalled { first }
            } else {
                state.busy.insert(id);
                Plan::Reserved
            }
        };

        match plan {
            Plan::Reserved => {
                let result = self.inner.cancel_item(id).await;
                self.inner.release(id, None);
                result
            }
            Plan::Signalled { first } => {
                self.inner.wait_released(id).await;
                let stage = self.inner.repository.load(id).await?.map(|item| item.stage);
                Ok(first && stage == Some(Stage::Cancelled))
            }
        }
    }

    pub fn queue_depth(&self, step: Step) -> usize {
        self.inner.lock().queue.depth(step)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().busy.len()
    }

    /// Stop the workers; each finishes its current task first
    pub async fn shutdown(&self) {
        logging::log_shutdown(&Component::Scheduler, "stopping worker pools");
        let _ = self.shutdown.send(true);
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            workers.drain(..).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                component_error!(Component::Scheduler, "Worker task ended abnormally: {}", err);
            }
        }
    }
}

async fn worker_loop(inner: Arc<SchedulerInner>, step: Step, index: usize, mut shutdown: watch::Receiver<bool>) {
    let component = Component::Worker(step);
    component_debug!(component, worker = index, "Worker started");
    loop {
        let notified = inner.ready.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if *shutdown.borrow() {
            break;
        }
        if let Some((task, cancel)) = inner.claim(step) {
            inner.process(task, cancel).await;
            continue;
        }
        tokio::select! {
            _ = &mut notified => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    component_debug!(component, worker = index, "Worker stopped");
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pop the best ready task for `step` and take ownership of its item
    fn claim(&self, step: Step) -> Option<(Task, Arc<AtomicBool>)> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let task = state.queue.pop_ready(step, &state.busy)?;
        let cancel = Arc::new(AtomicBool::new(false));
        state.busy.insert(task.work_item_id);
        state.cancel_flags.insert(task.work_item_id, Arc::clone(&cancel));
        Some((task, cancel))
    }

    /// Give up ownership of an item and queue its follow-up, if any
    fn release(&self, id: WorkItemId, next: Option<Task>) {
        {
            let mut state = self.lock();
            state.busy.remove(&id);
            state.cancel_flags.remove(&id);
            if let Some(task) = next {
                // Follow-ups never count against the depth limit
                if let Err(err) = state.queue.push(task, false) {
                    component_error!(Component::Scheduler, item = %id, "Failed to queue follow-up: {}", err);
                }
            }
        }
        self.ready.notify_waiters();
        self.released.notify_waiters();
    }

    /// Release unless a cancellation arrived; in that case keep ownership and
    /// report it so the caller can finish the cancellation
    fn release_unless_cancelled(&self, id: WorkItemId, next: Option<Task>) -> bool {
        {
            let state = self.lock();
            let cancelled = state
                .cancel_flags
                .get(&id)
                .is_some_and(|flag| flag.load(Ordering::SeqCst));
            if cancelled {
                return true;
            }
        }
        // Nobody else can set the flag between the check and the release:
        // `cancel` takes the same lock and only signals items that are busy.
        self.release(id, next);
        false
    }

    async fn wait_released(&self, id: WorkItemId) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.lock().busy.contains(&id) {
                return;
            }
            notified.await;
        }
    }

    /// Move a non-terminal item to CANCELLED; the caller owns the item
    async fn cancel_item(&self, id: WorkItemId) -> OrchestratorResult<bool> {
        let Some(mut item) = self.repository.load(id).await? else {
            return Ok(false);
        };
        if item.is_terminal() {
            return Ok(false);
        }
        let from = item.stage;
        item.transition_to(Stage::Cancelled, Some("cancelled by request".to_string()))?;
        self.repository.save(&item).await?;
        component_info!(Component::Scheduler, item = %id, from = %from, "🚫 Work item cancelled");
        Ok(true)
    }

    async fn process(&self, task: Task, cancel: Arc<AtomicBool>) {
        let id = task.work_item_id;
        let step = task.step;
        let component = Component::Worker(step);

        let next = match self.run_task(&task, &cancel).await {
            Ok(next) => next,
            Err(err) => {
                logging::log_error(&component, &format!("{step} task for {id}"), &err);
                if let Err(fail_err) = self.fail_item(id, &err).await {
                    logging::log_error(&component, &format!("failing {id}"), &fail_err);
                }
                None
            }
        };

        if self.release_unless_cancelled(id, next) {
            if let Err(err) = self.cancel_item(id).await {
                logging::log_error(&component, &format!("cancelling {id}"), &err);
            }
            self.release(id, None);
        }
    }

    /// Move an item to FAILED after its task errored outside the executor,
    /// so it never stays in an active stage with nothing queued
    async fn fail_item(&self, id: WorkItemId, error: &OrchestratorError) -> OrchestratorResult<()> {
        let Some(mut item) = self.repository.load(id).await? else {
            return Ok(());
        };
        if item.is_terminal() {
            return Ok(());
        }
        item.fail(error)?;
        self.repository.save(&item).await
    }

    /// Execute one task and return the follow-up to enqueue
    async fn run_task(&self, task: &Task, cancel: &Arc<AtomicBool>) -> OrchestratorResult<Option<Task>> {
        let id = task.work_item_id;
        let step = task.step;
        let component = Component::Worker(step);

        let Some(mut item) = self.repository.load(id).await? else {
            component_warn!(component, item = %id, "Dropping task for unknown work item");
            return Ok(None);
        };
        if item.is_terminal() {
            component_debug!(component, item = %id, stage = %item.stage, "Skipping task for terminal work item");
            return Ok(None);
        }
        if let Err(err) = StateMachine::enter(&mut item, step) {
            component_warn!(component, item = %id, stage = %item.stage, "Dropping stale task: {}", err);
            return Ok(None);
        }

        let strategy = (step == Step::Optimize).then(|| {
            self.controller
                .next_strategy(item.attempt, item.last_score(), item.score_threshold, item.last_strategy)
        });
        if let Some(level) = strategy {
            item.audit(format!("strategy {level} chosen for attempt {}", item.attempt));
        }
        self.repository.save(&item).await?;
        component_debug!(component, item = %id, task = %task.id, stage = %item.stage, "Executing");

        let executor = self
            .executors
            .get(&step)
            .ok_or_else(|| OrchestratorError::Configuration {
                field: format!("executors.{step}"),
                reason: "no executor registered".to_string(),
            })?;
        let ctx = StageContext::new(item.clone(), task.clone(), strategy, Arc::clone(cancel));
        let mut outcome = executor.execute(&ctx).await;

        if cancel.load(Ordering::SeqCst) && !matches!(outcome, StageOutcome::Cancelled) {
            component_info!(component, item = %id, "Discarding {} result of cancelled work item", outcome.label());
            outcome = StageOutcome::Cancelled;
        }
        if let StageOutcome::Failed(err) = &outcome {
            component_warn!(component, item = %id, "Stage failed: {}", err);
        }

        let from = item.stage;
        let follow_up = match StateMachine::apply(&mut item, step, outcome) {
            Ok(follow_up) => follow_up,
            Err(err) => {
                component_error!(component, item = %id, "Outcome could not be applied: {}", err);
                item.fail(&err)?;
                FollowUp::Complete(Stage::Failed)
            }
        };
        self.repository.save(&item).await?;
        component_info!(component, item = %id, "➡️ {} -> {}", from, item.stage);

        Ok(match follow_up {
            FollowUp::Next(next_step) => {
                // A rewrite retry prefers the provider that produced the previous rewrite
                let hint = match next_step {
                    Step::Optimize => item
                        .latest(ContentVersion::Optimized)
                        .and_then(|revision| revision.provider.clone()),
                    _ => None,
                };
                Some(
                    Task::new(id, next_step, item.priority)
                        .with_attempt(item.attempt)
                        .with_provider_hint(hint),
                )
            }
            FollowUp::Complete(stage) => {
                log_terminal(&item, stage);
                None
            }
        })
    }
}

fn log_terminal(item: &WorkItem, stage: Stage) {
    match stage {
        Stage::Published => logging::log_success(
            &Component::Scheduler,
            &format!(
                "{} published as {} after {} detection(s)",
                item.id,
                item.published_ref.as_deref().unwrap_or("-"),
                item.detection_history().len()
            ),
        ),
        Stage::Failed => component_warn!(
            Component::Scheduler,
            item = %item.id,
            attempts = item.attempt,
            "💀 Work item failed: {}",
            item.last_error.as_deref().unwrap_or("unknown error")
        ),
        _ => component_info!(Component::Scheduler, item = %item.id, "Work item finished as {}", stage),
    }
}

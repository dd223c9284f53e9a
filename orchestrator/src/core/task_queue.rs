//! Per-step priority queue of pending tasks
//!
//! Ordering is priority first, then submission order. Popping skips tasks
//! whose work item already has a task in flight, leaving them queued.

use chrono::{DateTime, Utc};
use shared::{Priority, ProviderId, Step, TaskId, WorkItemId};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{OrchestratorError, OrchestratorResult};

/// One (work item, step) execution request
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub work_item_id: WorkItemId,
    pub step: Step,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub attempt_number: u32,
    pub provider_hint: Option<ProviderId>,
}

impl Task {
    pub fn new(work_item_id: WorkItemId, step: Step, priority: Priority) -> Self {
        Self {
            id: TaskId::new(),
            work_item_id,
            step,
            priority,
            created_at: Utc::now(),
            attempt_number: 0,
            provider_hint: None,
        }
    }

    pub fn with_attempt(mut self, attempt_number: u32) -> Self {
        self.attempt_number = attempt_number;
        self
    }

    pub fn with_provider_hint(mut self, hint: Option<ProviderId>) -> Self {
        self.provider_hint = hint;
        self
    }
}

type QueueKey = (Reverse<Priority>, u64);

#[derive(Debug)]
pub struct TaskQueue {
    queues: HashMap<Step, BTreeMap<QueueKey, Task>>,
    next_seq: u64,
    max_depth: usize,
}

impl TaskQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            queues: HashMap::new(),
            next_seq: 0,
            max_depth,
        }
    }

    /// Enqueue a task, rejecting external submissions past the depth limit
    pub fn push(&mut self, task: Task, enforce_limit: bool) -> OrchestratorResult<()> {
        let depth = self.depth(task.step);
        if enforce_limit && depth >= self.max_depth {
            return Err(OrchestratorError::QueueSaturated {
                step: task.step.to_string(),
                depth,
            });
        }

        let key = (Reverse(task.priority), self.next_seq);
        self.next_seq += 1;
        self.queues.entry(task.step).or_default().insert(key, task);
        Ok(())
    }

    /// Remove and return the best task for `step` whose item is not busy
    pub fn pop_ready(&mut self, step: Step, busy: &HashSet<WorkItemId>) -> Option<Task> {
        let queue = self.queues.get_mut(&step)?;
        let key = queue
            .iter()
            .find(|(_, task)| !busy.contains(&task.work_item_id))
            .map(|(key, _)| *key)?;
        queue.remove(&key)
    }

    /// Drop every queued task of a work item, returning how many were removed
    pub fn remove_item(&mut self, id: WorkItemId) -> usize {
        let mut removed = 0;
        for queue in self.queues.values_mut() {
            let before = queue.len();
            queue.retain(|_, task| task.work_item_id != id);
            removed += before - queue.len();
        }
        removed
    }

    pub fn contains_item(&self, id: WorkItemId) -> bool {
        self.queues
            .values()
            .any(|queue| queue.values().any(|task| task.work_item_id == id))
    }

    pub fn depth(&self, step: Step) -> usize {
        self.queues.get(&step).map_or(0, BTreeMap::len)
    }

    pub fn total_depth(&self) -> usize {
        self.queues.values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = TaskQueue::new(10);
        let a = Task::new(WorkItemId::new(), Step::Translate, Priority::Normal);
        let b = Task::new(WorkItemId::new(), Step::Translate, Priority::Urgent);
        let c = Task::new(WorkItemId::new(), Step::Translate, Priority::Normal);
        let d = Task::new(WorkItemId::new(), Step::Translate, Priority::Low);
        for task in [&a, &b, &c, &d] {
            queue.push(task.clone(), true).unwrap();
        }

        let busy = HashSet::new();
        let order: Vec<TaskId> = std::iter::from_fn(|| queue.pop_ready(Step::Translate, &busy))
            .map(|t| t.id)
            .collect();

        assert_eq!(order, vec![b.id, a.id, c.id, d.id]);
    }

    #[test]
    fn test_steps_are_independent() {
        let mut queue = TaskQueue::new(10);
        queue
            .push(Task::new(WorkItemId::new(), Step::Fetch, Priority::Normal), true)
            .unwrap();

        assert!(queue.pop_ready(Step::Detect, &HashSet::new()).is_none());
        assert_eq!(queue.depth(Step::Fetch), 1);
    }

    #[test]
    fn test_busy_items_are_skipped_not_dropped() {
        let mut queue = TaskQueue::new(10);
        let busy_item = WorkItemId::new();
        let first = Task::new(busy_item, Step::Optimize, Priority::Urgent);
        let second = Task::new(WorkItemId::new(), Step::Optimize, Priority::Low);
        queue.push(first.clone(), true).unwrap();
        queue.push(second.clone(), true).unwrap();

        let busy: HashSet<_> = [busy_item].into_iter().collect();
        assert_eq!(queue.pop_ready(Step::Optimize, &busy).unwrap().id, second.id);
        assert!(queue.pop_ready(Step::Optimize, &busy).is_none());
        assert!(queue.contains_item(busy_item));

        assert_eq!(queue.pop_ready(Step::Optimize, &HashSet::new()).unwrap().id, first.id);
    }

    #[test]
    fn test_depth_limit_applies_to_external_submissions_only() {
        let mut queue = TaskQueue::new(2);
        for _ in 0..2 {
            queue
                .push(Task::new(WorkItemId::new(), Step::Fetch, Priority::Normal), true)
                .unwrap();
        }

        let rejected = queue.push(Task::new(WorkItemId::new(), Step::Fetch, Priority::Urgent), true);
        assert!(matches!(rejected, Err(OrchestratorError::QueueSaturated { depth: 2, .. })));

        queue
            .push(Task::new(WorkItemId::new(), Step::Fetch, Priority::Normal), false)
            .unwrap();
        assert_eq!(queue.depth(Step::Fetch), 3);
    }

    #[test]
    fn test_remove_item_across_steps() {
        let mut queue = TaskQueue::new(10);
        let id = WorkItemId::new();
        queue.push(Task::new(id, Step::Fetch, Priority::Normal), true).unwrap();
        queue.push(Task::new(id, Step::Translate, Priority::Normal), false).unwrap();
        queue
            .push(Task::new(WorkItemId::new(), Step::Fetch, Priority::Normal), true)
            .unwrap();

        assert_eq!(queue.remove_item(id), 2);
        assert!(!queue.contains_item(id));
        assert_eq!(queue.total_depth(), 1);
    }
}

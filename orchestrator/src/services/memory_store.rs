//! In-memory work item repository

use async_trait::async_trait;
use shared::{UsageRecord, WorkItemId};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::core::WorkItem;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::WorkItemRepository;

/// Keeps every record for the life of the process; terminal records are
/// retained as archived and never overwritten.
#[derive(Default)]
pub struct InMemoryWorkItemRepository {
    items: RwLock<HashMap<WorkItemId, WorkItem>>,
    usage: RwLock<Vec<UsageRecord>>,
}

impl InMemoryWorkItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkItemRepository for InMemoryWorkItemRepository {
    async fn insert(&self, item: WorkItem) -> OrchestratorResult<()> {
        let mut items = self.items.write().await;
        if items.contains_key(&item.id) {
            return Err(OrchestratorError::Repository {
                message: format!("work item {} already exists", item.id),
            });
        }
        items.insert(item.id, item);
        Ok(())
    }

    async fn load(&self, id: WorkItemId) -> OrchestratorResult<Option<WorkItem>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn save(&self, item: &WorkItem) -> OrchestratorResult<()> {
        let mut items = self.items.write().await;
        let stored = items
            .get_mut(&item.id)
            .ok_or(OrchestratorError::WorkItemNotFound { id: item.id })?;
        if stored.is_terminal() {
            return Err(OrchestratorError::TerminalItemImmutable {
                id: item.id,
                stage: stored.stage,
            });
        }
        *stored = item.clone();
        Ok(())
    }

    async fn find_active_by_source(&self, source_ref: &str) -> OrchestratorResult<Option<WorkItemId>> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .find(|item| item.source_ref == source_ref && !item.is_terminal())
            .map(|item| item.id))
    }

    async fn list_ids(&self) -> OrchestratorResult<Vec<WorkItemId>> {
        let mut ids: Vec<WorkItemId> = self.items.read().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn record_usage(&self, record: UsageRecord) -> OrchestratorResult<()> {
        self.usage.write().await.push(record);
        Ok(())
    }

    async fn usage(&self) -> OrchestratorResult<Vec<UsageRecord>> {
        Ok(self.usage.read().await.clone())
    }
}

//! In-memory repository tests

use crate::config::ItemPolicy;
use crate::core::WorkItem;
use crate::error::OrchestratorError;
use crate::services::InMemoryWorkItemRepository;
use crate::traits::WorkItemRepository;
use chrono::Utc;
use shared::{Capability, ContentCategory, Priority, ProviderId, Stage, UsageRecord, WorkItemId};
use tokio_test::{assert_err, assert_ok};

fn item(source: &str) -> WorkItem {
    WorkItem::new(source, ContentCategory::News, ItemPolicy::default(), Priority::Normal, "wordpress")
}

#[tokio::test]
async fn test_insert_load_save() {
    // Arrange
    let repo = InMemoryWorkItemRepository::new();
    let mut work_item = item("https://medium.com/p/1");
    let id = work_item.id;

    // Act
    assert_ok!(repo.insert(work_item.clone()).await);
    work_item.transition_to(Stage::Fetching, None).unwrap();
    assert_ok!(repo.save(&work_item).await);

    // Assert
    let loaded = assert_ok!(repo.load(id).await).unwrap();
    assert_eq!(loaded.stage, Stage::Fetching);
    assert!(assert_ok!(repo.load(WorkItemId::new()).await).is_none());
    assert_err!(repo.insert(work_item).await);
}

#[tokio::test]
async fn test_terminal_records_are_never_overwritten() {
    // Arrange
    let repo = InMemoryWorkItemRepository::new();
    let mut work_item = item("https://medium.com/p/2");
    repo.insert(work_item.clone()).await.unwrap();
    let stale = work_item.clone();
    work_item.transition_to(Stage::Cancelled, None).unwrap();
    repo.save(&work_item).await.unwrap();

    // Act
    let result = repo.save(&stale).await;

    // Assert
    assert!(matches!(
        result,
        Err(OrchestratorError::TerminalItemImmutable {
            stage: Stage::Cancelled,
            ..
        })
    ));
    let stored = repo.load(work_item.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::Cancelled);
    assert!(stored.archived_at.is_some());
}

#[tokio::test]
async fn test_save_unknown_item_fails() {
    let repo = InMemoryWorkItemRepository::new();
    let result = repo.save(&item("x")).await;
    assert!(matches!(result, Err(OrchestratorError::WorkItemNotFound { .. })));
}

#[tokio::test]
async fn test_find_active_by_source_ignores_terminal_items() {
    // Arrange
    let repo = InMemoryWorkItemRepository::new();
    let mut done = item("https://toutiao.com/a/9");
    repo.insert(done.clone()).await.unwrap();

    // Act & Assert
    assert_eq!(repo.find_active_by_source("https://toutiao.com/a/9").await.unwrap(), Some(done.id));
    done.transition_to(Stage::Cancelled, None).unwrap();
    repo.save(&done).await.unwrap();
    assert_eq!(repo.find_active_by_source("https://toutiao.com/a/9").await.unwrap(), None);
}

#[tokio::test]
async fn test_usage_records_are_appended() {
    let repo = InMemoryWorkItemRepository::new();
    let record = UsageRecord::new(ProviderId::from("deepl"), Capability::Translate, 1.0, 0.1, Utc::now());

    repo.record_usage(record.clone()).await.unwrap();
    repo.record_usage(record.clone()).await.unwrap();

    assert_eq!(repo.usage().await.unwrap(), vec![record.clone(), record]);
}

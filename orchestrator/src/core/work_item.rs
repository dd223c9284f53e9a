//! Work item record and its append-only logs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    ContentCategory, ContentVersion, DetectionRecord, Priority, ProviderId, Stage, StageTransition,
    StrategyLevel, WorkItemId, WorkItemStatus,
};

use super::state_machine::can_transition;
use crate::config::ItemPolicy;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::ContentMetadata;

/// Characters read per minute when estimating reading time
const CHARS_PER_MINUTE: usize = 350;

/// One stored content version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRevision {
    pub version: ContentVersion,
    pub text: String,
    pub word_count: usize,
    pub reading_minutes: u32,
    pub provider: Option<ProviderId>,
    pub strategy: Option<StrategyLevel>,
    pub created_at: DateTime<Utc>,
}

impl ContentRevision {
    pub fn new(
        version: ContentVersion,
        text: String,
        provider: Option<ProviderId>,
        strategy: Option<StrategyLevel>,
    ) -> Self {
        let word_count = text.split_whitespace().count();
        let reading_minutes = reading_minutes(&text);
        Self {
            version,
            text,
            word_count,
            reading_minutes,
            provider,
            strategy,
            created_at: Utc::now(),
        }
    }
}

/// Estimated reading time, never below one minute
pub fn reading_minutes(text: &str) -> u32 {
    let chars = text.chars().count();
    ((chars / CHARS_PER_MINUTE) as u32).max(1)
}

/// Audit entry written on every transition and failure path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub stage: Stage,
    pub message: String,
}

/// Pipeline state for one article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub source_ref: String,
    pub category: ContentCategory,
    pub priority: Priority,
    pub publish_target: String,
    pub stage: Stage,
    pub metadata: ContentMetadata,
    content: Vec<ContentRevision>,
    detection_history: Vec<DetectionRecord>,
    history: Vec<StageTransition>,
    audit: Vec<AuditEntry>,
    /// 0-based optimization iteration
    pub attempt: u32,
    pub max_attempts: u32,
    pub score_threshold: f64,
    pub last_strategy: Option<StrategyLevel>,
    pub last_error: Option<String>,
    pub published_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn new(
        source_ref: impl Into<String>,
        category: ContentCategory,
        policy: ItemPolicy,
        priority: Priority,
        publish_target: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let mut item = Self {
            id: WorkItemId::new(),
            source_ref: source_ref.into(),
            category,
            priority,
            publish_target: publish_target.into(),
            stage: Stage::Pending,
            metadata: ContentMetadata::default(),
            content: Vec::new(),
            detection_history: Vec::new(),
            history: Vec::new(),
            audit: Vec::new(),
            attempt: 0,
            max_attempts: policy.max_attempts.max(1),
            score_threshold: policy.score_threshold,
            last_strategy: None,
            last_error: None,
            published_ref: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        item.audit(format!(
            "ingested from {} (max_attempts={}, threshold={:.1})",
            item.source_ref, item.max_attempts, item.score_threshold
        ));
        item
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Move to `to` along the lifecycle graph
    pub fn transition_to(&mut self, to: Stage, note: Option<String>) -> OrchestratorResult<()> {
        if self.stage.is_terminal() {
            return Err(OrchestratorError::TerminalItemImmutable {
                id: self.id,
                stage: self.stage,
            });
        }
        if !can_transition(self.stage, to) {
            return Err(OrchestratorError::InvalidTransition { from: self.stage, to });
        }

        let now = Utc::now();
        let from = self.stage;
        self.stage = to;
        self.updated_at = now;
        if to.is_terminal() {
            self.archived_at = Some(now);
        }

        let message = match &note {
            Some(note) => format!("{from} -> {to}: {note}"),
            None => format!("{from} -> {to}"),
        };
        self.history.push(StageTransition { from, to, at: now, note });
        self.audit(message);
        Ok(())
    }

    /// Record a failure and move to FAILED
    pub fn fail(&mut self, error: &OrchestratorError) -> OrchestratorResult<()> {
        self.last_error = Some(error.to_string());
        self.transition_to(Stage::Failed, Some(error.to_string()))
    }

    pub fn audit(&mut self, message: impl Into<String>) {
        self.audit.push(AuditEntry {
            at: Utc::now(),
            stage: self.stage,
            message: message.into(),
        });
    }

    /// Append a content version; earlier revisions are kept
    pub fn push_content(&mut self, revision: ContentRevision) {
        self.updated_at = Utc::now();
        self.content.push(revision);
    }

    /// Most recent revision of `version`
    pub fn latest(&self, version: ContentVersion) -> Option<&ContentRevision> {
        self.content.iter().rev().find(|r| r.version == version)
    }

    pub fn latest_text(&self, version: ContentVersion) -> Option<&str> {
        self.latest(version).map(|r| r.text.as_str())
    }

    pub fn revisions(&self) -> &[ContentRevision] {
        &self.content
    }

    pub fn record_detection(&mut self, record: DetectionRecord) {
        self.updated_at = Utc::now();
        self.detection_history.push(record);
    }

    pub fn detection_history(&self) -> &[DetectionRecord] {
        &self.detection_history
    }

    pub fn history(&self) -> &[StageTransition] {
        &self.history
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit
    }

    pub fn last_score(&self) -> Option<f64> {
        self.detection_history.last().map(|r| r.score)
    }

    pub fn status(&self) -> WorkItemStatus {
        WorkItemStatus {
            id: self.id,
            source_ref: self.source_ref.clone(),
            category: self.category,
            stage: self.stage,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            threshold: self.score_threshold,
            last_score: self.last_score(),
            detection_history: self.detection_history.clone(),
            history: self.history.clone(),
            last_error: self.last_error.clone(),
            published_ref: self.published_ref.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            archived_at: self.archived_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem::new(
            "https://example.com/a/1",
            ContentCategory::Technical,
            ItemPolicy::default(),
            Priority::Normal,
            "wordpress",
        )
    }

    #[test]
    fn test_new_item_is_pending_with_policy() {
        let item = item();
        assert_eq!(item.stage, Stage::Pending);
        assert_eq!(item.attempt, 0);
        assert_eq!(item.max_attempts, 3);
        assert_eq!(item.score_threshold, 25.0);
        assert_eq!(item.audit_log().len(), 1);
    }

    #[test]
    fn test_max_attempts_clamped_to_one() {
        let item = WorkItem::new(
            "src",
            ContentCategory::General,
            ItemPolicy {
                max_attempts: 0,
                score_threshold: 25.0,
            },
            Priority::Low,
            "wordpress",
        );
        assert_eq!(item.max_attempts, 1);
    }

    #[test]
    fn test_transitions_are_recorded_and_audited() {
        let mut item = item();
        item.transition_to(Stage::Fetching, None).unwrap();
        item.transition_to(Stage::Fetched, Some("ok".into())).unwrap();

        assert_eq!(item.stage, Stage::Fetched);
        assert_eq!(item.history().len(), 2);
        assert_eq!(item.history()[1].from, Stage::Fetching);
        assert_eq!(item.audit_log().last().unwrap().message, "FETCHING -> FETCHED: ok");
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut item = item();
        let err = item.transition_to(Stage::Publishing, None).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidTransition {
                from: Stage::Pending,
                to: Stage::Publishing
            }
        ));
        assert_eq!(item.stage, Stage::Pending);
    }

    #[test]
    fn test_terminal_item_is_immutable_and_archived() {
        let mut item = item();
        item.transition_to(Stage::Cancelled, Some("user request".into())).unwrap();
        assert!(item.archived_at.is_some());

        let err = item.transition_to(Stage::Fetching, None).unwrap_err();
        assert!(matches!(err, OrchestratorError::TerminalItemImmutable { .. }));
    }

    #[test]
    fn test_fail_keeps_last_error() {
        let mut item = item();
        item.transition_to(Stage::Fetching, None).unwrap();
        let error = OrchestratorError::Session {
            message: "browser crashed".into(),
        };
        item.fail(&error).unwrap();

        assert_eq!(item.stage, Stage::Failed);
        assert_eq!(item.last_error.as_deref(), Some("Session error: browser crashed"));
    }

    #[test]
    fn test_content_revisions_are_append_only() {
        let mut item = item();
        item.push_content(ContentRevision::new(ContentVersion::Optimized, "first".into(), None, Some(StrategyLevel::Light)));
        item.push_content(ContentRevision::new(ContentVersion::Optimized, "second".into(), None, Some(StrategyLevel::Standard)));

        assert_eq!(item.revisions().len(), 2);
        assert_eq!(item.latest_text(ContentVersion::Optimized), Some("second"));
        assert_eq!(item.latest_text(ContentVersion::Raw), None);
    }

    #[test]
    fn test_reading_time_and_word_count() {
        let text = "word ".repeat(200);
        let revision = ContentRevision::new(ContentVersion::Raw, text, None, None);
        assert_eq!(revision.word_count, 200);
        assert_eq!(revision.reading_minutes, 2);
        assert_eq!(reading_minutes("short"), 1);
    }
}

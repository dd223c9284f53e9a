//! Work item lifecycle graph and outcome application
//!
//! ```text
//! PENDING -> FETCHING -> {FETCHED -> TRANSLATING, FAILED}
//! TRANSLATING -> {TRANSLATED -> OPTIMIZING, FAILED}
//! OPTIMIZING -> {OPTIMIZED -> DETECTING, FAILED}
//! DETECTING -> {PUBLISHING, OPTIMIZING, FAILED}
//! PUBLISHING -> {PUBLISHED, FAILED}
//! any non-terminal -> CANCELLED
//! ```

use chrono::Utc;
use shared::{ContentVersion, DetectionRecord, ProviderId, Stage, Step, StrategyLevel};

use super::work_item::{ContentRevision, WorkItem};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::FetchedContent;

/// Whether `from -> to` is an edge of the lifecycle graph
pub fn can_transition(from: Stage, to: Stage) -> bool {
    if from.is_terminal() {
        return false;
    }
    if to == Stage::Cancelled {
        return true;
    }
    matches!(
        (from, to),
        (Stage::Pending, Stage::Fetching)
            | (Stage::Fetching, Stage::Fetched)
            | (Stage::Fetching, Stage::Failed)
            | (Stage::Fetched, Stage::Translating)
            | (Stage::Translating, Stage::Translated)
            | (Stage::Translating, Stage::Failed)
            | (Stage::Translated, Stage::Optimizing)
            | (Stage::Optimizing, Stage::Optimized)
            | (Stage::Optimizing, Stage::Failed)
            | (Stage::Optimized, Stage::Detecting)
            | (Stage::Detecting, Stage::Publishing)
            | (Stage::Detecting, Stage::Optimizing)
            | (Stage::Detecting, Stage::Failed)
            | (Stage::Publishing, Stage::Published)
            | (Stage::Publishing, Stage::Failed)
    )
}

/// Result produced by a stage executor
#[derive(Debug)]
pub enum StageOutcome {
    Fetched {
        content: FetchedContent,
    },
    Translated {
        text: String,
        provider: ProviderId,
    },
    Optimized {
        text: String,
        provider: ProviderId,
        strategy: StrategyLevel,
    },
    Detected {
        score: f64,
        detector_passed: bool,
        provider: ProviderId,
    },
    Published {
        published_ref: String,
        provider: ProviderId,
    },
    Failed(OrchestratorError),
    Cancelled,
}

impl StageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Fetched { .. } => "fetched",
            StageOutcome::Translated { .. } => "translated",
            StageOutcome::Optimized { .. } => "optimized",
            StageOutcome::Detected { .. } => "detected",
            StageOutcome::Published { .. } => "published",
            StageOutcome::Failed(_) => "failed",
            StageOutcome::Cancelled => "cancelled",
        }
    }
}

/// What the scheduler does after an outcome has been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Enqueue a task for the given step
    Next(Step),
    /// The item reached a terminal stage
    Complete(Stage),
}

/// Drives a `WorkItem` through the lifecycle graph
pub struct StateMachine;

impl StateMachine {
    /// Move the item into the step's active stage before the executor runs
    ///
    /// OPTIMIZING and PUBLISHING are both entry and active stages: a detection
    /// decision leaves the item there for the next task to pick up.
    pub fn enter(item: &mut WorkItem, step: Step) -> OrchestratorResult<()> {
        let active = step.active_stage();
        match (step, item.stage) {
            (Step::Fetch, Stage::Pending)
            | (Step::Translate, Stage::Fetched)
            | (Step::Optimize, Stage::Translated)
            | (Step::Detect, Stage::Optimized) => item.transition_to(active, None),
            (Step::Optimize, Stage::Optimizing) | (Step::Publish, Stage::Publishing) => Ok(()),
            (_, stage) if stage.is_terminal() => Err(OrchestratorError::TerminalItemImmutable { id: item.id, stage }),
            (_, stage) => Err(OrchestratorError::InvalidTransition { from: stage, to: active }),
        }
    }

    /// Apply an executor outcome to an item in the step's active stage
    pub fn apply(item: &mut WorkItem, step: Step, outcome: StageOutcome) -> OrchestratorResult<FollowUp> {
        if item.is_terminal() {
            return Err(OrchestratorError::TerminalItemImmutable {
                id: item.id,
                stage: item.stage,
            });
        }
        if item.stage != step.active_stage() {
            return Err(OrchestratorError::InvalidTransition {
                from: item.stage,
                to: step.active_stage(),
            });
        }

        match (step, outcome) {
            (_, StageOutcome::Cancelled) => {
                item.transition_to(Stage::Cancelled, Some("cancelled by request".to_string()))?;
                Ok(FollowUp::Complete(Stage::Cancelled))
            }
            (_, StageOutcome::Failed(error)) => {
                item.fail(&error)?;
                Ok(FollowUp::Complete(Stage::Failed))
            }
            (Step::Fetch, StageOutcome::Fetched { content }) => {
                item.metadata = content.metadata;
                item.push_content(ContentRevision::new(ContentVersion::Raw, content.raw, None, None));
                item.transition_to(Stage::Fetched, None)?;
                Ok(FollowUp::Next(Step::Translate))
            }
            (Step::Translate, StageOutcome::Translated { text, provider }) => {
                let note = format!("via {provider}");
                item.push_content(ContentRevision::new(ContentVersion::Translated, text, Some(provider), None));
                item.transition_to(Stage::Translated, Some(note))?;
                Ok(FollowUp::Next(Step::Optimize))
            }
            (Step::Optimize, StageOutcome::Optimized { text, provider, strategy }) => {
                let note = format!("{strategy} via {provider}");
                item.push_content(ContentRevision::new(
                    ContentVersion::Optimized,
                    text,
                    Some(provider),
                    Some(strategy),
                ));
                item.last_strategy = Some(strategy);
                item.transition_to(Stage::Optimized, Some(note))?;
                Ok(FollowUp::Next(Step::Detect))
            }
            (Step::Detect, StageOutcome::Detected { score, detector_passed, provider }) => {
                Self::apply_detection(item, score, detector_passed, provider)
            }
            (Step::Publish, StageOutcome::Published { published_ref, provider }) => {
                let note = format!("{published_ref} via {provider}");
                item.published_ref = Some(published_ref);
                item.transition_to(Stage::Published, Some(note))?;
                Ok(FollowUp::Complete(Stage::Published))
            }
            (step, outcome) => Err(OrchestratorError::InvalidTransition {
                from: item.stage,
                to: mismatched_target(step, &outcome),
            }),
        }
    }

    fn apply_detection(
        item: &mut WorkItem,
        score: f64,
        detector_passed: bool,
        provider: ProviderId,
    ) -> OrchestratorResult<FollowUp> {
        let passed = score <= item.score_threshold;
        item.record_detection(DetectionRecord {
            attempt: item.attempt,
            score,
            threshold: item.score_threshold,
            passed,
            provider,
            strategy: item.last_strategy,
            recorded_at: Utc::now(),
        });
        if passed != detector_passed {
            item.audit(format!(
                "detector reported passed={detector_passed}, item threshold {:.1} decides passed={passed}",
                item.score_threshold
            ));
        }

        if passed {
            if let Some(text) = item.latest_text(ContentVersion::Optimized).map(str::to_string) {
                item.push_content(ContentRevision::new(ContentVersion::Final, text, None, item.last_strategy));
            }
            item.transition_to(
                Stage::Publishing,
                Some(format!("score {score:.1} <= {:.1}", item.score_threshold)),
            )?;
            return Ok(FollowUp::Next(Step::Publish));
        }

        item.attempt += 1;
        if item.attempt < item.max_attempts {
            item.transition_to(
                Stage::Optimizing,
                Some(format!(
                    "score {score:.1} > {:.1}, attempt {}/{}",
                    item.score_threshold, item.attempt, item.max_attempts
                )),
            )?;
            Ok(FollowUp::Next(Step::Optimize))
        } else {
            let error = OrchestratorError::DetectionBudgetExhausted {
                attempts: item.attempt,
                last_score: score,
                threshold: item.score_threshold,
            };
            item.fail(&error)?;
            Ok(FollowUp::Complete(Stage::Failed))
        }
    }
}

fn mismatched_target(step: Step, outcome: &StageOutcome) -> Stage {
    match outcome {
        StageOutcome::Fetched { .. } => Stage::Fetched,
        StageOutcome::Translated { .. } => Stage::Translated,
        StageOutcome::Optimized { .. } => Stage::Optimized,
        StageOutcome::Detected { .. } => Stage::Publishing,
        StageOutcome::Published { .. } => Stage::Published,
        StageOutcome::Failed(_) | StageOutcome::Cancelled => step.active_stage(),
    }
}

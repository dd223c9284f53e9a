//! Detect step: score the newest rewrite through a leased detection session

use async_trait::async_trait;
use shared::{component_info, Capability, Component, ContentVersion, SessionPurpose, Step};

use super::failover::{call_with_failover, lease_session, Billed, SessionUse};
use super::{into_outcome, ExecutorDeps, StageContext, StageExecutor};
use crate::core::StageOutcome;
use crate::error::{AdapterError, OrchestratorError, OrchestratorResult};

/// Units billed per detection call
const DETECTION_COST_UNITS: f64 = 1.0;

pub struct DetectExecutor {
    deps: ExecutorDeps,
}

impl DetectExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &StageContext) -> OrchestratorResult<StageOutcome> {
        let text = ctx
            .item
            .latest_text(ContentVersion::Optimized)
            .ok_or(OrchestratorError::MissingContent {
                id: ctx.item.id,
                version: ContentVersion::Optimized,
            })?;

        let session = lease_session(&self.deps, ctx, SessionPurpose::Detect).await?;
        let adapters = &self.deps.adapters;
        let handle = session.handle();
        let session_use = SessionUse::default();
        let session_use = &session_use;
        let result = call_with_failover(&self.deps, ctx, Capability::Detect, |provider| {
            let detector = adapters.detector(&provider);
            async move {
                let detector = detector.map_err(|error| AdapterError::Permanent(error.to_string()))?;
                let score = session_use.call(detector.score(text, handle)).await?;
                Ok(Billed::new(score, DETECTION_COST_UNITS))
            }
        })
        .await;
        session.release(session_use.outcome());

        let served = result?;
        component_info!(
            Component::Worker(Step::Detect),
            item = %ctx.item.id,
            provider = %served.provider,
            attempt = ctx.item.attempt,
            "🔎 Detection score {:.1} (threshold {:.1})",
            served.value.score,
            ctx.item.score_threshold
        );
        Ok(StageOutcome::Detected {
            score: served.value.score,
            detector_passed: served.value.passed,
            provider: served.provider,
        })
    }
}

#[async_trait]
impl StageExecutor for DetectExecutor {
    fn step(&self) -> Step {
        Step::Detect
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        into_outcome(self.run(ctx).await)
    }
}

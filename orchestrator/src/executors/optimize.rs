//! Optimize step
//!
//! Rewrites the newest optimized revision, or the translation on the first
//! pass, at the strategy level chosen by the optimization controller. Each
//! pass builds on the previous one so rewrites accumulate across attempts.

use async_trait::async_trait;
use shared::{component_info, Capability, Component, ContentVersion, Step, StrategyLevel};

use super::failover::transform_with_failover;
use super::{into_outcome, ExecutorDeps, StageContext, StageExecutor};
use crate::core::StageOutcome;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::optimization::StrategyProfile;

pub struct OptimizeExecutor {
    deps: ExecutorDeps,
}

impl OptimizeExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &StageContext) -> OrchestratorResult<StageOutcome> {
        let input = ctx
            .item
            .latest_text(ContentVersion::Optimized)
            .or_else(|| ctx.item.latest_text(ContentVersion::Translated))
            .ok_or(OrchestratorError::MissingContent {
                id: ctx.item.id,
                version: ContentVersion::Translated,
            })?;
        let level = ctx.strategy.unwrap_or(StrategyLevel::Light);
        let profile = StrategyProfile::for_level(level);
        let params = profile.params(None);

        let served = transform_with_failover(&self.deps, ctx, Capability::Optimize, input, level, &params).await?;

        component_info!(
            Component::Worker(Step::Optimize),
            item = %ctx.item.id,
            provider = %served.provider,
            attempt = ctx.item.attempt,
            intensity = profile.intensity,
            "✍️ Rewrote at {}",
            level
        );
        Ok(StageOutcome::Optimized {
            text: served.value,
            provider: served.provider,
            strategy: level,
        })
    }
}

#[async_trait]
impl StageExecutor for OptimizeExecutor {
    fn step(&self) -> Step {
        Step::Optimize
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        into_outcome(self.run(ctx).await)
    }
}

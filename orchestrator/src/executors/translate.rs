//! Translate step

use async_trait::async_trait;
use shared::{component_info, Capability, Component, ContentVersion, Step, StrategyLevel};

use super::failover::transform_with_failover;
use super::{into_outcome, ExecutorDeps, StageContext, StageExecutor};
use crate::core::StageOutcome;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::optimization::StrategyProfile;

pub struct TranslateExecutor {
    deps: ExecutorDeps,
}

impl TranslateExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &StageContext) -> OrchestratorResult<StageOutcome> {
        let raw = ctx
            .item
            .latest_text(ContentVersion::Raw)
            .ok_or(OrchestratorError::MissingContent {
                id: ctx.item.id,
                version: ContentVersion::Raw,
            })?;
        // Translation keeps close to the source, so it always runs at the lightest level
        let params = StrategyProfile::for_level(StrategyLevel::Light).params(Some(self.deps.target_language.clone()));

        let served =
            transform_with_failover(&self.deps, ctx, Capability::Translate, raw, StrategyLevel::Light, &params).await?;

        component_info!(
            Component::Worker(Step::Translate),
            item = %ctx.item.id,
            provider = %served.provider,
            "🌐 Translated to {}",
            self.deps.target_language
        );
        Ok(StageOutcome::Translated {
            text: served.value,
            provider: served.provider,
        })
    }
}

#[async_trait]
impl StageExecutor for TranslateExecutor {
    fn step(&self) -> Step {
        Step::Translate
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        into_outcome(self.run(ctx).await)
    }
}

//! Publish step

use async_trait::async_trait;
use shared::{component_info, Capability, Component, ContentVersion, SessionPurpose, Step};

use super::failover::{call_with_failover, lease_session, Billed, SessionUse};
use super::{into_outcome, ExecutorDeps, StageContext, StageExecutor};
use crate::core::StageOutcome;
use crate::error::{AdapterError, OrchestratorError, OrchestratorResult};

const PUBLISH_COST_UNITS: f64 = 1.0;

pub struct PublishExecutor {
    deps: ExecutorDeps,
}

impl PublishExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &StageContext) -> OrchestratorResult<StageOutcome> {
        let text = ctx
            .item
            .latest_text(ContentVersion::Final)
            .ok_or(OrchestratorError::MissingContent {
                id: ctx.item.id,
                version: ContentVersion::Final,
            })?;
        let target = ctx.item.publish_target.as_str();

        let session = lease_session(&self.deps, ctx, SessionPurpose::Publish).await?;
        let adapters = &self.deps.adapters;
        let handle = session.handle();
        let session_use = SessionUse::default();
        let session_use = &session_use;
        let result = call_with_failover(&self.deps, ctx, Capability::Publish, |provider| {
            let publisher = adapters.publisher(&provider);
            async move {
                let publisher = publisher.map_err(|error| AdapterError::Permanent(error.to_string()))?;
                let published_ref = session_use.call(publisher.publish(text, target, handle)).await?;
                Ok(Billed::new(published_ref, PUBLISH_COST_UNITS))
            }
        })
        .await;
        session.release(session_use.outcome());

        let served = result?;
        component_info!(
            Component::Worker(Step::Publish),
            item = %ctx.item.id,
            provider = %served.provider,
            "📤 Published to {} as {}",
            target,
            served.value
        );
        Ok(StageOutcome::Published {
            published_ref: served.value,
            provider: served.provider,
        })
    }
}

#[async_trait]
impl StageExecutor for PublishExecutor {
    fn step(&self) -> Step {
        Step::Publish
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        into_outcome(self.run(ctx).await)
    }
}

//! Fetch step: pull the raw article through a leased fetch session

use async_trait::async_trait;
use shared::{component_info, component_warn, Component, ProviderId, SessionPurpose, Step};

use super::failover::lease_session;
use super::{into_outcome, ExecutorDeps, StageContext, StageExecutor};
use crate::core::StageOutcome;
use crate::error::{AdapterError, OrchestratorResult};
use crate::services::SessionOutcome;

/// Provider label used when classifying content source failures
const SOURCE_PROVIDER: &str = "content-source";

pub struct FetchExecutor {
    deps: ExecutorDeps,
}

impl FetchExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }

    async fn run(&self, ctx: &StageContext) -> OrchestratorResult<StageOutcome> {
        let component = Component::Worker(Step::Fetch);
        let source = self.deps.adapters.source();
        let retry = &self.deps.retry;
        let mut retries = 0u32;

        loop {
            let session = lease_session(&self.deps, ctx, SessionPurpose::Fetch).await?;
            let fetched = match tokio::time::timeout(
                self.deps.timeouts.call(),
                source.fetch(&ctx.item.source_ref, session.handle()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Timeout(self.deps.timeouts.call())),
            };

            match fetched {
                Ok(content) => {
                    session.release(SessionOutcome::Ok);
                    ctx.checkpoint()?;
                    component_info!(
                        component,
                        item = %ctx.item.id,
                        chars = content.raw.chars().count(),
                        "📥 Fetched {}",
                        ctx.item.source_ref
                    );
                    return Ok(StageOutcome::Fetched { content });
                }
                Err(error) => {
                    session.release(SessionOutcome::Error);
                    if error.is_permanent() || retries >= retry.max_local_retries {
                        return Err(error.into_provider_error(ProviderId::from(SOURCE_PROVIDER)));
                    }
                    let backoff = retry.backoff(retries);
                    retries += 1;
                    component_warn!(component, item = %ctx.item.id, "Fetch failed, retrying in {:?}: {}", backoff, error);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait]
impl StageExecutor for FetchExecutor {
    fn step(&self) -> Step {
        Step::Fetch
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        into_outcome(self.run(ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, deps_with_source, item};
    use super::*;
    use crate::adapters::AdapterRegistry;
    use crate::traits::{ContentMetadata, FetchedContent, MockContentSource};
    use std::sync::Arc;

    fn fetched() -> FetchedContent {
        FetchedContent {
            raw: "Hello world".to_string(),
            metadata: ContentMetadata {
                title: Some("Hello".to_string()),
                ..ContentMetadata::default()
            },
        }
    }

    #[tokio::test]
    async fn test_transient_fetch_failure_is_retried_with_fresh_session() {
        // Arrange
        let mut source = MockContentSource::new();
        let mut calls = 0;
        source.expect_fetch().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(AdapterError::Transient("captcha".into()))
            } else {
                Ok(fetched())
            }
        });
        let (deps, _) = deps_with_source(Vec::new(), Arc::new(source), AdapterRegistry::new);
        let executor = FetchExecutor::new(deps.clone());
        let (ctx, _) = context(item(), Step::Fetch, None);

        // Act
        let outcome = executor.execute(&ctx).await;

        // Assert
        match outcome {
            StageOutcome::Fetched { content } => assert_eq!(content.metadata.title.as_deref(), Some("Hello")),
            other => panic!("unexpected outcome {other:?}"),
        }
        let fetch_pool = deps
            .pool
            .snapshot()
            .into_iter()
            .find(|s| s.purpose == SessionPurpose::Fetch)
            .unwrap();
        assert_eq!(fetch_pool.disposed_total, 1);
        assert_eq!(fetch_pool.idle, 1);
    }

    #[tokio::test]
    async fn test_permanent_fetch_failure_fails_stage() {
        // Arrange
        let mut source = MockContentSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|_, _| Err(AdapterError::Permanent("404".into())));
        let (deps, _) = deps_with_source(Vec::new(), Arc::new(source), AdapterRegistry::new);
        let executor = FetchExecutor::new(deps);
        let (ctx, _) = context(item(), Step::Fetch, None);

        // Act
        let outcome = executor.execute(&ctx).await;

        // Assert
        assert!(matches!(
            outcome,
            StageOutcome::Failed(crate::error::OrchestratorError::PermanentProvider { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_before_fetch_skips_source() {
        // Arrange
        let mut source = MockContentSource::new();
        source.expect_fetch().times(0);
        let (deps, _) = deps_with_source(Vec::new(), Arc::new(source), AdapterRegistry::new);
        let executor = FetchExecutor::new(deps);
        let (ctx, cancel) = context(item(), Step::Fetch, None);
        cancel.store(true, std::sync::atomic::Ordering::SeqCst);

        // Act & Assert
        assert!(matches!(executor.execute(&ctx).await, StageOutcome::Cancelled));
    }
}

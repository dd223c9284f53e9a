//! Provider failover and session leasing shared by the executors
//!
//! A failed call moves to an untried alternate provider while the alternate
//! budget lasts; after that transient failures are retried on the same
//! provider with exponential backoff. Permanent failures are never retried on
//! the provider that raised them.

use shared::{component_debug, component_warn, Capability, Component, ProviderId, SessionPurpose, StrategyLevel};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{ExecutorDeps, StageContext};
use crate::error::{AdapterError, AdapterResult, OrchestratorError, OrchestratorResult};
use crate::services::{FailureKind, SessionLease, SessionOutcome};
use crate::traits::TransformParams;

/// Provider output plus the units billed for it
#[derive(Debug, Clone, PartialEq)]
pub struct Billed<T> {
    pub value: T,
    pub cost_units: f64,
}

impl<T> Billed<T> {
    pub fn new(value: T, cost_units: f64) -> Self {
        Self { value, cost_units }
    }
}

/// Successful call and the provider that served it
#[derive(Debug, Clone, PartialEq)]
pub struct Served<T> {
    pub value: T,
    pub provider: ProviderId,
}

/// Run `call` against providers of `capability` until one succeeds or the
/// retry policy is spent
///
/// Every call runs under the configured call deadline. A call that completes
/// after cancellation was requested is settled normally, then discarded.
pub async fn call_with_failover<T, F, Fut>(
    deps: &ExecutorDeps,
    ctx: &StageContext,
    capability: Capability,
    mut call: F,
) -> OrchestratorResult<Served<T>>
where
    F: FnMut(ProviderId) -> Fut,
    Fut: Future<Output = AdapterResult<Billed<T>>>,
{
    let component = Component::Worker(ctx.task.step);
    let retry = &deps.retry;
    let mut exclude: Vec<ProviderId> = Vec::new();
    let mut hint = ctx.task.provider_hint.clone();
    let mut tried = 0usize;
    let mut alternates = 0usize;
    let mut retries = 0u32;
    let mut last_error: Option<OrchestratorError> = None;

    while tried < retry.max_calls() {
        ctx.checkpoint()?;
        let lease = match deps
            .registry
            .acquire_within(capability, &exclude, hint.as_ref(), deps.timeouts.acquire())
            .await
        {
            Ok(lease) => lease,
            Err(error) => {
                // Keep the provider error that ended the previous call
                if last_error.is_none() {
                    last_error = Some(error);
                }
                break;
            }
        };
        let provider = lease.provider_id().clone();
        tried += 1;

        let result = match tokio::time::timeout(deps.timeouts.call(), call(provider.clone())).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(deps.timeouts.call())),
        };

        match result {
            Ok(billed) => {
                if let Some(record) = lease.succeed(billed.cost_units) {
                    if let Err(error) = deps.repository.record_usage(record).await {
                        component_warn!(component, provider = %provider, "Failed to persist usage record: {}", error);
                    }
                }
                ctx.checkpoint()?;
                return Ok(Served {
                    value: billed.value,
                    provider,
                });
            }
            Err(error) => {
                let permanent = error.is_permanent();
                lease.fail(if permanent {
                    FailureKind::Permanent
                } else {
                    FailureKind::Transient
                });
                component_warn!(
                    component,
                    item = %ctx.item.id,
                    provider = %provider,
                    call = tried,
                    "⚠️ {} call failed: {}",
                    capability,
                    error
                );
                last_error = Some(error.into_provider_error(provider.clone()));
                hint = None;

                exclude.push(provider);
                if alternates < retry.max_alternates && deps.registry.has_candidate(capability, &exclude) {
                    alternates += 1;
                } else if !permanent && retries < retry.max_local_retries {
                    // No usable alternate, so the retry stays on this provider
                    exclude.pop();
                    let backoff = retry.backoff(retries);
                    retries += 1;
                    component_debug!(component, item = %ctx.item.id, "Retrying {} in {:?}", capability, backoff);
                    tokio::time::sleep(backoff).await;
                } else {
                    break;
                }
            }
        }
    }

    Err(match (tried, last_error) {
        (0, Some(error)) => error,
        (0, None) => OrchestratorError::NoProviderAvailable { capability },
        (tried, last_error) => OrchestratorError::AllProvidersExhausted {
            capability,
            tried,
            last_error: last_error.map(|error| error.to_string()).unwrap_or_default(),
        },
    })
}

/// Send `input` through an AI provider of `capability` with failover
pub async fn transform_with_failover(
    deps: &ExecutorDeps,
    ctx: &StageContext,
    capability: Capability,
    input: &str,
    level: StrategyLevel,
    params: &TransformParams,
) -> OrchestratorResult<Served<String>> {
    let adapters = &deps.adapters;
    call_with_failover(deps, ctx, capability, |provider| {
        let ai = adapters.ai(&provider);
        async move {
            // A configured provider without an adapter can never succeed
            let ai = ai.map_err(|error| AdapterError::Permanent(error.to_string()))?;
            let output = ai.transform(capability, input, level, params).await?;
            Ok(Billed::new(output.text, output.cost_units))
        }
    })
    .await
}

/// Adapter calls made through one leased session
///
/// Provider failures leave the session reusable. It is disposed only when a
/// call reports a session error or is cut off at its deadline, since an
/// abandoned browser call leaves the page in an unknown state.
#[derive(Debug, Default)]
pub struct SessionUse {
    started: AtomicUsize,
    finished: AtomicUsize,
    broken: AtomicBool,
}

impl SessionUse {
    pub async fn call<T>(&self, call: impl Future<Output = AdapterResult<T>>) -> AdapterResult<T> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let result = call.await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        if matches!(result, Err(AdapterError::Session(_))) {
            self.broken.store(true, Ordering::SeqCst);
        }
        result
    }

    /// How the session should go back to the pool
    pub fn outcome(&self) -> SessionOutcome {
        let abandoned = self.started.load(Ordering::SeqCst) != self.finished.load(Ordering::SeqCst);
        if abandoned || self.broken.load(Ordering::SeqCst) {
            SessionOutcome::Error
        } else {
            SessionOutcome::Ok
        }
    }
}

/// Lease a session, retrying transient pool errors with backoff
pub async fn lease_session(
    deps: &ExecutorDeps,
    ctx: &StageContext,
    purpose: SessionPurpose,
) -> OrchestratorResult<SessionLease> {
    let mut retries = 0u32;
    loop {
        ctx.checkpoint()?;
        match deps.pool.lease(purpose, deps.timeouts.lease()).await {
            Ok(lease) => return Ok(lease),
            Err(error) if error.is_transient() && retries < deps.retry.max_local_retries => {
                let backoff = deps.retry.backoff(retries);
                retries += 1;
                component_warn!(
                    Component::Worker(ctx.task.step),
                    item = %ctx.item.id,
                    "Session lease failed, retrying in {:?}: {}",
                    backoff,
                    error
                );
                tokio::time::sleep(backoff).await;
            }
            Err(error) => return Err(error),
        }
    }
}

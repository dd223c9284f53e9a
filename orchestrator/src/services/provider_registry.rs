//! Provider registry and weighted selector
//!
//! Sole owner of live provider state. Callers obtain a `ProviderLease` from
//! `acquire` and must settle it exactly once with `succeed` or `fail`; a lease
//! dropped unsettled counts as a transient failure so the slot is never leaked.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{component_debug, component_info, component_warn, Capability, Component, ProviderId, ProviderSnapshot, UsageRecord};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::usage_ledger::UsageLedger;
use crate::config::{HealthPolicy, ProviderConfig};
use crate::core::RollingWindow;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Longest wait between availability re-checks in `acquire_within`
const RECHECK_INTERVAL: Duration = Duration::from_millis(250);

/// How a provider call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

#[derive(Debug)]
struct ProviderState {
    config: ProviderConfig,
    in_flight: u32,
    minute: RollingWindow,
    hour: RollingWindow,
    consecutive_failures: u32,
    healthy: bool,
    unhealthy_since: Option<Instant>,
    probe_in_flight: bool,
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
    total_latency: Duration,
    total_cost: f64,
}

impl ProviderState {
    fn new(config: ProviderConfig) -> Self {
        let minute = RollingWindow::per_minute(config.rate_limit_per_minute);
        let hour = RollingWindow::per_hour(config.rate_limit_per_hour);
        Self {
            config,
            in_flight: 0,
            minute,
            hour,
            consecutive_failures: 0,
            healthy: true,
            unhealthy_since: None,
            probe_in_flight: false,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            total_latency: Duration::ZERO,
            total_cost: 0.0,
        }
    }

    fn has_capacity(&mut self, now: Instant) -> bool {
        self.in_flight < self.config.concurrency_limit && !self.minute.is_saturated(now) && !self.hour.is_saturated(now)
    }

    /// Candidate check; `Some(true)` marks the call as a recovery probe
    fn eligibility(&mut self, now: Instant, cooldown: Duration) -> Option<bool> {
        if !self.has_capacity(now) {
            return None;
        }
        if self.healthy {
            return Some(false);
        }
        self.is_serviceable(now, cooldown).then_some(true)
    }

    /// Healthy, or cooled down with no recovery call running
    fn is_serviceable(&self, now: Instant, cooldown: Duration) -> bool {
        self.healthy
            || (!self.probe_in_flight
                && self
                    .unhealthy_since
                    .map_or(true, |since| now.duration_since(since) >= cooldown))
    }

    fn mark_unhealthy(&mut self, now: Instant) {
        self.healthy = false;
        self.unhealthy_since = Some(now);
    }

    fn snapshot(&mut self, now: Instant) -> ProviderSnapshot {
        let settled = self.total_successes + self.total_failures;
        let avg_latency_ms = if settled == 0 {
            0.0
        } else {
            self.total_latency.as_secs_f64() * 1000.0 / settled as f64
        };
        ProviderSnapshot {
            id: self.config.id.clone(),
            capability: self.config.capability,
            weight: self.config.weight,
            healthy: self.healthy,
            in_flight: self.in_flight,
            concurrency_limit: self.config.concurrency_limit,
            consecutive_failures: self.consecutive_failures,
            calls_last_minute: self.minute.count(now),
            calls_last_hour: self.hour.count(now),
            total_requests: self.total_requests,
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            avg_latency_ms,
            total_cost: self.total_cost,
        }
    }
}

struct RegistryInner {
    /// Ordered by id so equal effective weights resolve deterministically
    providers: BTreeMap<ProviderId, ProviderState>,
    rng: StdRng,
}

enum Settlement {
    Success { cost_units: f64 },
    Failure(FailureKind),
}

pub struct ProviderRegistry {
    inner: Mutex<RegistryInner>,
    health: HealthPolicy,
    ledger: UsageLedger,
    released: Notify,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderConfig>, health: HealthPolicy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let providers = providers
            .into_iter()
            .map(|config| (config.id.clone(), ProviderState::new(config)))
            .collect();

        Self {
            inner: Mutex::new(RegistryInner { providers, rng }),
            health,
            ledger: UsageLedger::new(),
            released: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pick a provider for `capability` now, or fail with `NoProviderAvailable`
    ///
    /// Providers in `exclude` are skipped. `hint` wins whenever it is a
    /// candidate; otherwise the draw is weighted by `weight / (1 + in_flight)`.
    pub fn acquire(
        self: &Arc<Self>,
        capability: Capability,
        exclude: &[ProviderId],
        hint: Option<&ProviderId>,
    ) -> OrchestratorResult<ProviderLease> {
        let now = Instant::now();
        let cooldown = self.health.cooldown();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let mut candidates: Vec<(ProviderId, f64, bool)> = Vec::new();
        for (id, state) in inner.providers.iter_mut() {
            if state.config.capability != capability || exclude.contains(id) {
                continue;
            }
            if let Some(probe) = state.eligibility(now, cooldown) {
                let effective = state.config.weight / (1.0 + state.in_flight as f64);
                candidates.push((id.clone(), effective, probe));
            }
        }

        if candidates.is_empty() {
            return Err(OrchestratorError::NoProviderAvailable { capability });
        }

        let hinted = hint.and_then(|hint| candidates.iter().position(|(id, _, _)| id == hint));
        let index = match hinted {
            Some(index) => index,
            None => {
                let total: f64 = candidates.iter().map(|(_, weight, _)| weight).sum();
                let mut draw = inner.rng.gen::<f64>() * total;
                let mut chosen = candidates.len() - 1;
                for (i, (_, weight, _)) in candidates.iter().enumerate() {
                    if draw < *weight {
                        chosen = i;
                        break;
                    }
                    draw -= weight;
                }
                chosen
            }
        };

        let (id, _, probe) = candidates.swap_remove(index);
        let state = inner
            .providers
            .get_mut(&id)
            .ok_or(OrchestratorError::NoProviderAvailable { capability })?;
        state.in_flight += 1;
        state.minute.record(now);
        state.hour.record(now);
        state.total_requests += 1;
        if probe {
            state.probe_in_flight = true;
            component_info!(Component::ProviderRegistry, provider = %id, "🩺 Probing unhealthy provider");
        }

        Ok(ProviderLease {
            registry: Arc::clone(self),
            id,
            capability,
            cost_per_unit: state.config.cost_per_unit,
            probe,
            started: now,
            settled: false,
        })
    }

    /// `acquire`, waiting up to `timeout` for a provider to free up
    pub async fn acquire_within(
        self: &Arc<Self>,
        capability: Capability,
        exclude: &[ProviderId],
        hint: Option<&ProviderId>,
        timeout: Duration,
    ) -> OrchestratorResult<ProviderLease> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.acquire(capability, exclude, hint) {
                Ok(lease) => return Ok(lease),
                Err(err) => {
                    let now = Instant::now();
                    if now >= deadline || !self.has_any(capability, exclude) {
                        return Err(err);
                    }
                    let wake = deadline.min(now + RECHECK_INTERVAL);
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(wake) => {}
                    }
                }
            }
        }
    }

    /// Whether any non-excluded provider offers `capability`
    fn has_any(&self, capability: Capability, exclude: &[ProviderId]) -> bool {
        self.lock()
            .providers
            .values()
            .any(|state| state.config.capability == capability && !exclude.contains(&state.config.id))
    }

    /// Whether a non-excluded provider of `capability` could take a call
    /// once it has capacity
    pub fn has_candidate(&self, capability: Capability, exclude: &[ProviderId]) -> bool {
        let now = Instant::now();
        let cooldown = self.health.cooldown();
        self.lock().providers.values().any(|state| {
            state.config.capability == capability
                && !exclude.contains(&state.config.id)
                && state.is_serviceable(now, cooldown)
        })
    }

    fn settle(&self, id: &ProviderId, capability: Capability, probe: bool, latency: Duration, settlement: Settlement) -> Option<UsageRecord> {
        let now = Instant::now();
        let mut usage = None;
        {
            let mut guard = self.lock();
            let Some(state) = guard.providers.get_mut(id) else {
                return None;
            };

            state.in_flight = state.in_flight.saturating_sub(1);
            state.total_latency += latency;
            if probe {
                state.probe_in_flight = false;
            }

            match settlement {
                Settlement::Success { cost_units } => {
                    let record = UsageRecord::new(id.clone(), capability, cost_units, state.config.cost_per_unit, Utc::now());
                    state.total_successes += 1;
                    state.total_cost += record.cost;
                    state.consecutive_failures = 0;
                    if !state.healthy {
                        state.healthy = true;
                        state.unhealthy_since = None;
                        component_info!(Component::ProviderRegistry, provider = %id, "💚 Provider recovered");
                    }
                    self.ledger.record(&record);
                    usage = Some(record);
                }
                Settlement::Failure(kind) => {
                    state.total_failures += 1;
                    state.consecutive_failures += 1;
                    if !state.healthy {
                        // Failed probe or late failure restarts the cool-down
                        state.unhealthy_since = Some(now);
                    } else if kind == FailureKind::Permanent {
                        state.mark_unhealthy(now);
                        component_warn!(Component::ProviderRegistry, provider = %id, "🚫 Provider marked unhealthy after permanent failure");
                    } else if state.consecutive_failures >= self.health.failure_threshold {
                        state.mark_unhealthy(now);
                        component_warn!(
                            Component::ProviderRegistry,
                            provider = %id,
                            failures = state.consecutive_failures,
                            "🚫 Provider marked unhealthy after consecutive failures"
                        );
                    } else {
                        component_debug!(
                            Component::ProviderRegistry,
                            provider = %id,
                            failures = state.consecutive_failures,
                            "Provider call failed"
                        );
                    }
                }
            }
        }
        self.released.notify_waiters();
        usage
    }

    /// Per-provider snapshot ordered by id
    pub fn snapshot(&self) -> Vec<ProviderSnapshot> {
        let now = Instant::now();
        self.lock()
            .providers
            .values_mut()
            .map(|state| state.snapshot(now))
            .collect()
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }
}

/// Exclusive claim on one provider call slot
pub struct ProviderLease {
    registry: Arc<ProviderRegistry>,
    id: ProviderId,
    capability: Capability,
    cost_per_unit: f64,
    probe: bool,
    started: Instant,
    settled: bool,
}

impl ProviderLease {
    pub fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn cost_per_unit(&self) -> f64 {
        self.cost_per_unit
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Settle as a success; returns the usage record to persist
    pub fn succeed(mut self, cost_units: f64) -> Option<UsageRecord> {
        self.settled = true;
        self.registry.settle(
            &self.id,
            self.capability,
            self.probe,
            self.started.elapsed(),
            Settlement::Success { cost_units },
        )
    }

    pub fn fail(mut self, kind: FailureKind) {
        self.settled = true;
        self.registry
            .settle(&self.id, self.capability, self.probe, self.started.elapsed(), Settlement::Failure(kind));
    }
}

impl Drop for ProviderLease {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.settle(
                &self.id,
                self.capability,
                self.probe,
                self.started.elapsed(),
                Settlement::Failure(FailureKind::Transient),
            );
        }
    }
}

impl std::fmt::Debug for ProviderLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLease")
            .field("id", &self.id)
            .field("capability", &self.capability)
            .field("probe", &self.probe)
            .finish()
    }
}

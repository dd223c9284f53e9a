//! Service-specific tests
//!
//! Each service has its own test file; shared builders live in `common`.

#[cfg(test)]
mod memory_store;

// Common test utilities for services
#[cfg(test)]
pub mod common {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{HealthPolicy, ProviderConfig, SessionPoolConfig};
    use crate::services::{ProviderRegistry, RandomProfileGenerator, SessionPool};
    use crate::traits::MockSessionBackend;
    use shared::Capability;

    /// Standard cool-down used by registry tests
    pub const COOLDOWN: Duration = Duration::from_secs(30);

    pub fn health(failure_threshold: u32) -> HealthPolicy {
        HealthPolicy {
            failure_threshold,
            cooldown_ms: COOLDOWN.as_millis() as u64,
        }
    }

    /// Provider with no rate limits and a generous concurrency cap
    pub fn unlimited(id: &str, capability: Capability, weight: f64) -> ProviderConfig {
        ProviderConfig::new(id, capability, weight, 1_000).with_cost(0.5)
    }

    pub fn registry(providers: Vec<ProviderConfig>, failure_threshold: u32) -> Arc<ProviderRegistry> {
        Arc::new(ProviderRegistry::new(providers, health(failure_threshold), Some(42)))
    }

    /// Backend mock that opens and closes everything successfully
    pub fn ok_backend() -> MockSessionBackend {
        let mut backend = MockSessionBackend::new();
        backend.expect_open().returning(|_| Ok(())).times(0..);
        backend.expect_close().returning(|_| Ok(())).times(0..);
        backend
    }

    pub fn pool_config(capacity: usize, max_ops: u32) -> SessionPoolConfig {
        SessionPoolConfig {
            fetch_capacity: capacity,
            detect_capacity: capacity,
            publish_capacity: capacity,
            max_ops_per_session: max_ops,
            idle_ttl_ms: 60_000,
            reap_interval_ms: 10_000,
        }
    }

    pub fn pool(capacity: usize, max_ops: u32, backend: MockSessionBackend) -> Arc<SessionPool> {
        Arc::new(SessionPool::new(
            &pool_config(capacity, max_ops),
            Arc::new(backend),
            Arc::new(RandomProfileGenerator::new(Some(9))),
        ))
    }
}

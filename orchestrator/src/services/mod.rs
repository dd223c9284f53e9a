//! Service implementations
//!
//! Shared mutable state of the pipeline (provider registry, session pool,
//! usage ledger), the in-memory repository and the simulated adapters.

pub mod memory_store;
pub mod provider_registry;
pub mod session_pool;
pub mod simulated;
pub mod usage_ledger;

#[cfg(test)]
mod tests;

pub use memory_store::InMemoryWorkItemRepository;
pub use provider_registry::{FailureKind, ProviderLease, ProviderRegistry};
pub use session_pool::{SessionLease, SessionOutcome, SessionPool};
pub use simulated::{
    RandomProfileGenerator, SimulatedAiProvider, SimulatedDetector, SimulatedPublisher, SimulatedSessionBackend,
    SimulatedSource, SimulationSettings,
};
pub use usage_ledger::{LedgerEntry, UsageLedger};

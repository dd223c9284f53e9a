//! Registry mapping provider ids to adapter implementations

use shared::ProviderId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{AiProvider, ContentSource, Detector, Publisher};

/// Adapters available to the stage executors
///
/// The provider registry decides *which* provider serves a call; this registry
/// resolves the chosen id to the code that talks to it.
#[derive(Clone)]
pub struct AdapterRegistry {
    source: Arc<dyn ContentSource>,
    ai: HashMap<ProviderId, Arc<dyn AiProvider>>,
    detectors: HashMap<ProviderId, Arc<dyn Detector>>,
    publishers: HashMap<ProviderId, Arc<dyn Publisher>>,
}

impl AdapterRegistry {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self {
            source,
            ai: HashMap::new(),
            detectors: HashMap::new(),
            publishers: HashMap::new(),
        }
    }

    pub fn with_ai(mut self, id: impl Into<ProviderId>, provider: Arc<dyn AiProvider>) -> Self {
        self.ai.insert(id.into(), provider);
        self
    }

    pub fn with_detector(mut self, id: impl Into<ProviderId>, detector: Arc<dyn Detector>) -> Self {
        self.detectors.insert(id.into(), detector);
        self
    }

    pub fn with_publisher(mut self, id: impl Into<ProviderId>, publisher: Arc<dyn Publisher>) -> Self {
        self.publishers.insert(id.into(), publisher);
        self
    }

    pub fn source(&self) -> Arc<dyn ContentSource> {
        Arc::clone(&self.source)
    }

    pub fn ai(&self, id: &ProviderId) -> OrchestratorResult<Arc<dyn AiProvider>> {
        self.ai.get(id).cloned().ok_or_else(|| missing(id, "ai provider"))
    }

    pub fn detector(&self, id: &ProviderId) -> OrchestratorResult<Arc<dyn Detector>> {
        self.detectors.get(id).cloned().ok_or_else(|| missing(id, "detector"))
    }

    pub fn publisher(&self, id: &ProviderId) -> OrchestratorResult<Arc<dyn Publisher>> {
        self.publishers.get(id).cloned().ok_or_else(|| missing(id, "publisher"))
    }
}

fn missing(id: &ProviderId, kind: &str) -> OrchestratorError {
    OrchestratorError::Configuration {
        field: format!("adapters.{id}"),
        reason: format!("no {kind} adapter registered"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockAiProvider, MockContentSource};

    #[test]
    fn test_lookup_registered_and_missing() {
        let registry = AdapterRegistry::new(Arc::new(MockContentSource::new()))
            .with_ai("deepl", Arc::new(MockAiProvider::new()));

        assert!(registry.ai(&ProviderId::from("deepl")).is_ok());
        assert!(matches!(
            registry.ai(&ProviderId::from("unknown")),
            Err(OrchestratorError::Configuration { .. })
        ));
        assert!(registry.detector(&ProviderId::from("deepl")).is_err());
    }
}

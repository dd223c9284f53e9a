//! Simulated adapters for offline runs and tests
//!
//! Seedable in-process stand-ins for the scraping, AI, detection, publishing
//! and browser backends. Failure injection is controlled by `failure_rate`.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Capability, SessionPurpose, StrategyLevel};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{AdapterError, AdapterResult};
use crate::traits::{
    AiProvider, ContentMetadata, ContentSource, DetectionScore, Detector, FetchedContent, IdentityProfile,
    ProfileGenerator, Publisher, SessionBackend, SessionHandle, TransformParams, Transformation,
};

/// Marker appended by each simulated rewrite pass
const REWRITE_MARKER: &str = "⟲";

fn seeded(seed: Option<u64>) -> Mutex<StdRng> {
    Mutex::new(match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    })
}

fn lock(rng: &Mutex<StdRng>) -> MutexGuard<'_, StdRng> {
    rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared knobs for every simulated adapter
#[derive(Debug, Clone, Copy)]
pub struct SimulationSettings {
    pub latency: Duration,
    pub failure_rate: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(20),
            failure_rate: 0.0,
            seed: None,
        }
    }
}

struct Chaos {
    latency: Duration,
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl Chaos {
    fn new(settings: SimulationSettings) -> Self {
        Self {
            latency: settings.latency,
            failure_rate: settings.failure_rate.clamp(0.0, 1.0),
            rng: seeded(settings.seed),
        }
    }

    /// Sleep for the configured latency, then maybe inject a transient failure
    async fn step(&self, what: &str) -> AdapterResult<()> {
        tokio::time::sleep(self.latency).await;
        let roll: f64 = lock(&self.rng).gen();
        if roll < self.failure_rate {
            return Err(AdapterError::Transient(format!("simulated {what} failure")));
        }
        Ok(())
    }

    fn gen_range(&self, low: f64, high: f64) -> f64 {
        lock(&self.rng).gen_range(low..high)
    }
}

pub struct SimulatedSource {
    chaos: Chaos,
}

impl SimulatedSource {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            chaos: Chaos::new(settings),
        }
    }
}

#[async_trait]
impl ContentSource for SimulatedSource {
    async fn fetch(&self, source_ref: &str, _session: &SessionHandle) -> AdapterResult<FetchedContent> {
        self.chaos.step("fetch").await?;
        let paragraphs = 3 + (self.chaos.gen_range(0.0, 5.0) as usize);
        let raw = (0..paragraphs)
            .map(|i| format!("Paragraph {} of the article at {source_ref}.", i + 1))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(FetchedContent {
            raw,
            metadata: ContentMetadata {
                title: Some(format!("Article {source_ref}")),
                platform: Some("simulated".to_string()),
                author: Some("sim-author".to_string()),
                language: Some("en".to_string()),
            },
        })
    }
}

pub struct SimulatedAiProvider {
    name: String,
    chaos: Chaos,
}

impl SimulatedAiProvider {
    pub fn new(name: impl Into<String>, settings: SimulationSettings) -> Self {
        Self {
            name: name.into(),
            chaos: Chaos::new(settings),
        }
    }
}

#[async_trait]
impl AiProvider for SimulatedAiProvider {
    async fn transform(
        &self,
        capability: Capability,
        content: &str,
        level: StrategyLevel,
        params: &TransformParams,
    ) -> AdapterResult<Transformation> {
        self.chaos.step(&self.name).await?;
        let text = match capability {
            Capability::Translate => {
                let language = params.target_language.as_deref().unwrap_or("zh");
                format!("[{language} via {}]\n{content}", self.name)
            }
            _ => {
                // Stronger levels leave more markers, which the simulated detector rewards
                let passes = match level {
                    StrategyLevel::Light => 1,
                    StrategyLevel::Standard => 2,
                    StrategyLevel::Aggressive => 3,
                };
                format!("{content}\n{}", REWRITE_MARKER.repeat(passes))
            }
        };
        let cost_units = (text.split_whitespace().count() as f64 / 100.0).max(0.01);
        Ok(Transformation { text, cost_units })
    }
}

/// Scores drop as rewrite markers accumulate
pub struct SimulatedDetector {
    chaos: Chaos,
    threshold: f64,
}

impl SimulatedDetector {
    pub fn new(settings: SimulationSettings, threshold: f64) -> Self {
        Self {
            chaos: Chaos::new(settings),
            threshold,
        }
    }
}

#[async_trait]
impl Detector for SimulatedDetector {
    async fn score(&self, content: &str, _session: &SessionHandle) -> AdapterResult<DetectionScore> {
        self.chaos.step("detect").await?;
        let passes = content.matches(REWRITE_MARKER).count() as f64;
        let base = self.chaos.gen_range(35.0, 70.0);
        let score = (base - passes * 9.0).clamp(0.0, 100.0);
        Ok(DetectionScore {
            score,
            passed: score <= self.threshold,
        })
    }
}

pub struct SimulatedPublisher {
    chaos: Chaos,
}

impl SimulatedPublisher {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            chaos: Chaos::new(settings),
        }
    }
}

#[async_trait]
impl Publisher for SimulatedPublisher {
    async fn publish(&self, _content: &str, target: &str, session: &SessionHandle) -> AdapterResult<String> {
        self.chaos.step("publish").await?;
        let id = session.id.to_string();
        Ok(format!("{target}-{}", &id[..8]))
    }
}

pub struct SimulatedSessionBackend {
    chaos: Chaos,
}

impl SimulatedSessionBackend {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            chaos: Chaos::new(settings),
        }
    }
}

#[async_trait]
impl SessionBackend for SimulatedSessionBackend {
    async fn open(&self, _session: &SessionHandle) -> AdapterResult<()> {
        self.chaos.step("session open").await
    }

    async fn close(&self, _session: &SessionHandle) -> AdapterResult<()> {
        Ok(())
    }
}

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];
const LOCALES: [&str; 3] = ["zh-CN", "en-US", "en-GB"];
const VIEWPORTS: [(u32, u32); 3] = [(1920, 1080), (1440, 900), (1366, 768)];

/// Picks a random identity from small fixed tables
pub struct RandomProfileGenerator {
    rng: Mutex<StdRng>,
}

impl RandomProfileGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: seeded(seed) }
    }
}

impl ProfileGenerator for RandomProfileGenerator {
    fn generate(&self, purpose: SessionPurpose) -> IdentityProfile {
        let mut rng = lock(&self.rng);
        let n: u32 = rng.gen();
        IdentityProfile {
            id: format!("{purpose}-{n:08x}"),
            user_agent: USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())].to_string(),
            locale: LOCALES[rng.gen_range(0..LOCALES.len())].to_string(),
            viewport: VIEWPORTS[rng.gen_range(0..VIEWPORTS.len())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::SessionId;

    fn session() -> SessionHandle {
        SessionHandle {
            id: SessionId::new(),
            purpose: SessionPurpose::Detect,
            profile: RandomProfileGenerator::new(Some(1)).generate(SessionPurpose::Detect),
        }
    }

    fn instant() -> SimulationSettings {
        SimulationSettings {
            latency: Duration::ZERO,
            failure_rate: 0.0,
            seed: Some(7),
        }
    }

    #[tokio::test]
    async fn test_more_rewrites_lower_the_score() {
        let detector = SimulatedDetector::new(instant(), 25.0);
        let rewritten = detector
            .score(&format!("text\n{}", REWRITE_MARKER.repeat(6)), &session())
            .await
            .unwrap();
        // Base is below 70, so six passes always land at or under 16
        assert!(rewritten.score <= 16.0);
        assert!(rewritten.passed);
    }

    #[tokio::test]
    async fn test_failure_rate_one_always_fails() {
        let provider = SimulatedAiProvider::new(
            "always-down",
            SimulationSettings {
                failure_rate: 1.0,
                ..instant()
            },
        );
        let params = TransformParams {
            intensity: 0.5,
            temperature: 0.7,
            target_language: None,
        };
        let result = provider
            .transform(Capability::Optimize, "x", StrategyLevel::Light, &params)
            .await;
        assert!(matches!(result, Err(AdapterError::Transient(_))));
    }

    #[test]
    fn test_profiles_are_reproducible_with_seed() {
        let a = RandomProfileGenerator::new(Some(3)).generate(SessionPurpose::Fetch);
        let b = RandomProfileGenerator::new(Some(3)).generate(SessionPurpose::Fetch);
        assert_eq!(a, b);
        assert!(a.id.starts_with("fetch-"));
    }
}

//! Test fixtures and scripted adapters for orchestrator tests
//!
//! This module provides consistent test data plus deterministic adapter fakes
//! whose behavior each test scripts up front.

use async_trait::async_trait;
use orchestrator::error::{AdapterError, AdapterResult};
use orchestrator::traits::{
    AiProvider, ContentMetadata, ContentSource, DetectionScore, Detector, FetchedContent, Publisher, SessionHandle,
    TransformParams, Transformation,
};
use shared::{Capability, StrategyLevel};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Standard test data
pub struct TestFixtures;

impl TestFixtures {
    pub const SOURCE_1: &'static str = "https://medium.com/p/ownership-in-practice";
    pub const SOURCE_2: &'static str = "https://medium.com/p/async-rust-pitfalls";
    pub const SOURCE_3: &'static str = "https://medium.com/p/borrow-checker-stories";

    pub const TRANSLATOR: &'static str = "deepl";
    pub const REWRITER: &'static str = "gpt-rewrite";
    pub const DETECTOR: &'static str = "zerogpt";
    pub const PUBLISHER: &'static str = "wordpress";

    /// Default item threshold
    pub const THRESHOLD: f64 = 25.0;
    pub const SEED: u64 = 7;

    pub const RAW_TEXT: &'static str = "Ownership is the feature that makes Rust unique.";

    pub fn metadata() -> ContentMetadata {
        ContentMetadata {
            title: Some("Ownership in practice".to_string()),
            platform: Some("medium".to_string()),
            author: Some("fixture".to_string()),
            language: Some("en".to_string()),
        }
    }
}

/// Source that returns the same article for every reference, optionally after a delay
pub struct StaticSource {
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    async fn fetch(&self, source_ref: &str, _session: &SessionHandle) -> AdapterResult<FetchedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(FetchedContent {
            raw: format!("{} ({source_ref})", TestFixtures::RAW_TEXT),
            metadata: TestFixtures::metadata(),
        })
    }
}

/// AI provider that tags the input with the capability and strategy it ran at
pub struct TaggingProvider {
    calls: AtomicUsize,
}

impl TaggingProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for TaggingProvider {
    async fn transform(
        &self,
        capability: Capability,
        content: &str,
        level: StrategyLevel,
        _params: &TransformParams,
    ) -> AdapterResult<Transformation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Transformation {
            text: format!("{content} [{capability}:{level}]"),
            cost_units: 2.0,
        })
    }
}

/// Detector that replays a fixed score sequence; the last score repeats
pub struct ScriptedDetector {
    scores: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
}

impl ScriptedDetector {
    pub fn new(scores: Vec<f64>) -> Self {
        let last = scores.last().copied().unwrap_or(0.0);
        Self {
            scores: Mutex::new(scores.into()),
            last: Mutex::new(last),
        }
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn score(&self, _content: &str, _session: &SessionHandle) -> AdapterResult<DetectionScore> {
        let score = self.scores.lock().unwrap().pop_front();
        let score = score.unwrap_or_else(|| *self.last.lock().unwrap());
        Ok(DetectionScore {
            score,
            passed: score <= TestFixtures::THRESHOLD,
        })
    }
}

/// Publisher that hands out sequential references and records what it published
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Publisher whose platform rejects every post
    pub fn rejecting() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, content: &str, target: &str, _session: &SessionHandle) -> AdapterResult<String> {
        if self.fail {
            return Err(AdapterError::Permanent("post rejected by platform".to_string()));
        }
        let mut published = self.published.lock().unwrap();
        published.push((target.to_string(), content.to_string()));
        Ok(format!("{target}-{}", published.len()))
    }
}

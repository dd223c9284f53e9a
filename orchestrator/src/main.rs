//! Main entry point for the orchestrator binary
//!
//! Runs the pipeline end-to-end against the simulated adapters, wiring every
//! configured provider to an in-process stand-in.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use orchestrator::{
    services::{
        InMemoryWorkItemRepository, RandomProfileGenerator, SimulatedAiProvider, SimulatedDetector, SimulatedPublisher,
        SimulatedSessionBackend, SimulatedSource, SimulationSettings,
    },
    AdapterRegistry, IngestOptions, Orchestrator, OrchestratorResult, PipelineConfig,
};
use shared::{component_info, component_warn, logging, Capability, Component, ContentCategory, Priority};

/// Article migration pipeline orchestrator
#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Runs the fetch → translate → optimize → detect → publish pipeline on simulated adapters")]
pub struct Args {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Number of simulated articles to ingest
    #[arg(long, default_value = "5")]
    pub articles: usize,

    /// Probability that any simulated adapter call fails transiently
    #[arg(long, default_value = "0.0")]
    pub failure_rate: f64,

    /// Seed for the simulated adapters and provider selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// Simulated latency of each adapter call in milliseconds
    #[arg(long, default_value = "20")]
    pub latency_ms: u64,

    /// Seconds to wait for every article to reach a terminal stage
    #[arg(long, default_value = "120")]
    pub timeout_secs: u64,
}

const CATEGORIES: [ContentCategory; 4] = [
    ContentCategory::Technical,
    ContentCategory::News,
    ContentCategory::Tutorial,
    ContentCategory::Business,
];

fn simulated_adapters(config: &PipelineConfig, settings: SimulationSettings) -> AdapterRegistry {
    // Offset seeds so adapters do not share a random stream
    let seeded = |offset: u64| SimulationSettings {
        seed: settings.seed.map(|seed| seed.wrapping_add(offset)),
        ..settings
    };
    let mut adapters = AdapterRegistry::new(Arc::new(SimulatedSource::new(seeded(1))));
    for (index, provider) in config.providers.iter().enumerate() {
        let offset = 100 + index as u64;
        adapters = match provider.capability {
            Capability::Translate | Capability::Optimize => adapters.with_ai(
                provider.id.clone(),
                Arc::new(SimulatedAiProvider::new(provider.id.as_str(), seeded(offset))),
            ),
            Capability::Detect => adapters.with_detector(
                provider.id.clone(),
                Arc::new(SimulatedDetector::new(seeded(offset), config.defaults.score_threshold)),
            ),
            Capability::Publish => {
                adapters.with_publisher(provider.id.clone(), Arc::new(SimulatedPublisher::new(seeded(offset))))
            }
        };
    }
    adapters
}

#[tokio::main]
async fn main() -> OrchestratorResult<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();
    logging::init_tracing_with_level(Some(&args.log_level));

    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let settings = SimulationSettings {
        latency: Duration::from_millis(args.latency_ms),
        failure_rate: args.failure_rate,
        seed: config.seed,
    };
    let orchestrator = Orchestrator::new(
        config.clone(),
        simulated_adapters(&config, settings),
        Arc::new(InMemoryWorkItemRepository::new()),
        Arc::new(SimulatedSessionBackend::new(settings)),
        Arc::new(RandomProfileGenerator::new(config.seed)),
    )?;
    orchestrator.start();

    let mut ids = Vec::with_capacity(args.articles);
    for n in 0..args.articles {
        let options = IngestOptions {
            category: CATEGORIES[n % CATEGORIES.len()],
            priority: if n == 0 { Priority::High } else { Priority::Normal },
            publish_target: None,
        };
        ids.push(orchestrator.ingest(&format!("https://medium.com/p/article-{n}"), options).await?);
    }

    let deadline = Duration::from_secs(args.timeout_secs);
    let wait_all = async {
        let mut statuses = Vec::with_capacity(ids.len());
        for id in &ids {
            statuses.push(orchestrator.wait_until_terminal(*id, deadline).await);
        }
        statuses
    };

    tokio::select! {
        statuses = wait_all => {
            for status in statuses {
                let status = status?;
                component_info!(
                    Component::Orchestrator,
                    item = %status.id,
                    stage = %status.stage,
                    attempt = status.attempt,
                    detections = status.detection_history.len(),
                    "{}",
                    status.source_ref
                );
            }
        }
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => component_warn!(Component::Orchestrator, "Received Ctrl+C, stopping early"),
                Err(err) => logging::log_error(&Component::Orchestrator, "Signal handling", &err),
            }
        }
    }

    let mut counts: Vec<_> = orchestrator.stage_counts().await?.into_iter().collect();
    counts.sort_by_key(|(stage, _)| stage.to_string());
    for (stage, count) in counts {
        logging::log_progress(&Component::Orchestrator, "Stage", &format!("{stage}: {count}"));
    }

    for snapshot in orchestrator.provider_stats() {
        component_info!(
            Component::ProviderRegistry,
            provider = %snapshot.id,
            healthy = snapshot.healthy,
            requests = snapshot.total_requests,
            failures = snapshot.total_failures,
            avg_latency_ms = snapshot.avg_latency_ms,
            "💰 cost {:.4}",
            snapshot.total_cost
        );
    }
    for snapshot in orchestrator.session_stats() {
        component_info!(
            Component::SessionPool,
            purpose = %snapshot.purpose,
            created = snapshot.created_total,
            disposed = snapshot.disposed_total,
            "🧭 {} idle / {} open",
            snapshot.idle,
            snapshot.open
        );
    }

    for (provider, hour, entry) in orchestrator.ledger() {
        component_info!(
            Component::ProviderRegistry,
            provider = %provider,
            hour = %hour,
            calls = entry.calls,
            "🧾 ledger cost {:.4}",
            entry.cost
        );
    }

    orchestrator.shutdown().await;
    logging::log_success(&Component::Orchestrator, "Run complete");
    Ok(())
}

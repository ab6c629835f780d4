//! Command-line demo for the Phenowatch phenotype tracker.
//!
//! Replays the stock threshold scenario against a [`ThresholdTracker`], then
//! runs two plants' marker readings through the pipeline with a
//! [`ChangeTracker`] and prints the resulting growth records.
//!
//! The configuration path is taken from the first argument, then from
//! `PHENOWATCH_CONFIG`, then `phenowatch-config.yaml` in the working
//! directory. Defaults are used when none of these exist.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use phenowatch_core::{
    ChangeTracker, GrowthMonitor, LogObserver, MarkProcessed, Pipeline, PhenowatchConfig,
    ThresholdTracker,
};
use phenowatch_types::{CHLOROPHYLL_CONTENT, LEAF_AREA, Marker, PlantId, STEM_HEIGHT};
use rust_decimal::Decimal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "PHENOWATCH_CONFIG";

/// Configuration file looked up in the working directory.
const DEFAULT_CONFIG_PATH: &str = "phenowatch-config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, source) = load_config()?;
    init_logging(&config);

    info!(config = %source, "phenowatch-demo starting");

    replay_threshold_scenario(&config)?;
    run_pipeline(&config).await?;

    info!("phenowatch-demo finished");
    Ok(())
}

/// Resolve and load configuration, returning it with a label for its source.
fn load_config() -> anyhow::Result<(PhenowatchConfig, String)> {
    let explicit = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from);

    let path = match explicit {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => PathBuf::from(DEFAULT_CONFIG_PATH),
        None => {
            let mut config = PhenowatchConfig::default();
            config.logging.apply_env_overrides();
            return Ok((config, "defaults".to_owned()));
        }
    };

    let config = PhenowatchConfig::from_file(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    Ok((config, path.display().to_string()))
}

fn init_logging(config: &PhenowatchConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Feed the stock readings to a threshold tracker with a logging observer.
fn replay_threshold_scenario(config: &PhenowatchConfig) -> anyhow::Result<()> {
    let mut tracker = ThresholdTracker::from_config(&config.tracker);
    tracker.subscribe(Arc::new(LogObserver));

    let readings = [
        (LEAF_AREA, Decimal::from(60)),
        (STEM_HEIGHT, Decimal::from(35)),
        (CHLOROPHYLL_CONTENT, Decimal::from(3)),
        (CHLOROPHYLL_CONTENT, Decimal::from(6)),
    ];

    let mut notified: usize = 0;
    for (parameter, value) in readings {
        if let Some(threshold) = tracker.threshold(parameter) {
            debug!(parameter, %value, %threshold, "Replaying reading");
        }
        let sent = tracker
            .update([(parameter, value)])
            .with_context(|| format!("updating {parameter}"))?;
        notified = notified.saturating_add(sent);
    }

    info!(
        notified,
        parameters = ?tracker.parameters(),
        "Threshold scenario replayed"
    );
    Ok(())
}

/// Run two batches for two plants through the change-tracking pipeline.
async fn run_pipeline(config: &PhenowatchConfig) -> anyhow::Result<()> {
    let monitor = Arc::new(GrowthMonitor::new());
    let mut pipeline = Pipeline::new(MarkProcessed, ChangeTracker::from_config(&config.changes));
    pipeline.tracker_mut().subscribe(monitor.clone());
    pipeline.tracker_mut().subscribe(Arc::new(LogObserver));
    info!(
        significance = %pipeline.tracker().significance(),
        "Change tracking pipeline ready"
    );

    let seedling = PlantId::new();
    let sapling = PlantId::new();
    let batches = [
        vec![
            sample(seedling, "A", 12, 4, 2),
            sample(sapling, "B", 40, 22, 5),
        ],
        vec![
            sample(seedling, "A", 19, 6, 3),
            sample(sapling, "B", 41, 31, 7),
        ],
    ];

    let deadline = Duration::from_millis(config.pipeline.run_timeout_ms);
    for (round, batch) in batches.into_iter().enumerate() {
        let tracked = tokio::time::timeout(deadline, pipeline.run(batch))
            .await
            .with_context(|| format!("pipeline round {round} timed out"))?
            .with_context(|| format!("pipeline round {round} failed"))?;

        let output = serde_json::to_string(&tracked).context("serializing tracked markers")?;
        info!(round, phase = ?pipeline.phase(), %output, "Pipeline round complete");
    }

    for record in monitor.records() {
        info!(
            plant_id = ?record.plant_id,
            updates = record.updates,
            phenotypes = ?record.phenotypes,
            "Growth record"
        );
    }
    Ok(())
}

fn sample(plant: PlantId, label: &str, leaf: i64, stem: i64, chlorophyll: i64) -> Marker {
    Marker::new(label)
        .for_plant(plant)
        .with_measurement(LEAF_AREA, Decimal::from(leaf))
        .with_measurement(STEM_HEIGHT, Decimal::from(stem))
        .with_measurement(CHLOROPHYLL_CONTENT, Decimal::from(chlorophyll))
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::enrich::RoutingConfig;
use crate::stream::{default_consumer_name, AckPolicy, WorkerConfig};
use crate::transit::MatcherConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub routing: Option<RoutingConfig>,
}

/// GeoJSON FeatureCollections, plain or `.gz`
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub boundaries: PathBuf,
    pub stops: PathBuf,
    pub lines: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StreamConfig {
    pub inbound: String,
    pub outbound: String,
    pub group: String,
    /// Defaults to `<hostname>-<uuid>`
    pub consumer: Option<String>,
    /// Unacknowledged entries older than this are handed to another consumer
    pub claim_idle_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            inbound: "locations:inbound".to_string(),
            outbound: "locations:enriched".to_string(),
            group: "enrichment".to_string(),
            consumer: None,
            claim_idle_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerSection {
    pub instances: usize,
    pub max_batch: usize,
    pub idle_sleep_ms: u64,
    pub error_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub ack_policy: AckPolicy,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            instances: 1,
            max_batch: 20,
            idle_sleep_ms: 100,
            error_backoff_ms: 500,
            max_backoff_ms: 30_000,
            ack_policy: AckPolicy::AtLeastOnce,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        anyhow::ensure!(config.worker.max_batch > 0, "worker.max_batch must be positive");
        anyhow::ensure!(config.worker.instances > 0, "worker.instances must be positive");
        Ok(config)
    }

    /// Worker settings for one instance; each call draws a fresh consumer
    /// name unless one is configured
    pub fn worker_config(&self, instance: usize) -> WorkerConfig {
        let consumer = match &self.stream.consumer {
            Some(name) if self.worker.instances > 1 => format!("{name}-{instance}"),
            Some(name) => name.clone(),
            None => default_consumer_name(),
        };

        WorkerConfig {
            inbound_stream: self.stream.inbound.clone(),
            outbound_stream: self.stream.outbound.clone(),
            group: self.stream.group.clone(),
            consumer,
            max_batch: self.worker.max_batch,
            idle_sleep: Duration::from_millis(self.worker.idle_sleep_ms),
            error_backoff: Duration::from_millis(self.worker.error_backoff_ms),
            max_backoff: Duration::from_millis(self.worker.max_backoff_ms),
            ack_policy: self.worker.ack_policy,
        }
    }
}

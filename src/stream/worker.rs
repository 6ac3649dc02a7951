//! Poll, enrich, publish, acknowledge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::broker::{BrokerError, StreamBroker};
use super::shutdown::Shutdown;
use crate::enrich::{EnrichError, EnrichmentOrchestrator, ItemResult, LocationInput};
use crate::models::{EnrichedLocation, LocationEvent, NearestStop};

/// Which parsed messages are acknowledged after publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Every parsed message, whatever happened to its publish
    #[default]
    AtLeastOnce,
    /// Only messages whose result was published; the rest are redelivered
    Strict,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub inbound_stream: String,
    pub outbound_stream: String,
    pub group: String,
    pub consumer: String,
    pub max_batch: usize,
    pub idle_sleep: Duration,
    /// First backoff after a failed batch, doubled on each consecutive failure
    pub error_backoff: Duration,
    pub max_backoff: Duration,
    pub ack_policy: AckPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            inbound_stream: "locations:inbound".to_string(),
            outbound_stream: "locations:enriched".to_string(),
            group: "enrichment".to_string(),
            consumer: default_consumer_name(),
            max_batch: 20,
            idle_sleep: Duration::from_millis(100),
            error_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            ack_policy: AckPolicy::AtLeastOnce,
        }
    }
}

/// `<hostname>-<uuid>`, unique per worker instance
pub fn default_consumer_name() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "placemark".to_string());
    format!("{}-{}", host, Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Polling,
    Processing,
    Publishing,
    Acking,
    Stopping,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub iterations: u64,
    pub polled: u64,
    pub malformed: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub acked: u64,
    pub batch_failures: u64,
}

/// Result record written to the outbound stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub property_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<EnrichedLocation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_stops: Option<Vec<NearestStop>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub enriched_at: DateTime<Utc>,
}

impl OutboundEvent {
    pub fn from_item(item: ItemResult, enriched_at: DateTime<Utc>) -> Self {
        Self {
            property_id: item.property_id,
            location: item.location,
            nearest_stops: item.nearest_stops,
            error: item.error,
            enriched_at,
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),
}

/// What one iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// Nothing to read
    Idle,
    Processed { parsed: usize, published: usize },
}

/// One consumer of the inbound stream
pub struct BatchWorker {
    broker: Arc<dyn StreamBroker>,
    orchestrator: EnrichmentOrchestrator,
    config: WorkerConfig,
    state: WorkerState,
    stats: WorkerStats,
}

impl BatchWorker {
    pub fn new(broker: Arc<dyn StreamBroker>, orchestrator: EnrichmentOrchestrator, config: WorkerConfig) -> Self {
        Self {
            broker,
            orchestrator,
            config,
            state: WorkerState::Idle,
            stats: WorkerStats::default(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Loop until `shutdown` fires. The iteration in flight always completes.
    pub async fn run(mut self, shutdown: Shutdown) -> Result<WorkerStats, BrokerError> {
        self.broker
            .create_group(&self.config.inbound_stream, &self.config.group)
            .await?;

        info!(
            consumer = %self.config.consumer,
            stream = %self.config.inbound_stream,
            group = %self.config.group,
            "worker started"
        );

        let mut backoff = self.config.error_backoff;

        while !shutdown.is_triggered() {
            match self.run_once().await {
                Ok(Iteration::Idle) => {
                    if shutdown.sleep(self.config.idle_sleep).await {
                        break;
                    }
                }
                Ok(Iteration::Processed { .. }) => backoff = self.config.error_backoff,
                Err(e) => {
                    error!(consumer = %self.config.consumer, backoff_ms = backoff.as_millis() as u64, "batch failed: {}", e);
                    if shutdown.sleep(backoff).await {
                        break;
                    }
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
            }
        }

        self.state = WorkerState::Stopping;
        info!(consumer = %self.config.consumer, stats = ?self.stats, "worker stopped");
        Ok(self.stats)
    }

    /// One poll → process → publish → ack cycle.
    ///
    /// On `Err` nothing parsed in this batch was acknowledged.
    pub async fn run_once(&mut self) -> Result<Iteration, WorkerError> {
        self.stats.iterations += 1;
        let outcome = self.iterate().await;
        if outcome.is_err() {
            self.stats.batch_failures += 1;
        }
        self.state = WorkerState::Idle;
        outcome
    }

    async fn iterate(&mut self) -> Result<Iteration, WorkerError> {
        let WorkerConfig {
            inbound_stream,
            outbound_stream,
            group,
            consumer,
            ..
        } = &self.config;

        self.state = WorkerState::Polling;
        let messages = self
            .broker
            .poll_batch(inbound_stream, group, consumer, self.config.max_batch)
            .await?;
        if messages.is_empty() {
            return Ok(Iteration::Idle);
        }
        self.stats.polled += messages.len() as u64;

        self.state = WorkerState::Processing;
        let mut parsed_ids = Vec::with_capacity(messages.len());
        let mut malformed_ids = Vec::new();
        let mut inputs = Vec::with_capacity(messages.len());

        for message in messages {
            match serde_json::from_str::<LocationEvent>(&message.payload) {
                Ok(event) => {
                    inputs.push(LocationInput {
                        index: inputs.len(),
                        event,
                    });
                    parsed_ids.push(message.id);
                }
                Err(e) => {
                    warn!(id = %message.id, "dropping malformed message: {}", e);
                    malformed_ids.push(message.id);
                }
            }
        }

        if !malformed_ids.is_empty() {
            self.stats.malformed += malformed_ids.len() as u64;
            self.stats.acked += self.broker.ack(inbound_stream, group, &malformed_ids).await? as u64;
        }
        if inputs.is_empty() {
            return Ok(Iteration::Processed {
                parsed: 0,
                published: 0,
            });
        }

        let result = self.orchestrator.enrich_batch(inputs).await?;
        debug!(
            total = result.total,
            success = result.success,
            errors = result.errors,
            "batch enriched"
        );

        self.state = WorkerState::Publishing;
        let enriched_at = Utc::now();
        let mut published = vec![false; parsed_ids.len()];

        for item in result.items {
            let index = item.index;
            let property_id = item.property_id.clone();
            let outcome = match serde_json::to_string(&OutboundEvent::from_item(item, enriched_at)) {
                Ok(payload) => self.broker.publish(outbound_stream, &payload).await,
                Err(e) => Err(BrokerError::from(e)),
            };

            match outcome {
                Ok(_) => {
                    self.stats.published += 1;
                    if let Some(flag) = published.get_mut(index) {
                        *flag = true;
                    }
                }
                Err(e) => {
                    self.stats.publish_failures += 1;
                    warn!(property_id = %property_id, "publish failed: {}", e);
                }
            }
        }

        self.state = WorkerState::Acking;
        let to_ack: Vec<String> = match self.config.ack_policy {
            AckPolicy::AtLeastOnce => parsed_ids.clone(),
            AckPolicy::Strict => parsed_ids
                .iter()
                .zip(&published)
                .filter(|(_, ok)| **ok)
                .map(|(id, _)| id.clone())
                .collect(),
        };
        if !to_ack.is_empty() {
            self.stats.acked += self.broker.ack(inbound_stream, group, &to_ack).await? as u64;
        }

        Ok(Iteration::Processed {
            parsed: parsed_ids.len(),
            published: published.iter().filter(|ok| **ok).count(),
        })
    }
}

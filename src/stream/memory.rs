//! In-process stream broker with consumer groups.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::broker::{BrokerError, Result, StreamBroker, StreamMessage};

#[derive(Debug)]
struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct Group {
    /// Offset of the next never-delivered entry
    next: usize,
    /// Entry offset -> delivery state
    pending: BTreeMap<usize, PendingEntry>,
}

#[derive(Debug, Default)]
struct Stream {
    entries: Vec<StreamMessage>,
    offsets: HashMap<String, usize>,
    groups: HashMap<String, Group>,
    last_millis: i64,
    seq: u64,
}

impl Stream {
    fn append(&mut self, payload: &str) -> String {
        let millis = Utc::now().timestamp_millis().max(self.last_millis);
        if millis == self.last_millis {
            self.seq += 1;
        } else {
            self.last_millis = millis;
            self.seq = 0;
        }

        let id = format!("{}-{}", millis, self.seq);
        self.offsets.insert(id.clone(), self.entries.len());
        self.entries.push(StreamMessage {
            id: id.clone(),
            payload: payload.to_string(),
        });
        id
    }
}

#[derive(Debug, Default)]
struct State {
    streams: HashMap<String, Stream>,
    closed: bool,
}

/// Broker kept in memory; clones share the same streams
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
    claim_idle: Duration,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl MemoryBroker {
    /// `claim_idle`: how long a delivered entry may stay unacknowledged
    /// before any consumer of the group can receive it again
    pub fn new(claim_idle: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            claim_idle,
        }
    }

    /// Every entry of a stream, oldest first
    pub async fn entries(&self, stream: &str) -> Vec<StreamMessage> {
        let state = self.state.lock().await;
        state
            .streams
            .get(stream)
            .map(|s| s.entries.clone())
            .unwrap_or_default()
    }

    pub async fn pending_count(&self, stream: &str, group: &str) -> usize {
        let state = self.state.lock().await;
        state
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0)
    }

    /// True when the group has consumed and acknowledged everything
    pub async fn is_drained(&self, stream: &str, group: &str) -> bool {
        let state = self.state.lock().await;
        match state.streams.get(stream) {
            Some(s) => s
                .groups
                .get(group)
                .is_none_or(|g| g.pending.is_empty() && g.next >= s.entries.len()),
            None => true,
        }
    }

    /// Reject every later operation with [`BrokerError::Closed`]
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
    }
}

#[async_trait]
impl StreamBroker for MemoryBroker {
    async fn create_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }

        let s = state.streams.entry(stream.to_string()).or_default();
        if !s.groups.contains_key(group) {
            s.groups.insert(group.to_string(), Group::default());
            debug!(stream, group, "consumer group created");
        }
        Ok(())
    }

    async fn poll_batch(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max: usize,
    ) -> Result<Vec<StreamMessage>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }

        let s = state
            .streams
            .get_mut(stream)
            .ok_or_else(|| BrokerError::UnknownStream(stream.to_string()))?;
        let g = s.groups.get_mut(group).ok_or_else(|| BrokerError::UnknownGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        })?;

        let now = Instant::now();
        let mut batch = Vec::new();

        // Reclaim entries whose consumer went quiet
        for (offset, entry) in g.pending.iter_mut() {
            if batch.len() >= max {
                break;
            }
            if now.duration_since(entry.delivered_at) >= self.claim_idle {
                debug!(
                    stream,
                    group,
                    id = %s.entries[*offset].id,
                    from = %entry.consumer,
                    to = consumer,
                    deliveries = entry.deliveries + 1,
                    "redelivering idle entry"
                );
                entry.consumer = consumer.to_string();
                entry.delivered_at = now;
                entry.deliveries += 1;
                batch.push(s.entries[*offset].clone());
            }
        }

        while batch.len() < max && g.next < s.entries.len() {
            g.pending.insert(
                g.next,
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    deliveries: 1,
                },
            );
            batch.push(s.entries[g.next].clone());
            g.next += 1;
        }

        Ok(batch)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<usize> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }

        let s = state
            .streams
            .get_mut(stream)
            .ok_or_else(|| BrokerError::UnknownStream(stream.to_string()))?;
        let g = s.groups.get_mut(group).ok_or_else(|| BrokerError::UnknownGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        })?;

        let acked = ids
            .iter()
            .filter_map(|id| s.offsets.get(id))
            .filter(|offset| g.pending.remove(*offset).is_some())
            .count();
        Ok(acked)
    }

    async fn publish(&self, stream: &str, payload: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        Ok(state.streams.entry(stream.to_string()).or_default().append(payload))
    }
}

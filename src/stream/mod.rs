//! Batched consumption of the inbound location stream.
//!
//! A [`BatchWorker`] polls a consumer group through a [`StreamBroker`], hands
//! each batch to the enrichment orchestrator in one call and publishes one
//! outbound event per parsed message.

pub mod broker;
pub mod memory;
mod shutdown;
mod worker;

pub use broker::{BrokerError, StreamBroker, StreamMessage};
pub use memory::MemoryBroker;
pub use shutdown::Shutdown;
pub use worker::{
    default_consumer_name, AckPolicy, BatchWorker, Iteration, OutboundEvent, WorkerConfig, WorkerError,
    WorkerState, WorkerStats,
};

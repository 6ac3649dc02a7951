//! Enrichment pipeline core: one batched call per stream batch.

mod error;
mod orchestrator;
pub mod routing;

pub use error::{EnrichError, ItemError};
pub use orchestrator::{BatchResult, EnrichmentOrchestrator, ItemResult, LocationInput};
pub use routing::{OsrmRouter, RoutingConfig, RoutingError, WalkingRouter};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::boundary::BoundaryResolver;
use crate::config::Config;
use crate::enrich::{EnrichmentOrchestrator, OsrmRouter};
use crate::gateway::{loader, RTreeGateway, SpatialGateway};
use crate::transit::TransitMatcher;

/// Loaded gateway data plus the orchestrator built on it
#[derive(Clone)]
pub struct Pipeline {
    pub gateway: RTreeGateway,
    pub orchestrator: EnrichmentOrchestrator,
}

impl Pipeline {
    pub fn load(config: &Config) -> Result<Self> {
        let gateway = loader::load_gateway(&config.data.boundaries, &config.data.stops, &config.data.lines)?;
        info!(
            "Gateway ready: {} boundaries, {} stops, {} lines",
            gateway.boundary_count(),
            gateway.stop_count(),
            gateway.line_count()
        );

        Self::from_gateway(config, gateway)
    }

    pub fn from_gateway(config: &Config, gateway: RTreeGateway) -> Result<Self> {
        let shared: Arc<dyn SpatialGateway> = Arc::new(gateway.clone());
        let mut orchestrator = EnrichmentOrchestrator::new(
            BoundaryResolver::new(Arc::clone(&shared)),
            TransitMatcher::new(shared, config.matcher.clone()),
        );

        if let Some(routing) = &config.routing {
            info!("Walking distances from {} ({})", routing.base_url, routing.profile);
            orchestrator = orchestrator.with_router(Arc::new(OsrmRouter::new(routing)?));
        }

        Ok(Self { gateway, orchestrator })
    }
}

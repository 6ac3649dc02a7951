//! Resolve the administrative hierarchy containing a point.

use std::sync::Arc;
use tracing::debug;

use crate::gateway::{self, SpatialGateway};
use crate::models::{AdminBoundary, AdminLevel, BoundaryInfo, EnrichedLocation, GeoPoint};

/// Point-in-polygon hierarchy resolver
#[derive(Clone)]
pub struct BoundaryResolver {
    gateway: Arc<dyn SpatialGateway>,
}

impl BoundaryResolver {
    pub fn new(gateway: Arc<dyn SpatialGateway>) -> Self {
        Self { gateway }
    }

    /// Hierarchy for one point; `None` when no boundary contains it
    pub async fn resolve_one(&self, point: GeoPoint) -> gateway::Result<Option<EnrichedLocation>> {
        let boundaries = self.gateway.containing_boundaries(point).await?;
        Ok(build_hierarchy(point, &boundaries))
    }

    /// Hierarchies for many points in a single gateway call.
    ///
    /// The output has one slot per input point. A point outside every
    /// boundary gets an empty slot, never an error.
    pub async fn resolve_batch(
        &self,
        points: &[GeoPoint],
    ) -> gateway::Result<Vec<Option<EnrichedLocation>>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let per_point = self.gateway.containing_boundaries_batch(points).await?;
        if per_point.len() != points.len() {
            return Err(gateway::GatewayError::Internal(format!(
                "boundary batch returned {} slots for {} points",
                per_point.len(),
                points.len()
            )));
        }

        Ok(points
            .iter()
            .zip(per_point.iter())
            .map(|(point, boundaries)| build_hierarchy(*point, boundaries))
            .collect())
    }
}

/// Group containing boundaries by level, one per level.
///
/// Overlapping boundaries at the same level are a data problem; the
/// smallest one wins (declared area, else polygon area), then the lowest id.
pub fn build_hierarchy(point: GeoPoint, boundaries: &[Arc<AdminBoundary>]) -> Option<EnrichedLocation> {
    if boundaries.is_empty() {
        return None;
    }

    let mut location = EnrichedLocation::default();

    for level in AdminLevel::all() {
        let at_level: Vec<&Arc<AdminBoundary>> =
            boundaries.iter().filter(|b| b.level == *level).collect();

        let chosen = at_level.iter().min_by(|a, b| {
            a.size_hint()
                .total_cmp(&b.size_hint())
                .then_with(|| a.id.cmp(&b.id))
        });

        if let Some(boundary) = chosen {
            if at_level.len() > 1 {
                debug!(
                    lat = point.lat,
                    lon = point.lon,
                    level = ?level,
                    chosen = boundary.id,
                    discarded = at_level.len() - 1,
                    "overlapping boundaries at one level"
                );
            }
            location.set(*level, BoundaryInfo::from_boundary(boundary));
        }
    }

    Some(location)
}

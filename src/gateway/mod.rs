//! Spatial data gateway.
//!
//! The pipeline reads boundaries, stops and lines only through
//! [`SpatialGateway`]. Implementations execute batches of [`QueryPlan`]s;
//! the point/radius helpers used by the resolver and matcher are provided on
//! top of those primitives.

mod error;
pub mod index;
pub mod loader;
pub mod memory;
pub mod query;

use async_trait::async_trait;
use std::sync::Arc;

pub use error::{GatewayError, Result};
pub use index::{FeatureIndex, LineFeature};
pub use memory::RTreeGateway;
pub use query::{Envelope, Layer, Order, PlanTarget, Predicate, QueryBuilder, QueryPlan};

use crate::models::{AdminBoundary, GeoPoint, TransitLine, TransitMode, TransitStop};

/// Bounding-box expansion around a point for the boundary pre-filter (~11 km at the equator).
///
/// Containment plans carry it for engines that scan by envelope alone. The
/// in-process gateway intersects it with the containment bound, so its R-tree
/// scan is narrowed to the point itself.
pub const BOUNDARY_PREFILTER_DEGREES: f64 = 0.1;

/// A stop matched by a radius query
#[derive(Debug, Clone)]
pub struct StopHit {
    pub stop: Arc<TransitStop>,
    pub distance_m: f64,
}

/// One radius query in a batched stop lookup
#[derive(Debug, Clone)]
pub struct StopRequest {
    pub point: GeoPoint,
    pub radius_m: f64,
    /// `None` returns every stop within the radius
    pub limit: Option<usize>,
    pub modes: Vec<TransitMode>,
}

/// Read-only spatial store.
///
/// Every method takes a batch and returns one result list per plan,
/// index-aligned. An `Err` means the whole call failed.
#[async_trait]
pub trait SpatialGateway: Send + Sync {
    async fn query_boundaries(&self, plans: &[QueryPlan]) -> Result<Vec<Vec<Arc<AdminBoundary>>>>;

    async fn query_stops(&self, plans: &[QueryPlan]) -> Result<Vec<Vec<StopHit>>>;

    async fn query_lines(&self, plans: &[QueryPlan]) -> Result<Vec<Vec<Arc<TransitLine>>>>;

    /// Boundaries containing a point
    async fn containing_boundaries(&self, point: GeoPoint) -> Result<Vec<Arc<AdminBoundary>>> {
        let mut results = self.containing_boundaries_batch(&[point]).await?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Boundaries containing each point, in one call
    async fn containing_boundaries_batch(
        &self,
        points: &[GeoPoint],
    ) -> Result<Vec<Vec<Arc<AdminBoundary>>>> {
        let plans: Vec<QueryPlan> = points
            .iter()
            .map(|p| QueryPlan::containing(*p, BOUNDARY_PREFILTER_DEGREES))
            .collect();
        self.query_boundaries(&plans).await
    }

    /// Stops of the given modes within the radius, nearest first
    async fn nearest_stops(
        &self,
        point: GeoPoint,
        radius_m: f64,
        limit: Option<usize>,
        modes: &[TransitMode],
    ) -> Result<Vec<StopHit>> {
        let request = StopRequest {
            point,
            radius_m,
            limit,
            modes: modes.to_vec(),
        };
        let mut results = self.nearest_stops_batch(&[request]).await?;
        Ok(results.pop().unwrap_or_default())
    }

    async fn nearest_stops_batch(&self, requests: &[StopRequest]) -> Result<Vec<Vec<StopHit>>> {
        let plans: Vec<QueryPlan> = requests
            .iter()
            .map(|r| QueryPlan::nearest_stops(r.point, r.radius_m, r.limit, &r.modes))
            .collect();
        self.query_stops(&plans).await
    }

    /// Lines passing within the threshold of a stop location
    async fn lines_near(
        &self,
        point: GeoPoint,
        threshold_m: f64,
        modes: &[TransitMode],
    ) -> Result<Vec<Arc<TransitLine>>> {
        let mut results = self.lines_near_batch(&[point], threshold_m, modes).await?;
        Ok(results.pop().unwrap_or_default())
    }

    async fn lines_near_batch(
        &self,
        points: &[GeoPoint],
        threshold_m: f64,
        modes: &[TransitMode],
    ) -> Result<Vec<Vec<Arc<TransitLine>>>> {
        let plans: Vec<QueryPlan> = points
            .iter()
            .map(|p| QueryPlan::lines_near(*p, threshold_m, modes))
            .collect();
        self.query_lines(&plans).await
    }
}

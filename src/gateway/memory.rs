//! In-process gateway backed by R-tree indexes.

use async_trait::async_trait;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

use super::index::{FeatureIndex, LineFeature};
use super::query::{Layer, Order, PlanTarget, Predicate, QueryPlan};
use super::{GatewayError, Result, SpatialGateway, StopHit};
use crate::models::{AdminBoundary, AdminLevel, GeoPoint, TransitLine, TransitStop};

struct Indexes {
    boundaries: FeatureIndex<AdminBoundary>,
    stops: FeatureIndex<TransitStop>,
    lines: FeatureIndex<LineFeature>,
}

/// Gateway over immutable in-memory data, cheap to clone and share
#[derive(Clone)]
pub struct RTreeGateway {
    inner: Arc<Indexes>,
}

impl RTreeGateway {
    pub fn new(
        boundaries: Vec<AdminBoundary>,
        stops: Vec<TransitStop>,
        lines: Vec<LineFeature>,
    ) -> Self {
        let mut per_level = std::collections::BTreeMap::<AdminLevel, usize>::new();
        for boundary in &boundaries {
            *per_level.entry(boundary.level).or_default() += 1;
        }
        for (level, count) in &per_level {
            info!("  {:?}: {} boundaries", level, count);
        }

        Self {
            inner: Arc::new(Indexes {
                boundaries: FeatureIndex::build(boundaries, "boundary"),
                stops: FeatureIndex::build(stops, "stop"),
                lines: FeatureIndex::build(lines, "line"),
            }),
        }
    }

    pub fn boundary_count(&self) -> usize {
        self.inner.boundaries.len()
    }

    pub fn stop_count(&self) -> usize {
        self.inner.stops.len()
    }

    pub fn line_count(&self) -> usize {
        self.inner.lines.len()
    }

    /// Run every plan against one index on the rayon pool, off the async runtime.
    async fn run_batch<T, F, M, O>(
        &self,
        plans: &[QueryPlan],
        layer: Layer,
        pick: F,
        map: M,
    ) -> Result<Vec<Vec<O>>>
    where
        T: PlanTarget + Send + Sync + 'static,
        F: Fn(&Indexes) -> &FeatureIndex<T> + Send + 'static,
        M: Fn(&QueryPlan, Arc<T>) -> O + Send + Sync + 'static,
        O: Send + 'static,
    {
        if plans.is_empty() {
            return Ok(Vec::new());
        }

        let inner = Arc::clone(&self.inner);
        let plans = plans.to_vec();

        tokio::task::spawn_blocking(move || {
            let index = pick(&inner);
            plans
                .par_iter()
                .map(|plan| -> Result<Vec<O>> {
                    let hits = execute(index, plan, layer)?;
                    Ok(hits.into_iter().map(|item| map(plan, item)).collect())
                })
                .collect::<Result<Vec<Vec<O>>>>()
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("query task failed: {e}")))?
    }
}

/// Execute one plan: bounded candidate scan, exact predicate, order, limit.
pub fn execute<T: PlanTarget>(
    index: &FeatureIndex<T>,
    plan: &QueryPlan,
    layer: Layer,
) -> Result<Vec<Arc<T>>> {
    if plan.layer != layer {
        return Err(GatewayError::LayerMismatch {
            expected: layer,
            actual: plan.layer,
        });
    }

    let bound = plan
        .predicate
        .bounding_envelope()
        .ok_or(GatewayError::Unbounded(layer))?;

    let mut hits: Vec<(Arc<T>, f64)> = index
        .candidates(&bound)
        .filter(|feature| plan.predicate.matches::<T>(feature))
        .map(|feature| {
            let key = match plan.order {
                Order::NearestTo(origin) => feature.distance_m(&origin),
                Order::SmallestFirst => feature.size(),
                Order::Unordered => 0.0,
            };
            (Arc::clone(feature), key)
        })
        .collect();

    if plan.order != Order::Unordered {
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
    }
    if let Some(limit) = plan.limit {
        hits.truncate(limit);
    }

    debug!(layer = ?layer, hits = hits.len(), "plan executed");

    Ok(hits.into_iter().map(|(feature, _)| feature).collect())
}

/// Point distances are measured from: ordering origin, else radius origin.
fn plan_origin(plan: &QueryPlan) -> Option<GeoPoint> {
    fn within_origin(predicate: &Predicate) -> Option<GeoPoint> {
        match predicate {
            Predicate::WithinMeters { origin, .. } => Some(*origin),
            Predicate::And(children) => children.iter().find_map(within_origin),
            _ => None,
        }
    }

    match plan.order {
        Order::NearestTo(origin) => Some(origin),
        _ => within_origin(&plan.predicate),
    }
}

#[async_trait]
impl SpatialGateway for RTreeGateway {
    async fn query_boundaries(&self, plans: &[QueryPlan]) -> Result<Vec<Vec<Arc<AdminBoundary>>>> {
        self.run_batch(plans, Layer::Boundaries, |i| &i.boundaries, |_, b| b)
            .await
    }

    async fn query_stops(&self, plans: &[QueryPlan]) -> Result<Vec<Vec<StopHit>>> {
        self.run_batch(plans, Layer::Stops, |i| &i.stops, |plan, stop| {
            let distance_m = plan_origin(plan)
                .map(|origin| origin.distance_m(&stop.location))
                .unwrap_or(0.0);
            StopHit { stop, distance_m }
        })
        .await
    }

    async fn query_lines(&self, plans: &[QueryPlan]) -> Result<Vec<Vec<Arc<TransitLine>>>> {
        self.run_batch(plans, Layer::Lines, |i| &i.lines, |_, f| Arc::clone(&f.line))
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::TransitMode;
    use geo::{LineString, MultiLineString, MultiPolygon, Polygon};
    use std::collections::HashMap;

    pub(crate) fn rect(
        id: i64,
        level: AdminLevel,
        name: &str,
        (min_lon, min_lat): (f64, f64),
        (max_lon, max_lat): (f64, f64),
    ) -> AdminBoundary {
        let ring = LineString::from(vec![
            (min_lon, min_lat),
            (max_lon, min_lat),
            (max_lon, max_lat),
            (min_lon, max_lat),
            (min_lon, min_lat),
        ]);
        AdminBoundary {
            id,
            level,
            names: HashMap::from([("default".to_string(), name.to_string())]),
            population: None,
            area_km2: None,
            geometry: MultiPolygon::new(vec![Polygon::new(ring, vec![])]),
        }
    }

    pub(crate) fn stop(id: &str, name: &str, mode: TransitMode, lat: f64, lon: f64) -> TransitStop {
        TransitStop::new(
            id,
            HashMap::from([("default".to_string(), name.to_string())]),
            mode,
            GeoPoint::new(lat, lon),
        )
    }

    pub(crate) fn line(
        id: &str,
        reference: &str,
        mode: TransitMode,
        coords: Vec<(f64, f64)>,
    ) -> LineFeature {
        LineFeature {
            line: Arc::new(TransitLine {
                id: id.to_string(),
                reference: Some(reference.to_string()),
                name: format!("Line {reference}"),
                color: None,
                mode,
            }),
            geometry: MultiLineString::new(vec![LineString::from(coords)]),
        }
    }

    /// Spain > Catalonia > Barcelona, a few metro/bus stops around Plaça de Catalunya
    pub(crate) fn barcelona() -> RTreeGateway {
        let boundaries = vec![
            rect(1311341, AdminLevel::Country, "España", (-9.5, 35.9), (3.4, 43.8)),
            rect(349053, AdminLevel::Region, "Catalunya", (0.1, 40.5), (3.4, 42.9)),
            rect(347950, AdminLevel::City, "Barcelona", (2.05, 41.32), (2.23, 41.47)),
        ];
        let stops = vec![
            stop("node/1", "Catalunya", TransitMode::Metro, 41.3870, 2.1701),
            stop("node/2", "Catalunya", TransitMode::Metro, 41.3872, 2.1695),
            stop("node/3", "Universitat", TransitMode::Metro, 41.3859, 2.1640),
            stop("node/4", "Pl Catalunya", TransitMode::Bus, 41.3866, 2.1707),
        ];
        let lines = vec![line(
            "relation/10",
            "L1",
            TransitMode::Metro,
            vec![(2.1640, 41.3859), (2.1701, 41.3870)],
        )];
        RTreeGateway::new(boundaries, stops, lines)
    }

    #[tokio::test]
    async fn test_containing_boundaries_batch_is_aligned() {
        let gateway = barcelona();
        let points = [
            GeoPoint::new(41.3851, 2.1734),
            GeoPoint::new(-33.86, 151.2),
            GeoPoint::new(40.4168, -3.7038),
        ];

        let results = gateway.containing_boundaries_batch(&points).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].len(), 3);
        assert!(results[1].is_empty());
        assert_eq!(results[2].len(), 1);

        // Smallest polygon first
        assert_eq!(results[0][0].id, 347950);
    }

    #[tokio::test]
    async fn test_nearest_stops_sorted_and_limited() {
        let gateway = barcelona();
        let origin = GeoPoint::new(41.3870, 2.1701);

        let hits = gateway
            .nearest_stops(origin, 1000.0, Some(2), &[TransitMode::Metro])
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].stop.id, "node/1");
        assert!(hits[0].distance_m < 1.0);
        assert!(hits[0].distance_m <= hits[1].distance_m);
    }

    #[tokio::test]
    async fn test_radius_query_across_antimeridian() {
        let gateway = RTreeGateway::new(
            vec![],
            vec![
                stop("node/east", "Levuka", TransitMode::Ferry, -17.0, -179.995),
                stop("node/west", "Savusavu", TransitMode::Ferry, -17.0, 179.995),
            ],
            vec![line(
                "relation/fj",
                "F1",
                TransitMode::Ferry,
                vec![(-179.999, -17.0), (-179.99, -17.0)],
            )],
        );
        let origin = GeoPoint::new(-17.0, 179.999);

        let hits = gateway
            .nearest_stops(origin, 2000.0, None, &[TransitMode::Ferry])
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.stop.id.as_str()).collect();
        assert_eq!(ids, vec!["node/west", "node/east"]);

        let lines = gateway
            .lines_near(origin, 300.0, &[TransitMode::Ferry])
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[tokio::test]
    async fn test_lines_near_threshold() {
        let gateway = barcelona();

        let near = gateway
            .lines_near(GeoPoint::new(41.3870, 2.1701), 100.0, &[TransitMode::Metro])
            .await
            .unwrap();
        assert_eq!(near.len(), 1);

        let far = gateway
            .lines_near(GeoPoint::new(41.3950, 2.1701), 100.0, &[TransitMode::Metro])
            .await
            .unwrap();
        assert!(far.is_empty());

        let wrong_mode = gateway
            .lines_near(GeoPoint::new(41.3870, 2.1701), 100.0, &[TransitMode::Bus])
            .await
            .unwrap();
        assert!(wrong_mode.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_mismatched_and_unbounded_plans() {
        let gateway = barcelona();
        let point = GeoPoint::new(41.3870, 2.1701);

        let wrong_layer = QueryPlan::lines_near(point, 100.0, &[]);
        let err = gateway.query_stops(&[wrong_layer]).await.unwrap_err();
        assert!(matches!(err, GatewayError::LayerMismatch { .. }));

        let unbounded = QueryPlan::builder(Layer::Stops)
            .modes(&[TransitMode::Bus])
            .build();
        let err = gateway.query_stops(&[unbounded]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unbounded(Layer::Stops)));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let gateway = barcelona();
        assert!(gateway.query_boundaries(&[]).await.unwrap().is_empty());
    }
}

//! Combine boundary and transit lookups into one record per input.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{EnrichError, ItemError};
use super::routing::{route_matrix, WalkingRouter};
use crate::boundary::BoundaryResolver;
use crate::models::{EnrichedLocation, GeoPoint, LocationEvent, NearestStop};
use crate::transit::TransitMatcher;

/// One orchestrator input: a location event plus its slot in the batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationInput {
    pub index: usize,

    #[serde(flatten)]
    pub event: LocationEvent,
}

/// Enrichment outcome for one input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub index: usize,

    pub property_id: String,

    /// `None` when no boundary contains the point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<EnrichedLocation>,

    /// `None` only when the item failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_stops: Option<Vec<NearestStop>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemResult {
    fn failed(input: &LocationInput, error: ItemError) -> Self {
        Self {
            index: input.index,
            property_id: input.event.property_id.clone(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// One entry per input, in input order
    pub items: Vec<ItemResult>,
    pub total: usize,
    pub success: usize,
    pub errors: usize,
}

/// Stateless coordinator over the resolver, the matcher and an optional router
#[derive(Clone)]
pub struct EnrichmentOrchestrator {
    resolver: BoundaryResolver,
    matcher: TransitMatcher,
    router: Option<Arc<dyn WalkingRouter>>,
}

impl EnrichmentOrchestrator {
    pub fn new(resolver: BoundaryResolver, matcher: TransitMatcher) -> Self {
        Self {
            resolver,
            matcher,
            router: None,
        }
    }

    pub fn with_router(mut self, router: Arc<dyn WalkingRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn resolver(&self) -> &BoundaryResolver {
        &self.resolver
    }

    pub fn matcher(&self) -> &TransitMatcher {
        &self.matcher
    }

    /// Enrich a batch with one boundary call and one transit pass.
    ///
    /// Item problems are reported on the item; only a gateway failure fails
    /// the call.
    pub async fn enrich_batch(&self, inputs: Vec<LocationInput>) -> Result<BatchResult, EnrichError> {
        let mut items: Vec<Option<ItemResult>> = vec![None; inputs.len()];
        let mut slots = Vec::new();
        let mut points = Vec::new();

        for (slot, input) in inputs.iter().enumerate() {
            match validated_point(&input.event) {
                Ok(point) => {
                    slots.push(slot);
                    points.push(point);
                }
                Err(error) => {
                    debug!(index = input.index, property_id = %input.event.property_id, %error, "item rejected");
                    items[slot] = Some(ItemResult::failed(input, error));
                }
            }
        }

        if !points.is_empty() {
            let config = self.matcher.config();
            let (locations, mut stops) = tokio::try_join!(
                self.resolver.resolve_batch(&points),
                self.matcher
                    .nearest_batch(&points, config.default_radius_m, config.default_limit),
            )?;

            ensure_aligned("boundary resolver", locations.len(), points.len())?;
            ensure_aligned("transit matcher", stops.len(), points.len())?;

            if let Some(router) = &self.router {
                add_walking_legs(router.as_ref(), &points, &mut stops).await;
            }

            for ((slot, location), stops) in slots.into_iter().zip(locations).zip(stops) {
                let input = &inputs[slot];
                let location = location.map(|mut location| {
                    location.address_visible = input
                        .event
                        .show_address
                        .unwrap_or_else(|| input.event.has_street_address());
                    location
                });

                items[slot] = Some(ItemResult {
                    index: input.index,
                    property_id: input.event.property_id.clone(),
                    location,
                    nearest_stops: Some(stops),
                    error: None,
                });
            }
        }

        let items: Vec<ItemResult> = items.into_iter().flatten().collect();
        let success = items.iter().filter(|item| item.is_success()).count();

        Ok(BatchResult {
            total: items.len(),
            success,
            errors: items.len() - success,
            items,
        })
    }
}

fn validated_point(event: &LocationEvent) -> Result<GeoPoint, ItemError> {
    let point = event.point().ok_or(ItemError::MissingCoordinates)?;
    if point.is_valid() {
        Ok(point)
    } else {
        Err(ItemError::InvalidCoordinates {
            lat: point.lat,
            lon: point.lon,
        })
    }
}

fn ensure_aligned(what: &'static str, got: usize, expected: usize) -> Result<(), EnrichError> {
    if got == expected {
        Ok(())
    } else {
        Err(EnrichError::Misaligned { what, got, expected })
    }
}

/// Best effort: routing failures leave the walking fields empty.
async fn add_walking_legs(router: &dyn WalkingRouter, points: &[GeoPoint], stops: &mut [Vec<NearestStop>]) {
    let requests = points.iter().zip(stops.iter()).map(|(point, stops)| async move {
        if stops.is_empty() {
            return None;
        }
        let destinations: Vec<GeoPoint> = stops.iter().map(|s| s.stop.location).collect();
        match route_matrix(router, &[*point], &destinations).await {
            Ok(mut matrix) => matrix.pop(),
            Err(e) => {
                warn!(lat = point.lat, lon = point.lon, "walking distance lookup failed: {}", e);
                None
            }
        }
    });
    let legs = join_all(requests).await;

    for (stops, row) in stops.iter_mut().zip(legs) {
        let Some(row) = row else { continue };
        for (stop, leg) in stops.iter_mut().zip(row) {
            if let Some(leg) = leg {
                stop.walking_distance_m = Some(leg.distance_m);
                stop.walking_duration_s = Some(leg.duration_s);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::routing::tests::StraightLineRouter;
    use crate::enrich::routing::{Matrix, RoutingError};
    use crate::gateway::memory::tests::barcelona;
    use crate::gateway::{self, GatewayError, QueryPlan, SpatialGateway, StopHit};
    use crate::models::{AdminBoundary, TransitLine};
    use crate::transit::MatcherConfig;
    use async_trait::async_trait;

    struct UnavailableGateway;

    #[async_trait]
    impl SpatialGateway for UnavailableGateway {
        async fn query_boundaries(&self, _: &[QueryPlan]) -> gateway::Result<Vec<Vec<Arc<AdminBoundary>>>> {
            Err(GatewayError::Unavailable("connection refused".to_string()))
        }

        async fn query_stops(&self, _: &[QueryPlan]) -> gateway::Result<Vec<Vec<StopHit>>> {
            Err(GatewayError::Unavailable("connection refused".to_string()))
        }

        async fn query_lines(&self, _: &[QueryPlan]) -> gateway::Result<Vec<Vec<Arc<TransitLine>>>> {
            Err(GatewayError::Unavailable("connection refused".to_string()))
        }
    }

    struct DownRouter;

    #[async_trait]
    impl WalkingRouter for DownRouter {
        async fn matrix(&self, _: &[GeoPoint], _: &[GeoPoint]) -> Result<Matrix, RoutingError> {
            Err(RoutingError::BadResponse("NoTable: service down".to_string()))
        }
    }

    fn orchestrator(gateway: Arc<dyn SpatialGateway>) -> EnrichmentOrchestrator {
        EnrichmentOrchestrator::new(
            BoundaryResolver::new(Arc::clone(&gateway)),
            TransitMatcher::new(gateway, MatcherConfig::default()),
        )
    }

    fn input(index: usize, property_id: &str, lat: Option<f64>, lon: Option<f64>) -> LocationInput {
        LocationInput {
            index,
            event: LocationEvent {
                property_id: property_id.to_string(),
                country: "ES".to_string(),
                city: Some("Barcelona".to_string()),
                lat,
                lon,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_barcelona_scenario() {
        let result = orchestrator(Arc::new(barcelona()))
            .enrich_batch(vec![input(0, "bcn-1", Some(41.3870), Some(2.1701))])
            .await
            .unwrap();

        assert_eq!((result.total, result.success, result.errors), (1, 1, 0));

        let item = &result.items[0];
        let location = item.location.as_ref().unwrap();
        assert!(location.country.is_some());
        assert!(location.city.is_some());
        assert!(!location.address_visible);

        let stops = item.nearest_stops.as_ref().unwrap();
        assert_eq!(stops[0].stop.id, "node/1");
        assert!(stops[0].walking_distance_m.is_none());
    }

    #[tokio::test]
    async fn test_item_errors_are_isolated_and_aligned() {
        let result = orchestrator(Arc::new(barcelona()))
            .enrich_batch(vec![
                input(7, "no-coords", None, None),
                input(8, "bcn", Some(41.3870), Some(2.1701)),
                input(9, "bad-lat", Some(120.0), Some(2.0)),
                input(10, "sydney", Some(-33.86), Some(151.2)),
            ])
            .await
            .unwrap();

        assert_eq!((result.total, result.success, result.errors), (4, 2, 2));

        let indexes: Vec<usize> = result.items.iter().map(|i| i.index).collect();
        assert_eq!(indexes, vec![7, 8, 9, 10]);

        assert_eq!(result.items[0].error.as_deref(), Some("location has no coordinates"));
        assert!(result.items[0].location.is_none());
        assert!(result.items[2].error.as_deref().unwrap().starts_with("invalid coordinates"));

        // Nothing found is an empty slot, not an error
        assert!(result.items[3].is_success());
        assert!(result.items[3].location.is_none());
        assert_eq!(result.items[3].nearest_stops.as_deref(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_address_visibility() {
        let orchestrator = orchestrator(Arc::new(barcelona()));

        let mut with_street = input(0, "a", Some(41.3870), Some(2.1701));
        with_street.event.street = Some("Carrer de Pelai".to_string());
        with_street.event.house_number = Some("12".to_string());

        let mut hidden = with_street.clone();
        hidden.index = 1;
        hidden.event.show_address = Some(false);

        let result = orchestrator.enrich_batch(vec![with_street, hidden]).await.unwrap();
        assert!(result.items[0].location.as_ref().unwrap().address_visible);
        assert!(!result.items[1].location.as_ref().unwrap().address_visible);
    }

    #[tokio::test]
    async fn test_idempotent() {
        let orchestrator = orchestrator(Arc::new(barcelona()));
        let inputs = vec![
            input(0, "a", Some(41.3870), Some(2.1701)),
            input(1, "b", Some(41.3859), Some(2.1640)),
            input(2, "c", None, None),
        ];

        let first = orchestrator.enrich_batch(inputs.clone()).await.unwrap();
        let second = orchestrator.enrich_batch(inputs).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_gateway_failure_fails_whole_batch() {
        let err = orchestrator(Arc::new(UnavailableGateway))
            .enrich_batch(vec![input(0, "a", Some(41.3870), Some(2.1701))])
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::Gateway(GatewayError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_no_valid_points_skips_gateway() {
        let result = orchestrator(Arc::new(UnavailableGateway))
            .enrich_batch(vec![input(0, "a", None, None)])
            .await
            .unwrap();
        assert_eq!(result.errors, 1);
    }

    #[tokio::test]
    async fn test_walking_legs() {
        let router = Arc::new(StraightLineRouter::default());
        let result = orchestrator(Arc::new(barcelona()))
            .with_router(router)
            .enrich_batch(vec![input(0, "a", Some(41.3870), Some(2.1701))])
            .await
            .unwrap();

        let stops = result.items[0].nearest_stops.as_ref().unwrap();
        assert!(stops.iter().all(|s| s.walking_distance_m.is_some()));
        assert!(stops.iter().all(|s| s.walking_duration_s.is_some()));
    }

    #[tokio::test]
    async fn test_router_failure_is_not_an_item_error() {
        let result = orchestrator(Arc::new(barcelona()))
            .with_router(Arc::new(DownRouter))
            .enrich_batch(vec![input(0, "a", Some(41.3870), Some(2.1701))])
            .await
            .unwrap();

        assert_eq!(result.errors, 0);
        let stops = result.items[0].nearest_stops.as_ref().unwrap();
        assert!(!stops.is_empty());
        assert!(stops.iter().all(|s| s.walking_distance_m.is_none()));
    }
}

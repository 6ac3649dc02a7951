//! Walking distance from a property to its selected stops.
//!
//! The router is an external matrix service limited to 25 points
//! (origins + destinations) per request; [`route_matrix`] partitions larger
//! sets and stitches the partial matrices back together.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::GeoPoint;

/// Combined origin + destination ceiling per request
pub const MAX_MATRIX_POINTS: usize = 25;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("invalid routing input: {0}")]
    InvalidInput(String),

    #[error("{count} points exceed the per-request maximum of {max}")]
    TooManyPoints { count: usize, max: usize },

    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bad routing response: {0}")]
    BadResponse(String),
}

/// Foot distance and duration between two points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkLeg {
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Rows are origins, columns destinations. `None` means unroutable.
pub type Matrix = Vec<Vec<Option<WalkLeg>>>;

#[async_trait]
pub trait WalkingRouter: Send + Sync {
    /// One request; `origins.len() + destinations.len()` must not exceed
    /// [`MAX_MATRIX_POINTS`].
    async fn matrix(&self, origins: &[GeoPoint], destinations: &[GeoPoint]) -> Result<Matrix, RoutingError>;
}

/// Origin/destination index ranges of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixChunk {
    pub origins: std::ops::Range<usize>,
    pub destinations: std::ops::Range<usize>,
}

/// Split an `origins x destinations` matrix into requests of at most `max_points` points.
pub fn partition(origins: usize, destinations: usize, max_points: usize) -> Result<Vec<MatrixChunk>, RoutingError> {
    if origins == 0 || destinations == 0 {
        return Err(RoutingError::InvalidInput(
            "origins and destinations must both be non-empty".to_string(),
        ));
    }
    if max_points < 2 {
        return Err(RoutingError::InvalidInput(format!(
            "request size {max_points} cannot hold an origin and a destination"
        )));
    }

    let origin_step = origins.min(max_points - destinations.min(max_points / 2)).max(1);
    let destination_step = (max_points - origin_step).max(1);

    let mut chunks = Vec::new();
    for o in (0..origins).step_by(origin_step) {
        for d in (0..destinations).step_by(destination_step) {
            chunks.push(MatrixChunk {
                origins: o..(o + origin_step).min(origins),
                destinations: d..(d + destination_step).min(destinations),
            });
        }
    }
    Ok(chunks)
}

/// Full matrix over any number of points, one router call per chunk.
pub async fn route_matrix(
    router: &dyn WalkingRouter,
    origins: &[GeoPoint],
    destinations: &[GeoPoint],
) -> Result<Matrix, RoutingError> {
    let chunks = partition(origins.len(), destinations.len(), MAX_MATRIX_POINTS)?;
    let mut matrix: Matrix = vec![vec![None; destinations.len()]; origins.len()];

    for chunk in &chunks {
        let part = router
            .matrix(&origins[chunk.origins.clone()], &destinations[chunk.destinations.clone()])
            .await?;

        if part.len() != chunk.origins.len() {
            return Err(RoutingError::BadResponse(format!(
                "expected {} rows, got {}",
                chunk.origins.len(),
                part.len()
            )));
        }
        for (row, cells) in chunk.origins.clone().zip(part) {
            if cells.len() != chunk.destinations.len() {
                return Err(RoutingError::BadResponse(format!(
                    "expected {} columns, got {}",
                    chunk.destinations.len(),
                    cells.len()
                )));
            }
            for (col, cell) in chunk.destinations.clone().zip(cells) {
                matrix[row][col] = cell;
            }
        }
    }

    debug!(
        origins = origins.len(),
        destinations = destinations.len(),
        requests = chunks.len(),
        "walking matrix routed"
    );
    Ok(matrix)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Base URL of an OSRM-compatible server, e.g. `http://localhost:5000/`
    pub base_url: String,

    pub profile: String,

    pub timeout_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/".to_string(),
            profile: "foot".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Client for the OSRM `table` service
pub struct OsrmRouter {
    client: Client,
    base_url: Url,
    profile: String,
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f64>>>>,
    #[serde(default)]
    durations: Option<Vec<Vec<Option<f64>>>>,
}

impl OsrmRouter {
    pub fn new(config: &RoutingConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid routing base_url {}", config.base_url))?;
        let client = Client::builder()
            .user_agent(concat!("placemark/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to create routing HTTP client")?;

        Ok(Self {
            client,
            base_url,
            profile: config.profile.clone(),
        })
    }

    fn table_url(&self, origins: &[GeoPoint], destinations: &[GeoPoint]) -> Result<Url, RoutingError> {
        let coords = origins
            .iter()
            .chain(destinations)
            .map(|p| format!("{:.6},{:.6}", p.lon, p.lat))
            .collect::<Vec<_>>()
            .join(";");

        let sources = (0..origins.len()).map(|i| i.to_string()).collect::<Vec<_>>().join(";");
        let targets = (origins.len()..origins.len() + destinations.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RoutingError::InvalidInput(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["table", "v1", self.profile.as_str(), coords.as_str()]);
        url.set_query(Some(&format!(
            "sources={sources}&destinations={targets}&annotations=distance,duration"
        )));
        Ok(url)
    }
}

fn parse_table(response: TableResponse, rows: usize, cols: usize) -> Result<Matrix, RoutingError> {
    if response.code != "Ok" {
        return Err(RoutingError::BadResponse(format!(
            "{}: {}",
            response.code,
            response.message.unwrap_or_default()
        )));
    }

    let distances = response
        .distances
        .ok_or_else(|| RoutingError::BadResponse("missing distances".to_string()))?;
    let durations = response
        .durations
        .ok_or_else(|| RoutingError::BadResponse("missing durations".to_string()))?;

    if distances.len() != rows || durations.len() != rows {
        return Err(RoutingError::BadResponse(format!("expected {rows} rows")));
    }

    distances
        .into_iter()
        .zip(durations)
        .map(|(dist_row, dur_row)| {
            if dist_row.len() != cols || dur_row.len() != cols {
                return Err(RoutingError::BadResponse(format!("expected {cols} columns")));
            }
            Ok(dist_row
                .into_iter()
                .zip(dur_row)
                .map(|cell| match cell {
                    (Some(distance_m), Some(duration_s)) => Some(WalkLeg { distance_m, duration_s }),
                    _ => None,
                })
                .collect())
        })
        .collect()
}

#[async_trait]
impl WalkingRouter for OsrmRouter {
    async fn matrix(&self, origins: &[GeoPoint], destinations: &[GeoPoint]) -> Result<Matrix, RoutingError> {
        if origins.is_empty() || destinations.is_empty() {
            return Err(RoutingError::InvalidInput(
                "origins and destinations must both be non-empty".to_string(),
            ));
        }
        let count = origins.len() + destinations.len();
        if count > MAX_MATRIX_POINTS {
            return Err(RoutingError::TooManyPoints {
                count,
                max: MAX_MATRIX_POINTS,
            });
        }

        let url = self.table_url(origins, destinations)?;
        let response: TableResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_table(response, origins.len(), destinations.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Walks in straight lines at 1.25 m/s and counts requests
    #[derive(Default)]
    pub(crate) struct StraightLineRouter {
        pub(crate) calls: AtomicUsize,
    }

    #[async_trait]
    impl WalkingRouter for StraightLineRouter {
        async fn matrix(&self, origins: &[GeoPoint], destinations: &[GeoPoint]) -> Result<Matrix, RoutingError> {
            assert!(origins.len() + destinations.len() <= MAX_MATRIX_POINTS);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(origins
                .iter()
                .map(|o| {
                    destinations
                        .iter()
                        .map(|d| {
                            let distance_m = o.distance_m(d);
                            Some(WalkLeg {
                                distance_m,
                                duration_s: distance_m / 1.25,
                            })
                        })
                        .collect()
                })
                .collect())
        }
    }

    #[test]
    fn test_partition_respects_ceiling() {
        for (origins, destinations) in [(1, 20), (1, 40), (30, 30), (3, 100), (24, 1)] {
            let chunks = partition(origins, destinations, MAX_MATRIX_POINTS).unwrap();
            let mut covered = 0;
            for chunk in &chunks {
                assert!(chunk.origins.len() + chunk.destinations.len() <= MAX_MATRIX_POINTS);
                covered += chunk.origins.len() * chunk.destinations.len();
            }
            assert_eq!(covered, origins * destinations, "{origins}x{destinations}");
        }

        assert_eq!(partition(1, 20, MAX_MATRIX_POINTS).unwrap().len(), 1);
        assert_eq!(partition(1, 40, MAX_MATRIX_POINTS).unwrap().len(), 2);
    }

    #[test]
    fn test_partition_rejects_empty_sets() {
        assert!(matches!(
            partition(0, 5, MAX_MATRIX_POINTS),
            Err(RoutingError::InvalidInput(_))
        ));
        assert!(matches!(
            partition(5, 0, MAX_MATRIX_POINTS),
            Err(RoutingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_route_matrix_stitches_chunks() {
        let router = StraightLineRouter::default();
        let origin = GeoPoint::new(41.3870, 2.1701);
        let destinations: Vec<GeoPoint> = (0..40)
            .map(|i| GeoPoint::new(41.3870 + 0.0001 * i as f64, 2.1701))
            .collect();

        let matrix = route_matrix(&router, &[origin], &destinations).await.unwrap();
        assert_eq!(router.calls.load(Ordering::SeqCst), 2);
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0].len(), 40);

        let last = matrix[0][39].unwrap();
        assert!((last.distance_m - origin.distance_m(&destinations[39])).abs() < 1e-6);
    }

    #[test]
    fn test_table_url() {
        let router = OsrmRouter::new(&RoutingConfig {
            base_url: "http://osrm.local:5000/".to_string(),
            ..RoutingConfig::default()
        })
        .unwrap();

        let url = router
            .table_url(
                &[GeoPoint::new(41.387, 2.1701)],
                &[GeoPoint::new(41.3859, 2.164), GeoPoint::new(41.3866, 2.1707)],
            )
            .unwrap();

        assert_eq!(
            url.as_str(),
            "http://osrm.local:5000/table/v1/foot/2.170100,41.387000;2.164000,41.385900;2.170700,41.386600\
             ?sources=0&destinations=1;2&annotations=distance,duration"
        );
    }

    #[test]
    fn test_parse_table_response() {
        let body = r#"{
            "code": "Ok",
            "distances": [[512.3, null]],
            "durations": [[410.0, null]]
        }"#;
        let response: TableResponse = serde_json::from_str(body).unwrap();
        let matrix = parse_table(response, 1, 2).unwrap();

        assert_eq!(
            matrix[0][0],
            Some(WalkLeg {
                distance_m: 512.3,
                duration_s: 410.0
            })
        );
        assert_eq!(matrix[0][1], None);

        let error: TableResponse =
            serde_json::from_str(r#"{"code": "InvalidQuery", "message": "bad coords"}"#).unwrap();
        assert!(matches!(parse_table(error, 1, 1), Err(RoutingError::BadResponse(_))));
    }

    #[tokio::test]
    async fn test_osrm_rejects_oversized_requests() {
        let router = OsrmRouter::new(&RoutingConfig::default()).unwrap();
        let points = vec![GeoPoint::new(41.0, 2.0); 20];

        let err = router.matrix(&points[..6], &points).await.unwrap_err();
        assert!(matches!(err, RoutingError::TooManyPoints { count: 26, max: 25 }));

        let err = router.matrix(&[], &points).await.unwrap_err();
        assert!(matches!(err, RoutingError::InvalidInput(_)));
    }
}

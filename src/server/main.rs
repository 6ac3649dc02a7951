//! HTTP API over the enrichment pipeline.
//!
//! Synchronous batch enrichment plus the reverse admin lookup and nearest
//! transit queries the pipeline is built from.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use placemark::enrich::{BatchResult, LocationInput};
use placemark::{AdminLevel, Config, EnrichedLocation, GeoPoint, NearestStop, Pipeline};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Location enrichment HTTP server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    listen: String,

    /// TOML configuration file
    #[arg(short, long, default_value = "placemark.toml")]
    config: PathBuf,
}

/// Application state shared across handlers
struct AppState {
    pipeline: Pipeline,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str())))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Placemark Server");
    let config = Config::load_from_file(&args.config)?;
    let pipeline = Pipeline::load(&config)?;

    let state = Arc::new(AppState { pipeline });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/enrich", post(enrich_handler))
        .route("/v1/reverse", get(reverse_handler))
        .route("/v1/transit/nearest", get(nearest_transit_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server on {}", args.listen);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let gateway = &state.pipeline.gateway;
    Json(HealthResponse {
        status: "ok",
        boundaries: gateway.boundary_count(),
        stops: gateway.stop_count(),
        lines: gateway.line_count(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    boundaries: usize,
    stops: usize,
    lines: usize,
}

#[derive(Deserialize)]
struct EnrichRequest {
    items: Vec<LocationInput>,
}

/// Synchronous batch enrichment
async fn enrich_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnrichRequest>,
) -> Result<Json<BatchResult>, (StatusCode, String)> {
    state
        .pipeline
        .orchestrator
        .enrich_batch(request.items)
        .await
        .map(Json)
        .map_err(|e| {
            error!("Batch enrichment failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })
}

fn validated_point(lat: f64, lon: f64) -> Result<GeoPoint, (StatusCode, String)> {
    let point = GeoPoint::new(lat, lon);
    if point.is_valid() {
        Ok(point)
    } else {
        Err((StatusCode::BAD_REQUEST, format!("invalid coordinates ({lat}, {lon})")))
    }
}

#[derive(Deserialize)]
struct ReverseQueryParams {
    #[serde(rename = "point.lat")]
    point_lat: f64,
    #[serde(rename = "point.lon")]
    point_lon: f64,
    /// Preferred language for names
    lang: Option<String>,
}

/// Administrative hierarchy at a point
async fn reverse_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReverseQueryParams>,
) -> Result<Json<EnrichedLocation>, (StatusCode, String)> {
    let point = validated_point(params.point_lat, params.point_lon)?;

    let location = state
        .pipeline
        .orchestrator
        .resolver()
        .resolve_one(point)
        .await
        .map_err(|e| {
            error!("Reverse lookup failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "no boundary contains this point".to_string()))?;

    Ok(Json(localize(location, params.lang.as_deref())))
}

/// Replace each level's display name with the preferred language when available
fn localize(mut location: EnrichedLocation, lang: Option<&str>) -> EnrichedLocation {
    if lang.is_none() {
        return location;
    }
    for level in AdminLevel::all() {
        if let Some(info) = location.get(*level) {
            let mut info = info.clone();
            info.name = info.localized(lang).to_string();
            location.set(*level, info);
        }
    }
    location
}

#[derive(Deserialize)]
struct NearestQueryParams {
    #[serde(rename = "point.lat")]
    point_lat: f64,
    #[serde(rename = "point.lon")]
    point_lon: f64,
    /// Search radius in meters
    radius: Option<f64>,
    /// Number of stops
    limit: Option<usize>,
}

#[derive(Serialize)]
struct NearestResponse {
    stops: Vec<NearestStop>,
}

/// Priority-ranked nearest transit stops
async fn nearest_transit_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearestQueryParams>,
) -> Result<Json<NearestResponse>, (StatusCode, String)> {
    let point = validated_point(params.point_lat, params.point_lon)?;
    let matcher = state.pipeline.orchestrator.matcher();

    let stops = matcher
        .nearest_one(
            point,
            params.radius.unwrap_or(matcher.config().default_radius_m),
            params.limit.unwrap_or(matcher.config().default_limit),
        )
        .await
        .map_err(|e| {
            error!("Nearest transit lookup failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })?;

    Ok(Json(NearestResponse { stops }))
}

//! Load gateway data from GeoJSON FeatureCollections.
//!
//! Properties follow OSM tag conventions (`name`, `name:<lang>`,
//! `admin_level`, `ref`, `colour`, `route`, ...), which is what OSM exports
//! such as osmium or overpass produce.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use geo::{MultiLineString, MultiPolygon};
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, JsonObject};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::index::LineFeature;
use super::memory::RTreeGateway;
use crate::models::{AdminBoundary, AdminLevel, GeoPoint, TransitLine, TransitMode, TransitStop};

/// Read a FeatureCollection, transparently un-gzipping `.gz` files
pub fn read_collection(path: &Path) -> Result<FeatureCollection> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {}", path.display()))?;
    let mut reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let geojson: GeoJson = content
        .parse()
        .with_context(|| format!("Invalid GeoJSON in {}", path.display()))?;
    FeatureCollection::try_from(geojson)
        .with_context(|| format!("{} is not a FeatureCollection", path.display()))
}

/// Build the in-process gateway from three GeoJSON files
pub fn load_gateway(boundaries: &Path, stops: &Path, lines: &Path) -> Result<RTreeGateway> {
    info!("Loading boundaries from {}", boundaries.display());
    let boundaries = extract_boundaries(read_collection(boundaries)?);

    info!("Loading stops from {}", stops.display());
    let stops = extract_stops(read_collection(stops)?);

    info!("Loading lines from {}", lines.display());
    let lines = extract_lines(read_collection(lines)?);

    Ok(RTreeGateway::new(boundaries, stops, lines))
}

/// Extract admin boundaries; features without a usable level, name or polygon are skipped
pub fn extract_boundaries(collection: FeatureCollection) -> Vec<AdminBoundary> {
    let mut boundaries = Vec::new();

    for feature in collection.features {
        let props = feature.properties.clone().unwrap_or_default();

        let Some(level) = prop_u64(&props, "admin_level")
            .and_then(|l| u8::try_from(l).ok())
            .and_then(AdminLevel::from_osm_level)
        else {
            continue;
        };

        let Some(id) = numeric_id(&feature, &props) else {
            debug!("Skipping admin boundary without numeric id");
            continue;
        };

        let names = collect_names(&props);
        // Skip if no name
        if names.is_empty() {
            continue;
        }

        let Some(geometry) = polygon_geometry(feature) else {
            debug!("Could not resolve geometry for admin boundary {}", id);
            continue;
        };

        boundaries.push(AdminBoundary {
            id,
            level,
            names,
            population: prop_u64(&props, "population"),
            area_km2: prop_f64(&props, "area"),
            geometry,
        });
    }

    info!("Found {} admin boundaries", boundaries.len());

    // Sort by admin level (country first)
    boundaries.sort_by(|a, b| a.level.cmp(&b.level));
    boundaries
}

/// Extract transit stops from point features
pub fn extract_stops(collection: FeatureCollection) -> Vec<TransitStop> {
    let mut stops = Vec::new();

    for feature in collection.features {
        let props = feature.properties.clone().unwrap_or_default();
        let Some(id) = string_id(&feature, &props) else {
            continue;
        };
        let mode = stop_mode(&props);

        let location = match feature
            .geometry
            .map(|g| geo_types::Geometry::<f64>::try_from(g))
        {
            Some(Ok(geo_types::Geometry::Point(p))) => GeoPoint::new(p.y(), p.x()),
            _ => {
                debug!("Stop {} has no point geometry", id);
                continue;
            }
        };

        stops.push(TransitStop::new(id, collect_names(&props), mode, location));
    }

    info!("Found {} transit stops", stops.len());
    stops
}

/// Extract transit line geometries
pub fn extract_lines(collection: FeatureCollection) -> Vec<LineFeature> {
    let mut lines = Vec::new();

    for feature in collection.features {
        let props = feature.properties.clone().unwrap_or_default();
        let Some(id) = string_id(&feature, &props) else {
            continue;
        };

        let geometry = match feature
            .geometry
            .map(|g| geo_types::Geometry::<f64>::try_from(g))
        {
            Some(Ok(geo_types::Geometry::LineString(ls))) => MultiLineString::new(vec![ls]),
            Some(Ok(geo_types::Geometry::MultiLineString(mls))) => mls,
            _ => {
                debug!("Line {} has no linear geometry", id);
                continue;
            }
        };

        let mode = prop_str(&props, "route")
            .or_else(|| prop_str(&props, "mode"))
            .map(TransitMode::parse)
            .unwrap_or(TransitMode::Other);

        let line = TransitLine {
            id,
            reference: prop_str(&props, "ref").map(str::to_string),
            name: prop_str(&props, "name").unwrap_or_default().to_string(),
            color: prop_str(&props, "colour")
                .or_else(|| prop_str(&props, "color"))
                .map(str::to_string),
            mode,
        };

        lines.push(LineFeature {
            line: Arc::new(line),
            geometry,
        });
    }

    info!("Found {} transit lines", lines.len());
    lines
}

/// Explicit `mode` wins; otherwise infer from OSM public transport tags
fn stop_mode(props: &JsonObject) -> TransitMode {
    if let Some(mode) = prop_str(props, "mode") {
        return TransitMode::parse(mode);
    }

    let station = prop_str(props, "station");
    match prop_str(props, "railway") {
        Some("subway_entrance") => return TransitMode::Metro,
        Some("station") | Some("halt") if matches!(station, Some("subway") | Some("light_rail")) => {
            return TransitMode::Metro
        }
        Some("station") | Some("halt") => return TransitMode::Train,
        Some("tram_stop") => return TransitMode::Tram,
        _ => {}
    }

    if prop_str(props, "highway") == Some("bus_stop") {
        return TransitMode::Bus;
    }
    if prop_str(props, "amenity") == Some("ferry_terminal") {
        return TransitMode::Ferry;
    }
    TransitMode::Other
}

/// `name` → "default", `name:<lang>` → lang
fn collect_names(props: &JsonObject) -> HashMap<String, String> {
    let mut names = HashMap::new();
    for (key, value) in props {
        let Some(value) = value.as_str() else {
            continue;
        };
        if key == "name" {
            names.insert("default".to_string(), value.to_string());
        } else if let Some(lang) = key.strip_prefix("name:") {
            names.insert(lang.to_string(), value.to_string());
        }
    }
    names
}

fn polygon_geometry(feature: Feature) -> Option<MultiPolygon<f64>> {
    let geometry = geo_types::Geometry::<f64>::try_from(feature.geometry?).ok()?;
    match geometry {
        geo_types::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        geo_types::Geometry::MultiPolygon(mp) => Some(mp),
        _ => None,
    }
}

fn numeric_id(feature: &Feature, props: &JsonObject) -> Option<i64> {
    match &feature.id {
        Some(Id::Number(n)) => n.as_i64(),
        Some(Id::String(s)) => parse_osm_id(s),
        None => prop_str(props, "osm_id")
            .and_then(parse_osm_id)
            .or_else(|| props.get("osm_id").and_then(Value::as_i64))
            .or_else(|| props.get("id").and_then(Value::as_i64)),
    }
}

/// Accepts "123" and "relation/123"
fn parse_osm_id(value: &str) -> Option<i64> {
    value.rsplit('/').next()?.parse().ok()
}

fn string_id(feature: &Feature, props: &JsonObject) -> Option<String> {
    match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => props.get("id").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
    }
}

fn prop_str<'a>(props: &'a JsonObject, key: &str) -> Option<&'a str> {
    props.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Numbers may arrive as JSON numbers or as OSM tag strings
fn prop_u64(props: &JsonObject, key: &str) -> Option<u64> {
    match props.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn prop_f64(props: &JsonObject, key: &str) -> Option<f64> {
    match props.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

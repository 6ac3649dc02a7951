//! R-tree indexes for boundaries, stops and line geometries.

use geo::{Contains, MultiLineString, Point};
use rstar::primitives::Line;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::sync::Arc;
use tracing::info;

use super::query::{Envelope, PlanTarget, METERS_PER_DEGREE};
use crate::models::{AdminBoundary, GeoPoint, TransitLine, TransitMode, TransitStop};

/// Wrapper for R-tree indexing of any plan target
pub struct IndexedFeature<T> {
    pub item: Arc<T>,
    envelope: AABB<[f64; 2]>,
}

impl<T> Clone for IndexedFeature<T> {
    fn clone(&self) -> Self {
        Self {
            item: Arc::clone(&self.item),
            envelope: self.envelope,
        }
    }
}

impl<T> RTreeObject for IndexedFeature<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl<T: PlanTarget> IndexedFeature<T> {
    pub fn new(item: T) -> Option<Self> {
        let env = item.envelope()?;
        Some(Self {
            item: Arc::new(item),
            envelope: AABB::from_corners([env.min_lon, env.min_lat], [env.max_lon, env.max_lat]),
        })
    }
}

/// Spatial index over one feature layer
pub struct FeatureIndex<T> {
    tree: RTree<IndexedFeature<T>>,
}

impl<T: PlanTarget> FeatureIndex<T> {
    /// Build spatial index; features without geometry are dropped
    pub fn build(features: Vec<T>, label: &str) -> Self {
        let total = features.len();
        let indexed: Vec<IndexedFeature<T>> = features
            .into_iter()
            .filter_map(IndexedFeature::new)
            .collect();

        let tree = RTree::bulk_load(indexed);
        info!(
            "{} index built with {} entries ({} without geometry skipped)",
            label,
            tree.size(),
            total - tree.size()
        );

        Self { tree }
    }

    /// Features whose envelope intersects the query envelope. Envelopes
    /// crossing the antimeridian are split and scanned on both sides.
    pub fn candidates<'a>(
        &'a self,
        envelope: &Envelope,
    ) -> impl Iterator<Item = &'a Arc<T>> + 'a {
        let parts = envelope.split_antimeridian();
        let mut hits: Vec<&'a Arc<T>> = Vec::new();

        for part in &parts {
            let query =
                AABB::from_corners([part.min_lon, part.min_lat], [part.max_lon, part.max_lat]);
            for feature in self.tree.locate_in_envelope_intersecting(&query) {
                // A feature spanning both halves must be reported once
                if parts.len() == 1
                    || !hits.iter().any(|hit| Arc::ptr_eq(hit, &feature.item))
                {
                    hits.push(&feature.item);
                }
            }
        }

        hits.into_iter()
    }

    /// Get total number of indexed features
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Iterate over all indexed features
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.tree.iter().map(|f| &f.item)
    }
}

impl PlanTarget for AdminBoundary {
    fn envelope(&self) -> Option<Envelope> {
        let (min_x, min_y, max_x, max_y) = self.bbox()?;
        Some(Envelope::new(min_x, min_y, max_x, max_y))
    }

    fn contains(&self, point: &GeoPoint) -> bool {
        self.geometry.contains(&Point::new(point.lon, point.lat))
    }

    /// Zero inside the polygon; polygons are never "near" a point.
    fn distance_m(&self, origin: &GeoPoint) -> f64 {
        if self.contains(origin) {
            0.0
        } else {
            f64::INFINITY
        }
    }

    fn size(&self) -> f64 {
        self.size_hint()
    }
}

impl PlanTarget for TransitStop {
    fn envelope(&self) -> Option<Envelope> {
        self.location.is_valid().then(|| Envelope::point(self.location))
    }

    fn contains(&self, _point: &GeoPoint) -> bool {
        false
    }

    fn distance_m(&self, origin: &GeoPoint) -> f64 {
        origin.distance_m(&self.location)
    }

    fn mode(&self) -> Option<TransitMode> {
        Some(self.mode)
    }
}

/// A transit line with the geometry it is matched against
#[derive(Debug, Clone)]
pub struct LineFeature {
    pub line: Arc<TransitLine>,
    pub geometry: MultiLineString<f64>,
}

impl PlanTarget for LineFeature {
    fn envelope(&self) -> Option<Envelope> {
        use geo::BoundingRect;
        self.geometry
            .bounding_rect()
            .map(|rect| Envelope::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    fn contains(&self, _point: &GeoPoint) -> bool {
        false
    }

    /// Closest approach of any segment, measured in a local equirectangular
    /// projection centered on the origin. Accurate to well under a meter at
    /// the few-hundred-meter scale used for stop/line association.
    fn distance_m(&self, origin: &GeoPoint) -> f64 {
        let cos_lat = origin.lat.to_radians().cos();
        let project = |lon: f64, lat: f64| -> [f64; 2] {
            // Shortest way round, so segments across the antimeridian stay close
            let dlon = (lon - origin.lon + 540.0).rem_euclid(360.0) - 180.0;
            [
                dlon * METERS_PER_DEGREE * cos_lat,
                (lat - origin.lat) * METERS_PER_DEGREE,
            ]
        };

        let mut best = f64::INFINITY;
        for line_string in &self.geometry.0 {
            if line_string.0.len() == 1 {
                let c = line_string.0[0];
                let p = project(c.x, c.y);
                best = best.min((p[0] * p[0] + p[1] * p[1]).sqrt());
                continue;
            }
            for segment in line_string.lines() {
                let from = project(segment.start.x, segment.start.y);
                let to = project(segment.end.x, segment.end.y);
                let d2 = Line::new(from, to).distance_2(&[0.0, 0.0]);
                best = best.min(d2.sqrt());
            }
        }
        best
    }

    fn mode(&self) -> Option<TransitMode> {
        Some(self.line.mode)
    }
}

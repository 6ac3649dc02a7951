//! Typed spatial query plans.
//!
//! A plan is a predicate tree (envelope pre-filter, exact geometry tests,
//! attribute filters) plus ordering and limit. Plans say nothing about how
//! they are executed, so the same plan can run against the in-process R-tree
//! gateway or be translated for a remote spatial database.

use crate::models::{GeoPoint, TransitMode};

/// Meters per degree of latitude (and of longitude at the equator)
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Which feature collection a plan targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Boundaries,
    Stops,
    Lines,
}

/// Axis-aligned lon/lat rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Envelope {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Degenerate envelope covering a single point
    pub fn point(point: GeoPoint) -> Self {
        Self::new(point.lon, point.lat, point.lon, point.lat)
    }

    /// Square expansion of `degrees` on each side of the point
    pub fn around(point: GeoPoint, degrees: f64) -> Self {
        Self::new(
            point.lon - degrees,
            point.lat - degrees,
            point.lon + degrees,
            point.lat + degrees,
        )
    }

    /// Expansion covering every location within `meters` of the point.
    ///
    /// Longitude span widens with latitude; near the poles it covers the
    /// whole longitude range.
    pub fn around_meters(point: GeoPoint, meters: f64) -> Self {
        let dlat = meters / METERS_PER_DEGREE;
        let cos_lat = point.lat.to_radians().cos();
        let dlon = if cos_lat < 1e-6 {
            180.0
        } else {
            (meters / (METERS_PER_DEGREE * cos_lat)).min(180.0)
        };
        Self::new(
            point.lon - dlon,
            point.lat - dlat,
            point.lon + dlon,
            point.lat + dlat,
        )
    }

    /// Parts within [-180, 180] longitude covering this envelope: one, or two
    /// when it crosses the antimeridian
    pub fn split_antimeridian(&self) -> Vec<Envelope> {
        if self.max_lon - self.min_lon >= 360.0 {
            vec![Envelope::new(-180.0, self.min_lat, 180.0, self.max_lat)]
        } else if self.min_lon < -180.0 {
            vec![
                Envelope::new(self.min_lon + 360.0, self.min_lat, 180.0, self.max_lat),
                Envelope::new(-180.0, self.min_lat, self.max_lon, self.max_lat),
            ]
        } else if self.max_lon > 180.0 {
            vec![
                Envelope::new(self.min_lon, self.min_lat, 180.0, self.max_lat),
                Envelope::new(-180.0, self.min_lat, self.max_lon - 360.0, self.max_lat),
            ]
        } else {
            vec![*self]
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lon >= self.min_lon
            && point.lon <= self.max_lon
            && point.lat >= self.min_lat
            && point.lat <= self.max_lat
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// Overlap of two envelopes, `None` when they are disjoint
    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        if !self.intersects(other) {
            return None;
        }
        Some(Envelope::new(
            self.min_lon.max(other.min_lon),
            self.min_lat.max(other.min_lat),
            self.max_lon.min(other.max_lon),
            self.max_lat.min(other.max_lat),
        ))
    }
}

/// Predicate tree evaluated per candidate feature
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// All children must hold
    And(Vec<Predicate>),
    /// Feature envelope intersects the rectangle (cheap pre-filter)
    EnvelopeIntersects(Envelope),
    /// Feature geometry contains the point (exact)
    ContainsPoint(GeoPoint),
    /// Feature geometry lies within `meters` of the origin (exact)
    WithinMeters { origin: GeoPoint, meters: f64 },
    /// Feature mode is one of the listed modes
    ModeIn(Vec<TransitMode>),
}

impl Predicate {
    /// Envelope every matching feature must intersect, if the tree bounds one.
    pub fn bounding_envelope(&self) -> Option<Envelope> {
        match self {
            Predicate::EnvelopeIntersects(envelope) => Some(*envelope),
            Predicate::ContainsPoint(point) => Some(Envelope::point(*point)),
            Predicate::WithinMeters { origin, meters } => {
                Some(Envelope::around_meters(*origin, *meters))
            }
            Predicate::ModeIn(_) => None,
            Predicate::And(children) => {
                let mut bound: Option<Envelope> = None;
                for child in children {
                    if let Some(child_bound) = child.bounding_envelope() {
                        bound = Some(match bound {
                            None => child_bound,
                            // Disjoint bounds can never match; keep a degenerate
                            // envelope so the caller still has a finite scan.
                            Some(current) => current
                                .intersection(&child_bound)
                                .unwrap_or_else(|| Envelope::point(GeoPoint::new(
                                    current.min_lat,
                                    current.min_lon,
                                ))),
                        });
                    }
                }
                bound
            }
        }
    }

    /// Evaluate against a feature
    pub fn matches<T: PlanTarget + ?Sized>(&self, feature: &T) -> bool {
        match self {
            Predicate::And(children) => children.iter().all(|c| c.matches(feature)),
            Predicate::EnvelopeIntersects(envelope) => feature
                .envelope()
                .is_some_and(|own| own.intersects(envelope)),
            Predicate::ContainsPoint(point) => feature.contains(point),
            Predicate::WithinMeters { origin, meters } => feature.distance_m(origin) <= *meters,
            Predicate::ModeIn(modes) => feature
                .mode()
                .map(|mode| modes.contains(&mode))
                .unwrap_or(false),
        }
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Order {
    Unordered,
    /// Ascending distance from the point
    NearestTo(GeoPoint),
    /// Ascending feature size (most specific polygon first)
    SmallestFirst,
}

/// Something a plan can be evaluated against
pub trait PlanTarget {
    /// `None` for features without geometry
    fn envelope(&self) -> Option<Envelope>;

    /// Exact containment; features without area never contain a point
    fn contains(&self, point: &GeoPoint) -> bool;

    /// Distance in meters from the origin to the nearest part of the feature
    fn distance_m(&self, origin: &GeoPoint) -> f64;

    fn mode(&self) -> Option<TransitMode> {
        None
    }

    fn size(&self) -> f64 {
        0.0
    }
}

/// Engine-independent description of one spatial query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub layer: Layer,
    pub predicate: Predicate,
    pub order: Order,
    pub limit: Option<usize>,
}

impl QueryPlan {
    pub fn builder(layer: Layer) -> QueryBuilder {
        QueryBuilder {
            layer,
            predicates: Vec::new(),
            order: Order::Unordered,
            limit: None,
        }
    }

    /// Boundaries containing the point, pre-filtered by a square expansion.
    /// The expansion is advisory: [`Predicate::bounding_envelope`] narrows it
    /// to the point once containment is part of the tree.
    pub fn containing(point: GeoPoint, expand_degrees: f64) -> Self {
        QueryPlan::builder(Layer::Boundaries)
            .envelope(Envelope::around(point, expand_degrees))
            .contains(point)
            .order_by(Order::SmallestFirst)
            .build()
    }

    /// Stops of the given modes within the radius, nearest first.
    /// Without a limit every stop in the radius is returned.
    pub fn nearest_stops(
        point: GeoPoint,
        radius_m: f64,
        limit: Option<usize>,
        modes: &[TransitMode],
    ) -> Self {
        let builder = QueryPlan::builder(Layer::Stops)
            .within(point, radius_m)
            .modes(modes)
            .order_by(Order::NearestTo(point));
        match limit {
            Some(limit) => builder.limit(limit).build(),
            None => builder.build(),
        }
    }

    /// Lines of the given modes passing within the threshold of the point
    pub fn lines_near(point: GeoPoint, threshold_m: f64, modes: &[TransitMode]) -> Self {
        QueryPlan::builder(Layer::Lines)
            .within(point, threshold_m)
            .modes(modes)
            .order_by(Order::NearestTo(point))
            .build()
    }
}

/// Incremental plan construction
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    layer: Layer,
    predicates: Vec<Predicate>,
    order: Order,
    limit: Option<usize>,
}

impl QueryBuilder {
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn envelope(self, envelope: Envelope) -> Self {
        self.filter(Predicate::EnvelopeIntersects(envelope))
    }

    pub fn contains(self, point: GeoPoint) -> Self {
        self.filter(Predicate::ContainsPoint(point))
    }

    pub fn within(self, origin: GeoPoint, meters: f64) -> Self {
        self.filter(Predicate::WithinMeters { origin, meters })
    }

    pub fn modes(self, modes: &[TransitMode]) -> Self {
        if modes.is_empty() {
            return self;
        }
        self.filter(Predicate::ModeIn(modes.to_vec()))
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(mut self) -> QueryPlan {
        let predicate = if self.predicates.len() == 1 {
            self.predicates.remove(0)
        } else {
            Predicate::And(self.predicates)
        };

        QueryPlan {
            layer: self.layer,
            predicate,
            order: self.order,
            limit: self.limit,
        }
    }
}

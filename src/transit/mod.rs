//! Priority-tiered nearest transit matching.
//!
//! Stops are split into tiers by mode (metro/train before tram/bus), collapsed
//! per station name within a tier, and filled tier by tier up to the limit.
//! Selected stops are annotated with the lines passing close by.

mod dedup;
mod matcher;

use serde::{Deserialize, Serialize};

pub use dedup::{dedup_lines, dedup_nearest};
pub use matcher::TransitMatcher;

/// Radius used when the caller passes a non-positive or non-finite one
pub const DEFAULT_RADIUS_METERS: f64 = 1500.0;

/// Upper bound on stops returned per point
pub const MAX_STOPS_PER_POINT: usize = 20;

/// A line serves a stop when its geometry passes this close to it
pub const LINE_PROXIMITY_METERS: f64 = 100.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub default_radius_m: f64,

    /// Stops per point requested by the enrichment pipeline
    pub default_limit: usize,

    pub max_limit: usize,

    pub line_proximity_m: f64,

    /// Fill with ferry/other stops after tram/bus
    pub include_fallback_modes: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            default_radius_m: DEFAULT_RADIUS_METERS,
            default_limit: 5,
            max_limit: MAX_STOPS_PER_POINT,
            line_proximity_m: LINE_PROXIMITY_METERS,
            include_fallback_modes: false,
        }
    }
}

impl MatcherConfig {
    pub fn effective_radius(&self, radius_m: f64) -> f64 {
        if radius_m.is_finite() && radius_m > 0.0 {
            radius_m
        } else {
            self.default_radius_m
        }
    }

    pub fn effective_limit(&self, limit: usize) -> usize {
        if limit == 0 || limit > self.max_limit {
            self.max_limit
        } else {
            limit
        }
    }

    /// Tiers that take part in the fill, in priority order
    pub fn tiers(&self) -> &'static [u8] {
        if self.include_fallback_modes {
            &[1, 2, 3]
        } else {
            &[1, 2]
        }
    }
}

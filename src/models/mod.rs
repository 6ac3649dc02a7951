//! Core data models for the enrichment pipeline.

pub mod admin;
pub mod location;
pub mod normalize;
pub mod transit;

pub use admin::{AdminBoundary, AdminLevel, BoundaryInfo, EnrichedLocation};
pub use location::{GeoPoint, LocationEvent};
pub use normalize::normalized_key;
pub use transit::{NearestStop, TransitLine, TransitMode, TransitStop};

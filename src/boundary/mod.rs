//! Administrative boundary resolution.
//!
//! Finds every boundary polygon containing a point through the spatial
//! gateway and folds the matches into one [`EnrichedLocation`] per point.
//!
//! [`EnrichedLocation`]: crate::models::EnrichedLocation

mod resolver;

pub use resolver::{build_hierarchy, BoundaryResolver};

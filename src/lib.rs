//! Placemark - location enrichment pipeline
//!
//! Resolves the administrative hierarchy and the nearest transit stops for
//! property locations read from a stream. Shared by the worker and server
//! binaries.

pub mod app;
pub mod boundary;
pub mod config;
pub mod enrich;
pub mod gateway;
pub mod models;
pub mod stream;
pub mod transit;

pub use app::Pipeline;
pub use config::Config;
pub use models::{AdminLevel, EnrichedLocation, GeoPoint, LocationEvent, NearestStop};

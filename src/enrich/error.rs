use thiserror::Error;

use crate::gateway::GatewayError;

/// Failure of a single input; rendered into that item's error string
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItemError {
    #[error("location has no coordinates")]
    MissingCoordinates,

    #[error("invalid coordinates ({lat}, {lon})")]
    InvalidCoordinates { lat: f64, lon: f64 },
}

/// Failure of a whole enrichment call; nothing in the batch is usable
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("spatial gateway failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("{what} returned {got} results for {expected} points")]
    Misaligned {
        what: &'static str,
        got: usize,
        expected: usize,
    },
}

//! Error types for the spatial data gateway.

use thiserror::Error;

use super::query::Layer;

/// Gateway-level failures. Any of these fails the whole batch.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Backing store could not be reached.
    #[error("spatial store unavailable: {0}")]
    Unavailable(String),

    /// Plan targets a different layer than the call it was passed to.
    #[error("plan targets {actual:?} but {expected:?} was queried")]
    LayerMismatch { expected: Layer, actual: Layer },

    /// Plan has no spatial bound and would scan the whole layer.
    #[error("unbounded plan on {0:?}")]
    Unbounded(Layer),

    /// Internal error (should not happen).
    #[error("internal gateway error: {0}")]
    Internal(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

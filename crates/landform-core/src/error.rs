//! Core error types.
//!
//! User-input problems (seed parsing) live in [`crate::seed::SeedParseError`].
//! Everything here signals a pipeline invariant violation: these are bugs, not
//! input problems, and they propagate up without recovery.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("width, height, and meters_per_pixel must be positive")]
    InvalidDimensions,

    #[error("shape mismatch between companion rasters: {0}")]
    ShapeMismatch(&'static str),

    #[error("non-finite values in {0}")]
    NonFinite(&'static str),

    #[error("flow field invariant violated: {0}")]
    FlowInvariant(String),

    #[error("uphill river routing detected after lake handling")]
    UphillRiver,
}

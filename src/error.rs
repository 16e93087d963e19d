//! Error taxonomy shared by the surface, pricing and calibration layers.
//!
//! Public functions return `anyhow::Result`; the failures that callers are
//! expected to branch on are raised as [`SurfaceError`] values and can be
//! recovered with `err.downcast_ref::<SurfaceError>()`.

use thiserror::Error;

/// Classified failure raised by the library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    /// Caller supplied an argument that can never succeed
    /// (missing pricing model, unknown model name, empty grid, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required market observation is absent from the backing store.
    #[error("{what} not found for {key}")]
    NotFound {
        /// Kind of observation (price, future, discount curve, ...)
        what: &'static str,
        /// Lookup key rendered for diagnostics
        key: String,
    },

    /// Options requested for a surface are not present in the data.
    #[error("options could not be found: missing {missing:?}")]
    MissingOptions {
        /// Identifiers of the options (or expiries) that were not found
        missing: Vec<String>,
    },

    /// A numerical routine produced a degenerate result.
    #[error("numerical failure: {0}")]
    Numerical(String),
}

impl SurfaceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn not_found(what: &'static str, key: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what,
            key: key.to_string(),
        }
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical(message.into())
    }

    /// Returns the classified error inside an `anyhow::Error`, if any.
    pub fn classify(error: &anyhow::Error) -> Option<&SurfaceError> {
        error.downcast_ref::<SurfaceError>()
    }
}

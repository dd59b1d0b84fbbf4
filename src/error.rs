//! Error types for preparation and loading.
//!
//! Errors fall into three kinds, surfaced via [`PrepareError::kind`]:
//!
//! - [`ErrorKind::Configuration`] — wiring mistakes caught at registration or
//!   preparer construction time (unknown model, non-entity model, mismatched
//!   preparer).
//! - [`ErrorKind::Lookup`] — descriptor lookups that fail at use time
//!   (unknown context model, unknown context-info key).
//! - [`ErrorKind::Usage`] — caller mistakes (asking for a model that was
//!   never registered, include trees nested past the depth guard).
//!
//! Absent options and absent descriptors for a null context are defined
//! no-ops, never errors.

use thiserror::Error;

/// Result type for preparation operations.
pub type PrepareResult<T> = Result<T, PrepareError>;

/// The broad category an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fails fast at registration or construction time.
    Configuration,
    /// Fails at use time; recoverable by the caller.
    Lookup,
    /// The caller asked for something that was never set up.
    Usage,
}

/// Errors produced while registering preparers, resolving descriptors, or
/// preparing queries.
#[derive(Debug, Error)]
pub enum PrepareError {
    /// The model name is not present in the catalog.
    #[error("unknown model `{0}`: not present in the catalog")]
    UnknownModel(String),

    /// The model exists but does not carry the entity capability.
    #[error("model `{0}` is not an entity and cannot take a preparer")]
    NotAnEntity(String),

    /// A preparer declared one model but was registered for another.
    #[error("preparer declares model `{declared}` but was registered for `{registered}`")]
    PreparerMismatch {
        /// Model the preparer was built for.
        declared: String,
        /// Model it was registered under.
        registered: String,
    },

    /// No preparer was registered for the requested model.
    #[error("no preparer registered for model `{0}`")]
    UnregisteredModel(String),

    /// A named context model has no descriptor on this preparer.
    #[error("no context info exists for `{0}`")]
    UnknownContext(String),

    /// The context model is known but the requested sub-key is not.
    #[error("no context info exists for `{context}` with key `{key}`")]
    UnknownContextInfoKey {
        /// Context model name that was looked up.
        context: String,
        /// The missing sub-key.
        key: String,
    },

    /// The include tree nested deeper than the configured guard allows.
    #[error("include tree exceeds the maximum nesting depth of {max} at namespace `{namespace}`")]
    DepthExceeded {
        /// Namespace at which the guard tripped.
        namespace: String,
        /// The configured maximum depth.
        max: usize,
    },
}

impl PrepareError {
    /// Get the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownModel(_) | Self::NotAnEntity(_) | Self::PreparerMismatch { .. } => {
                ErrorKind::Configuration
            }
            Self::UnknownContext(_) | Self::UnknownContextInfoKey { .. } => ErrorKind::Lookup,
            Self::UnregisteredModel(_) | Self::DepthExceeded { .. } => ErrorKind::Usage,
        }
    }
}

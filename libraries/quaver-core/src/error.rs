/// Core error types for Quaver
use thiserror::Error;

/// Result type alias using `EntityError`
pub type Result<T> = std::result::Result<T, EntityError>;

/// Errors raised while constructing metadata entities
///
/// These indicate data-modeling bugs upstream (e.g. inconsistent tag
/// derivation) and are never resolved automatically.
#[derive(Error, Debug)]
pub enum EntityError {
    /// Constituent entities disagree on a derived token
    #[error("entity must have exactly one token, found {found:?}")]
    TokenMismatch {
        /// The distinct tokens that were found (zero, or more than one)
        found: Vec<String>,
    },
}

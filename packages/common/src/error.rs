use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes shared by every massing crate
///
/// Callers branch on the kind rather than on concrete error variants:
/// validation and structural failures mean the batch had zero effect,
/// a desync is recovered by the sync layer, and an invariant violation
/// points at a latent bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A delta referenced a missing or invalid id
    Validation,
    /// Applying a delta would break a graph or object invariant
    Structural,
    /// Client and server hashes disagree
    Desync,
    /// An internal consistency check failed
    InvariantViolation,
}

/// Errors that can be sorted into an [`ErrorKind`]
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Errors raised by the shared id and math helpers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommonError {
    #[error("User index {0} is outside the id partition range")]
    InvalidUserIndex(u8),

    #[error("Id space exhausted for user {0}")]
    IdSpaceExhausted(u8),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl Classify for CommonError {
    fn kind(&self) -> ErrorKind {
        match self {
            CommonError::InvalidUserIndex(_) => ErrorKind::Validation,
            CommonError::IdSpaceExhausted(_) => ErrorKind::Structural,
            CommonError::Generic(_) => ErrorKind::InvariantViolation,
        }
    }
}

impl From<String> for CommonError {
    fn from(s: String) -> Self {
        CommonError::Generic(s)
    }
}

impl From<&str> for CommonError {
    fn from(s: &str) -> Self {
        CommonError::Generic(s.to_string())
    }
}

pub type CommonResult<T> = Result<T, CommonError>;

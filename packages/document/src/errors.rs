//! Error types for the document

use massing_common::{Classify, CommonError, ErrorKind, ObjectId};
use massing_graph::GraphError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Object already exists: {0}")]
    ObjectExists(ObjectId),

    #[error("Graph not found: {0}")]
    GraphNotFound(ObjectId),

    #[error("Graph already exists: {0}")]
    GraphExists(ObjectId),

    #[error("Delta for {0} does not match the current state")]
    StaleState(ObjectId),

    #[error("Invalid payload for type '{tag}': {reason}")]
    InvalidPayload { tag: String, reason: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("The root group cannot be {0}")]
    RootGroup(&'static str),

    #[error("Document hash is {actual:#010x}, expected {expected:#010x}")]
    HashMismatch { expected: u32, actual: u32 },

    #[error("Document invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Id error: {0}")]
    Id(#[from] CommonError),
}

impl Classify for DocumentError {
    fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::Graph(e) => e.kind(),
            DocumentError::Id(e) => e.kind(),

            DocumentError::ObjectNotFound(_)
            | DocumentError::GraphNotFound(_)
            | DocumentError::StaleState(_)
            | DocumentError::InvalidPayload { .. }
            | DocumentError::InvalidOperation(_)
            | DocumentError::RootGroup(_) => ErrorKind::Validation,

            DocumentError::ObjectExists(_)
            | DocumentError::GraphExists(_)
            | DocumentError::Structural(_) => ErrorKind::Structural,

            DocumentError::HashMismatch { .. } => ErrorKind::Desync,

            DocumentError::InvariantViolation(_) | DocumentError::Serialization(_) => {
                ErrorKind::InvariantViolation
            }
        }
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(e: serde_json::Error) -> Self {
        DocumentError::Serialization(e.to_string())
    }
}

pub type DocumentResult<T> = Result<T, DocumentError>;

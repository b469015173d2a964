//! Error types for the graph store

use massing_common::{Classify, CommonError, ErrorKind, ObjectId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Delta targets graph {got} but was applied to graph {expected}")]
    WrongGraph { expected: ObjectId, got: ObjectId },

    #[error("Vertex not found: {0}")]
    VertexNotFound(ObjectId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(ObjectId),

    #[error("Face not found: {0}")]
    FaceNotFound(ObjectId),

    #[error("Element not found: {0}")]
    ElementNotFound(ObjectId),

    #[error("Id already in use: {0}")]
    IdInUse(ObjectId),

    #[error("Stale delta for element {0}")]
    StaleElement(ObjectId),

    #[error("Element {0} is still referenced")]
    StillReferenced(ObjectId),

    #[error("Edge {0} connects a vertex to itself")]
    DegenerateEdge(ObjectId),

    #[error("Edge between {0} and {1} already exists")]
    DuplicateEdge(ObjectId, ObjectId),

    #[error("Face {0} has an invalid vertex loop")]
    InvalidFaceLoop(ObjectId),

    #[error("Face {0} is not planar")]
    NonPlanarFace(ObjectId),

    #[error("Face {face} cannot be contained by {containing}")]
    InvalidContainment { face: ObjectId, containing: ObjectId },

    #[error("Graph invariant violated: {0}")]
    Invariant(String),

    #[error("Id error: {0}")]
    Id(#[from] CommonError),
}

impl Classify for GraphError {
    fn kind(&self) -> ErrorKind {
        match self {
            GraphError::WrongGraph { .. }
            | GraphError::VertexNotFound(_)
            | GraphError::EdgeNotFound(_)
            | GraphError::FaceNotFound(_)
            | GraphError::ElementNotFound(_)
            | GraphError::StaleElement(_) => ErrorKind::Validation,

            GraphError::IdInUse(_)
            | GraphError::StillReferenced(_)
            | GraphError::DegenerateEdge(_)
            | GraphError::DuplicateEdge(..)
            | GraphError::InvalidFaceLoop(_)
            | GraphError::NonPlanarFace(_)
            | GraphError::InvalidContainment { .. } => ErrorKind::Structural,

            GraphError::Invariant(_) => ErrorKind::InvariantViolation,
            GraphError::Id(e) => e.kind(),
        }
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

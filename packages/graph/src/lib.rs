//! # Massing Graph
//!
//! Topological store for building massing: vertices, edges and faces with
//! their connectivity invariants, mutated only through reversible
//! [`GraphDelta`]s.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ operations: positions → GraphDelta[]        │
//! │  - vertex/edge/face addition with merging   │
//! │  - delete with propagation / face joining   │
//! │  - paste, delete→move conversion            │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ Graph::apply_delta                          │
//! │  - validate whole delta first               │
//! │  - then mutate                              │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use massing_graph::{Graph, GraphKind};
//!
//! let mut graph = Graph::new(group_id, GraphKind::Volume, 0.01);
//! let (deltas, face) = graph.deltas_for_face_addition(&mut ids, &corners, None)?;
//! for delta in &deltas {
//!     graph.apply_delta(delta)?;
//! }
//! ```

mod convert;
mod delta;
mod edge;
mod errors;
mod face;
mod graph;
mod operations;
mod record;
mod vertex;

pub use convert::convert_graph_delete_to_move;
pub use delta::{ContainmentUpdate, ElementDelta, ElementKind, GraphDelta, VertexMove};
pub use edge::Edge;
pub use errors::{GraphError, GraphResult};
pub use face::{same_loop, Face};
pub use graph::{Graph, GraphKind};
pub use operations::{DeleteMode, DeltaBuilder};
pub use record::{FaceRecord, GraphRecord};
pub use vertex::Vertex;

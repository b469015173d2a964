use massing_common::{ObjectId, Point};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: ObjectId,
    pub graph_id: ObjectId,
    pub position: Point,
    /// Connected edges, unsigned
    pub edge_ids: BTreeSet<ObjectId>,
}

impl Vertex {
    pub fn new(id: ObjectId, graph_id: ObjectId, position: Point) -> Self {
        Self {
            id,
            graph_id,
            position,
            edge_ids: BTreeSet::new(),
        }
    }

    pub fn is_isolated(&self) -> bool {
        self.edge_ids.is_empty()
    }
}

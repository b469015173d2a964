use massing_common::{ObjectId, Plane};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub id: ObjectId,
    /// Boundary loop, in winding order
    pub vertex_ids: Vec<ObjectId>,
    /// Derived from `vertex_ids`; negative when the edge runs against the loop
    pub edge_ids: Vec<ObjectId>,
    /// Derived from vertex positions
    pub plane: Plane,
    pub containing_face: Option<ObjectId>,
    pub contained_faces: BTreeSet<ObjectId>,
}

impl Face {
    pub fn has_vertex(&self, vertex_id: ObjectId) -> bool {
        self.vertex_ids.contains(&vertex_id)
    }

    pub fn has_edge(&self, edge_id: ObjectId) -> bool {
        self.edge_ids.iter().any(|id| id.abs() == edge_id)
    }

    /// Same boundary regardless of starting vertex or winding
    pub fn same_loop(&self, vertex_ids: &[ObjectId]) -> bool {
        same_loop(&self.vertex_ids, vertex_ids)
    }
}

pub fn same_loop(a: &[ObjectId], b: &[ObjectId]) -> bool {
    if a.len() != b.len() || a.is_empty() {
        return false;
    }

    let Some(offset) = b.iter().position(|id| *id == a[0]) else {
        return false;
    };

    let n = a.len();
    let forward = (0..n).all(|i| a[i] == b[(offset + i) % n]);
    let backward = (0..n).all(|i| a[i] == b[(offset + n - i) % n]);
    forward || backward
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_loop_rotation_and_winding() {
        assert!(same_loop(&[1, 2, 3, 4], &[3, 4, 1, 2]));
        assert!(same_loop(&[1, 2, 3, 4], &[1, 4, 3, 2]));
        assert!(!same_loop(&[1, 2, 3, 4], &[1, 3, 2, 4]));
        assert!(!same_loop(&[1, 2, 3], &[1, 2, 3, 4]));
    }
}

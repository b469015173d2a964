//! # Graph deltas
//!
//! A [`GraphDelta`] is the only way a [`Graph`](crate::Graph) changes. It
//! records every addition and deletion with enough state (positions, vertex
//! loops, containment) that its inverse can be built without looking at the
//! graph again.
//!
//! Application order inside one delta:
//!
//! 1. face deletions, edge deletions, vertex deletions
//! 2. vertex movements
//! 3. vertex additions, edge additions, face additions
//! 4. face containment updates

use massing_common::{ObjectId, Point};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Vertex,
    Edge,
    Face,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Vertex => "vertex",
            ElementKind::Edge => "edge",
            ElementKind::Face => "face",
        }
    }
}

/// Added or deleted edge/face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementDelta {
    /// Two vertices for an edge, the boundary loop for a face
    pub vertices: Vec<ObjectId>,
    /// Elements this one replaces (split, join, delete→move)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_ids: Vec<ObjectId>,
    /// Faces only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containing: Option<ObjectId>,
}

impl ElementDelta {
    pub fn new(vertices: Vec<ObjectId>) -> Self {
        Self {
            vertices,
            parent_ids: Vec::new(),
            containing: None,
        }
    }

    pub fn with_parents(mut self, parent_ids: Vec<ObjectId>) -> Self {
        self.parent_ids = parent_ids;
        self
    }

    pub fn with_containing(mut self, containing: Option<ObjectId>) -> Self {
        self.containing = containing;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexMove {
    pub old: Point,
    pub new: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentUpdate {
    pub old: Option<ObjectId>,
    pub new: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDelta {
    pub graph_id: ObjectId,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vertex_additions: BTreeMap<ObjectId, Point>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vertex_deletions: BTreeMap<ObjectId, Point>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vertex_movements: BTreeMap<ObjectId, VertexMove>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub edge_additions: BTreeMap<ObjectId, ElementDelta>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub edge_deletions: BTreeMap<ObjectId, ElementDelta>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub face_additions: BTreeMap<ObjectId, ElementDelta>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub face_deletions: BTreeMap<ObjectId, ElementDelta>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub face_containment_updates: BTreeMap<ObjectId, ContainmentUpdate>,
}

impl GraphDelta {
    pub fn new(graph_id: ObjectId) -> Self {
        Self {
            graph_id,
            vertex_additions: BTreeMap::new(),
            vertex_deletions: BTreeMap::new(),
            vertex_movements: BTreeMap::new(),
            edge_additions: BTreeMap::new(),
            edge_deletions: BTreeMap::new(),
            face_additions: BTreeMap::new(),
            face_deletions: BTreeMap::new(),
            face_containment_updates: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_additions.is_empty()
            && self.vertex_deletions.is_empty()
            && self.vertex_movements.is_empty()
            && self.edge_additions.is_empty()
            && self.edge_deletions.is_empty()
            && self.face_additions.is_empty()
            && self.face_deletions.is_empty()
            && self.face_containment_updates.is_empty()
    }

    /// Literal structural inverse
    pub fn make_inverse(&self) -> GraphDelta {
        GraphDelta {
            graph_id: self.graph_id,
            vertex_additions: self.vertex_deletions.clone(),
            vertex_deletions: self.vertex_additions.clone(),
            vertex_movements: self
                .vertex_movements
                .iter()
                .map(|(id, m)| (*id, VertexMove { old: m.new, new: m.old }))
                .collect(),
            edge_additions: strip_parents(&self.edge_deletions),
            edge_deletions: strip_parents(&self.edge_additions),
            face_additions: strip_parents(&self.face_deletions),
            face_deletions: strip_parents(&self.face_additions),
            face_containment_updates: self
                .face_containment_updates
                .iter()
                .map(|(id, u)| (*id, ContainmentUpdate { old: u.new, new: u.old }))
                .collect(),
        }
    }

    pub fn added_ids(&self) -> BTreeSet<ObjectId> {
        self.vertex_additions
            .keys()
            .chain(self.edge_additions.keys())
            .chain(self.face_additions.keys())
            .copied()
            .collect()
    }

    pub fn removed_ids(&self) -> BTreeSet<ObjectId> {
        self.vertex_deletions
            .keys()
            .chain(self.edge_deletions.keys())
            .chain(self.face_deletions.keys())
            .copied()
            .collect()
    }

    /// Added elements keyed by each element they name as parent
    pub fn successors(&self) -> BTreeMap<ObjectId, Vec<ObjectId>> {
        let mut successors: BTreeMap<ObjectId, Vec<ObjectId>> = BTreeMap::new();
        for (id, delta) in self.edge_additions.iter().chain(self.face_additions.iter()) {
            for parent in &delta.parent_ids {
                successors.entry(*parent).or_default().push(*id);
            }
        }
        successors
    }

    pub fn element_kind(&self, id: ObjectId) -> Option<ElementKind> {
        if self.vertex_additions.contains_key(&id) || self.vertex_deletions.contains_key(&id) {
            Some(ElementKind::Vertex)
        } else if self.edge_additions.contains_key(&id) || self.edge_deletions.contains_key(&id) {
            Some(ElementKind::Edge)
        } else if self.face_additions.contains_key(&id) || self.face_deletions.contains_key(&id) {
            Some(ElementKind::Face)
        } else {
            None
        }
    }
}

// Parent links describe why an element was created; re-adding a deleted
// element on undo does not replace anything.
fn strip_parents(map: &BTreeMap<ObjectId, ElementDelta>) -> BTreeMap<ObjectId, ElementDelta> {
    map.iter()
        .map(|(id, delta)| {
            (
                *id,
                ElementDelta {
                    vertices: delta.vertices.clone(),
                    parent_ids: Vec::new(),
                    containing: delta.containing,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use massing_common::point;

    #[test]
    fn test_inverse_swaps_additions_and_deletions() {
        let mut delta = GraphDelta::new(7);
        delta.vertex_additions.insert(1, point(0.0, 0.0, 0.0));
        delta.vertex_deletions.insert(2, point(1.0, 0.0, 0.0));
        delta.vertex_movements.insert(
            3,
            VertexMove {
                old: point(0.0, 0.0, 0.0),
                new: point(0.0, 0.0, 1.0),
            },
        );
        delta
            .edge_additions
            .insert(4, ElementDelta::new(vec![1, 3]).with_parents(vec![9]));
        delta.face_containment_updates.insert(
            5,
            ContainmentUpdate {
                old: None,
                new: Some(6),
            },
        );

        let inverse = delta.make_inverse();
        assert_eq!(inverse.vertex_deletions.get(&1), Some(&point(0.0, 0.0, 0.0)));
        assert_eq!(inverse.vertex_additions.get(&2), Some(&point(1.0, 0.0, 0.0)));
        assert_eq!(inverse.vertex_movements[&3].new, point(0.0, 0.0, 0.0));
        assert_eq!(inverse.edge_deletions[&4].vertices, vec![1, 3]);
        assert!(inverse.edge_deletions[&4].parent_ids.is_empty());
        assert_eq!(inverse.face_containment_updates[&5].new, None);
    }

    #[test]
    fn test_successors_follow_parent_ids() {
        let mut delta = GraphDelta::new(1);
        delta.edge_deletions.insert(10, ElementDelta::new(vec![1, 2]));
        delta
            .edge_additions
            .insert(11, ElementDelta::new(vec![1, 3]).with_parents(vec![10]));
        delta
            .edge_additions
            .insert(12, ElementDelta::new(vec![3, 2]).with_parents(vec![10]));

        let successors = delta.successors();
        assert_eq!(successors.get(&10), Some(&vec![11, 12]));
        assert_eq!(delta.removed_ids().into_iter().collect::<Vec<_>>(), vec![10]);
        assert_eq!(delta.element_kind(12), Some(ElementKind::Edge));
    }

    #[test]
    fn test_empty_delta_serializes_compactly() {
        let delta = GraphDelta::new(3);
        let json = serde_json::to_string(&delta).unwrap();
        assert_eq!(json, r#"{"graph_id":3}"#);
        let back: GraphDelta = serde_json::from_str(&json).unwrap();
        assert!(back.is_empty());
    }
}

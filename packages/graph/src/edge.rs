use massing_common::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: ObjectId,
    pub start: ObjectId,
    pub end: ObjectId,
    /// Connected faces; positive when the face loop runs start→end
    pub face_ids: BTreeSet<ObjectId>,
}

impl Edge {
    pub fn new(id: ObjectId, start: ObjectId, end: ObjectId) -> Self {
        Self {
            id,
            start,
            end,
            face_ids: BTreeSet::new(),
        }
    }

    pub fn connects(&self, a: ObjectId, b: ObjectId) -> bool {
        (self.start == a && self.end == b) || (self.start == b && self.end == a)
    }

    pub fn has_vertex(&self, vertex_id: ObjectId) -> bool {
        self.start == vertex_id || self.end == vertex_id
    }

    pub fn other_vertex(&self, vertex_id: ObjectId) -> Option<ObjectId> {
        if self.start == vertex_id {
            Some(self.end)
        } else if self.end == vertex_id {
            Some(self.start)
        } else {
            None
        }
    }

    /// Unsigned ids of the faces this edge bounds
    pub fn unsigned_face_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.face_ids.iter().map(|id| id.abs())
    }
}

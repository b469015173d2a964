//! # Graph store
//!
//! Vertices, edges and faces of one volume or surface graph. The graph
//! never changes outside [`Graph::apply_delta`], which validates the whole
//! delta against the current state before touching anything.

use crate::delta::{ElementKind, GraphDelta};
use crate::edge::Edge;
use crate::errors::{GraphError, GraphResult};
use crate::face::{same_loop, Face};
use crate::vertex::Vertex;
use massing_common::{points_equal, ObjectId, Plane, Point};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphKind {
    /// 3D massing of a group
    Volume,
    /// 2D subdivision hosted on a face
    Surface,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    id: ObjectId,
    kind: GraphKind,
    epsilon: f64,
    vertices: BTreeMap<ObjectId, Vertex>,
    edges: BTreeMap<ObjectId, Edge>,
    faces: BTreeMap<ObjectId, Face>,
}

impl Graph {
    pub fn new(id: ObjectId, kind: GraphKind, epsilon: f64) -> Self {
        Self {
            id,
            kind,
            epsilon,
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            faces: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> GraphKind {
        self.kind
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn vertices(&self) -> &BTreeMap<ObjectId, Vertex> {
        &self.vertices
    }

    pub fn edges(&self) -> &BTreeMap<ObjectId, Edge> {
        &self.edges
    }

    pub fn faces(&self) -> &BTreeMap<ObjectId, Face> {
        &self.faces
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.edges.is_empty() && self.faces.is_empty()
    }

    /// (vertices, edges, faces)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.vertices.len(), self.edges.len(), self.faces.len())
    }

    pub fn find_vertex(&self, id: ObjectId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    pub fn find_edge(&self, id: ObjectId) -> Option<&Edge> {
        self.edges.get(&id.abs())
    }

    pub fn find_face(&self, id: ObjectId) -> Option<&Face> {
        self.faces.get(&id.abs())
    }

    pub fn element_kind(&self, id: ObjectId) -> Option<ElementKind> {
        let id = id.abs();
        if self.vertices.contains_key(&id) {
            Some(ElementKind::Vertex)
        } else if self.edges.contains_key(&id) {
            Some(ElementKind::Edge)
        } else if self.faces.contains_key(&id) {
            Some(ElementKind::Face)
        } else {
            None
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.element_kind(id).is_some()
    }

    pub fn element_ids(&self) -> BTreeSet<ObjectId> {
        self.vertices
            .keys()
            .chain(self.edges.keys())
            .chain(self.faces.keys())
            .copied()
            .collect()
    }

    pub fn find_vertex_by_position(&self, position: &Point) -> Option<ObjectId> {
        self.vertices
            .values()
            .find(|v| points_equal(&v.position, position, self.epsilon))
            .map(|v| v.id)
    }

    pub fn find_edge_by_vertices(&self, a: ObjectId, b: ObjectId) -> Option<ObjectId> {
        let vertex = self.vertices.get(&a)?;
        vertex
            .edge_ids
            .iter()
            .filter_map(|id| self.edges.get(id))
            .find(|edge| edge.connects(a, b))
            .map(|edge| edge.id)
    }

    pub fn find_face_by_vertices(&self, vertex_ids: &[ObjectId]) -> Option<ObjectId> {
        let first = *vertex_ids.first()?;
        self.faces_of_vertex(first)
            .into_iter()
            .filter_map(|id| self.faces.get(&id))
            .find(|face| face.same_loop(vertex_ids))
            .map(|face| face.id)
    }

    pub fn adjacent_edges(&self, vertex_id: ObjectId) -> Vec<ObjectId> {
        self.vertices
            .get(&vertex_id)
            .map(|v| v.edge_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn adjacent_vertices(&self, vertex_id: ObjectId) -> Vec<ObjectId> {
        self.adjacent_edges(vertex_id)
            .into_iter()
            .filter_map(|id| self.edges.get(&id))
            .filter_map(|edge| edge.other_vertex(vertex_id))
            .collect()
    }

    /// Unsigned ids of the faces bounded by an edge
    pub fn adjacent_faces(&self, edge_id: ObjectId) -> Vec<ObjectId> {
        self.edges
            .get(&edge_id.abs())
            .map(|edge| edge.unsigned_face_ids().collect())
            .unwrap_or_default()
    }

    pub fn faces_of_vertex(&self, vertex_id: ObjectId) -> BTreeSet<ObjectId> {
        self.adjacent_edges(vertex_id)
            .into_iter()
            .flat_map(|edge_id| self.adjacent_faces(edge_id))
            .collect()
    }

    pub fn vertex_position(&self, id: ObjectId) -> GraphResult<Point> {
        self.vertices
            .get(&id)
            .map(|v| v.position)
            .ok_or(GraphError::VertexNotFound(id))
    }

    pub fn face_positions(&self, face_id: ObjectId) -> GraphResult<Vec<Point>> {
        let face = self.find_face(face_id).ok_or(GraphError::FaceNotFound(face_id))?;
        face.vertex_ids
            .iter()
            .map(|id| self.vertex_position(*id))
            .collect()
    }

    /// Check a delta against the current state without mutating anything
    pub fn validate_delta(&self, delta: &GraphDelta) -> GraphResult<()> {
        if delta.graph_id != self.id {
            return Err(GraphError::WrongGraph {
                expected: self.id,
                got: delta.graph_id,
            });
        }

        let view = ProjectedView::new(self, delta);

        for (id, deleted) in &delta.face_deletions {
            let face = self.faces.get(id).ok_or(GraphError::FaceNotFound(*id))?;
            if face.vertex_ids != deleted.vertices || face.containing_face != deleted.containing {
                return Err(GraphError::StaleElement(*id));
            }
            for child in &face.contained_faces {
                let rehomed = delta
                    .face_containment_updates
                    .get(child)
                    .map(|u| u.new != Some(*id))
                    .unwrap_or(false);
                if !delta.face_deletions.contains_key(child) && !rehomed {
                    return Err(GraphError::StillReferenced(*id));
                }
            }
        }

        for (id, deleted) in &delta.edge_deletions {
            let edge = self.edges.get(id).ok_or(GraphError::EdgeNotFound(*id))?;
            if deleted.vertices != [edge.start, edge.end] {
                return Err(GraphError::StaleElement(*id));
            }
            if edge
                .unsigned_face_ids()
                .any(|face| !delta.face_deletions.contains_key(&face))
            {
                return Err(GraphError::StillReferenced(*id));
            }
        }

        for (id, position) in &delta.vertex_deletions {
            let vertex = self.vertices.get(id).ok_or(GraphError::VertexNotFound(*id))?;
            if vertex.position != *position {
                return Err(GraphError::StaleElement(*id));
            }
            if vertex
                .edge_ids
                .iter()
                .any(|edge| !delta.edge_deletions.contains_key(edge))
            {
                return Err(GraphError::StillReferenced(*id));
            }
        }

        for (id, movement) in &delta.vertex_movements {
            let vertex = self
                .vertices
                .get(id)
                .filter(|_| !delta.vertex_deletions.contains_key(id))
                .ok_or(GraphError::VertexNotFound(*id))?;
            if vertex.position != movement.old {
                return Err(GraphError::StaleElement(*id));
            }
        }

        let mut new_ids = BTreeSet::new();
        let added = delta
            .vertex_additions
            .keys()
            .chain(delta.edge_additions.keys())
            .chain(delta.face_additions.keys());
        for id in added {
            if *id <= 0 || !new_ids.insert(*id) || view.was_live(*id) {
                return Err(GraphError::IdInUse(*id));
            }
        }

        let mut added_pairs = BTreeSet::new();
        for (id, added) in &delta.edge_additions {
            let &[a, b] = added.vertices.as_slice() else {
                return Err(GraphError::DegenerateEdge(*id));
            };
            if a == b {
                return Err(GraphError::DegenerateEdge(*id));
            }
            for v in [a, b] {
                if !view.vertex_alive(v) {
                    return Err(GraphError::VertexNotFound(v));
                }
            }
            let pair = (a.min(b), a.max(b));
            if view.existing_edge(a, b).is_some() || !added_pairs.insert(pair) {
                return Err(GraphError::DuplicateEdge(a, b));
            }
        }

        for (id, added) in &delta.face_additions {
            let n = added.vertices.len();
            let distinct: BTreeSet<_> = added.vertices.iter().collect();
            if n < 3 || distinct.len() != n {
                return Err(GraphError::InvalidFaceLoop(*id));
            }
            for i in 0..n {
                let (a, b) = (added.vertices[i], added.vertices[(i + 1) % n]);
                if !view.vertex_alive(a) {
                    return Err(GraphError::VertexNotFound(a));
                }
                if view.existing_edge(a, b).is_none() && view.added_edge(a, b).is_none() {
                    return Err(GraphError::InvalidFaceLoop(*id));
                }
            }
            if view.face_with_loop(*id, &added.vertices) {
                return Err(GraphError::InvalidFaceLoop(*id));
            }
            view.check_planar(*id, &added.vertices, self.epsilon)?;
            if let Some(containing) = added.containing {
                if containing == *id || !view.face_alive(containing) {
                    return Err(GraphError::InvalidContainment {
                        face: *id,
                        containing,
                    });
                }
            }
        }

        let moved_faces: BTreeSet<ObjectId> = delta
            .vertex_movements
            .keys()
            .flat_map(|v| self.faces_of_vertex(*v))
            .filter(|f| !delta.face_deletions.contains_key(f))
            .collect();
        for face_id in moved_faces {
            if let Some(face) = self.faces.get(&face_id) {
                view.check_planar(face_id, &face.vertex_ids, self.epsilon)?;
            }
        }

        for (face_id, update) in &delta.face_containment_updates {
            if !view.face_alive(*face_id) {
                return Err(GraphError::FaceNotFound(*face_id));
            }
            let current = match delta.face_additions.get(face_id) {
                Some(added) => added.containing,
                None => self.faces.get(face_id).and_then(|f| f.containing_face),
            };
            if current != update.old {
                return Err(GraphError::StaleElement(*face_id));
            }
            if let Some(containing) = update.new {
                if containing == *face_id || !view.face_alive(containing) {
                    return Err(GraphError::InvalidContainment {
                        face: *face_id,
                        containing,
                    });
                }
            }
        }

        Ok(())
    }

    /// Validate and apply a delta; on error the graph is untouched
    pub fn apply_delta(&mut self, delta: &GraphDelta) -> GraphResult<()> {
        self.validate_delta(delta)?;

        for id in delta.face_deletions.keys() {
            self.remove_face(*id);
        }
        for id in delta.edge_deletions.keys() {
            if let Some(edge) = self.edges.remove(id) {
                for v in [edge.start, edge.end] {
                    if let Some(vertex) = self.vertices.get_mut(&v) {
                        vertex.edge_ids.remove(id);
                    }
                }
            }
        }
        for id in delta.vertex_deletions.keys() {
            self.vertices.remove(id);
        }

        let mut dirty_faces = BTreeSet::new();
        for (id, movement) in &delta.vertex_movements {
            if let Some(vertex) = self.vertices.get_mut(id) {
                vertex.position = movement.new;
            }
            dirty_faces.extend(self.faces_of_vertex(*id));
        }

        for (id, position) in &delta.vertex_additions {
            self.vertices.insert(*id, Vertex::new(*id, self.id, *position));
        }
        for (id, added) in &delta.edge_additions {
            let (start, end) = (added.vertices[0], added.vertices[1]);
            self.edges.insert(*id, Edge::new(*id, start, end));
            for v in [start, end] {
                if let Some(vertex) = self.vertices.get_mut(&v) {
                    vertex.edge_ids.insert(*id);
                }
            }
        }
        for (id, added) in &delta.face_additions {
            self.insert_face(*id, &added.vertices)?;
        }
        for (id, added) in &delta.face_additions {
            if added.containing.is_some() {
                self.set_containing(*id, added.containing);
            }
        }

        for (face_id, update) in &delta.face_containment_updates {
            self.set_containing(*face_id, update.new);
        }

        for face_id in dirty_faces {
            let positions = self.face_positions(face_id)?;
            if let Some(face) = self.faces.get_mut(&face_id) {
                face.plane = Plane::from_polygon(&positions)
                    .ok_or(GraphError::InvalidFaceLoop(face_id))?;
            }
        }

        Ok(())
    }

    fn remove_face(&mut self, id: ObjectId) {
        let Some(face) = self.faces.remove(&id) else {
            return;
        };

        for signed_edge in &face.edge_ids {
            if let Some(edge) = self.edges.get_mut(&signed_edge.abs()) {
                edge.face_ids.remove(&signed_face(id, *signed_edge));
            }
        }
        if let Some(parent) = face.containing_face.and_then(|p| self.faces.get_mut(&p)) {
            parent.contained_faces.remove(&id);
        }
    }

    fn insert_face(&mut self, id: ObjectId, vertex_ids: &[ObjectId]) -> GraphResult<()> {
        let n = vertex_ids.len();
        let mut edge_ids = Vec::with_capacity(n);
        for i in 0..n {
            let (a, b) = (vertex_ids[i], vertex_ids[(i + 1) % n]);
            let edge_id = self
                .find_edge_by_vertices(a, b)
                .ok_or(GraphError::InvalidFaceLoop(id))?;
            let edge = self
                .edges
                .get_mut(&edge_id)
                .ok_or(GraphError::EdgeNotFound(edge_id))?;
            let signed_edge = if edge.start == a { edge_id } else { -edge_id };
            edge.face_ids.insert(signed_face(id, signed_edge));
            edge_ids.push(signed_edge);
        }

        let positions = vertex_ids
            .iter()
            .map(|v| self.vertex_position(*v))
            .collect::<GraphResult<Vec<_>>>()?;
        let plane = Plane::from_polygon(&positions).ok_or(GraphError::InvalidFaceLoop(id))?;

        self.faces.insert(
            id,
            Face {
                id,
                vertex_ids: vertex_ids.to_vec(),
                edge_ids,
                plane,
                containing_face: None,
                contained_faces: BTreeSet::new(),
            },
        );
        Ok(())
    }

    fn set_containing(&mut self, face_id: ObjectId, containing: Option<ObjectId>) {
        let previous = match self.faces.get_mut(&face_id) {
            Some(face) => std::mem::replace(&mut face.containing_face, containing),
            None => return,
        };
        if let Some(old) = previous.and_then(|p| self.faces.get_mut(&p)) {
            old.contained_faces.remove(&face_id);
        }
        if let Some(new) = containing.and_then(|p| self.faces.get_mut(&p)) {
            new.contained_faces.insert(face_id);
        }
    }

    /// Full invariant check
    pub fn validate(&self) -> GraphResult<()> {
        let invariant = |msg: String| Err(GraphError::Invariant(format!("graph {}: {}", self.id, msg)));

        for (id, vertex) in &self.vertices {
            if vertex.graph_id != self.id {
                return invariant(format!("vertex {} owned by graph {}", id, vertex.graph_id));
            }
            for edge_id in &vertex.edge_ids {
                match self.edges.get(edge_id) {
                    Some(edge) if edge.has_vertex(*id) => {}
                    _ => return invariant(format!("vertex {} lists foreign edge {}", id, edge_id)),
                }
            }
        }

        let mut pairs = BTreeSet::new();
        for (id, edge) in &self.edges {
            if edge.start == edge.end {
                return invariant(format!("edge {} is degenerate", id));
            }
            for v in [edge.start, edge.end] {
                match self.vertices.get(&v) {
                    Some(vertex) if vertex.edge_ids.contains(id) => {}
                    _ => return invariant(format!("edge {} has dangling vertex {}", id, v)),
                }
            }
            if !pairs.insert((edge.start.min(edge.end), edge.start.max(edge.end))) {
                return invariant(format!("edge {} duplicates another edge", id));
            }
            for signed in &edge.face_ids {
                match self.faces.get(&signed.abs()) {
                    Some(face) if face.edge_ids.contains(&if *signed > 0 { *id } else { -*id }) => {}
                    _ => return invariant(format!("edge {} lists foreign face {}", id, signed)),
                }
            }
        }

        for (id, face) in &self.faces {
            let n = face.vertex_ids.len();
            if n < 3 || face.edge_ids.len() != n {
                return invariant(format!("face {} has a malformed loop", id));
            }
            for i in 0..n {
                let (a, b) = (face.vertex_ids[i], face.vertex_ids[(i + 1) % n]);
                let signed_edge = face.edge_ids[i];
                let Some(edge) = self.edges.get(&signed_edge.abs()) else {
                    return invariant(format!("face {} has dangling edge {}", id, signed_edge));
                };
                let runs_forward = edge.start == a && edge.end == b;
                let runs_backward = edge.start == b && edge.end == a;
                if !((runs_forward && signed_edge > 0) || (runs_backward && signed_edge < 0)) {
                    return invariant(format!("face {} loop disagrees with edge {}", id, signed_edge));
                }
                if !edge.face_ids.contains(&signed_face(*id, signed_edge)) {
                    return invariant(format!("edge {} misses face {}", signed_edge, id));
                }
            }
            let positions = self.face_positions(*id)?;
            if positions
                .iter()
                .any(|p| !face.plane.contains(p, self.epsilon))
            {
                return invariant(format!("face {} is off its plane", id));
            }
            if let Some(parent) = face.containing_face {
                match self.faces.get(&parent) {
                    Some(p) if p.contained_faces.contains(id) => {}
                    _ => return invariant(format!("face {} has dangling container {}", id, parent)),
                }
            }
            for child in &face.contained_faces {
                match self.faces.get(child) {
                    Some(c) if c.containing_face == Some(*id) => {}
                    _ => return invariant(format!("face {} lists foreign child {}", id, child)),
                }
            }
        }

        Ok(())
    }
}

/// Signed face reference stored on an edge
fn signed_face(face_id: ObjectId, signed_edge: ObjectId) -> ObjectId {
    if signed_edge > 0 {
        face_id.abs()
    } else {
        -face_id.abs()
    }
}

/// The graph as it would look after a delta, for validation
struct ProjectedView<'a> {
    graph: &'a Graph,
    delta: &'a GraphDelta,
}

impl<'a> ProjectedView<'a> {
    fn new(graph: &'a Graph, delta: &'a GraphDelta) -> Self {
        Self { graph, delta }
    }

    fn was_live(&self, id: ObjectId) -> bool {
        (self.graph.vertices.contains_key(&id) && !self.delta.vertex_deletions.contains_key(&id))
            || (self.graph.edges.contains_key(&id) && !self.delta.edge_deletions.contains_key(&id))
            || (self.graph.faces.contains_key(&id) && !self.delta.face_deletions.contains_key(&id))
    }

    fn vertex_alive(&self, id: ObjectId) -> bool {
        self.delta.vertex_additions.contains_key(&id)
            || (self.graph.vertices.contains_key(&id)
                && !self.delta.vertex_deletions.contains_key(&id))
    }

    fn face_alive(&self, id: ObjectId) -> bool {
        self.delta.face_additions.contains_key(&id)
            || (self.graph.faces.contains_key(&id) && !self.delta.face_deletions.contains_key(&id))
    }

    fn position(&self, id: ObjectId) -> Option<Point> {
        if let Some(p) = self.delta.vertex_additions.get(&id) {
            return Some(*p);
        }
        if let Some(m) = self.delta.vertex_movements.get(&id) {
            return Some(m.new);
        }
        self.graph.vertices.get(&id).map(|v| v.position)
    }

    fn existing_edge(&self, a: ObjectId, b: ObjectId) -> Option<ObjectId> {
        self.graph
            .find_edge_by_vertices(a, b)
            .filter(|id| !self.delta.edge_deletions.contains_key(id))
    }

    fn added_edge(&self, a: ObjectId, b: ObjectId) -> Option<ObjectId> {
        self.delta
            .edge_additions
            .iter()
            .find(|(_, added)| added.vertices.len() == 2 && {
                let (s, e) = (added.vertices[0], added.vertices[1]);
                (s == a && e == b) || (s == b && e == a)
            })
            .map(|(id, _)| *id)
    }

    fn face_with_loop(&self, id: ObjectId, vertex_ids: &[ObjectId]) -> bool {
        let existing = self
            .graph
            .find_face_by_vertices(vertex_ids)
            .filter(|f| !self.delta.face_deletions.contains_key(f))
            .is_some();
        let added = self
            .delta
            .face_additions
            .iter()
            .any(|(other, added)| *other != id && same_loop(&added.vertices, vertex_ids));
        existing || added
    }

    fn check_planar(&self, id: ObjectId, vertex_ids: &[ObjectId], epsilon: f64) -> GraphResult<()> {
        let positions = vertex_ids
            .iter()
            .map(|v| self.position(*v).ok_or(GraphError::VertexNotFound(*v)))
            .collect::<GraphResult<Vec<_>>>()?;
        let plane = Plane::from_polygon(&positions).ok_or(GraphError::InvalidFaceLoop(id))?;
        if positions.iter().any(|p| !plane.contains(p, epsilon)) {
            return Err(GraphError::NonPlanarFace(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{ContainmentUpdate, ElementDelta, VertexMove};
    use massing_common::point;

    fn square_delta(graph_id: ObjectId) -> GraphDelta {
        let mut delta = GraphDelta::new(graph_id);
        delta.vertex_additions.insert(1, point(0.0, 0.0, 0.0));
        delta.vertex_additions.insert(2, point(1.0, 0.0, 0.0));
        delta.vertex_additions.insert(3, point(1.0, 1.0, 0.0));
        delta.vertex_additions.insert(4, point(0.0, 1.0, 0.0));
        delta.edge_additions.insert(11, ElementDelta::new(vec![1, 2]));
        delta.edge_additions.insert(12, ElementDelta::new(vec![2, 3]));
        delta.edge_additions.insert(13, ElementDelta::new(vec![4, 3]));
        delta.edge_additions.insert(14, ElementDelta::new(vec![4, 1]));
        delta.face_additions.insert(21, ElementDelta::new(vec![1, 2, 3, 4]));
        delta
    }

    #[test]
    fn test_apply_square() {
        let mut graph = Graph::new(100, GraphKind::Volume, 1e-6);
        graph.apply_delta(&square_delta(100)).unwrap();

        assert_eq!(graph.counts(), (4, 4, 1));
        let face = graph.find_face(21).unwrap();
        assert_eq!(face.edge_ids, vec![11, 12, -13, 14]);
        assert!(graph.find_edge(13).unwrap().face_ids.contains(&-21));
        assert_eq!(graph.find_edge_by_vertices(3, 2), Some(12));
        assert_eq!(graph.adjacent_faces(14), vec![21]);
        graph.validate().unwrap();
    }

    #[test]
    fn test_inverse_restores_exact_state() {
        let mut graph = Graph::new(100, GraphKind::Volume, 1e-6);
        let delta = square_delta(100);
        let before = graph.clone();

        graph.apply_delta(&delta).unwrap();
        graph.apply_delta(&delta.make_inverse()).unwrap();
        assert_eq!(graph, before);
    }

    #[test]
    fn test_wrong_graph_rejected() {
        let mut graph = Graph::new(100, GraphKind::Volume, 1e-6);
        let err = graph.apply_delta(&square_delta(5)).unwrap_err();
        assert_eq!(err, GraphError::WrongGraph { expected: 100, got: 5 });
    }

    #[test]
    fn test_edge_deletion_requires_face_deletion() {
        let mut graph = Graph::new(100, GraphKind::Volume, 1e-6);
        graph.apply_delta(&square_delta(100)).unwrap();
        let before = graph.clone();

        let mut delta = GraphDelta::new(100);
        delta.edge_deletions.insert(11, ElementDelta::new(vec![1, 2]));
        assert_eq!(
            graph.apply_delta(&delta).unwrap_err(),
            GraphError::StillReferenced(11)
        );
        assert_eq!(graph, before);
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut graph = Graph::new(100, GraphKind::Volume, 1e-6);
        graph.apply_delta(&square_delta(100)).unwrap();

        let mut delta = GraphDelta::new(100);
        delta.edge_additions.insert(30, ElementDelta::new(vec![2, 1]));
        assert_eq!(
            graph.apply_delta(&delta).unwrap_err(),
            GraphError::DuplicateEdge(2, 1)
        );
    }

    #[test]
    fn test_non_planar_move_rejected() {
        let mut graph = Graph::new(100, GraphKind::Volume, 1e-6);
        graph.apply_delta(&square_delta(100)).unwrap();

        let mut delta = GraphDelta::new(100);
        delta.vertex_movements.insert(
            3,
            VertexMove {
                old: point(1.0, 1.0, 0.0),
                new: point(1.0, 1.0, 0.5),
            },
        );
        assert_eq!(
            graph.apply_delta(&delta).unwrap_err(),
            GraphError::NonPlanarFace(21)
        );

        let mut planar = GraphDelta::new(100);
        planar.vertex_movements.insert(
            3,
            VertexMove {
                old: point(1.0, 1.0, 0.0),
                new: point(2.0, 2.0, 0.0),
            },
        );
        graph.apply_delta(&planar).unwrap();
        graph.validate().unwrap();
    }

    #[test]
    fn test_stale_vertex_deletion_rejected() {
        let mut graph = Graph::new(100, GraphKind::Volume, 1e-6);
        let mut add = GraphDelta::new(100);
        add.vertex_additions.insert(1, point(0.0, 0.0, 0.0));
        graph.apply_delta(&add).unwrap();

        let mut delta = GraphDelta::new(100);
        delta.vertex_deletions.insert(1, point(3.0, 0.0, 0.0));
        assert_eq!(
            graph.apply_delta(&delta).unwrap_err(),
            GraphError::StaleElement(1)
        );
    }

    #[test]
    fn test_containment_round_trip() {
        let mut graph = Graph::new(100, GraphKind::Volume, 1e-6);
        graph.apply_delta(&square_delta(100)).unwrap();

        let mut hole = GraphDelta::new(100);
        hole.vertex_additions.insert(5, point(0.25, 0.25, 0.0));
        hole.vertex_additions.insert(6, point(0.75, 0.25, 0.0));
        hole.vertex_additions.insert(7, point(0.5, 0.75, 0.0));
        hole.edge_additions.insert(15, ElementDelta::new(vec![5, 6]));
        hole.edge_additions.insert(16, ElementDelta::new(vec![6, 7]));
        hole.edge_additions.insert(17, ElementDelta::new(vec![7, 5]));
        hole.face_additions
            .insert(22, ElementDelta::new(vec![5, 6, 7]).with_containing(Some(21)));
        graph.apply_delta(&hole).unwrap();

        assert!(graph.find_face(21).unwrap().contained_faces.contains(&22));
        graph.validate().unwrap();

        let mut release = GraphDelta::new(100);
        release.face_containment_updates.insert(
            22,
            ContainmentUpdate {
                old: Some(21),
                new: None,
            },
        );
        let before = graph.clone();
        graph.apply_delta(&release).unwrap();
        assert!(graph.find_face(21).unwrap().contained_faces.is_empty());

        graph.apply_delta(&release.make_inverse()).unwrap();
        assert_eq!(graph, before);
    }

    #[test]
    fn test_containing_face_deletion_requires_rehome() {
        let mut graph = Graph::new(100, GraphKind::Volume, 1e-6);
        graph.apply_delta(&square_delta(100)).unwrap();

        let mut hole = GraphDelta::new(100);
        hole.vertex_additions.insert(5, point(0.25, 0.25, 0.0));
        hole.vertex_additions.insert(6, point(0.75, 0.25, 0.0));
        hole.vertex_additions.insert(7, point(0.5, 0.75, 0.0));
        hole.edge_additions.insert(15, ElementDelta::new(vec![5, 6]));
        hole.edge_additions.insert(16, ElementDelta::new(vec![6, 7]));
        hole.edge_additions.insert(17, ElementDelta::new(vec![7, 5]));
        hole.face_additions
            .insert(22, ElementDelta::new(vec![5, 6, 7]).with_containing(Some(21)));
        graph.apply_delta(&hole).unwrap();

        let mut delete = GraphDelta::new(100);
        delete
            .face_deletions
            .insert(21, ElementDelta::new(vec![1, 2, 3, 4]).with_containing(None));
        assert_eq!(
            graph.apply_delta(&delete).unwrap_err(),
            GraphError::StillReferenced(21)
        );

        delete.face_containment_updates.insert(
            22,
            ContainmentUpdate {
                old: Some(21),
                new: None,
            },
        );
        graph.apply_delta(&delete).unwrap();
        assert_eq!(graph.find_face(22).unwrap().containing_face, None);
        graph.validate().unwrap();
    }
}

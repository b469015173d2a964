//! # Position-based graph operations
//!
//! Tools describe geometry by position. These operations turn positions
//! into [`GraphDelta`]s, reusing coincident vertices and edges and splitting
//! existing edges where a new vertex lands on them. Nothing here mutates the
//! graph; every step is applied to a scratch copy so later steps see the
//! earlier ones, and the caller receives the deltas to submit.

use crate::delta::{ContainmentUpdate, ElementDelta, ElementKind, GraphDelta, VertexMove};
use crate::errors::{GraphError, GraphResult};
use crate::graph::Graph;
use massing_common::{segment_interior_param, IdAllocator, ObjectId, Point};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Rejoin the two coplanar faces on either side of a deleted edge
    AttemptJoin,
    /// Delete only
    Pure,
}

/// Accumulates deltas against a scratch copy of a graph
pub struct DeltaBuilder<'a> {
    scratch: Graph,
    ids: &'a mut IdAllocator,
    deltas: Vec<GraphDelta>,
}

impl<'a> DeltaBuilder<'a> {
    pub fn new(graph: &Graph, ids: &'a mut IdAllocator) -> Self {
        Self {
            scratch: graph.clone(),
            ids,
            deltas: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.scratch
    }

    pub fn finish(self) -> Vec<GraphDelta> {
        self.deltas
    }

    fn next_id(&mut self) -> GraphResult<ObjectId> {
        Ok(self.ids.next_id()?)
    }

    fn commit(&mut self, delta: GraphDelta) -> GraphResult<()> {
        if delta.is_empty() {
            return Ok(());
        }
        self.scratch.apply_delta(&delta)?;
        self.deltas.push(delta);
        Ok(())
    }

    /// Vertex at `position`, reusing a coincident one
    pub fn add_vertex(&mut self, position: Point) -> GraphResult<ObjectId> {
        if let Some(existing) = self.scratch.find_vertex_by_position(&position) {
            return Ok(existing);
        }

        let vertex_id = self.next_id()?;
        let eps = self.scratch.epsilon();
        let host_edge = self.scratch.edges().values().find_map(|edge| {
            let a = self.scratch.find_vertex(edge.start)?.position;
            let b = self.scratch.find_vertex(edge.end)?.position;
            segment_interior_param(&position, &a, &b, eps).map(|_| edge.id)
        });

        match host_edge {
            Some(edge_id) => self.split_edge(edge_id, vertex_id, position)?,
            None => {
                let mut delta = GraphDelta::new(self.scratch.id());
                delta.vertex_additions.insert(vertex_id, position);
                self.commit(delta)?;
            }
        }

        Ok(vertex_id)
    }

    fn split_edge(&mut self, edge_id: ObjectId, vertex_id: ObjectId, position: Point) -> GraphResult<()> {
        let graph = &self.scratch;
        let edge = graph.find_edge(edge_id).ok_or(GraphError::EdgeNotFound(edge_id))?.clone();
        let (start_half, end_half) = (self.ids.next_id()?, self.ids.next_id()?);

        let mut delta = GraphDelta::new(graph.id());
        delta.vertex_additions.insert(vertex_id, position);
        delta
            .edge_deletions
            .insert(edge_id, ElementDelta::new(vec![edge.start, edge.end]));
        delta.edge_additions.insert(
            start_half,
            ElementDelta::new(vec![edge.start, vertex_id]).with_parents(vec![edge_id]),
        );
        delta.edge_additions.insert(
            end_half,
            ElementDelta::new(vec![vertex_id, edge.end]).with_parents(vec![edge_id]),
        );

        let mut replaced = BTreeMap::new();
        for face_id in edge.unsigned_face_ids() {
            replaced.insert(face_id, self.ids.next_id()?);
        }

        for (face_id, new_face_id) in &replaced {
            let face = graph.find_face(*face_id).ok_or(GraphError::FaceNotFound(*face_id))?;
            let n = face.vertex_ids.len();
            let mut vertices = Vec::with_capacity(n + 1);
            for i in 0..n {
                let (a, b) = (face.vertex_ids[i], face.vertex_ids[(i + 1) % n]);
                vertices.push(a);
                if edge.connects(a, b) {
                    vertices.push(vertex_id);
                }
            }

            delta.face_deletions.insert(
                *face_id,
                ElementDelta::new(face.vertex_ids.clone()).with_containing(face.containing_face),
            );
            let containing = face
                .containing_face
                .map(|c| replaced.get(&c).copied().unwrap_or(c));
            delta.face_additions.insert(
                *new_face_id,
                ElementDelta::new(vertices)
                    .with_parents(vec![*face_id])
                    .with_containing(containing),
            );
            for child in &face.contained_faces {
                if !replaced.contains_key(child) {
                    delta.face_containment_updates.insert(
                        *child,
                        ContainmentUpdate {
                            old: Some(*face_id),
                            new: Some(*new_face_id),
                        },
                    );
                }
            }
        }

        self.commit(delta)
    }

    /// Edge between two positions, split at every existing vertex on it
    ///
    /// Returns the vertex chain from `a` to `b` and the edges along it.
    pub fn add_edge(
        &mut self,
        a: Point,
        b: Point,
        parent_ids: &[ObjectId],
    ) -> GraphResult<(Vec<ObjectId>, Vec<ObjectId>)> {
        let start = self.add_vertex(a)?;
        let end = self.add_vertex(b)?;
        if start == end {
            return Err(GraphError::DegenerateEdge(start));
        }

        let eps = self.scratch.epsilon();
        let mut interior: Vec<(f64, ObjectId)> = self
            .scratch
            .vertices()
            .values()
            .filter(|v| v.id != start && v.id != end)
            .filter_map(|v| segment_interior_param(&v.position, &a, &b, eps).map(|t| (t, v.id)))
            .collect();
        interior.sort_by(|x, y| x.0.total_cmp(&y.0));

        let mut chain = vec![start];
        chain.extend(interior.into_iter().map(|(_, id)| id));
        chain.push(end);

        let mut delta = GraphDelta::new(self.scratch.id());
        let mut edge_ids = Vec::with_capacity(chain.len() - 1);
        for pair in chain.windows(2) {
            match self.scratch.find_edge_by_vertices(pair[0], pair[1]) {
                Some(existing) => edge_ids.push(existing),
                None => {
                    let id = self.next_id()?;
                    delta.edge_additions.insert(
                        id,
                        ElementDelta::new(vec![pair[0], pair[1]]).with_parents(parent_ids.to_vec()),
                    );
                    edge_ids.push(id);
                }
            }
        }
        self.commit(delta)?;

        Ok((chain, edge_ids))
    }

    /// Face through a closed polygon of positions, reusing an identical face
    pub fn add_face(
        &mut self,
        positions: &[Point],
        parent_ids: &[ObjectId],
        containing: Option<ObjectId>,
    ) -> GraphResult<ObjectId> {
        let n = positions.len();
        if n < 3 {
            return Err(GraphError::InvalidFaceLoop(0));
        }

        let mut vertex_loop = Vec::new();
        for i in 0..n {
            let (chain, _) = self.add_edge(positions[i], positions[(i + 1) % n], parent_ids)?;
            vertex_loop.extend_from_slice(&chain[..chain.len() - 1]);
        }

        if let Some(existing) = self.scratch.find_face_by_vertices(&vertex_loop) {
            return Ok(existing);
        }

        let face_id = self.next_id()?;
        let distinct: BTreeSet<_> = vertex_loop.iter().collect();
        if distinct.len() != vertex_loop.len() {
            return Err(GraphError::InvalidFaceLoop(face_id));
        }

        let mut delta = GraphDelta::new(self.scratch.id());
        delta.face_additions.insert(
            face_id,
            ElementDelta::new(vertex_loop)
                .with_parents(parent_ids.to_vec())
                .with_containing(containing),
        );
        self.commit(delta)?;
        Ok(face_id)
    }
}

impl Graph {
    pub fn delta_for_vertex_addition(
        &self,
        ids: &mut IdAllocator,
        position: Point,
    ) -> GraphResult<(Vec<GraphDelta>, ObjectId)> {
        let mut builder = DeltaBuilder::new(self, ids);
        let id = builder.add_vertex(position)?;
        Ok((builder.finish(), id))
    }

    /// Deltas and resulting edge ids for an edge between two positions
    pub fn deltas_for_edge_addition(
        &self,
        ids: &mut IdAllocator,
        a: Point,
        b: Point,
    ) -> GraphResult<(Vec<GraphDelta>, Vec<ObjectId>)> {
        let mut builder = DeltaBuilder::new(self, ids);
        let (_, edges) = builder.add_edge(a, b, &[])?;
        Ok((builder.finish(), edges))
    }

    pub fn deltas_for_face_addition(
        &self,
        ids: &mut IdAllocator,
        positions: &[Point],
        containing: Option<ObjectId>,
    ) -> GraphResult<(Vec<GraphDelta>, ObjectId)> {
        let mut builder = DeltaBuilder::new(self, ids);
        let face = builder.add_face(positions, &[], containing)?;
        Ok((builder.finish(), face))
    }

    pub fn delta_for_vertex_movements(&self, moves: &BTreeMap<ObjectId, Point>) -> GraphResult<GraphDelta> {
        let mut delta = GraphDelta::new(self.id());
        for (id, new) in moves {
            let old = self.vertex_position(*id)?;
            if old != *new {
                delta
                    .vertex_movements
                    .insert(*id, VertexMove { old, new: *new });
            }
        }
        self.validate_delta(&delta)?;
        Ok(delta)
    }

    /// Delete elements and everything that depends on them
    ///
    /// Deleting a vertex takes its edges with it, deleting an edge takes the
    /// faces it bounds, and vertices left without edges go too. In
    /// [`DeleteMode::AttemptJoin`], two coplanar faces that meet only along a
    /// deleted edge are replaced by one face naming both as parents.
    pub fn deltas_for_delete_objects(
        &self,
        ids: &mut IdAllocator,
        element_ids: &[ObjectId],
        mode: DeleteMode,
    ) -> GraphResult<Vec<GraphDelta>> {
        let mut vertices = BTreeSet::new();
        let mut edges = BTreeSet::new();
        let mut faces = BTreeSet::new();
        let mut selected_edges = BTreeSet::new();

        for id in element_ids {
            let id = id.abs();
            match self.element_kind(id) {
                Some(ElementKind::Vertex) => {
                    vertices.insert(id);
                    edges.extend(self.adjacent_edges(id));
                }
                Some(ElementKind::Edge) => {
                    edges.insert(id);
                    selected_edges.insert(id);
                }
                Some(ElementKind::Face) => {
                    faces.insert(id);
                }
                None => return Err(GraphError::ElementNotFound(id)),
            }
        }

        let mut joins = Vec::new();
        let mut joined = BTreeSet::new();
        if mode == DeleteMode::AttemptJoin {
            for edge_id in &selected_edges {
                if let Some((loop_ids, parents)) = self.join_across(*edge_id, &edges, &faces, &joined) {
                    joined.extend(parents);
                    joins.push((ids.next_id()?, loop_ids, parents));
                }
            }
        }

        for edge_id in &edges {
            faces.extend(self.adjacent_faces(*edge_id));
        }
        for edge_id in &edges {
            let edge = self.find_edge(*edge_id).ok_or(GraphError::EdgeNotFound(*edge_id))?;
            for v in [edge.start, edge.end] {
                if self.adjacent_edges(v).iter().all(|e| edges.contains(e)) {
                    vertices.insert(v);
                }
            }
        }

        let mut delta = GraphDelta::new(self.id());
        let join_of = |face_id: ObjectId| {
            joins
                .iter()
                .find(|(_, _, parents)| parents.contains(&face_id))
                .map(|(id, _, _)| *id)
        };

        for face_id in &faces {
            let face = self.find_face(*face_id).ok_or(GraphError::FaceNotFound(*face_id))?;
            delta.face_deletions.insert(
                *face_id,
                ElementDelta::new(face.vertex_ids.clone()).with_containing(face.containing_face),
            );
            for child in &face.contained_faces {
                if !faces.contains(child) {
                    delta.face_containment_updates.insert(
                        *child,
                        ContainmentUpdate {
                            old: Some(*face_id),
                            new: join_of(*face_id),
                        },
                    );
                }
            }
        }
        for edge_id in &edges {
            let edge = self.find_edge(*edge_id).ok_or(GraphError::EdgeNotFound(*edge_id))?;
            delta
                .edge_deletions
                .insert(*edge_id, ElementDelta::new(vec![edge.start, edge.end]));
        }
        for vertex_id in &vertices {
            delta
                .vertex_deletions
                .insert(*vertex_id, self.vertex_position(*vertex_id)?);
        }
        for (join_id, loop_ids, parents) in &joins {
            let containing = self
                .find_face(parents[0])
                .and_then(|f| f.containing_face)
                .filter(|c| !faces.contains(c));
            delta.face_additions.insert(
                *join_id,
                ElementDelta::new(loop_ids.clone())
                    .with_parents(parents.to_vec())
                    .with_containing(containing),
            );
        }

        if delta.is_empty() {
            return Ok(Vec::new());
        }
        self.validate_delta(&delta)?;
        Ok(vec![delta])
    }

    /// Delete every element of the graph
    pub fn delta_for_delete_all(&self) -> GraphDelta {
        let mut delta = GraphDelta::new(self.id());
        for (id, face) in self.faces() {
            delta.face_deletions.insert(
                *id,
                ElementDelta::new(face.vertex_ids.clone()).with_containing(face.containing_face),
            );
        }
        for (id, edge) in self.edges() {
            delta
                .edge_deletions
                .insert(*id, ElementDelta::new(vec![edge.start, edge.end]));
        }
        for (id, vertex) in self.vertices() {
            delta.vertex_deletions.insert(*id, vertex.position);
        }
        delta
    }

    fn join_across(
        &self,
        edge_id: ObjectId,
        deleted_edges: &BTreeSet<ObjectId>,
        deleted_faces: &BTreeSet<ObjectId>,
        joined: &BTreeSet<ObjectId>,
    ) -> Option<(Vec<ObjectId>, [ObjectId; 2])> {
        let edge = self.find_edge(edge_id)?;
        let adjacent = self.adjacent_faces(edge_id);
        let &[first, second] = adjacent.as_slice() else {
            return None;
        };
        if [first, second]
            .iter()
            .any(|f| deleted_faces.contains(f) || joined.contains(f))
        {
            return None;
        }

        let a = self.find_face(first)?;
        let b = self.find_face(second)?;
        if !a.plane.is_coplanar(&b.plane, self.epsilon())
            || a.containing_face == Some(second)
            || b.containing_face == Some(first)
        {
            return None;
        }

        let a_edges: BTreeSet<_> = a.edge_ids.iter().map(|e| e.abs()).collect();
        let shared: Vec<_> = b.edge_ids.iter().map(|e| e.abs()).filter(|e| a_edges.contains(e)).collect();
        if shared != [edge_id] {
            return None;
        }

        let merged = join_loops(&a.vertex_ids, &b.vertex_ids, edge.start, edge.end)?;
        let n = merged.len();
        let uses_deleted_edge = (0..n).any(|i| {
            self.find_edge_by_vertices(merged[i], merged[(i + 1) % n])
                .map(|e| deleted_edges.contains(&e))
                .unwrap_or(true)
        });
        if uses_deleted_edge {
            return None;
        }

        Some((merged, [first, second]))
    }
}

/// Path around a loop that avoids the edge `u`-`v`, from one endpoint to the other
fn open_at(vertex_loop: &[ObjectId], u: ObjectId, v: ObjectId) -> Option<Vec<ObjectId>> {
    let n = vertex_loop.len();
    let i = (0..n).find(|i| {
        let (a, b) = (vertex_loop[*i], vertex_loop[(i + 1) % n]);
        (a == u && b == v) || (a == v && b == u)
    })?;
    Some((1..=n).map(|k| vertex_loop[(i + k) % n]).collect())
}

/// Union of two loops sharing the edge `u`-`v`
fn join_loops(a: &[ObjectId], b: &[ObjectId], u: ObjectId, v: ObjectId) -> Option<Vec<ObjectId>> {
    let path_a = open_at(a, u, v)?;
    let mut path_b = open_at(b, u, v)?;

    let a_end = *path_a.last()?;
    if path_b.first() != Some(&a_end) {
        path_b.reverse();
    }

    let mut merged = path_a;
    merged.extend_from_slice(&path_b[1..path_b.len() - 1]);

    let distinct: BTreeSet<_> = merged.iter().collect();
    (distinct.len() == merged.len()).then_some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphKind;
    use massing_common::point;

    fn graph_with(ids: &mut IdAllocator, build: impl FnOnce(&mut DeltaBuilder)) -> Graph {
        let mut graph = Graph::new(1000, GraphKind::Volume, 1e-6);
        let mut builder = DeltaBuilder::new(&graph, ids);
        build(&mut builder);
        for delta in builder.finish() {
            graph.apply_delta(&delta).unwrap();
        }
        graph
    }

    #[test]
    fn test_join_loops() {
        // 1-2-3-4 and 2-5-6-3 share edge 2-3
        let merged = join_loops(&[1, 2, 3, 4], &[2, 5, 6, 3], 2, 3).unwrap();
        assert_eq!(merged.len(), 6);
        assert!(crate::face::same_loop(&merged, &[1, 2, 5, 6, 3, 4]));
    }

    #[test]
    fn test_vertex_reuse() {
        let mut ids = IdAllocator::new(0).unwrap();
        let graph = graph_with(&mut ids, |b| {
            b.add_vertex(point(0.0, 0.0, 0.0)).unwrap();
        });

        let (deltas, id) = graph
            .delta_for_vertex_addition(&mut ids, point(0.0, 0.0, 1e-9))
            .unwrap();
        assert!(deltas.is_empty());
        assert_eq!(Some(id), graph.find_vertex_by_position(&point(0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_edge_split_by_new_vertex() {
        let mut ids = IdAllocator::new(0).unwrap();
        let mut graph = graph_with(&mut ids, |b| {
            b.add_edge(point(0.0, 0.0, 0.0), point(2.0, 0.0, 0.0), &[]).unwrap();
        });
        let original_edge = *graph.edges().keys().next().unwrap();

        let (deltas, _) = graph
            .delta_for_vertex_addition(&mut ids, point(1.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].successors()[&original_edge].len(), 2);

        for delta in &deltas {
            graph.apply_delta(delta).unwrap();
        }
        assert_eq!(graph.counts(), (3, 2, 0));
        graph.validate().unwrap();
    }

    #[test]
    fn test_edge_through_existing_vertex() {
        let mut ids = IdAllocator::new(0).unwrap();
        let mut graph = graph_with(&mut ids, |b| {
            b.add_vertex(point(1.0, 0.0, 0.0)).unwrap();
        });

        let (deltas, edges) = graph
            .deltas_for_edge_addition(&mut ids, point(0.0, 0.0, 0.0), point(3.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(edges.len(), 2);
        for delta in &deltas {
            graph.apply_delta(delta).unwrap();
        }
        assert_eq!(graph.counts(), (3, 2, 0));
    }

    #[test]
    fn test_face_split_keeps_face_valid() {
        let mut ids = IdAllocator::new(0).unwrap();
        let mut graph = graph_with(&mut ids, |b| {
            b.add_face(
                &[
                    point(0.0, 0.0, 0.0),
                    point(2.0, 0.0, 0.0),
                    point(2.0, 2.0, 0.0),
                    point(0.0, 2.0, 0.0),
                ],
                &[],
                None,
            )
            .unwrap();
        });
        let old_face = *graph.faces().keys().next().unwrap();

        let (deltas, _) = graph
            .delta_for_vertex_addition(&mut ids, point(1.0, 0.0, 0.0))
            .unwrap();
        for delta in &deltas {
            graph.apply_delta(delta).unwrap();
        }

        assert!(graph.find_face(old_face).is_none());
        let face = graph.faces().values().next().unwrap();
        assert_eq!(face.vertex_ids.len(), 5);
        graph.validate().unwrap();
    }

    #[test]
    fn test_delete_edge_pure_removes_faces_and_orphans() {
        let mut ids = IdAllocator::new(0).unwrap();
        let mut graph = graph_with(&mut ids, |b| {
            b.add_face(
                &[point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0), point(0.0, 1.0, 0.0)],
                &[],
                None,
            )
            .unwrap();
        });
        let edge = graph
            .find_edge_by_vertices(
                graph.find_vertex_by_position(&point(0.0, 0.0, 0.0)).unwrap(),
                graph.find_vertex_by_position(&point(1.0, 0.0, 0.0)).unwrap(),
            )
            .unwrap();

        let deltas = graph
            .deltas_for_delete_objects(&mut ids, &[edge], DeleteMode::Pure)
            .unwrap();
        for delta in &deltas {
            graph.apply_delta(delta).unwrap();
        }
        assert_eq!(graph.counts(), (3, 2, 0));
    }

    #[test]
    fn test_delete_edge_attempt_join() {
        let mut ids = IdAllocator::new(0).unwrap();
        let mut graph = graph_with(&mut ids, |b| {
            b.add_face(
                &[point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0), point(1.0, 1.0, 0.0), point(0.0, 1.0, 0.0)],
                &[],
                None,
            )
            .unwrap();
            b.add_face(
                &[point(1.0, 0.0, 0.0), point(2.0, 0.0, 0.0), point(2.0, 1.0, 0.0), point(1.0, 1.0, 0.0)],
                &[],
                None,
            )
            .unwrap();
        });
        assert_eq!(graph.counts(), (6, 7, 2));

        let shared = graph
            .find_edge_by_vertices(
                graph.find_vertex_by_position(&point(1.0, 0.0, 0.0)).unwrap(),
                graph.find_vertex_by_position(&point(1.0, 1.0, 0.0)).unwrap(),
            )
            .unwrap();
        let old_faces: Vec<_> = graph.faces().keys().copied().collect();

        let deltas = graph
            .deltas_for_delete_objects(&mut ids, &[shared], DeleteMode::AttemptJoin)
            .unwrap();
        let successors = deltas[0].successors();
        for delta in &deltas {
            graph.apply_delta(delta).unwrap();
        }

        assert_eq!(graph.counts(), (6, 6, 1));
        let joined = *graph.faces().keys().next().unwrap();
        assert_eq!(successors[&old_faces[0]], vec![joined]);
        assert_eq!(successors[&old_faces[1]], vec![joined]);
        graph.validate().unwrap();
    }

    #[test]
    fn test_delete_unknown_id() {
        let mut ids = IdAllocator::new(0).unwrap();
        let graph = Graph::new(1, GraphKind::Volume, 1e-6);
        assert_eq!(
            graph.deltas_for_delete_objects(&mut ids, &[42], DeleteMode::Pure),
            Err(GraphError::ElementNotFound(42))
        );
    }

    #[test]
    fn test_delete_all_then_inverse() {
        let mut ids = IdAllocator::new(0).unwrap();
        let mut graph = graph_with(&mut ids, |b| {
            b.add_face(
                &[point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0), point(0.0, 1.0, 0.0)],
                &[],
                None,
            )
            .unwrap();
        });
        let before = graph.clone();

        let delta = graph.delta_for_delete_all();
        graph.apply_delta(&delta).unwrap();
        assert!(graph.is_empty());
        graph.apply_delta(&delta.make_inverse()).unwrap();
        assert_eq!(graph, before);
    }

    #[test]
    fn test_vertex_movement_delta() {
        let mut ids = IdAllocator::new(0).unwrap();
        let mut graph = graph_with(&mut ids, |b| {
            b.add_edge(point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0), &[]).unwrap();
        });
        let v = graph.find_vertex_by_position(&point(1.0, 0.0, 0.0)).unwrap();

        let moves = BTreeMap::from([(v, point(1.0, 5.0, 0.0))]);
        let delta = graph.delta_for_vertex_movements(&moves).unwrap();
        graph.apply_delta(&delta).unwrap();
        assert_eq!(graph.vertex_position(v).unwrap(), point(1.0, 5.0, 0.0));
    }
}

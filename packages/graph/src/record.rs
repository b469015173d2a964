//! Serializable graph snapshots, whole or partial, and pasting them back.

use crate::delta::{ElementDelta, ElementKind, GraphDelta};
use crate::errors::{GraphError, GraphResult};
use crate::graph::{Graph, GraphKind};
use crate::operations::DeltaBuilder;
use massing_common::{IdAllocator, IdRemap, ObjectId, Point};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub vertices: Vec<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containing: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub id: ObjectId,
    pub kind: GraphKind,
    #[serde(default)]
    pub vertices: BTreeMap<ObjectId, Point>,
    #[serde(default)]
    pub edges: BTreeMap<ObjectId, [ObjectId; 2]>,
    #[serde(default)]
    pub faces: BTreeMap<ObjectId, FaceRecord>,
}

impl GraphRecord {
    pub fn new(id: ObjectId, kind: GraphKind) -> Self {
        Self {
            id,
            kind,
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            faces: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.edges.is_empty() && self.faces.is_empty()
    }

    pub fn element_count(&self) -> usize {
        self.vertices.len() + self.edges.len() + self.faces.len()
    }

    fn position(&self, id: ObjectId) -> GraphResult<Point> {
        self.vertices.get(&id).copied().ok_or(GraphError::VertexNotFound(id))
    }

    /// Faces ordered so that every containing face precedes its children
    fn faces_in_containment_order(&self) -> Vec<(ObjectId, &FaceRecord)> {
        let mut ordered = Vec::with_capacity(self.faces.len());
        let mut placed = BTreeSet::new();
        while ordered.len() < self.faces.len() {
            let before = ordered.len();
            for (id, face) in &self.faces {
                if placed.contains(id) {
                    continue;
                }
                let ready = match face.containing {
                    Some(parent) => !self.faces.contains_key(&parent) || placed.contains(&parent),
                    None => true,
                };
                if ready {
                    placed.insert(*id);
                    ordered.push((*id, face));
                }
            }
            if ordered.len() == before {
                // Containment cycle; place the rest as they come
                for (id, face) in &self.faces {
                    if placed.insert(*id) {
                        ordered.push((*id, face));
                    }
                }
            }
        }
        ordered
    }
}

impl Graph {
    pub fn save(&self) -> GraphRecord {
        let mut record = GraphRecord::new(self.id(), self.kind());
        for (id, vertex) in self.vertices() {
            record.vertices.insert(*id, vertex.position);
        }
        for (id, edge) in self.edges() {
            record.edges.insert(*id, [edge.start, edge.end]);
        }
        for (id, face) in self.faces() {
            record.faces.insert(
                *id,
                FaceRecord {
                    vertices: face.vertex_ids.clone(),
                    containing: face.containing_face,
                },
            );
        }
        record
    }

    /// Minimal record holding the given elements and everything they rest on
    ///
    /// Faces bring their boundary and the faces they contain; edges bring
    /// their vertices.
    pub fn save_subset(&self, ids: &[ObjectId]) -> GraphResult<GraphRecord> {
        let mut faces = BTreeSet::new();
        let mut edges = BTreeSet::new();
        let mut vertices = BTreeSet::new();

        let mut pending: Vec<ObjectId> = ids.iter().map(|id| id.abs()).collect();
        while let Some(id) = pending.pop() {
            match self.element_kind(id) {
                Some(ElementKind::Face) => {
                    if faces.insert(id) {
                        let face = self.find_face(id).ok_or(GraphError::FaceNotFound(id))?;
                        edges.extend(face.edge_ids.iter().map(|e| e.abs()));
                        vertices.extend(face.vertex_ids.iter().copied());
                        pending.extend(face.contained_faces.iter().copied());
                    }
                }
                Some(ElementKind::Edge) => {
                    edges.insert(id);
                }
                Some(ElementKind::Vertex) => {
                    vertices.insert(id);
                }
                None => return Err(GraphError::ElementNotFound(id)),
            }
        }

        for edge_id in &edges {
            let edge = self.find_edge(*edge_id).ok_or(GraphError::EdgeNotFound(*edge_id))?;
            vertices.insert(edge.start);
            vertices.insert(edge.end);
        }

        let mut record = GraphRecord::new(self.id(), self.kind());
        for id in vertices {
            record.vertices.insert(id, self.vertex_position(id)?);
        }
        for id in edges {
            let edge = self.find_edge(id).ok_or(GraphError::EdgeNotFound(id))?;
            record.edges.insert(id, [edge.start, edge.end]);
        }
        for id in &faces {
            let face = self.find_face(*id).ok_or(GraphError::FaceNotFound(*id))?;
            record.faces.insert(
                *id,
                FaceRecord {
                    vertices: face.vertex_ids.clone(),
                    containing: face.containing_face.filter(|c| faces.contains(c)),
                },
            );
        }
        Ok(record)
    }

    /// Single delta that recreates a record with its original ids
    pub fn delta_for_load(&self, record: &GraphRecord) -> GraphDelta {
        let mut delta = GraphDelta::new(self.id());
        delta.vertex_additions = record.vertices.clone();
        for (id, [start, end]) in &record.edges {
            delta
                .edge_additions
                .insert(*id, ElementDelta::new(vec![*start, *end]));
        }
        for (id, face) in &record.faces {
            delta.face_additions.insert(
                *id,
                ElementDelta::new(face.vertices.clone()).with_containing(face.containing),
            );
        }
        delta
    }

    /// Rebuild a graph from a record, ids preserved
    pub fn load(record: &GraphRecord, epsilon: f64) -> GraphResult<Graph> {
        let mut graph = Graph::new(record.id, record.kind, epsilon);
        let delta = graph.delta_for_load(record);
        graph.apply_delta(&delta)?;
        Ok(graph)
    }

    /// Re-add a record's geometry at an offset with fresh ids
    ///
    /// Geometry is matched by position, so pasted elements merge with
    /// coincident ones already in this graph. With `link_parents` every new
    /// element names the record element it came from as its parent.
    pub fn deltas_for_paste(
        &self,
        ids: &mut IdAllocator,
        record: &GraphRecord,
        offset: Point,
        link_parents: bool,
    ) -> GraphResult<(Vec<GraphDelta>, IdRemap)> {
        let mut builder = DeltaBuilder::new(self, ids);
        let mut remap = IdRemap::new();
        let parents = |id: ObjectId| if link_parents { vec![id] } else { Vec::new() };

        for (id, position) in &record.vertices {
            let new_id = builder.add_vertex(position + offset)?;
            remap.insert(*id, new_id);
        }

        for (id, [start, end]) in &record.edges {
            let a = record.position(*start)? + offset;
            let b = record.position(*end)? + offset;
            let (_, edge_ids) = builder.add_edge(a, b, &parents(*id))?;
            for edge_id in edge_ids {
                remap.insert(*id, edge_id);
            }
        }

        for (id, face) in record.faces_in_containment_order() {
            let positions = face
                .vertices
                .iter()
                .map(|v| record.position(*v).map(|p| p + offset))
                .collect::<GraphResult<Vec<_>>>()?;
            let containing = face.containing.and_then(|c| remap.get(c));
            let new_id = builder.add_face(&positions, &parents(id), containing)?;
            remap.insert(id, new_id);
        }

        // Splits during later steps can replace elements remapped earlier
        let final_graph = builder.graph().clone();
        let deltas = builder.finish();
        let remap = follow_successors(remap, &deltas, &final_graph);

        Ok((deltas, remap))
    }
}

/// Re-point remap entries whose target was itself replaced by a later delta
fn follow_successors(remap: IdRemap, deltas: &[GraphDelta], graph: &Graph) -> IdRemap {
    let mut successors: BTreeMap<ObjectId, Vec<ObjectId>> = BTreeMap::new();
    for delta in deltas {
        for (parent, children) in delta.successors() {
            successors.entry(parent).or_default().extend(children);
        }
    }

    let mut resolved = IdRemap::new();
    for (old, news) in remap.iter() {
        let mut frontier: Vec<ObjectId> = news.to_vec();
        let mut seen = BTreeSet::new();
        while let Some(id) = frontier.pop() {
            if !seen.insert(id) {
                continue;
            }
            if graph.contains(id) {
                resolved.insert(old, id);
            } else if let Some(next) = successors.get(&id) {
                frontier.extend(next.iter().rev());
            }
        }
    }
    resolved
}

//! Position-based graph edits committed as document batches.

use crate::context::Context;
use crate::delta::{Delta, ObjectDelta};
use crate::document::{CommittedBatch, Document};
use crate::errors::{DocumentError, DocumentResult};
use crate::object::{ObjectKind, ObjectState, SURFACE_GRAPH_TAG};
use massing_common::{ObjectId, Point};
use massing_graph::{DeleteMode, ElementKind, Graph, GraphDelta, GraphKind};
use std::collections::BTreeMap;

fn graph_deltas(deltas: Vec<GraphDelta>) -> Vec<Delta> {
    deltas.into_iter().map(Delta::from).collect()
}

impl Document {
    pub(crate) fn graph_for_edit(&self, graph_id: ObjectId) -> DocumentResult<&Graph> {
        self.state.require_graph(graph_id)
    }

    pub fn add_vertex(&mut self, ctx: &Context, graph_id: ObjectId, position: Point) -> DocumentResult<ObjectId> {
        self.clear_preview_deltas();
        let mut ids = self.ids.clone();
        let (deltas, vertex) = self
            .graph_for_edit(graph_id)?
            .delta_for_vertex_addition(&mut ids, position)?;
        self.apply_deltas(ctx, graph_deltas(deltas))?;
        Ok(vertex)
    }

    /// Edges created between `a` and `b`, more than one when existing
    /// vertices split the segment
    pub fn add_edge(&mut self, ctx: &Context, graph_id: ObjectId, a: Point, b: Point) -> DocumentResult<Vec<ObjectId>> {
        self.clear_preview_deltas();
        let mut ids = self.ids.clone();
        let (deltas, edges) = self
            .graph_for_edit(graph_id)?
            .deltas_for_edge_addition(&mut ids, a, b)?;
        self.apply_deltas(ctx, graph_deltas(deltas))?;
        Ok(edges)
    }

    pub fn add_face(
        &mut self,
        ctx: &Context,
        graph_id: ObjectId,
        positions: &[Point],
        containing: Option<ObjectId>,
    ) -> DocumentResult<ObjectId> {
        self.clear_preview_deltas();
        let mut ids = self.ids.clone();
        let (deltas, face) = self
            .graph_for_edit(graph_id)?
            .deltas_for_face_addition(&mut ids, positions, containing)?;
        self.apply_deltas(ctx, graph_deltas(deltas))?;
        Ok(face)
    }

    /// Attach an empty surface graph to a volume face
    pub fn create_surface_graph(&mut self, ctx: &Context, host_id: ObjectId) -> DocumentResult<ObjectId> {
        self.clear_preview_deltas();
        let host = self.state.object(host_id)?;
        if host.kind.wrapped() != Some((GraphKind::Volume, ElementKind::Face)) {
            return Err(DocumentError::InvalidOperation(format!(
                "surface graphs sit on volume faces, {} is a {}",
                host_id,
                host.kind.name()
            )));
        }
        if self.state.find_surface_graph_by_host(host_id).is_some() {
            return Err(DocumentError::Structural(format!("face {} already has a surface graph", host_id)));
        }

        let mut ids = self.ids.clone();
        let graph_id = ids.next_id()?;
        let mut objects = ObjectDelta::new();
        objects.create(ObjectState::new(graph_id, host_id, ObjectKind::SurfaceGraph, SURFACE_GRAPH_TAG));
        self.apply_deltas(ctx, vec![Delta::add_graph(graph_id, GraphKind::Surface), objects.into()])?;
        Ok(graph_id)
    }

    pub fn move_vertices(
        &mut self,
        ctx: &Context,
        graph_id: ObjectId,
        moves: &BTreeMap<ObjectId, Point>,
    ) -> DocumentResult<CommittedBatch> {
        self.clear_preview_deltas();
        let delta = self.graph_for_edit(graph_id)?.delta_for_vertex_movements(moves)?;
        self.apply_deltas(ctx, vec![delta.into()])
    }

    /// Delete graph elements and any non-wrapper objects among `ids`
    ///
    /// Elements are grouped per graph; whatever hangs off them is cleaned
    /// up by consistency derivation.
    pub fn delete_objects(&mut self, ctx: &Context, ids: &[ObjectId], mode: DeleteMode) -> DocumentResult<CommittedBatch> {
        self.clear_preview_deltas();
        let mut per_graph: BTreeMap<ObjectId, Vec<ObjectId>> = BTreeMap::new();
        let mut objects = Vec::new();
        for id in ids {
            match self.state.graph_of_element(*id) {
                Some(graph) => per_graph.entry(graph.id()).or_default().push(*id),
                None if self.state.get_object(*id).is_some() => objects.push(*id),
                None => return Err(DocumentError::ObjectNotFound(*id)),
            }
        }

        let mut allocator = self.ids.clone();
        let mut deltas = Vec::new();
        for (graph_id, element_ids) in per_graph {
            let graph = self.state.require_graph(graph_id)?;
            deltas.extend(graph_deltas(graph.deltas_for_delete_objects(&mut allocator, &element_ids, mode)?));
        }

        let mut destroy = ObjectDelta::new();
        for id in objects {
            if id == self.state.root_group_id() {
                return Err(DocumentError::RootGroup("deleted"));
            }
            self.destroy_subtree_into(id, &mut destroy)?;
        }
        if !destroy.is_empty() {
            deltas.push(destroy.into());
        }

        self.apply_deltas(ctx, deltas)
    }

    /// Destroy changes for an object and everything below it, children first
    pub(crate) fn destroy_subtree_into(&self, id: ObjectId, delta: &mut ObjectDelta) -> DocumentResult<()> {
        let mut subtree = vec![id];
        subtree.extend(self.state.descendants_of(id));
        for object_id in subtree.into_iter().rev() {
            if delta.touches(object_id) {
                continue;
            }
            let object = self.state.object(object_id)?;
            // Wrappers go with their elements
            if object.kind.is_wrapper() {
                continue;
            }
            delta.destroy(object.clone());
        }
        Ok(())
    }
}

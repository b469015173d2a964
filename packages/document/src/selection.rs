//! # Copy and paste
//!
//! [`SelectionRecord`] is a self-contained snapshot of selected geometry and
//! the objects riding on it. Pasting re-derives the geometry in the target
//! graph, so it merges with whatever is already there, and every object
//! comes back with a fresh id.

use crate::context::Context;
use crate::delta::{Delta, ObjectDelta};
use crate::document::Document;
use crate::errors::{DocumentError, DocumentResult};
use crate::group::remap_members;
use crate::object::{ObjectKind, ObjectState};
use massing_common::{IdRemap, ObjectId, Point};
use massing_graph::{Graph, GraphKind, GraphRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRecord {
    /// Partial volume graphs keyed by their group id
    #[serde(default)]
    pub graphs: BTreeMap<ObjectId, GraphRecord>,
    /// Surface graphs keyed by graph id, whole when their object was selected
    #[serde(default)]
    pub surface_graphs: BTreeMap<ObjectId, GraphRecord>,
    /// Spans, hosted objects, surface graph objects and element wrappers
    #[serde(default)]
    pub objects: BTreeMap<ObjectId, ObjectState>,
}

impl SelectionRecord {
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty() && self.surface_graphs.is_empty() && self.objects.is_empty()
    }
}

fn record_element_ids(record: &GraphRecord) -> impl Iterator<Item = ObjectId> + '_ {
    record
        .vertices
        .keys()
        .chain(record.edges.keys())
        .chain(record.faces.keys())
        .copied()
}

/// One record holding every element of `records`, owned by `graph_id`
fn combine<'a>(graph_id: ObjectId, kind: GraphKind, records: impl Iterator<Item = &'a GraphRecord>) -> GraphRecord {
    let mut combined = GraphRecord::new(graph_id, kind);
    for record in records {
        combined.vertices.extend(record.vertices.iter().map(|(id, p)| (*id, *p)));
        combined.edges.extend(record.edges.iter().map(|(id, e)| (*id, *e)));
        combined.faces.extend(record.faces.iter().map(|(id, f)| (*id, f.clone())));
    }
    combined
}

impl Document {
    /// Snapshot the given ids for a later [`Document::paste_objects`]
    ///
    /// Elements bring what they rest on, spans bring their members and child,
    /// hosted objects bring their host, and a surface graph object brings its
    /// whole graph and the face it sits on. Other ids are skipped. A live
    /// preview is discarded first, so only committed state is saved.
    pub fn save_selection(&mut self, ids: &[ObjectId]) -> DocumentResult<SelectionRecord> {
        self.clear_preview_deltas();
        let state = &self.state;
        let mut volume: BTreeMap<ObjectId, Vec<ObjectId>> = BTreeMap::new();
        let mut surface: BTreeMap<ObjectId, Vec<ObjectId>> = BTreeMap::new();
        let mut whole_surfaces = BTreeSet::new();
        let mut record = SelectionRecord::default();

        let mut pending = ids.to_vec();
        let mut seen = BTreeSet::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(graph) = state.graph_of_element(id) {
                let members = match graph.kind() {
                    GraphKind::Volume => volume.entry(graph.id()).or_default(),
                    GraphKind::Surface => surface.entry(graph.id()).or_default(),
                };
                members.push(id);
                continue;
            }

            let object = state.object(id)?;
            match &object.kind {
                ObjectKind::Span { members, .. } => {
                    pending.extend(members.iter().copied());
                    pending.extend(state.children_of(id));
                }
                ObjectKind::Hosted => pending.push(object.parent_id),
                ObjectKind::SurfaceGraph => {
                    whole_surfaces.insert(id);
                    pending.push(object.parent_id);
                }
                other => {
                    debug!(id, kind = other.name(), "not copyable, skipped");
                    continue;
                }
            }
            record.objects.insert(id, object.clone());
        }

        for (graph_id, members) in volume {
            let saved = state.require_graph(graph_id)?.save_subset(&members)?;
            record.graphs.insert(graph_id, saved);
        }
        for graph_id in whole_surfaces {
            surface.remove(&graph_id);
            record.surface_graphs.insert(graph_id, state.require_graph(graph_id)?.save());
        }
        for (graph_id, members) in surface {
            let saved = state.require_graph(graph_id)?.save_subset(&members)?;
            record.surface_graphs.insert(graph_id, saved);
        }

        let saved_ids: Vec<ObjectId> = record
            .graphs
            .values()
            .chain(record.surface_graphs.values())
            .flat_map(record_element_ids)
            .collect();
        for id in saved_ids {
            if let Some(wrapper) = state.get_object(id) {
                record.objects.insert(id, wrapper.clone());
            }
        }
        Ok(record)
    }

    /// Paste a saved selection at an offset
    ///
    /// Volume geometry lands in the active group and surface graphs follow
    /// their pasted host faces. A selection holding only surface geometry
    /// lands in the active surface graph instead. Returns old → new ids.
    pub fn paste_objects(&mut self, ctx: &Context, record: &SelectionRecord, offset: Point) -> DocumentResult<IdRemap> {
        self.clear_preview_deltas();
        if record.is_empty() {
            return Ok(IdRemap::new());
        }
        let state = &self.state;
        let mut ids = self.ids.clone();
        let mut deltas = Vec::new();
        let mut remap = IdRemap::new();
        let mut objects = ObjectDelta::new();
        // Graph id in the record → graph id it lands in
        let mut landing: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();

        if !record.graphs.is_empty() {
            let target_id = self.active_group();
            let target = state.require_graph(target_id)?;
            let combined = combine(target_id, GraphKind::Volume, record.graphs.values());
            let (pasted, elements) = target.deltas_for_paste(&mut ids, &combined, offset, false)?;
            deltas.extend(pasted.into_iter().map(Delta::from));
            self.copy_wrappers(&record.objects, &elements, target_id, GraphKind::Volume, &mut objects);
            remap.extend(&elements);
            landing.extend(record.graphs.keys().map(|id| (*id, target_id)));

            let mut hosts = BTreeSet::new();
            for (graph_id, saved) in &record.surface_graphs {
                let Some(owner) = record
                    .objects
                    .get(graph_id)
                    .filter(|owner| owner.kind == ObjectKind::SurfaceGraph)
                else {
                    continue;
                };
                let Some(host) = remap.get(owner.parent_id) else {
                    continue;
                };
                if state.find_surface_graph_by_host(host).is_some() || !hosts.insert(host) {
                    debug!(host, "face already carries a surface graph, skipped");
                    continue;
                }

                let new_id = ids.next_id()?;
                let graph = Graph::new(new_id, GraphKind::Surface, state.epsilon());
                let (pasted, elements) = graph.deltas_for_paste(&mut ids, saved, offset, false)?;
                deltas.push(Delta::add_graph(new_id, GraphKind::Surface));
                deltas.extend(pasted.into_iter().map(Delta::from));

                let mut copy = owner.clone();
                copy.id = new_id;
                copy.parent_id = host;
                objects.create(copy);
                self.copy_wrappers(&record.objects, &elements, new_id, GraphKind::Surface, &mut objects);
                remap.insert(*graph_id, new_id);
                remap.extend(&elements);
                landing.insert(*graph_id, new_id);
            }
        } else if let Some(target_id) = self.active_surface_graph() {
            let target = state.require_graph(target_id)?;
            let combined = combine(target_id, GraphKind::Surface, record.surface_graphs.values());
            let (pasted, elements) = target.deltas_for_paste(&mut ids, &combined, offset, false)?;
            deltas.extend(pasted.into_iter().map(Delta::from));
            self.copy_wrappers(&record.objects, &elements, target_id, GraphKind::Surface, &mut objects);
            remap.extend(&elements);
            landing.extend(record.surface_graphs.keys().map(|id| (*id, target_id)));
        } else {
            return Err(DocumentError::InvalidOperation(
                "surface geometry needs an active surface graph to paste into".to_string(),
            ));
        }

        // Spans before hosted objects, which may hang off them
        for saved in record.objects.values() {
            let ObjectKind::Span { element, members } = &saved.kind else {
                continue;
            };
            let Some(graph_id) = landing.get(&saved.parent_id) else {
                continue;
            };
            let members = remap_members(&remap, members);
            if members.is_empty() {
                continue;
            }
            let new_id = ids.next_id()?;
            let mut copy = saved.clone();
            copy.id = new_id;
            copy.parent_id = *graph_id;
            copy.kind = ObjectKind::Span {
                element: *element,
                members,
            };
            objects.create(copy);
            remap.insert(saved.id, new_id);
        }
        for saved in record.objects.values() {
            if saved.kind != ObjectKind::Hosted {
                continue;
            }
            let parent_id = remap.get(saved.parent_id).unwrap_or(self.active_group());
            let new_id = ids.next_id()?;
            let mut copy = saved.clone();
            copy.id = new_id;
            copy.parent_id = parent_id;
            objects.create(copy);
            remap.insert(saved.id, new_id);
        }

        deltas.push(objects.into());
        debug!(pasted = remap.len(), "pasting selection");
        self.apply_deltas(ctx, deltas)?;
        Ok(remap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentConfig;
    use massing_common::point;

    fn square() -> [Point; 4] {
        [
            point(0.0, 0.0, 0.0),
            point(1.0, 0.0, 0.0),
            point(1.0, 1.0, 0.0),
            point(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_save_face_brings_boundary() {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let root = doc.root_group_id();
        let face = doc.add_face(&ctx, root, &square(), None).unwrap();

        let record = doc.save_selection(&[face]).unwrap();
        let saved = &record.graphs[&root];
        assert_eq!((saved.vertices.len(), saved.edges.len(), saved.faces.len()), (4, 4, 1));
        // One wrapper per element
        assert_eq!(record.objects.len(), 9);
    }

    #[test]
    fn test_group_ids_are_skipped() {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let group = doc.create_group(&ctx, doc.root_group_id()).unwrap();

        assert!(doc.save_selection(&[group]).unwrap().is_empty());
    }

    #[test]
    fn test_paste_offset_copies_payload() {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let root = doc.root_group_id();
        let face = doc.add_face(&ctx, root, &square(), None).unwrap();
        doc.propagate_payload(&ctx, face, "slab", b"concrete".to_vec()).unwrap();

        let record = doc.save_selection(&[face]).unwrap();
        let remap = doc.paste_objects(&ctx, &record, point(5.0, 0.0, 0.0)).unwrap();

        let pasted = remap.get(face).unwrap();
        assert_ne!(pasted, face);
        let wrapper = doc.get_object(pasted).unwrap();
        assert_eq!(wrapper.type_tag, "slab");
        assert_eq!(wrapper.payload, b"concrete".to_vec());
        assert_eq!(doc.find_volume_graph(root).unwrap().counts(), (8, 8, 2));
    }

    #[test]
    fn test_paste_span_with_child() {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let root = doc.root_group_id();
        let edges = doc
            .add_edge(&ctx, root, point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0))
            .unwrap();
        let (span, child) = doc.create_span(&ctx, &edges, "wall", "wall.props", b"{}".to_vec()).unwrap();

        let record = doc.save_selection(&[child]).unwrap();
        assert!(record.objects.contains_key(&span));
        let remap = doc.paste_objects(&ctx, &record, point(0.0, 3.0, 0.0)).unwrap();

        let new_span = remap.get(span).unwrap();
        let new_child = remap.get(child).unwrap();
        assert_eq!(doc.get_object(new_child).unwrap().parent_id, new_span);
        assert_eq!(
            doc.get_object(new_span).unwrap().span_members(),
            &[remap.get(edges[0]).unwrap()]
        );
        doc.check_invariants().unwrap();
    }
}

//! # Groups
//!
//! A group owns the volume graph that shares its id. Moving geometry between
//! groups goes through delete→move conversion, so the receiving graph
//! re-derives its elements from positions; every object that referred to a
//! moved element is then rewritten through the returned [`IdRemap`].

use crate::context::Context;
use crate::delta::{Delta, ObjectDelta, SymbolDelta};
use crate::document::Document;
use crate::errors::{DocumentError, DocumentResult};
use crate::object::{ObjectKind, ObjectState, GROUP_TAG};
use massing_common::{IdAllocator, IdRemap, ObjectId, Point, ID_NONE};
use massing_graph::{convert_graph_delete_to_move, DeleteMode, Graph, GraphKind};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// How equivalence sets absorb remapped ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetRewrite {
    /// New ids join the set next to the old ones (duplicate)
    Extend,
    /// New ids take the place of the old ones (move)
    Replace,
}

pub(crate) fn remapped(remap: &IdRemap, id: ObjectId) -> DocumentResult<ObjectId> {
    remap
        .get(id)
        .ok_or_else(|| DocumentError::InvariantViolation(format!("{} was not remapped", id)))
}

impl Document {
    pub fn create_group(&mut self, ctx: &Context, parent_id: ObjectId) -> DocumentResult<ObjectId> {
        self.clear_preview_deltas();
        self.require_group(parent_id)?;
        let mut ids = self.ids.clone();
        let group_id = ids.next_id()?;

        let mut objects = ObjectDelta::new();
        objects.create(ObjectState::new(group_id, parent_id, ObjectKind::Group, GROUP_TAG));
        self.apply_deltas(ctx, vec![Delta::add_graph(group_id, GraphKind::Volume), objects.into()])?;
        Ok(group_id)
    }

    /// Move elements of one volume graph into a new child group
    ///
    /// Faces take the edges only they use along with them; whatever the
    /// deletion removes from the source graph is recreated in the new one.
    pub fn create_group_from_elements(&mut self, ctx: &Context, element_ids: &[ObjectId]) -> DocumentResult<ObjectId> {
        self.clear_preview_deltas();
        let Some(first) = element_ids.first() else {
            return Err(DocumentError::InvalidOperation("no elements to group".to_string()));
        };
        let source = self
            .state
            .find_volume_graph(*first)
            .filter(|graph| graph.id() != *first)
            .ok_or(DocumentError::ObjectNotFound(*first))?;
        if let Some(stray) = element_ids.iter().find(|id| !source.contains(**id)) {
            return Err(DocumentError::InvalidOperation(format!(
                "{} is not in graph {}",
                stray,
                source.id()
            )));
        }

        let mut ids = self.ids.clone();
        let group_id = ids.next_id()?;
        let selection = exclusive_closure(source, element_ids);
        let deletions = source.deltas_for_delete_objects(&mut ids, &selection, DeleteMode::Pure)?;
        let removed: BTreeSet<ObjectId> = deletions.iter().flat_map(|d| d.removed_ids()).collect();
        let record = source.save_subset(&removed.iter().copied().collect::<Vec<_>>())?;

        let target = Graph::new(group_id, GraphKind::Volume, self.state.epsilon());
        let (additions, remap) = target.deltas_for_paste(&mut ids, &record, Point::zeros(), true)?;

        let mut deltas = vec![Delta::add_graph(group_id, GraphKind::Volume)];
        deltas.extend(additions.into_iter().map(Delta::from));
        deltas.extend(deletions.into_iter().map(Delta::from));

        let mut objects = ObjectDelta::new();
        objects.create(ObjectState::new(group_id, source.id(), ObjectKind::Group, GROUP_TAG));
        self.copy_wrappers(self.state.objects(), &remap, group_id, GraphKind::Volume, &mut objects);
        self.rehome_moved(&remap, &removed, group_id, &mut objects)?;
        deltas.push(objects.into());
        deltas.extend(self.symbol_remap_deltas(&remap, SetRewrite::Replace));

        debug!(group = group_id, elements = removed.len(), "grouping elements");
        self.apply_deltas(ctx, deltas)?;
        Ok(group_id)
    }

    /// Deep copy of a group next to the original
    ///
    /// Returns the new group id and the old→new table for every copied id.
    pub fn duplicate_group(&mut self, ctx: &Context, group_id: ObjectId, offset: Point) -> DocumentResult<(ObjectId, IdRemap)> {
        self.clear_preview_deltas();
        let group = self.require_group(group_id)?;
        if group.parent_id == ID_NONE {
            return Err(DocumentError::RootGroup("duplicated"));
        }
        let parent_id = group.parent_id;

        let mut ids = self.ids.clone();
        let (deltas, remap) = self.deltas_for_duplicate(&mut ids, group_id, parent_id, offset)?;
        let new_id = remapped(&remap, group_id)?;
        self.apply_deltas(ctx, deltas)?;
        Ok((new_id, remap))
    }

    /// Fold a group into its parent
    pub fn explode_group(&mut self, ctx: &Context, group_id: ObjectId) -> DocumentResult<IdRemap> {
        self.clear_preview_deltas();
        let group = self.require_group(group_id)?;
        if group.parent_id == ID_NONE {
            return Err(DocumentError::RootGroup("exploded"));
        }
        let parent_id = group.parent_id;
        self.merge_group_into(ctx, group_id, parent_id)
    }

    /// Fold a group into any group that is not inside it
    ///
    /// Child groups are reparented, the graph is converted into the target
    /// graph, and the group and its graph are removed.
    pub fn merge_group_into(&mut self, ctx: &Context, group_id: ObjectId, target_id: ObjectId) -> DocumentResult<IdRemap> {
        self.clear_preview_deltas();
        let group = self.require_group(group_id)?.clone();
        if group.parent_id == ID_NONE {
            return Err(DocumentError::RootGroup("merged"));
        }
        self.require_group(target_id)?;
        if target_id == group_id || self.state.is_descendant_of(target_id, group_id) {
            return Err(DocumentError::Structural(format!(
                "group {} cannot merge into {} which it contains",
                group_id, target_id
            )));
        }

        let mut ids = self.ids.clone();
        let source = self.state.require_graph(group_id)?;
        let target = self.state.require_graph(target_id)?;
        let deletion = source.delta_for_delete_all();
        let removed = deletion.removed_ids();

        let mut deltas = Vec::new();
        let mut remap = IdRemap::new();
        if !deletion.is_empty() {
            let (moves, moved) =
                convert_graph_delete_to_move(&[deletion.clone()], source, target, &mut ids, Point::zeros())?;
            remap = moved;
            deltas.extend(moves.into_iter().map(Delta::from));
            deltas.push(deletion.into());
        }

        let mut objects = ObjectDelta::new();
        self.copy_wrappers(self.state.objects(), &remap, target_id, GraphKind::Volume, &mut objects);
        self.rehome_moved(&remap, &removed, target_id, &mut objects)?;
        for child_id in self.state.children_of(group_id) {
            let child = self.state.object(child_id)?;
            let reparent = child.kind.is_group_like()
                || matches!(child.kind, ObjectKind::Hosted | ObjectKind::SurfaceGraph);
            if reparent && !objects.touches(child_id) {
                let mut moved = child.clone();
                moved.parent_id = target_id;
                objects.mutate(child.clone(), moved);
            }
        }
        objects.destroy(group.clone());
        deltas.push(objects.into());

        if let ObjectKind::SymbolInstance { template_id } = group.kind {
            let mut released: BTreeSet<ObjectId> = removed.clone();
            released.insert(group_id);
            deltas.extend(self.symbol_release_deltas(&released, Some(template_id)));
        } else {
            deltas.extend(self.symbol_remap_deltas(&remap, SetRewrite::Replace));
        }
        deltas.push(Delta::remove_graph(group_id, GraphKind::Volume));

        debug!(group = group_id, target = target_id, elements = removed.len(), "merging group");
        self.apply_deltas(ctx, deltas)?;
        Ok(remap)
    }

    pub(crate) fn require_group(&self, group_id: ObjectId) -> DocumentResult<&ObjectState> {
        let group = self.state.object(group_id)?;
        if !group.kind.is_group_like() {
            return Err(DocumentError::InvalidOperation(format!(
                "{} is a {}, not a group",
                group_id,
                group.kind.name()
            )));
        }
        Ok(group)
    }

    /// Deltas for a deep copy of `group_id` parented to `new_parent`
    pub(crate) fn deltas_for_duplicate(
        &self,
        ids: &mut IdAllocator,
        group_id: ObjectId,
        new_parent: ObjectId,
        offset: Point,
    ) -> DocumentResult<(Vec<Delta>, IdRemap)> {
        let state = &self.state;
        let mut subtree = vec![group_id];
        subtree.extend(state.descendants_of(group_id));

        let mut remap = IdRemap::new();
        let mut deltas = Vec::new();
        let mut objects = ObjectDelta::new();

        // Groups and their graphs, parents first
        for id in &subtree {
            if state.object(*id)?.kind.is_group_like() {
                remap.insert(*id, ids.next_id()?);
            }
        }
        for id in &subtree {
            let object = state.object(*id)?;
            if !object.kind.is_group_like() {
                continue;
            }
            let new_id = remapped(&remap, *id)?;
            let (graph_deltas, elements) = self.copy_graph(ids, *id, new_id, GraphKind::Volume, offset)?;
            deltas.push(Delta::add_graph(new_id, GraphKind::Volume));
            deltas.extend(graph_deltas);
            remap.extend(&elements);

            let mut copy = object.clone();
            copy.id = new_id;
            copy.parent_id = if *id == group_id {
                new_parent
            } else {
                remapped(&remap, object.parent_id)?
            };
            objects.create(copy);
        }

        for id in &subtree {
            let kind = &state.object(*id)?.kind;
            if matches!(kind, ObjectKind::Span { .. } | ObjectKind::Hosted | ObjectKind::SurfaceGraph) {
                remap.insert(*id, ids.next_id()?);
            }
        }

        // Surface graphs hang off copied elements, so they come second
        for id in &subtree {
            if state.object(*id)?.kind != ObjectKind::SurfaceGraph {
                continue;
            }
            let new_id = remapped(&remap, *id)?;
            let (graph_deltas, elements) = self.copy_graph(ids, *id, new_id, GraphKind::Surface, offset)?;
            deltas.push(Delta::add_graph(new_id, GraphKind::Surface));
            deltas.extend(graph_deltas);
            remap.extend(&elements);
        }

        for id in &subtree {
            let object = state.object(*id)?;
            if object.kind.is_group_like() {
                continue;
            }
            let parent_id = remapped(&remap, object.parent_id)?;
            if object.kind.is_wrapper() {
                for new_id in remap.get_all(*id) {
                    let mut copy = object.clone();
                    copy.id = *new_id;
                    copy.parent_id = parent_id;
                    objects.create(copy);
                }
                continue;
            }

            let mut copy = object.clone();
            copy.id = remapped(&remap, *id)?;
            copy.parent_id = parent_id;
            if let ObjectKind::Span { element, members } = &object.kind {
                copy.kind = ObjectKind::Span {
                    element: *element,
                    members: remap_members(&remap, members),
                };
            }
            objects.create(copy);
        }

        deltas.push(objects.into());
        deltas.extend(self.symbol_remap_deltas(&remap, SetRewrite::Extend));
        Ok((deltas, remap))
    }

    fn copy_graph(
        &self,
        ids: &mut IdAllocator,
        source_id: ObjectId,
        new_id: ObjectId,
        kind: GraphKind,
        offset: Point,
    ) -> DocumentResult<(Vec<Delta>, IdRemap)> {
        let source = self.state.require_graph(source_id)?;
        let target = Graph::new(new_id, kind, self.state.epsilon());
        let (deltas, remap) = target.deltas_for_paste(ids, &source.save(), offset, false)?;
        Ok((deltas.into_iter().map(Delta::from).collect(), remap))
    }

    /// Wrapper objects for moved elements, keeping tag and payload
    pub(crate) fn copy_wrappers(
        &self,
        source: &BTreeMap<ObjectId, ObjectState>,
        remap: &IdRemap,
        graph_id: ObjectId,
        kind: GraphKind,
        objects: &mut ObjectDelta,
    ) {
        for (old_id, new_ids) in remap.iter() {
            let Some(old) = source.get(&old_id) else {
                continue;
            };
            let Some((_, element)) = old.kind.wrapped() else {
                continue;
            };
            for new_id in new_ids {
                if self.state.get_object(*new_id).is_some() || objects.touches(*new_id) {
                    continue;
                }
                let mut copy = ObjectState::wrapper(*new_id, graph_id, kind, element);
                copy.type_tag = old.type_tag.clone();
                copy.payload = old.payload.clone();
                objects.create(copy);
            }
        }
    }

    /// Point hosted objects, surface graphs and spans at the replacements of
    /// removed elements
    pub(crate) fn rehome_moved(
        &self,
        remap: &IdRemap,
        removed: &BTreeSet<ObjectId>,
        graph_id: ObjectId,
        objects: &mut ObjectDelta,
    ) -> DocumentResult<()> {
        let mut new_hosts = BTreeSet::new();
        for object in self.state.objects().values() {
            match &object.kind {
                ObjectKind::Hosted | ObjectKind::SurfaceGraph if removed.contains(&object.parent_id) => {
                    let Some(host) = remap.get(object.parent_id) else {
                        continue;
                    };
                    if object.kind == ObjectKind::SurfaceGraph
                        && (self.state.find_surface_graph_by_host(host).is_some() || !new_hosts.insert(host))
                    {
                        continue;
                    }
                    let mut moved = object.clone();
                    moved.parent_id = host;
                    objects.mutate(object.clone(), moved);
                }
                ObjectKind::Span { element, members } if members.iter().any(|m| removed.contains(m)) => {
                    let all_moved = members.iter().all(|m| removed.contains(m));
                    let mut updated = object.clone();
                    let members = if all_moved {
                        updated.parent_id = graph_id;
                        remap_members(remap, members)
                    } else {
                        members.iter().copied().filter(|m| !removed.contains(m)).collect()
                    };
                    updated.kind = ObjectKind::Span {
                        element: *element,
                        members,
                    };
                    objects.mutate(object.clone(), updated);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Rewrite equivalence sets through `remap`
    pub(crate) fn symbol_remap_deltas(&self, remap: &IdRemap, rewrite: SetRewrite) -> Vec<Delta> {
        let mut claimed: BTreeSet<ObjectId> = self
            .state
            .symbols()
            .values()
            .flat_map(|template| template.all_ids())
            .collect();
        let mut deltas = Vec::new();

        for template in self.state.symbols().values() {
            let mut updated = template.clone();
            for set in updated.equivalent_ids.values_mut() {
                let old_ids: Vec<ObjectId> = set.iter().copied().filter(|id| remap.contains(*id)).collect();
                for old_id in old_ids {
                    if rewrite == SetRewrite::Replace {
                        set.remove(&old_id);
                    }
                    for new_id in remap.get_all(old_id) {
                        if claimed.insert(*new_id) {
                            set.insert(*new_id);
                        }
                    }
                }
            }
            updated.equivalent_ids.retain(|_, set| !set.is_empty());

            if updated != *template {
                let new = (!updated.equivalent_ids.is_empty()).then_some(updated);
                deltas.push(Delta::Symbol(SymbolDelta {
                    template_id: template.id,
                    old: Some(template.clone()),
                    new,
                }));
            }
        }
        deltas
    }

    /// Drop ids from equivalence sets, of one template or of all
    pub(crate) fn symbol_release_deltas(&self, released: &BTreeSet<ObjectId>, only: Option<ObjectId>) -> Vec<Delta> {
        let mut deltas = Vec::new();
        for template in self.state.symbols().values() {
            if only.is_some_and(|id| id != template.id) {
                continue;
            }
            let mut updated = template.clone();
            for set in updated.equivalent_ids.values_mut() {
                set.retain(|id| !released.contains(id));
            }
            updated.equivalent_ids.retain(|_, set| !set.is_empty());

            if updated != *template {
                let new = (!updated.equivalent_ids.is_empty()).then_some(updated);
                deltas.push(Delta::Symbol(SymbolDelta {
                    template_id: template.id,
                    old: Some(template.clone()),
                    new,
                }));
            }
        }
        deltas
    }
}

pub(crate) fn remap_members(remap: &IdRemap, members: &[ObjectId]) -> Vec<ObjectId> {
    let mut remapped = Vec::new();
    for member in members {
        for new_id in remap.get_all(*member) {
            if !remapped.contains(new_id) {
                remapped.push(*new_id);
            }
        }
    }
    remapped
}

/// Selected ids plus the edges used only by selected faces
fn exclusive_closure(graph: &Graph, selected: &[ObjectId]) -> Vec<ObjectId> {
    let faces: BTreeSet<ObjectId> = selected
        .iter()
        .copied()
        .filter(|id| graph.find_face(*id).is_some())
        .collect();
    let mut closure: BTreeSet<ObjectId> = selected.iter().copied().collect();
    for face_id in &faces {
        let Some(face) = graph.find_face(*face_id) else {
            continue;
        };
        for edge_id in face.edge_ids.iter().map(|e| e.abs()) {
            if graph.adjacent_faces(edge_id).iter().all(|f| faces.contains(f)) {
                closure.insert(edge_id);
            }
        }
    }
    closure.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use crate::config::DocumentConfig;
    use crate::context::Context;
    use crate::document::Document;
    use crate::errors::DocumentError;
    use massing_common::point;
    use massing_graph::GraphDelta;

    #[test]
    fn test_root_group_guards() {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let root = doc.root_group_id();

        assert_eq!(
            doc.duplicate_group(&ctx, root, point(1.0, 0.0, 0.0)).unwrap_err(),
            DocumentError::RootGroup("duplicated")
        );
        assert_eq!(doc.explode_group(&ctx, root).unwrap_err(), DocumentError::RootGroup("exploded"));
    }

    #[test]
    fn test_merge_into_descendant_rejected() {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let outer = doc.create_group(&ctx, doc.root_group_id()).unwrap();
        let inner = doc.create_group(&ctx, outer).unwrap();

        assert!(matches!(
            doc.merge_group_into(&ctx, outer, inner),
            Err(DocumentError::Structural(_))
        ));
    }

    #[test]
    fn test_explode_reparents_child_groups() {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let root = doc.root_group_id();
        let outer = doc.create_group(&ctx, root).unwrap();
        let inner = doc.create_group(&ctx, outer).unwrap();

        doc.explode_group(&ctx, outer).unwrap();
        assert!(doc.get_object(outer).is_none());
        assert!(doc.find_volume_graph(outer).is_none());
        assert_eq!(doc.get_object(inner).unwrap().parent_id, root);
    }

    #[test]
    fn test_group_from_elements_moves_face() {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let root = doc.root_group_id();
        let square = [
            point(0.0, 0.0, 0.0),
            point(1.0, 0.0, 0.0),
            point(1.0, 1.0, 0.0),
            point(0.0, 1.0, 0.0),
        ];
        let face = doc.add_face(&ctx, root, &square, None).unwrap();

        let group = doc.create_group_from_elements(&ctx, &[face]).unwrap();
        assert_eq!(doc.find_volume_graph(root).unwrap().counts(), (0, 0, 0));
        assert_eq!(doc.find_volume_graph(group).unwrap().counts(), (4, 4, 1));
        assert_eq!(doc.get_object(group).unwrap().parent_id, root);
    }

    #[test]
    fn test_duplicate_discards_live_preview() {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let group = doc.create_group(&ctx, doc.root_group_id()).unwrap();
        doc.add_edge(&ctx, group, point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0))
            .unwrap();

        let vertex = doc.get_next_available_id().unwrap();
        let mut preview = GraphDelta::new(group);
        preview.vertex_additions.insert(vertex, point(5.0, 5.0, 0.0));
        doc.apply_preview_deltas(&ctx, vec![preview.into()]).unwrap();
        assert_eq!(doc.find_volume_graph(group).unwrap().counts(), (3, 1, 0));

        let (copy, _) = doc.duplicate_group(&ctx, group, point(0.0, 3.0, 0.0)).unwrap();
        assert!(!doc.has_preview());
        assert!(doc.get_object(vertex).is_none());
        assert_eq!(doc.find_volume_graph(group).unwrap().counts(), (2, 1, 0));
        assert_eq!(doc.find_volume_graph(copy).unwrap().counts(), (2, 1, 0));
    }
}

//! # Symbols
//!
//! A symbol is a group whose copies stay linked. The template records, for
//! every object and element of the original instance, the set of
//! corresponding ids across all instances. Payload edits can then be carried
//! to every equivalent.

use crate::context::Context;
use crate::delta::{Delta, ObjectDelta, SymbolDelta};
use crate::document::{CommittedBatch, Document};
use crate::errors::{DocumentError, DocumentResult};
use crate::group::remapped;
use crate::object::{ObjectKind, SymbolTemplate};
use massing_common::{ObjectId, Point, ID_NONE};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

impl Document {
    /// Turn a plain group into the first instance of a new symbol
    ///
    /// Ids that already belong to a nested symbol stay with that symbol.
    pub fn create_symbol(&mut self, ctx: &Context, group_id: ObjectId) -> DocumentResult<ObjectId> {
        self.clear_preview_deltas();
        let group = self.state.object(group_id)?.clone();
        if group.kind != ObjectKind::Group {
            return Err(DocumentError::InvalidOperation(format!(
                "{} is a {}, only plain groups become symbols",
                group_id,
                group.kind.name()
            )));
        }
        if group.parent_id == ID_NONE {
            return Err(DocumentError::RootGroup("turned into a symbol"));
        }

        let mut ids = self.ids.clone();
        let template_id = ids.next_id()?;
        let mut template = SymbolTemplate::new(template_id);
        for id in std::iter::once(group_id).chain(self.state.descendants_of(group_id)) {
            if self.state.symbol_set_of(id).is_none() {
                template.equivalent_ids.insert(id, BTreeSet::from([id]));
            }
        }

        let mut instance = group.clone();
        instance.kind = ObjectKind::SymbolInstance { template_id };
        let mut objects = ObjectDelta::new();
        objects.mutate(group, instance);

        debug!(template = template_id, sets = template.equivalent_ids.len(), "creating symbol");
        let deltas = vec![
            Delta::Symbol(SymbolDelta {
                template_id,
                old: None,
                new: Some(template),
            }),
            objects.into(),
        ];
        self.apply_deltas(ctx, deltas)?;
        Ok(template_id)
    }

    /// Place a new instance of a symbol next to its first one
    pub fn instantiate_symbol(&mut self, ctx: &Context, template_id: ObjectId, offset: Point) -> DocumentResult<ObjectId> {
        self.clear_preview_deltas();
        if self.state.symbol(template_id).is_none() {
            return Err(DocumentError::ObjectNotFound(template_id));
        }
        let source = self
            .state
            .objects()
            .values()
            .find(|object| object.kind == ObjectKind::SymbolInstance { template_id })
            .ok_or_else(|| DocumentError::InvalidOperation(format!("symbol {} has no instance", template_id)))?;
        let (source_id, parent_id) = (source.id, source.parent_id);

        let mut ids = self.ids.clone();
        let (deltas, remap) = self.deltas_for_duplicate(&mut ids, source_id, parent_id, offset)?;
        let instance_id = remapped(&remap, source_id)?;
        self.apply_deltas(ctx, deltas)?;
        Ok(instance_id)
    }

    /// Unlink an instance; it becomes a plain group
    pub fn detach_symbol(&mut self, ctx: &Context, group_id: ObjectId) -> DocumentResult<CommittedBatch> {
        self.clear_preview_deltas();
        let group = self.state.object(group_id)?.clone();
        let ObjectKind::SymbolInstance { template_id } = group.kind else {
            return Err(DocumentError::InvalidOperation(format!("{} is not a symbol instance", group_id)));
        };

        let released: BTreeSet<ObjectId> = std::iter::once(group_id)
            .chain(self.state.descendants_of(group_id))
            .collect();
        let mut detached = group.clone();
        detached.kind = ObjectKind::Group;
        let mut objects = ObjectDelta::new();
        objects.mutate(group, detached);

        let mut deltas = vec![objects.into()];
        deltas.extend(self.symbol_release_deltas(&released, Some(template_id)));
        self.apply_deltas(ctx, deltas)
    }

    /// Ids linked to `id` in other instances
    pub fn symbol_equivalents(&self, id: ObjectId) -> Vec<ObjectId> {
        let Some((template_id, canonical)) = self.state.symbol_set_of(id) else {
            return Vec::new();
        };
        self.state
            .symbol(template_id)
            .and_then(|template| template.equivalent_ids.get(&canonical))
            .map(|set| set.iter().copied().filter(|other| *other != id).collect())
            .unwrap_or_default()
    }

    /// Canonical id → id inside the given instance
    pub fn symbol_instance_mapping(&self, group_id: ObjectId) -> DocumentResult<BTreeMap<ObjectId, ObjectId>> {
        let group = self.state.object(group_id)?;
        let ObjectKind::SymbolInstance { template_id } = group.kind else {
            return Err(DocumentError::InvalidOperation(format!("{} is not a symbol instance", group_id)));
        };
        let template = self
            .state
            .symbol(template_id)
            .ok_or(DocumentError::ObjectNotFound(template_id))?;

        let members: BTreeSet<ObjectId> = std::iter::once(group_id)
            .chain(self.state.descendants_of(group_id))
            .collect();
        let mut mapping = BTreeMap::new();
        for (canonical, set) in &template.equivalent_ids {
            if let Some(id) = set.iter().find(|id| members.contains(id)) {
                mapping.insert(*canonical, *id);
            }
        }
        Ok(mapping)
    }

    /// Set tag and payload on an object and on all of its equivalents
    pub fn propagate_payload(
        &mut self,
        ctx: &Context,
        id: ObjectId,
        type_tag: &str,
        payload: Vec<u8>,
    ) -> DocumentResult<CommittedBatch> {
        self.clear_preview_deltas();
        let mut objects = ObjectDelta::new();
        for target in std::iter::once(id).chain(self.symbol_equivalents(id)) {
            let old = self.state.object(target)?;
            let mut updated = old.clone();
            updated.type_tag = type_tag.to_string();
            updated.payload = payload.clone();
            objects.mutate(old.clone(), updated);
        }
        self.apply_deltas(ctx, vec![objects.into()])
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DocumentConfig;
    use crate::context::Context;
    use crate::document::Document;
    use crate::object::ObjectKind;
    use massing_common::point;

    fn doc_with_symbol() -> (Document, Context, i32, i32, i32) {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let group = doc.create_group(&ctx, doc.root_group_id()).unwrap();
        let edges = doc
            .add_edge(&ctx, group, point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0))
            .unwrap();
        let template = doc.create_symbol(&ctx, group).unwrap();
        (doc, ctx, group, edges[0], template)
    }

    #[test]
    fn test_create_symbol_marks_instance() {
        let (doc, _, group, edge, template) = doc_with_symbol();

        assert_eq!(
            doc.get_object(group).unwrap().kind,
            ObjectKind::SymbolInstance { template_id: template }
        );
        let sets = &doc.state().symbol(template).unwrap().equivalent_ids;
        assert!(sets.contains_key(&group));
        assert!(sets.contains_key(&edge));
        doc.check_invariants().unwrap();
    }

    #[test]
    fn test_instantiate_links_equivalents() {
        let (mut doc, ctx, group, edge, template) = doc_with_symbol();
        let copy = doc.instantiate_symbol(&ctx, template, point(0.0, 5.0, 0.0)).unwrap();

        let mapping = doc.symbol_instance_mapping(copy).unwrap();
        assert_eq!(mapping.get(&group), Some(&copy));
        let copied_edge = mapping[&edge];
        assert_eq!(doc.symbol_equivalents(edge), vec![copied_edge]);

        doc.propagate_payload(&ctx, copied_edge, "wall", b"brick".to_vec()).unwrap();
        assert_eq!(doc.get_object(edge).unwrap().payload, b"brick".to_vec());
        assert_eq!(doc.get_object(edge).unwrap().type_tag, "wall");
    }

    #[test]
    fn test_detach_releases_ids() {
        let (mut doc, ctx, group, edge, template) = doc_with_symbol();
        let copy = doc.instantiate_symbol(&ctx, template, point(0.0, 5.0, 0.0)).unwrap();

        doc.detach_symbol(&ctx, copy).unwrap();
        assert_eq!(doc.get_object(copy).unwrap().kind, ObjectKind::Group);
        assert!(doc.symbol_equivalents(edge).is_empty());
        // The group, two vertices and the edge
        assert_eq!(doc.symbol_instance_mapping(group).unwrap().len(), 4);
    }

    #[test]
    fn test_detach_last_instance_drops_template() {
        let (mut doc, ctx, group, _, template) = doc_with_symbol();

        doc.detach_symbol(&ctx, group).unwrap();
        assert!(doc.state().symbol(template).is_none());
        doc.check_invariants().unwrap();
    }
}

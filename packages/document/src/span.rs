//! # Spans
//!
//! A span aggregates same-kind edges or faces of one graph under a single
//! hosted child. Members are weak: the graph owns the elements, and
//! consistency derivation follows members through splits and joins.

use crate::context::Context;
use crate::delta::ObjectDelta;
use crate::document::{CommittedBatch, Document};
use crate::errors::{DocumentError, DocumentResult};
use crate::object::{ObjectKind, ObjectState};
use massing_common::ObjectId;
use massing_graph::ElementKind;
use std::collections::BTreeSet;

impl Document {
    /// Create a span over `members` with one hosted child
    ///
    /// Returns the span id and the child id.
    pub fn create_span(
        &mut self,
        ctx: &Context,
        members: &[ObjectId],
        span_tag: &str,
        child_tag: &str,
        child_payload: Vec<u8>,
    ) -> DocumentResult<(ObjectId, ObjectId)> {
        self.clear_preview_deltas();
        let (graph_id, element) = self.span_target(members)?;
        let mut ids = self.ids.clone();
        let span_id = ids.next_id()?;
        let child_id = ids.next_id()?;

        let mut delta = ObjectDelta::new();
        delta
            .create(ObjectState::new(
                span_id,
                graph_id,
                ObjectKind::Span {
                    element,
                    members: members.to_vec(),
                },
                span_tag,
            ))
            .create(ObjectState::new(child_id, span_id, ObjectKind::Hosted, child_tag).with_payload(child_payload));
        self.apply_deltas(ctx, vec![delta.into()])?;
        Ok((span_id, child_id))
    }

    /// Give every member after the first its own span and cloned child
    ///
    /// Returns the new span ids in member order.
    pub fn split_span(&mut self, ctx: &Context, span_id: ObjectId) -> DocumentResult<Vec<ObjectId>> {
        self.clear_preview_deltas();
        let (span, element, members) = self.span(span_id)?;
        if members.len() < 2 {
            return Ok(Vec::new());
        }
        let child = self.span_child(span_id)?.clone();

        let mut ids = self.ids.clone();
        let mut delta = ObjectDelta::new();
        let mut created = Vec::new();
        for member in &members[1..] {
            let new_span = ids.next_id()?;
            let new_child = ids.next_id()?;
            let mut span_state = span.clone();
            span_state.id = new_span;
            span_state.kind = ObjectKind::Span {
                element,
                members: vec![*member],
            };
            let mut child_state = child.clone();
            child_state.id = new_child;
            child_state.parent_id = new_span;
            delta.create(span_state).create(child_state);
            created.push(new_span);
        }

        let mut kept = span.clone();
        kept.kind = ObjectKind::Span {
            element,
            members: members[..1].to_vec(),
        };
        delta.mutate(span, kept);

        self.apply_deltas(ctx, vec![delta.into()])?;
        Ok(created)
    }

    /// Fold every other span's members into the first; the others and
    /// their children are destroyed
    pub fn merge_spans(&mut self, ctx: &Context, span_ids: &[ObjectId]) -> DocumentResult<ObjectId> {
        self.clear_preview_deltas();
        let Some((&first_id, rest)) = span_ids.split_first() else {
            return Err(DocumentError::InvalidOperation("no spans to merge".to_string()));
        };
        let (first, element, mut members) = self.span(first_id)?;

        let mut delta = ObjectDelta::new();
        for other_id in rest {
            if *other_id == first_id {
                continue;
            }
            let (other, other_element, other_members) = self.span(*other_id)?;
            if other_element != element || other.parent_id != first.parent_id {
                return Err(DocumentError::Structural(format!(
                    "span {} cannot merge into span {}",
                    other_id, first_id
                )));
            }
            for member in other_members {
                if !members.contains(&member) {
                    members.push(member);
                }
            }
            self.destroy_subtree_into(*other_id, &mut delta)?;
        }

        let mut merged = first.clone();
        merged.kind = ObjectKind::Span { element, members };
        delta.mutate(first, merged);

        self.apply_deltas(ctx, vec![delta.into()])?;
        Ok(first_id)
    }

    pub fn add_span_member(&mut self, ctx: &Context, span_id: ObjectId, member: ObjectId) -> DocumentResult<CommittedBatch> {
        self.clear_preview_deltas();
        let (span, element, mut members) = self.span(span_id)?;
        if members.contains(&member) {
            return Err(DocumentError::InvalidOperation(format!(
                "{} is already a member of span {}",
                member, span_id
            )));
        }
        let graph = self.state.require_graph(span.parent_id)?;
        if graph.element_kind(member) != Some(element) {
            return Err(DocumentError::Structural(format!(
                "{} is not a {} of graph {}",
                member,
                element.as_str(),
                graph.id()
            )));
        }

        members.push(member);
        let mut updated = span.clone();
        updated.kind = ObjectKind::Span { element, members };
        let mut delta = ObjectDelta::new();
        delta.mutate(span, updated);
        self.apply_deltas(ctx, vec![delta.into()])
    }

    pub fn remove_span_member(&mut self, ctx: &Context, span_id: ObjectId, member: ObjectId) -> DocumentResult<CommittedBatch> {
        self.clear_preview_deltas();
        let (span, element, mut members) = self.span(span_id)?;
        if !members.contains(&member) {
            return Err(DocumentError::InvalidOperation(format!(
                "{} is not a member of span {}",
                member, span_id
            )));
        }
        if members.len() == 1 {
            return Err(DocumentError::Structural(format!(
                "cannot remove the last member of span {}",
                span_id
            )));
        }

        members.retain(|id| *id != member);
        let mut updated = span.clone();
        updated.kind = ObjectKind::Span { element, members };
        let mut delta = ObjectDelta::new();
        delta.mutate(span, updated);
        self.apply_deltas(ctx, vec![delta.into()])
    }

    /// Destroy a span together with its hosted child
    pub fn destroy_span(&mut self, ctx: &Context, span_id: ObjectId) -> DocumentResult<CommittedBatch> {
        self.clear_preview_deltas();
        self.span(span_id)?;
        let mut delta = ObjectDelta::new();
        self.destroy_subtree_into(span_id, &mut delta)?;
        self.apply_deltas(ctx, vec![delta.into()])
    }

    pub fn span_child(&self, span_id: ObjectId) -> DocumentResult<&ObjectState> {
        self.state
            .children_of(span_id)
            .into_iter()
            .filter_map(|id| self.state.get_object(id))
            .find(|object| object.kind == ObjectKind::Hosted)
            .ok_or_else(|| DocumentError::Structural(format!("span {} has no hosted child", span_id)))
    }

    fn span(&self, span_id: ObjectId) -> DocumentResult<(ObjectState, ElementKind, Vec<ObjectId>)> {
        let span = self.state.object(span_id)?;
        match &span.kind {
            ObjectKind::Span { element, members } => Ok((span.clone(), *element, members.clone())),
            other => Err(DocumentError::InvalidOperation(format!(
                "{} is a {}, not a span",
                span_id,
                other.name()
            ))),
        }
    }

    /// Graph and element kind shared by all `members`
    fn span_target(&self, members: &[ObjectId]) -> DocumentResult<(ObjectId, ElementKind)> {
        let Some(first) = members.first() else {
            return Err(DocumentError::InvalidOperation("a span needs at least one member".to_string()));
        };
        if members.iter().collect::<BTreeSet<_>>().len() != members.len() {
            return Err(DocumentError::InvalidOperation("span members repeat".to_string()));
        }

        let graph = self
            .state
            .graph_of_element(*first)
            .ok_or(DocumentError::ObjectNotFound(*first))?;
        let element = graph
            .element_kind(*first)
            .ok_or(DocumentError::ObjectNotFound(*first))?;
        if element == ElementKind::Vertex {
            return Err(DocumentError::InvalidOperation("spans hold edges or faces".to_string()));
        }
        for member in members {
            if graph.element_kind(*member) != Some(element) {
                return Err(DocumentError::Structural(format!(
                    "member {} is not a {} of graph {}",
                    member,
                    element.as_str(),
                    graph.id()
                )));
            }
        }
        Ok((graph.id(), element))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DocumentConfig;
    use crate::context::Context;
    use crate::delta::ObjectDelta;
    use crate::document::Document;
    use crate::errors::DocumentError;
    use massing_common::point;

    fn doc_with_edges(count: usize) -> (Document, Vec<i32>) {
        let ctx = Context::default();
        let mut doc = Document::new(0, DocumentConfig::default()).unwrap();
        let root = doc.root_group_id();
        let mut edges = Vec::new();
        for i in 0..count {
            let x = i as f64 * 2.0;
            edges.extend(doc.add_edge(&ctx, root, point(x, 0.0, 0.0), point(x + 1.0, 0.0, 0.0)).unwrap());
        }
        (doc, edges)
    }

    #[test]
    fn test_create_span_hosts_one_child() {
        let ctx = Context::default();
        let (mut doc, edges) = doc_with_edges(2);
        let (span, child) = doc.create_span(&ctx, &edges, "beam", "beam.line", b"steel".to_vec()).unwrap();

        assert_eq!(doc.span_child(span).unwrap().id, child);
        assert_eq!(doc.get_object(span).unwrap().parent_id, doc.root_group_id());
        assert_eq!(doc.get_object(child).unwrap().payload, b"steel".to_vec());
    }

    #[test]
    fn test_remove_last_member_rejected() {
        let ctx = Context::default();
        let (mut doc, edges) = doc_with_edges(1);
        let (span, _) = doc.create_span(&ctx, &edges, "beam", "beam.line", Vec::new()).unwrap();

        assert!(matches!(
            doc.remove_span_member(&ctx, span, edges[0]),
            Err(DocumentError::Structural(_))
        ));
    }

    #[test]
    fn test_add_and_remove_member() {
        let ctx = Context::default();
        let (mut doc, edges) = doc_with_edges(2);
        let (span, _) = doc.create_span(&ctx, &edges[..1], "beam", "beam.line", Vec::new()).unwrap();

        doc.add_span_member(&ctx, span, edges[1]).unwrap();
        assert_eq!(doc.get_object(span).unwrap().span_members(), &edges[..]);

        doc.remove_span_member(&ctx, span, edges[0]).unwrap();
        assert_eq!(doc.get_object(span).unwrap().span_members(), &edges[1..]);
    }

    #[test]
    fn test_destroy_span_takes_child() {
        let ctx = Context::default();
        let (mut doc, edges) = doc_with_edges(1);
        let (span, child) = doc.create_span(&ctx, &edges, "beam", "beam.line", Vec::new()).unwrap();

        doc.destroy_span(&ctx, span).unwrap();
        assert!(doc.get_object(span).is_none());
        assert!(doc.get_object(child).is_none());
        assert!(doc.get_object(edges[0]).is_some());
    }

    #[test]
    fn test_merge_spans_discards_live_preview() {
        let ctx = Context::default();
        let (mut doc, edges) = doc_with_edges(2);
        let (first, _) = doc.create_span(&ctx, &edges[..1], "beam", "beam.line", Vec::new()).unwrap();
        let (second, _) = doc.create_span(&ctx, &edges[1..], "beam", "beam.line", Vec::new()).unwrap();

        let committed = doc.get_object(first).unwrap().clone();
        let mut draft = committed.clone();
        draft.payload = b"draft".to_vec();
        let mut preview = ObjectDelta::new();
        preview.mutate(committed, draft);
        doc.apply_preview_deltas(&ctx, vec![preview.into()]).unwrap();

        let merged = doc.merge_spans(&ctx, &[first, second]).unwrap();
        assert!(!doc.has_preview());
        assert_eq!(doc.get_object(merged).unwrap().span_members().len(), 2);
        assert!(doc.state().objects().values().all(|object| object.payload != b"draft".to_vec()));
        doc.check_invariants().unwrap();
    }
}

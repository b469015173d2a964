//! Whole-document consistency check, run after every batch when enabled.

use crate::errors::{DocumentError, DocumentResult};
use crate::object::ObjectKind;
use crate::state::DocumentState;
use massing_common::{ObjectId, ID_NONE};
use std::collections::{BTreeMap, BTreeSet};

fn violation(message: String) -> DocumentError {
    DocumentError::InvariantViolation(message)
}

pub fn check(state: &DocumentState) -> DocumentResult<()> {
    check_root(state)?;
    check_graphs(state)?;
    check_objects(state)?;
    check_symbols(state)
}

fn check_root(state: &DocumentState) -> DocumentResult<()> {
    let root = state
        .get_object(state.root_group_id())
        .ok_or_else(|| violation(format!("root group {} is missing", state.root_group_id())))?;
    if root.kind != ObjectKind::Group || root.parent_id != ID_NONE {
        return Err(violation(format!("root {} is not a parentless group", root.id)));
    }
    Ok(())
}

fn check_graphs(state: &DocumentState) -> DocumentResult<()> {
    for graph in state.graphs().values() {
        graph.validate()?;

        let owner = state
            .get_object(graph.id())
            .ok_or_else(|| violation(format!("graph {} has no owner", graph.id())))?;
        if owner.kind.owned_graph() != Some(graph.kind()) {
            return Err(violation(format!(
                "graph {} is owned by a {}",
                graph.id(),
                owner.kind.name()
            )));
        }

        for id in graph.element_ids() {
            let wrapper = state
                .get_object(id)
                .ok_or_else(|| violation(format!("element {} has no wrapper", id)))?;
            let expected = graph.element_kind(id).map(|element| (graph.kind(), element));
            if wrapper.kind.wrapped() != expected || wrapper.parent_id != graph.id() {
                return Err(violation(format!("wrapper {} does not match its element", id)));
            }
        }
    }
    Ok(())
}

fn check_objects(state: &DocumentState) -> DocumentResult<()> {
    let mut hosted_children: BTreeMap<ObjectId, usize> = BTreeMap::new();
    let mut surface_hosts = BTreeSet::new();

    for object in state.objects().values() {
        if object.id == state.root_group_id() {
            continue;
        }
        if object.parent_id == ID_NONE {
            return Err(violation(format!("object {} has no parent", object.id)));
        }
        let parent = state
            .get_object(object.parent_id)
            .ok_or_else(|| violation(format!("parent {} of {} is missing", object.parent_id, object.id)))?;

        match &object.kind {
            ObjectKind::GraphElement { .. } | ObjectKind::SurfaceElement { .. } => {
                if !state
                    .graph(object.parent_id)
                    .is_some_and(|graph| graph.contains(object.id))
                {
                    return Err(violation(format!("wrapper {} has no element", object.id)));
                }
            }
            ObjectKind::Group | ObjectKind::SymbolInstance { .. } => {
                if !parent.kind.is_group_like() {
                    return Err(violation(format!("group {} is parented to a {}", object.id, parent.kind.name())));
                }
                if state.is_descendant_of(object.parent_id, object.id) {
                    return Err(violation(format!("group {} is its own ancestor", object.id)));
                }
                if let ObjectKind::SymbolInstance { template_id } = &object.kind {
                    if state.symbol(*template_id).is_none() {
                        return Err(violation(format!("instance {} has no template", object.id)));
                    }
                }
            }
            ObjectKind::SurfaceGraph => {
                if !surface_hosts.insert(object.parent_id) {
                    return Err(violation(format!("host {} has two surface graphs", object.parent_id)));
                }
            }
            ObjectKind::Span { element, members } => {
                let graph = state
                    .graph(object.parent_id)
                    .ok_or_else(|| violation(format!("span {} is not parented to a graph", object.id)))?;
                if members.is_empty() {
                    return Err(violation(format!("span {} has no members", object.id)));
                }
                if members.iter().collect::<BTreeSet<_>>().len() != members.len() {
                    return Err(violation(format!("span {} repeats a member", object.id)));
                }
                if members.iter().any(|id| graph.element_kind(*id) != Some(*element)) {
                    return Err(violation(format!("span {} has a stray member", object.id)));
                }
            }
            ObjectKind::Hosted => {
                if matches!(parent.kind, ObjectKind::Span { .. }) {
                    *hosted_children.entry(parent.id).or_default() += 1;
                }
            }
        }

        if object.kind.owned_graph().is_some() && state.graph(object.id).is_none() {
            return Err(violation(format!("{} {} has no graph", object.kind.name(), object.id)));
        }
    }

    for span in state.objects().values() {
        if matches!(span.kind, ObjectKind::Span { .. }) && hosted_children.get(&span.id) != Some(&1) {
            return Err(violation(format!("span {} must host exactly one child", span.id)));
        }
    }
    Ok(())
}

fn check_symbols(state: &DocumentState) -> DocumentResult<()> {
    let mut seen = BTreeSet::new();
    for template in state.symbols().values() {
        for id in template.all_ids() {
            if !seen.insert(id) {
                return Err(violation(format!("id {} is in two equivalence sets", id)));
            }
            if !state.is_live(id) {
                return Err(violation(format!("equivalence set holds dead id {}", id)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectState;
    use massing_graph::{Graph, GraphKind};

    fn minimal() -> DocumentState {
        let mut state = DocumentState::new(1, 0.01);
        state
            .objects
            .insert(1, ObjectState::new(1, ID_NONE, ObjectKind::Group, "group"));
        state.graphs.insert(1, Graph::new(1, GraphKind::Volume, 0.01));
        state
    }

    #[test]
    fn test_minimal_document_is_consistent() {
        check(&minimal()).unwrap();
    }

    #[test]
    fn test_group_without_graph_is_reported() {
        let mut state = minimal();
        state
            .objects
            .insert(2, ObjectState::new(2, 1, ObjectKind::Group, "group"));
        assert!(matches!(check(&state), Err(DocumentError::InvariantViolation(_))));
    }

    #[test]
    fn test_span_without_child_is_reported() {
        let mut state = minimal();
        state.objects.insert(
            2,
            ObjectState::new(
                2,
                1,
                ObjectKind::Span {
                    element: massing_graph::ElementKind::Edge,
                    members: vec![],
                },
                "beam",
            ),
        );
        assert!(check(&state).is_err());
    }
}

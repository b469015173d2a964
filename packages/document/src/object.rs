//! # Object model
//!
//! Objects live in one arena keyed by id. Relations between them (parent,
//! span members, symbol equivalence) are plain ids looked up in that arena,
//! never references.

use massing_common::ObjectId;
use massing_graph::{ElementKind, GraphKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const GROUP_TAG: &str = "group";
pub const SURFACE_GRAPH_TAG: &str = "surface.graph";

/// Type tag carried by the wrapper object of a graph element
pub fn wrapper_tag(graph: GraphKind, element: ElementKind) -> &'static str {
    match (graph, element) {
        (GraphKind::Volume, ElementKind::Vertex) => "graph.vertex",
        (GraphKind::Volume, ElementKind::Edge) => "graph.edge",
        (GraphKind::Volume, ElementKind::Face) => "graph.face",
        (GraphKind::Surface, ElementKind::Vertex) => "surface.vertex",
        (GraphKind::Surface, ElementKind::Edge) => "surface.edge",
        (GraphKind::Surface, ElementKind::Face) => "surface.face",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "camelCase")]
pub enum ObjectKind {
    /// Shares its id with an element of the volume graph named by its parent
    GraphElement { element: ElementKind },
    /// Shares its id with an element of the surface graph named by its parent
    SurfaceElement { element: ElementKind },
    /// Aggregates same-kind elements of one graph under one hosted child
    Span {
        element: ElementKind,
        members: Vec<ObjectId>,
    },
    /// Owns the volume graph with the same id
    Group,
    /// A group whose contents are tracked by a symbol template
    SymbolInstance { template_id: ObjectId },
    /// Owns the surface graph with the same id, hosted by its parent
    SurfaceGraph,
    /// Leaf object attached to an element, a span or another hosted object
    Hosted,
}

impl ObjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::GraphElement { .. } => "graph element",
            ObjectKind::SurfaceElement { .. } => "surface element",
            ObjectKind::Span { .. } => "span",
            ObjectKind::Group => "group",
            ObjectKind::SymbolInstance { .. } => "symbol instance",
            ObjectKind::SurfaceGraph => "surface graph",
            ObjectKind::Hosted => "hosted",
        }
    }

    pub fn is_wrapper(&self) -> bool {
        matches!(
            self,
            ObjectKind::GraphElement { .. } | ObjectKind::SurfaceElement { .. }
        )
    }

    /// Element kind and graph kind for wrappers
    pub fn wrapped(&self) -> Option<(GraphKind, ElementKind)> {
        match self {
            ObjectKind::GraphElement { element } => Some((GraphKind::Volume, *element)),
            ObjectKind::SurfaceElement { element } => Some((GraphKind::Surface, *element)),
            _ => None,
        }
    }

    pub fn is_group_like(&self) -> bool {
        matches!(self, ObjectKind::Group | ObjectKind::SymbolInstance { .. })
    }

    /// Kind of graph an object of this kind owns under its own id
    pub fn owned_graph(&self) -> Option<GraphKind> {
        match self {
            ObjectKind::Group | ObjectKind::SymbolInstance { .. } => Some(GraphKind::Volume),
            ObjectKind::SurfaceGraph => Some(GraphKind::Surface),
            _ => None,
        }
    }

    pub fn wrapper_for(graph: GraphKind, element: ElementKind) -> ObjectKind {
        match graph {
            GraphKind::Volume => ObjectKind::GraphElement { element },
            GraphKind::Surface => ObjectKind::SurfaceElement { element },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectState {
    pub id: ObjectId,
    pub parent_id: ObjectId,
    pub kind: ObjectKind,
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
}

impl ObjectState {
    pub fn new(id: ObjectId, parent_id: ObjectId, kind: ObjectKind, type_tag: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            kind,
            type_tag: type_tag.into(),
            payload: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn wrapper(id: ObjectId, graph_id: ObjectId, graph: GraphKind, element: ElementKind) -> Self {
        Self::new(
            id,
            graph_id,
            ObjectKind::wrapper_for(graph, element),
            wrapper_tag(graph, element),
        )
    }

    pub fn span_members(&self) -> &[ObjectId] {
        match &self.kind {
            ObjectKind::Span { members, .. } => members,
            _ => &[],
        }
    }
}

/// Equivalence sets of one symbol template
///
/// Each set is keyed by its canonical id (the id in the instance the symbol
/// was created from) and holds the corresponding id in every instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolTemplate {
    pub id: ObjectId,
    #[serde(default)]
    pub equivalent_ids: BTreeMap<ObjectId, BTreeSet<ObjectId>>,
}

impl SymbolTemplate {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            equivalent_ids: BTreeMap::new(),
        }
    }

    /// Canonical key of the set holding `id`
    pub fn canonical_of(&self, id: ObjectId) -> Option<ObjectId> {
        self.equivalent_ids
            .iter()
            .find(|(_, set)| set.contains(&id))
            .map(|(canonical, _)| *canonical)
    }

    pub fn all_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.equivalent_ids.values().flat_map(|set| set.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_state_json_shape() {
        let state = ObjectState::new(
            7,
            3,
            ObjectKind::Span {
                element: ElementKind::Edge,
                members: vec![4],
            },
            "beam.span",
        );
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["parentId"], 3);
        assert_eq!(json["kind"]["variant"], "span");
        assert!(json.get("payload").is_none());

        let back: ObjectState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_kind_helpers() {
        let wrapper = ObjectKind::wrapper_for(GraphKind::Surface, ElementKind::Face);
        assert!(wrapper.is_wrapper());
        assert_eq!(wrapper.wrapped(), Some((GraphKind::Surface, ElementKind::Face)));
        assert_eq!(ObjectKind::SymbolInstance { template_id: 1 }.owned_graph(), Some(GraphKind::Volume));
        assert!(ObjectKind::Hosted.owned_graph().is_none());
    }
}

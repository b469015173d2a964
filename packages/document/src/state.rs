//! The arena a document mutates: graphs, objects and symbol templates.
//!
//! Only delta application writes here; everything else reads.

use crate::errors::{DocumentError, DocumentResult};
use crate::object::{ObjectKind, ObjectState, SymbolTemplate};
use massing_common::{ObjectId, ID_NONE};
use massing_graph::{Graph, GraphKind};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    pub(crate) graphs: BTreeMap<ObjectId, Graph>,
    pub(crate) objects: BTreeMap<ObjectId, ObjectState>,
    pub(crate) symbols: BTreeMap<ObjectId, SymbolTemplate>,
    pub(crate) root_group_id: ObjectId,
    pub(crate) epsilon: f64,
}

impl DocumentState {
    pub(crate) fn new(root_group_id: ObjectId, epsilon: f64) -> Self {
        Self {
            graphs: BTreeMap::new(),
            objects: BTreeMap::new(),
            symbols: BTreeMap::new(),
            root_group_id,
            epsilon,
        }
    }

    pub fn root_group_id(&self) -> ObjectId {
        self.root_group_id
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn graphs(&self) -> &BTreeMap<ObjectId, Graph> {
        &self.graphs
    }

    pub fn objects(&self) -> &BTreeMap<ObjectId, ObjectState> {
        &self.objects
    }

    pub fn symbols(&self) -> &BTreeMap<ObjectId, SymbolTemplate> {
        &self.symbols
    }

    pub fn get_object(&self, id: ObjectId) -> Option<&ObjectState> {
        self.objects.get(&id)
    }

    pub fn object(&self, id: ObjectId) -> DocumentResult<&ObjectState> {
        self.objects.get(&id).ok_or(DocumentError::ObjectNotFound(id))
    }

    pub fn graph(&self, id: ObjectId) -> Option<&Graph> {
        self.graphs.get(&id)
    }

    pub fn require_graph(&self, id: ObjectId) -> DocumentResult<&Graph> {
        self.graphs.get(&id).ok_or(DocumentError::GraphNotFound(id))
    }

    pub fn symbol(&self, id: ObjectId) -> Option<&SymbolTemplate> {
        self.symbols.get(&id)
    }

    pub fn graph_of_element(&self, element_id: ObjectId) -> Option<&Graph> {
        self.graphs.values().find(|graph| graph.contains(element_id))
    }

    /// An id is live when an object or a graph element carries it
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id) || self.graph_of_element(id).is_some()
    }

    pub fn children_of(&self, id: ObjectId) -> Vec<ObjectId> {
        self.objects
            .values()
            .filter(|object| object.parent_id == id && object.id != id)
            .map(|object| object.id)
            .collect()
    }

    /// Breadth-first, parents before children, `id` itself excluded
    pub fn descendants_of(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut children: BTreeMap<ObjectId, Vec<ObjectId>> = BTreeMap::new();
        for object in self.objects.values() {
            if object.parent_id != ID_NONE && object.parent_id != object.id {
                children.entry(object.parent_id).or_default().push(object.id);
            }
        }

        let mut ordered = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            for child in children.get(&next).into_iter().flatten() {
                if seen.insert(*child) {
                    ordered.push(*child);
                    queue.push_back(*child);
                }
            }
        }
        ordered
    }

    pub fn is_descendant_of(&self, id: ObjectId, ancestor: ObjectId) -> bool {
        let mut current = id;
        for _ in 0..=self.objects.len() {
            match self.objects.get(&current) {
                Some(object) if object.parent_id == ancestor => return true,
                Some(object) if object.parent_id != ID_NONE => current = object.parent_id,
                _ => return false,
            }
        }
        false
    }

    pub fn objects_of_type(&self, type_tag: &str) -> Vec<ObjectId> {
        self.objects
            .values()
            .filter(|object| object.type_tag == type_tag)
            .map(|object| object.id)
            .collect()
    }

    /// Volume graph by group id or by the id of one of its elements
    pub fn find_volume_graph(&self, id: ObjectId) -> Option<&Graph> {
        self.find_graph_of_kind(id, GraphKind::Volume)
    }

    /// Surface graph by its own id or by the id of one of its elements
    pub fn find_surface_graph(&self, id: ObjectId) -> Option<&Graph> {
        self.find_graph_of_kind(id, GraphKind::Surface)
    }

    pub fn find_surface_graph_by_host(&self, host_id: ObjectId) -> Option<&Graph> {
        self.objects
            .values()
            .find(|object| object.kind == ObjectKind::SurfaceGraph && object.parent_id == host_id)
            .and_then(|object| self.graphs.get(&object.id))
    }

    fn find_graph_of_kind(&self, id: ObjectId, kind: GraphKind) -> Option<&Graph> {
        match self.graphs.get(&id) {
            Some(graph) if graph.kind() == kind => Some(graph),
            _ => self
                .graphs
                .values()
                .find(|graph| graph.kind() == kind && graph.contains(id)),
        }
    }

    /// Template id and canonical id of the equivalence set holding `id`
    pub fn symbol_set_of(&self, id: ObjectId) -> Option<(ObjectId, ObjectId)> {
        self.symbols
            .values()
            .find_map(|template| template.canonical_of(id).map(|canonical| (template.id, canonical)))
    }

    /// Every id a new allocation must stay clear of
    pub(crate) fn all_ids(&self) -> BTreeSet<ObjectId> {
        let mut ids: BTreeSet<ObjectId> = self.objects.keys().copied().collect();
        for graph in self.graphs.values() {
            ids.insert(graph.id());
            ids.extend(graph.element_ids());
        }
        for template in self.symbols.values() {
            ids.insert(template.id);
        }
        ids
    }
}

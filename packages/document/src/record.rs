//! Persisted document layout

use crate::errors::DocumentResult;
use crate::object::{ObjectState, SymbolTemplate};
use crate::state::DocumentState;
use massing_common::ObjectId;
use massing_graph::{Graph, GraphKind, GraphRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub root_group_id: ObjectId,
    /// Volume graphs keyed by owning group id
    #[serde(default)]
    pub graphs: BTreeMap<ObjectId, GraphRecord>,
    /// Surface graphs keyed by host object id
    #[serde(default)]
    pub surface_graphs: BTreeMap<ObjectId, GraphRecord>,
    #[serde(default)]
    pub objects: BTreeMap<ObjectId, ObjectState>,
    #[serde(default)]
    pub symbols: BTreeMap<ObjectId, SymbolTemplate>,
}

impl DocumentState {
    pub fn to_record(&self) -> DocumentRecord {
        let mut record = DocumentRecord {
            root_group_id: self.root_group_id,
            graphs: BTreeMap::new(),
            surface_graphs: BTreeMap::new(),
            objects: self.objects.clone(),
            symbols: self.symbols.clone(),
        };

        for graph in self.graphs.values() {
            match graph.kind() {
                GraphKind::Volume => {
                    record.graphs.insert(graph.id(), graph.save());
                }
                GraphKind::Surface => {
                    let host = self
                        .objects
                        .get(&graph.id())
                        .map(|owner| owner.parent_id)
                        .unwrap_or(graph.id());
                    record.surface_graphs.insert(host, graph.save());
                }
            }
        }
        record
    }

    pub fn from_record(record: &DocumentRecord, epsilon: f64) -> DocumentResult<Self> {
        let mut state = DocumentState::new(record.root_group_id, epsilon);
        for graph_record in record.graphs.values().chain(record.surface_graphs.values()) {
            let graph = Graph::load(graph_record, epsilon)?;
            state.graphs.insert(graph.id(), graph);
        }
        state.objects = record.objects.clone();
        state.symbols = record.symbols.clone();
        Ok(state)
    }
}

//! # Document deltas
//!
//! Every document change is one of four deltas. Each carries the full old
//! and new state it touches, so its inverse is built from the delta alone.

use crate::object::{ObjectState, SymbolTemplate};
use massing_common::ObjectId;
use massing_graph::{GraphDelta, GraphKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleOp {
    Add,
    Remove,
}

/// Creates or removes an empty graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLifecycleDelta {
    pub graph_id: ObjectId,
    pub kind: GraphKind,
    pub op: LifecycleOp,
}

/// One object transition: create (no old), destroy (no new) or mutate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectChange {
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<ObjectState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<ObjectState>,
}

impl ObjectChange {
    pub fn inverse(&self) -> ObjectChange {
        ObjectChange {
            id: self.id,
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectDelta {
    pub changes: Vec<ObjectChange>,
}

impl ObjectDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, state: ObjectState) -> &mut Self {
        self.changes.push(ObjectChange {
            id: state.id,
            old: None,
            new: Some(state),
        });
        self
    }

    pub fn destroy(&mut self, state: ObjectState) -> &mut Self {
        self.changes.push(ObjectChange {
            id: state.id,
            old: Some(state),
            new: None,
        });
        self
    }

    /// No-op when the two states are equal
    pub fn mutate(&mut self, old: ObjectState, new: ObjectState) -> &mut Self {
        if old != new {
            self.changes.push(ObjectChange {
                id: old.id,
                old: Some(old),
                new: Some(new),
            });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn touches(&self, id: ObjectId) -> bool {
        self.changes.iter().any(|change| change.id == id)
    }

    pub fn make_inverse(&self) -> ObjectDelta {
        ObjectDelta {
            changes: self.changes.iter().rev().map(ObjectChange::inverse).collect(),
        }
    }
}

/// Replaces a symbol template; `None` on either side creates or removes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDelta {
    pub template_id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<SymbolTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<SymbolTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "delta", rename_all = "camelCase")]
pub enum Delta {
    Graph(GraphDelta),
    GraphLifecycle(GraphLifecycleDelta),
    Object(ObjectDelta),
    Symbol(SymbolDelta),
}

impl Delta {
    pub fn add_graph(graph_id: ObjectId, kind: GraphKind) -> Delta {
        Delta::GraphLifecycle(GraphLifecycleDelta {
            graph_id,
            kind,
            op: LifecycleOp::Add,
        })
    }

    pub fn remove_graph(graph_id: ObjectId, kind: GraphKind) -> Delta {
        Delta::GraphLifecycle(GraphLifecycleDelta {
            graph_id,
            kind,
            op: LifecycleOp::Remove,
        })
    }

    pub fn make_inverse(&self) -> Delta {
        match self {
            Delta::Graph(delta) => Delta::Graph(delta.make_inverse()),
            Delta::GraphLifecycle(delta) => Delta::GraphLifecycle(GraphLifecycleDelta {
                op: match delta.op {
                    LifecycleOp::Add => LifecycleOp::Remove,
                    LifecycleOp::Remove => LifecycleOp::Add,
                },
                ..delta.clone()
            }),
            Delta::Object(delta) => Delta::Object(delta.make_inverse()),
            Delta::Symbol(delta) => Delta::Symbol(SymbolDelta {
                template_id: delta.template_id,
                old: delta.new.clone(),
                new: delta.old.clone(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Delta::Graph(delta) => delta.is_empty(),
            Delta::GraphLifecycle(_) => false,
            Delta::Object(delta) => delta.is_empty(),
            Delta::Symbol(delta) => delta.old == delta.new,
        }
    }

    /// Ids this delta brings into existence
    pub fn created_ids(&self) -> BTreeSet<ObjectId> {
        match self {
            Delta::Graph(delta) => delta.added_ids(),
            Delta::GraphLifecycle(delta) => match delta.op {
                LifecycleOp::Add => BTreeSet::from([delta.graph_id]),
                LifecycleOp::Remove => BTreeSet::new(),
            },
            Delta::Object(delta) => delta
                .changes
                .iter()
                .filter(|change| change.old.is_none())
                .map(|change| change.id)
                .collect(),
            Delta::Symbol(delta) => match delta.old {
                None => BTreeSet::from([delta.template_id]),
                Some(_) => BTreeSet::new(),
            },
        }
    }

    /// Graph element ids removed by this delta
    pub fn removed_elements(&self) -> BTreeSet<ObjectId> {
        match self {
            Delta::Graph(delta) => delta.removed_ids(),
            _ => BTreeSet::new(),
        }
    }

    pub fn successors(&self) -> BTreeMap<ObjectId, Vec<ObjectId>> {
        match self {
            Delta::Graph(delta) => delta.successors(),
            _ => BTreeMap::new(),
        }
    }
}

impl From<GraphDelta> for Delta {
    fn from(delta: GraphDelta) -> Self {
        Delta::Graph(delta)
    }
}

impl From<ObjectDelta> for Delta {
    fn from(delta: ObjectDelta) -> Self {
        Delta::Object(delta)
    }
}

impl From<SymbolDelta> for Delta {
    fn from(delta: SymbolDelta) -> Self {
        Delta::Symbol(delta)
    }
}

/// Inverses of a batch in the order they must be applied
pub fn inverse_batch(deltas: &[Delta]) -> Vec<Delta> {
    deltas.iter().rev().map(Delta::make_inverse).collect()
}

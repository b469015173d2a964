//! # Post-Effect System
//!
//! Deltas trigger cascading effects that keep the object model consistent
//! with the graphs underneath it. For example:
//! - Adding a graph element → create its wrapper object
//! - Splitting an edge → move hosted objects and span membership onto the
//!   new edges
//! - Deleting an element → destroy its wrapper, then everything parented to it
//! - Destroying a group → delete its graph
//!
//! Effects read the document after the batch so far has been applied and
//! answer with more deltas. The document applies those and asks again until
//! no effect has anything to add.

use crate::delta::{Delta, ObjectDelta, SymbolDelta};
use crate::object::{ObjectKind, ObjectState};
use crate::state::DocumentState;
use massing_common::{ObjectId, ID_NONE};
use massing_graph::ElementKind;
use std::collections::{BTreeMap, BTreeSet};

/// What the batch applied so far replaced and removed
#[derive(Debug, Default, Clone)]
pub struct BatchSummary {
    successors: BTreeMap<ObjectId, Vec<ObjectId>>,
    removed: BTreeSet<ObjectId>,
}

impl BatchSummary {
    pub fn from_deltas(deltas: &[Delta]) -> Self {
        let mut summary = Self::default();
        for delta in deltas {
            for (parent, children) in delta.successors() {
                summary.successors.entry(parent).or_default().extend(children);
            }
            summary.removed.extend(delta.removed_elements());
        }
        summary
    }

    pub fn was_removed(&self, id: ObjectId) -> bool {
        self.removed.contains(&id)
    }

    /// Live elements that replaced `id`, following chains of replacements
    pub fn live_successors(&self, id: ObjectId, state: &DocumentState) -> Vec<ObjectId> {
        let mut found = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut frontier: Vec<ObjectId> = self.successors.get(&id).cloned().unwrap_or_default();
        frontier.reverse();

        while let Some(next) = frontier.pop() {
            if !seen.insert(next) {
                continue;
            }
            if state.graph_of_element(next).is_some() {
                found.push(next);
            } else if let Some(children) = self.successors.get(&next) {
                frontier.extend(children.iter().rev());
            }
        }
        found
    }
}

/// Consistency rule run after every batch
pub trait PostEffect: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Deltas needed to restore consistency, empty when consistent
    fn analyze(&self, state: &DocumentState, summary: &BatchSummary) -> Vec<Delta>;
}

/// Give every graph-owning object its graph
#[derive(Debug)]
pub struct CreateOwnedGraphs;

impl PostEffect for CreateOwnedGraphs {
    fn name(&self) -> &'static str {
        "create_owned_graphs"
    }

    fn analyze(&self, state: &DocumentState, _summary: &BatchSummary) -> Vec<Delta> {
        state
            .objects()
            .values()
            .filter_map(|object| object.kind.owned_graph().map(|kind| (object.id, kind)))
            .filter(|(id, _)| state.graph(*id).is_none())
            .map(|(id, kind)| Delta::add_graph(id, kind))
            .collect()
    }
}

/// One wrapper object per graph element, and none without an element
#[derive(Debug)]
pub struct SyncElementWrappers;

impl PostEffect for SyncElementWrappers {
    fn name(&self) -> &'static str {
        "sync_element_wrappers"
    }

    fn analyze(&self, state: &DocumentState, _summary: &BatchSummary) -> Vec<Delta> {
        let mut delta = ObjectDelta::new();

        for graph in state.graphs().values() {
            let owned = state
                .get_object(graph.id())
                .and_then(|owner| owner.kind.owned_graph())
                == Some(graph.kind());
            if !owned {
                continue;
            }
            for id in graph.element_ids() {
                if state.get_object(id).is_some() {
                    continue;
                }
                if let Some(element) = graph.element_kind(id) {
                    delta.create(ObjectState::wrapper(id, graph.id(), graph.kind(), element));
                }
            }
        }

        for object in state.objects().values() {
            if !object.kind.is_wrapper() {
                continue;
            }
            let alive = state
                .graph(object.parent_id)
                .is_some_and(|graph| graph.contains(object.id));
            if !alive {
                delta.destroy(object.clone());
            }
        }

        vec![delta.into()]
    }
}

/// Move hosted objects and surface graphs off removed elements onto their
/// successors
#[derive(Debug)]
pub struct RehomeHostedChildren;

impl PostEffect for RehomeHostedChildren {
    fn name(&self) -> &'static str {
        "rehome_hosted_children"
    }

    fn analyze(&self, state: &DocumentState, summary: &BatchSummary) -> Vec<Delta> {
        let mut delta = ObjectDelta::new();
        let mut new_hosts = BTreeSet::new();

        for object in state.objects().values() {
            if !matches!(object.kind, ObjectKind::Hosted | ObjectKind::SurfaceGraph) {
                continue;
            }
            let Some(host) = state.get_object(object.parent_id) else {
                continue;
            };
            let host_gone = host.kind.is_wrapper()
                && !state
                    .graph(host.parent_id)
                    .is_some_and(|graph| graph.contains(host.id));
            if !host_gone {
                continue;
            }

            let successor = summary
                .live_successors(host.id, state)
                .into_iter()
                .find(|candidate| {
                    object.kind != ObjectKind::SurfaceGraph
                        || (state.find_surface_graph_by_host(*candidate).is_none()
                            && !new_hosts.contains(candidate))
                });
            if let Some(successor) = successor {
                if object.kind == ObjectKind::SurfaceGraph {
                    new_hosts.insert(successor);
                }
                let mut moved = object.clone();
                moved.parent_id = successor;
                delta.mutate(object.clone(), moved);
            }
        }

        vec![delta.into()]
    }
}

/// Replace removed span members with their successors and drop spans left
/// without members
#[derive(Debug)]
pub struct PruneSpanMembers;

impl PostEffect for PruneSpanMembers {
    fn name(&self) -> &'static str {
        "prune_span_members"
    }

    fn analyze(&self, state: &DocumentState, summary: &BatchSummary) -> Vec<Delta> {
        let mut delta = ObjectDelta::new();

        for span in state.objects().values() {
            let ObjectKind::Span { element, members } = &span.kind else {
                continue;
            };
            let in_place = |id: &ObjectId| state.graph(span.parent_id).is_some_and(|g| g.contains(*id));
            if members.iter().all(in_place) {
                continue;
            }

            let mut replaced: Vec<ObjectId> = Vec::new();
            for member in members {
                let candidates = if state.graph_of_element(*member).is_some() {
                    vec![*member]
                } else {
                    summary.live_successors(*member, state)
                };
                for candidate in candidates {
                    if !replaced.contains(&candidate) && element_kind_of(state, candidate) == Some(*element) {
                        replaced.push(candidate);
                    }
                }
            }

            // Members must share one graph; the first surviving member decides
            let graph_id = replaced
                .first()
                .and_then(|first| state.graph_of_element(*first))
                .map(|graph| graph.id());
            match graph_id {
                Some(graph_id) => {
                    replaced.retain(|id| state.graph(graph_id).is_some_and(|g| g.contains(*id)));
                    let mut pruned = span.clone();
                    pruned.parent_id = graph_id;
                    pruned.kind = ObjectKind::Span {
                        element: *element,
                        members: replaced,
                    };
                    delta.mutate(span.clone(), pruned);
                }
                None => {
                    delta.destroy(span.clone());
                }
            }
        }

        vec![delta.into()]
    }
}

fn element_kind_of(state: &DocumentState, id: ObjectId) -> Option<ElementKind> {
    state.graph_of_element(id).and_then(|graph| graph.element_kind(id))
}

/// Keep symbol equivalence sets pointing at live ids
#[derive(Debug)]
pub struct PruneSymbolSets;

impl PostEffect for PruneSymbolSets {
    fn name(&self) -> &'static str {
        "prune_symbol_sets"
    }

    fn analyze(&self, state: &DocumentState, summary: &BatchSummary) -> Vec<Delta> {
        let mut claimed: BTreeSet<ObjectId> = state
            .symbols()
            .values()
            .flat_map(|template| template.all_ids())
            .filter(|id| state.is_live(*id))
            .collect();
        let mut deltas = Vec::new();

        for template in state.symbols().values() {
            if template.all_ids().all(|id| state.is_live(id)) {
                continue;
            }

            let mut pruned = template.clone();
            for set in pruned.equivalent_ids.values_mut() {
                let dead: Vec<ObjectId> = set.iter().copied().filter(|id| !state.is_live(*id)).collect();
                for id in dead {
                    set.remove(&id);
                    for successor in summary.live_successors(id, state) {
                        if claimed.insert(successor) {
                            set.insert(successor);
                        }
                    }
                }
            }
            pruned.equivalent_ids.retain(|_, set| !set.is_empty());

            let new = (!pruned.equivalent_ids.is_empty()).then_some(pruned);
            deltas.push(Delta::Symbol(SymbolDelta {
                template_id: template.id,
                old: Some(template.clone()),
                new,
            }));
        }

        deltas
    }
}

/// Empty and drop graphs whose owner is gone
#[derive(Debug)]
pub struct RemoveOrphanedGraphs;

impl PostEffect for RemoveOrphanedGraphs {
    fn name(&self) -> &'static str {
        "remove_orphaned_graphs"
    }

    fn analyze(&self, state: &DocumentState, _summary: &BatchSummary) -> Vec<Delta> {
        let mut deltas = Vec::new();
        for graph in state.graphs().values() {
            let owned = state
                .get_object(graph.id())
                .and_then(|owner| owner.kind.owned_graph())
                == Some(graph.kind());
            if owned {
                continue;
            }
            if !graph.is_empty() {
                deltas.push(Delta::Graph(graph.delta_for_delete_all()));
            }
            deltas.push(Delta::remove_graph(graph.id(), graph.kind()));
        }
        deltas
    }
}

/// Destroy objects whose parent no longer exists
#[derive(Debug)]
pub struct CascadeOrphans;

impl PostEffect for CascadeOrphans {
    fn name(&self) -> &'static str {
        "cascade_orphans"
    }

    fn analyze(&self, state: &DocumentState, _summary: &BatchSummary) -> Vec<Delta> {
        let mut delta = ObjectDelta::new();
        for object in state.objects().values() {
            if object.parent_id == ID_NONE {
                continue;
            }
            let parent_alive = state.get_object(object.parent_id).is_some()
                || state.graph_of_element(object.parent_id).is_some();
            if !parent_alive {
                delta.destroy(object.clone());
            }
        }
        vec![delta.into()]
    }
}

/// Runs every registered effect over the current state
#[derive(Debug)]
pub struct PostEffectEngine {
    effects: Vec<Box<dyn PostEffect>>,
}

impl PostEffectEngine {
    pub fn new() -> Self {
        Self {
            effects: vec![
                Box::new(CreateOwnedGraphs),
                Box::new(SyncElementWrappers),
                Box::new(RehomeHostedChildren),
                Box::new(PruneSpanMembers),
                Box::new(PruneSymbolSets),
                Box::new(RemoveOrphanedGraphs),
                Box::new(CascadeOrphans),
            ],
        }
    }

    /// One derivation pass
    ///
    /// The first effect to touch an object or template wins for this pass;
    /// later effects see the outcome on the next pass.
    pub fn analyze(&self, state: &DocumentState, summary: &BatchSummary) -> Vec<Delta> {
        let mut touched_objects = BTreeSet::new();
        let mut touched_symbols = BTreeSet::new();
        let mut derived = Vec::new();

        for effect in &self.effects {
            for delta in effect.analyze(state, summary) {
                match delta {
                    Delta::Object(mut delta) => {
                        delta.changes.retain(|change| touched_objects.insert(change.id));
                        if !delta.is_empty() {
                            derived.push(Delta::Object(delta));
                        }
                    }
                    Delta::Symbol(delta) => {
                        if touched_symbols.insert(delta.template_id) {
                            derived.push(Delta::Symbol(delta));
                        }
                    }
                    other => derived.push(other),
                }
            }
        }

        derived
    }

    pub fn effect_names(&self) -> Vec<&'static str> {
        self.effects.iter().map(|effect| effect.name()).collect()
    }
}

impl Default for PostEffectEngine {
    fn default() -> Self {
        Self::new()
    }
}

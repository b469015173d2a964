use crate::context::Context;
use crate::delta::{Delta, GraphLifecycleDelta, LifecycleOp, ObjectChange, ObjectDelta, SymbolDelta};
use crate::errors::{DocumentError, DocumentResult};
use crate::object::{ObjectKind, ObjectState};
use crate::state::DocumentState;
use massing_common::ObjectId;
use massing_graph::{Graph, GraphDelta};
use std::collections::BTreeMap;

/// Trait for delta operations
///
/// `validate` checks the whole delta against the current state; `apply`
/// validates first and then mutates, so a failed apply leaves the state
/// untouched.
pub trait DeltaOp: Send + Sync {
    fn validate(&self, state: &DocumentState, ctx: &Context) -> DocumentResult<()>;

    fn apply(&self, state: &mut DocumentState, ctx: &Context) -> DocumentResult<()>;

    fn make_inverse(&self) -> Delta;

    fn name(&self) -> &'static str;
}

impl DeltaOp for GraphDelta {
    fn validate(&self, state: &DocumentState, _ctx: &Context) -> DocumentResult<()> {
        state.require_graph(self.graph_id)?.validate_delta(self)?;
        Ok(())
    }

    fn apply(&self, state: &mut DocumentState, _ctx: &Context) -> DocumentResult<()> {
        let graph = state
            .graphs
            .get_mut(&self.graph_id)
            .ok_or(DocumentError::GraphNotFound(self.graph_id))?;
        graph.apply_delta(self)?;
        Ok(())
    }

    fn make_inverse(&self) -> Delta {
        Delta::Graph(GraphDelta::make_inverse(self))
    }

    fn name(&self) -> &'static str {
        "graph"
    }
}

impl DeltaOp for GraphLifecycleDelta {
    fn validate(&self, state: &DocumentState, _ctx: &Context) -> DocumentResult<()> {
        match (self.op, state.graph(self.graph_id)) {
            (LifecycleOp::Add, Some(_)) => Err(DocumentError::GraphExists(self.graph_id)),
            (LifecycleOp::Add, None) => Ok(()),
            (LifecycleOp::Remove, None) => Err(DocumentError::GraphNotFound(self.graph_id)),
            (LifecycleOp::Remove, Some(graph)) if graph.kind() != self.kind => {
                Err(DocumentError::StaleState(self.graph_id))
            }
            (LifecycleOp::Remove, Some(graph)) if !graph.is_empty() => Err(DocumentError::Structural(
                format!("graph {} still has elements", self.graph_id),
            )),
            (LifecycleOp::Remove, Some(_)) => Ok(()),
        }
    }

    fn apply(&self, state: &mut DocumentState, ctx: &Context) -> DocumentResult<()> {
        self.validate(state, ctx)?;
        match self.op {
            LifecycleOp::Add => {
                let graph = Graph::new(self.graph_id, self.kind, state.epsilon);
                state.graphs.insert(self.graph_id, graph);
            }
            LifecycleOp::Remove => {
                state.graphs.remove(&self.graph_id);
            }
        }
        Ok(())
    }

    fn make_inverse(&self) -> Delta {
        Delta::GraphLifecycle(self.clone()).make_inverse()
    }

    fn name(&self) -> &'static str {
        "graph_lifecycle"
    }
}

impl DeltaOp for ObjectDelta {
    fn validate(&self, state: &DocumentState, ctx: &Context) -> DocumentResult<()> {
        // Changes apply in order, so later ones see earlier ones
        let mut overlay: BTreeMap<ObjectId, Option<&ObjectState>> = BTreeMap::new();
        for change in &self.changes {
            let current = match overlay.get(&change.id) {
                Some(state) => *state,
                None => state.objects.get(&change.id),
            };
            validate_change(change, current, ctx)?;
            overlay.insert(change.id, change.new.as_ref());
        }
        Ok(())
    }

    fn apply(&self, state: &mut DocumentState, ctx: &Context) -> DocumentResult<()> {
        self.validate(state, ctx)?;
        for change in &self.changes {
            match &change.new {
                Some(new) => {
                    state.objects.insert(change.id, new.clone());
                }
                None => {
                    state.objects.remove(&change.id);
                }
            }
        }
        Ok(())
    }

    fn make_inverse(&self) -> Delta {
        Delta::Object(ObjectDelta::make_inverse(self))
    }

    fn name(&self) -> &'static str {
        "object"
    }
}

fn validate_change(change: &ObjectChange, current: Option<&ObjectState>, ctx: &Context) -> DocumentResult<()> {
    if change.old.is_none() && change.new.is_none() {
        return Err(DocumentError::InvalidOperation(format!(
            "change for {} has neither old nor new state",
            change.id
        )));
    }
    if [&change.old, &change.new]
        .into_iter()
        .flatten()
        .any(|state| state.id != change.id)
    {
        return Err(DocumentError::InvalidOperation(format!(
            "change for {} carries a state with another id",
            change.id
        )));
    }

    match (&change.old, current) {
        (None, Some(_)) => return Err(DocumentError::ObjectExists(change.id)),
        (Some(_), None) => return Err(DocumentError::ObjectNotFound(change.id)),
        (Some(old), Some(current)) if old != current => return Err(DocumentError::StaleState(change.id)),
        _ => {}
    }

    if let Some(new) = &change.new {
        if new.parent_id == new.id {
            return Err(DocumentError::Structural(format!("object {} is its own parent", new.id)));
        }
        // Core-owned kinds carry no registry-defined payload
        if matches!(new.kind, ObjectKind::Span { .. } | ObjectKind::Hosted) {
            ctx.registry
                .validate_payload(&new.type_tag, &new.payload)
                .map_err(|reason| DocumentError::InvalidPayload {
                    tag: new.type_tag.clone(),
                    reason,
                })?;
        }
    }
    Ok(())
}

impl DeltaOp for SymbolDelta {
    fn validate(&self, state: &DocumentState, _ctx: &Context) -> DocumentResult<()> {
        if self.old.is_none() && self.new.is_none() {
            return Err(DocumentError::InvalidOperation(format!(
                "symbol delta for {} has neither old nor new template",
                self.template_id
            )));
        }
        if [&self.old, &self.new]
            .into_iter()
            .flatten()
            .any(|template| template.id != self.template_id)
        {
            return Err(DocumentError::InvalidOperation(format!(
                "symbol delta for {} carries another template",
                self.template_id
            )));
        }

        match (&self.old, state.symbol(self.template_id)) {
            (None, Some(_)) => Err(DocumentError::ObjectExists(self.template_id)),
            (Some(_), None) => Err(DocumentError::ObjectNotFound(self.template_id)),
            (Some(old), Some(current)) if old != current => Err(DocumentError::StaleState(self.template_id)),
            _ => Ok(()),
        }
    }

    fn apply(&self, state: &mut DocumentState, ctx: &Context) -> DocumentResult<()> {
        self.validate(state, ctx)?;
        match &self.new {
            Some(template) => {
                state.symbols.insert(self.template_id, template.clone());
            }
            None => {
                state.symbols.remove(&self.template_id);
            }
        }
        Ok(())
    }

    fn make_inverse(&self) -> Delta {
        Delta::Symbol(self.clone()).make_inverse()
    }

    fn name(&self) -> &'static str {
        "symbol"
    }
}

impl DeltaOp for Delta {
    fn validate(&self, state: &DocumentState, ctx: &Context) -> DocumentResult<()> {
        self.op().validate(state, ctx)
    }

    fn apply(&self, state: &mut DocumentState, ctx: &Context) -> DocumentResult<()> {
        self.op().apply(state, ctx)
    }

    fn make_inverse(&self) -> Delta {
        Delta::make_inverse(self)
    }

    fn name(&self) -> &'static str {
        self.op().name()
    }
}

impl Delta {
    fn op(&self) -> &dyn DeltaOp {
        match self {
            Delta::Graph(delta) => delta,
            Delta::GraphLifecycle(delta) => delta,
            Delta::Object(delta) => delta,
            Delta::Symbol(delta) => delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PayloadSchema, SchemaRegistry};
    use massing_common::ID_NONE;
    use massing_graph::GraphKind;
    use std::sync::Arc;

    fn state() -> DocumentState {
        let mut state = DocumentState::new(1, 0.01);
        state
            .objects
            .insert(1, ObjectState::new(1, ID_NONE, ObjectKind::Group, "group"));
        state.graphs.insert(1, Graph::new(1, GraphKind::Volume, 0.01));
        state
    }

    #[test]
    fn test_object_delta_is_all_or_nothing() {
        let mut state = state();
        let before = state.clone();
        let ctx = Context::default();

        let note = ObjectState::new(5, 1, ObjectKind::Hosted, "note");
        let mut delta = ObjectDelta::new();
        delta.create(note.clone()).create(note);

        assert_eq!(delta.apply(&mut state, &ctx), Err(DocumentError::ObjectExists(5)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_stale_mutation_rejected() {
        let mut state = state();
        let ctx = Context::default();
        let root = state.objects[&1].clone();

        let mut stale = root.clone();
        stale.type_tag = "other".to_string();
        let mut delta = ObjectDelta::new();
        delta.mutate(stale, root.with_payload(vec![1]));

        assert_eq!(delta.apply(&mut state, &ctx), Err(DocumentError::StaleState(1)));
    }

    #[test]
    fn test_registry_rejects_bad_payload() {
        let mut state = state();
        let ctx = Context::new(Arc::new(SchemaRegistry::new().with_schema("wall", PayloadSchema::Json)));

        let mut delta = ObjectDelta::new();
        delta.create(ObjectState::new(5, 1, ObjectKind::Hosted, "wall").with_payload(b"{".to_vec()));
        assert!(matches!(
            delta.apply(&mut state, &ctx),
            Err(DocumentError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_remove_requires_empty_graph() {
        let mut state = state();
        let ctx = Context::default();
        state
            .graphs
            .get_mut(&1)
            .unwrap()
            .apply_delta(&{
                let mut delta = GraphDelta::new(1);
                delta.vertex_additions.insert(2, massing_common::point(0.0, 0.0, 0.0));
                delta
            })
            .unwrap();

        let remove = Delta::remove_graph(1, GraphKind::Volume);
        assert!(matches!(remove.apply(&mut state, &ctx), Err(DocumentError::Structural(_))));
        assert_eq!(Delta::add_graph(1, GraphKind::Volume).validate(&state, &ctx), Err(DocumentError::GraphExists(1)));
    }
}

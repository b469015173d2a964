//! # Document
//!
//! Owns every graph and object of one replica and is the only place they
//! change. A batch of deltas is applied atomically: each delta is validated
//! and applied in order, consistency derivation appends whatever the batch
//! implies, the invariants are checked, and any failure reverts the lot.
//!
//! ```text
//! apply_deltas(batch)
//!   ├─ clear preview
//!   ├─ apply + validate each delta
//!   ├─ derive to a fixpoint (post effects)
//!   ├─ check invariants
//!   └─ record undo, advance rolling hash
//! ```

use crate::config::DocumentConfig;
use crate::context::Context;
use crate::delta::{inverse_batch, Delta};
use crate::delta_trait::DeltaOp;
use crate::errors::{DocumentError, DocumentResult};
use crate::invariants;
use crate::object::{ObjectKind, ObjectState, GROUP_TAG};
use crate::post_effects::{BatchSummary, PostEffectEngine};
use crate::record::DocumentRecord;
use crate::state::DocumentState;
use crate::undo_stack::{DeltaBatch, UndoStack};
use massing_common::{IdAllocator, ObjectId, ID_NONE};
use massing_graph::{Graph, GraphKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitKind {
    Apply,
    Undo,
    Redo,
    Remote,
}

/// A batch as it was actually applied, derived deltas included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedBatch {
    pub kind: CommitKind,
    pub deltas: Vec<Delta>,
    pub prev_hash: u32,
    pub hash: u32,
    /// Id counter before the batch, restored on rollback
    pub id_counter: i32,
}

/// Rolling hash over committed batches
pub fn chain_hash(prev_hash: u32, deltas: &[Delta]) -> DocumentResult<u32> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&prev_hash.to_le_bytes());
    hasher.update(&serde_json::to_vec(deltas)?);
    Ok(hasher.finalize())
}

#[derive(Debug)]
struct Preview {
    inverses: Vec<Delta>,
}

#[derive(Debug)]
pub struct Document {
    pub(crate) state: DocumentState,
    pub(crate) ids: IdAllocator,
    undo_stack: UndoStack,
    effects: PostEffectEngine,
    preview: Option<Preview>,
    hash: u32,
    config: DocumentConfig,
    active_group_id: ObjectId,
    active_surface_graph_id: Option<ObjectId>,
    /// Local commits kept for a sync session to pick up
    journal: Option<Vec<CommittedBatch>>,
}

impl Document {
    /// Empty document holding only the root group and its graph
    pub fn new(user_idx: u8, config: DocumentConfig) -> DocumentResult<Self> {
        let mut ids = IdAllocator::new(user_idx)?;
        let root = ids.next_id()?;

        let mut state = DocumentState::new(root, config.graph_epsilon);
        state
            .objects
            .insert(root, ObjectState::new(root, ID_NONE, ObjectKind::Group, GROUP_TAG));
        state
            .graphs
            .insert(root, Graph::new(root, GraphKind::Volume, config.graph_epsilon));

        Ok(Self::with_state(state, ids, config, 0))
    }

    /// Load a persisted record as seen at `hash`
    pub fn from_record(
        record: &DocumentRecord,
        user_idx: u8,
        config: DocumentConfig,
        hash: u32,
    ) -> DocumentResult<Self> {
        let state = DocumentState::from_record(record, config.graph_epsilon)?;
        invariants::check(&state)?;

        let mut ids = IdAllocator::new(user_idx)?;
        for id in state.all_ids() {
            ids.observe(id);
        }
        Ok(Self::with_state(state, ids, config, hash))
    }

    fn with_state(state: DocumentState, ids: IdAllocator, config: DocumentConfig, hash: u32) -> Self {
        Self {
            active_group_id: state.root_group_id(),
            state,
            ids,
            undo_stack: UndoStack::with_max_levels(config.max_undo_levels),
            effects: PostEffectEngine::new(),
            preview: None,
            hash,
            config,
            active_surface_graph_id: None,
            journal: None,
        }
    }

    /// Committed state, without any live preview
    pub fn to_record(&self) -> DocumentRecord {
        match &self.preview {
            None => self.state.to_record(),
            Some(preview) => {
                let mut state = self.state.clone();
                revert_into(&mut state, &preview.inverses);
                state.to_record()
            }
        }
    }

    pub fn state_eq(&self, other: &Document) -> bool {
        self.to_record() == other.to_record()
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn user_idx(&self) -> u8 {
        self.ids.user_idx()
    }

    pub fn id_counter(&self) -> i32 {
        self.ids.counter()
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo_stack
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    /// Reserve a fresh id from this replica's partition
    pub fn get_next_available_id(&mut self) -> DocumentResult<ObjectId> {
        Ok(self.ids.next_id()?)
    }

    pub fn root_group_id(&self) -> ObjectId {
        self.state.root_group_id()
    }

    pub fn get_object(&self, id: ObjectId) -> Option<&ObjectState> {
        self.state.get_object(id)
    }

    pub fn get_objects_of_type(&self, type_tag: &str) -> Vec<ObjectId> {
        self.state.objects_of_type(type_tag)
    }

    pub fn children_of(&self, id: ObjectId) -> Vec<ObjectId> {
        self.state.children_of(id)
    }

    pub fn descendants_of(&self, id: ObjectId) -> Vec<ObjectId> {
        self.state.descendants_of(id)
    }

    pub fn find_volume_graph(&self, id: ObjectId) -> Option<&Graph> {
        self.state.find_volume_graph(id)
    }

    pub fn find_surface_graph(&self, id: ObjectId) -> Option<&Graph> {
        self.state.find_surface_graph(id)
    }

    pub fn find_surface_graph_by_host(&self, host_id: ObjectId) -> Option<&Graph> {
        self.state.find_surface_graph_by_host(host_id)
    }

    pub fn find_graph_of_element(&self, element_id: ObjectId) -> Option<&Graph> {
        self.state.graph_of_element(element_id)
    }

    /// Group new geometry goes into; falls back to the root once destroyed
    pub fn active_group(&self) -> ObjectId {
        match self.state.get_object(self.active_group_id) {
            Some(object) if object.kind.is_group_like() => self.active_group_id,
            _ => self.state.root_group_id(),
        }
    }

    pub fn set_active_group(&mut self, group_id: ObjectId) -> DocumentResult<()> {
        let group = self.state.object(group_id)?;
        if !group.kind.is_group_like() {
            return Err(DocumentError::InvalidOperation(format!(
                "{} {} cannot be the active group",
                group.kind.name(),
                group_id
            )));
        }
        self.active_group_id = group_id;
        Ok(())
    }

    pub fn active_surface_graph(&self) -> Option<ObjectId> {
        self.active_surface_graph_id
            .filter(|id| self.state.find_surface_graph(*id).is_some_and(|g| g.id() == *id))
    }

    pub fn set_active_surface_graph(&mut self, graph_id: Option<ObjectId>) -> DocumentResult<()> {
        if let Some(id) = graph_id {
            if self.state.object(id)?.kind != ObjectKind::SurfaceGraph {
                return Err(DocumentError::InvalidOperation(format!("{} is not a surface graph", id)));
            }
        }
        self.active_surface_graph_id = graph_id;
        Ok(())
    }

    /// Start keeping non-empty local commits until [`Document::take_journal`]
    pub fn enable_journal(&mut self) {
        self.journal.get_or_insert_with(Vec::new);
    }

    pub fn take_journal(&mut self) -> Vec<CommittedBatch> {
        self.journal.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn check_invariants(&self) -> DocumentResult<()> {
        invariants::check(&self.state)
    }

    /// Apply a batch atomically and record it for undo
    pub fn apply_deltas(&mut self, ctx: &Context, deltas: Vec<Delta>) -> DocumentResult<CommittedBatch> {
        self.clear_preview_deltas();
        let id_counter = self.ids.counter();

        let applied = self.transact(ctx, &deltas, true)?;
        let committed = self.commit(applied, CommitKind::Apply, id_counter)?;
        self.undo_stack
            .record(DeltaBatch::from_deltas(committed.deltas.clone()));

        debug!(
            deltas = committed.deltas.len(),
            requested = deltas.len(),
            hash = committed.hash,
            "committed batch"
        );
        Ok(committed)
    }

    /// Apply a batch that another replica already expanded and verified
    ///
    /// No derivation and no history: the deltas are applied exactly as given.
    pub fn apply_remote_deltas(&mut self, ctx: &Context, deltas: &[Delta]) -> DocumentResult<CommittedBatch> {
        self.clear_preview_deltas();
        let id_counter = self.ids.counter();

        let applied = self.transact(ctx, deltas, false)?;
        let committed = self.commit(applied, CommitKind::Remote, id_counter)?;
        debug!(deltas = committed.deltas.len(), hash = committed.hash, "applied remote batch");
        Ok(committed)
    }

    pub fn undo(&mut self, ctx: &Context) -> DocumentResult<Option<CommittedBatch>> {
        self.clear_preview_deltas();
        self.undo_stack.end_batch();
        let Some(batch) = self.undo_stack.take_undo() else {
            return Ok(None);
        };

        let id_counter = self.ids.counter();
        let applied = match self.transact(ctx, &batch.inverses, false) {
            Ok(applied) => applied,
            Err(err) => {
                self.undo_stack.restore_undo(batch);
                return Err(err);
            }
        };
        match self.commit(applied, CommitKind::Undo, id_counter) {
            Ok(committed) => {
                self.undo_stack.push_undone(batch);
                debug!(hash = committed.hash, "undo");
                Ok(Some(committed))
            }
            Err(err) => {
                self.undo_stack.restore_undo(batch);
                Err(err)
            }
        }
    }

    pub fn redo(&mut self, ctx: &Context) -> DocumentResult<Option<CommittedBatch>> {
        self.clear_preview_deltas();
        self.undo_stack.end_batch();
        let Some(batch) = self.undo_stack.take_redo() else {
            return Ok(None);
        };

        let id_counter = self.ids.counter();
        let applied = match self.transact(ctx, &batch.deltas, false) {
            Ok(applied) => applied,
            Err(err) => {
                self.undo_stack.restore_redo(batch);
                return Err(err);
            }
        };
        match self.commit(applied, CommitKind::Redo, id_counter) {
            Ok(committed) => {
                self.undo_stack.push_redone(batch);
                debug!(hash = committed.hash, "redo");
                Ok(Some(committed))
            }
            Err(err) => {
                self.undo_stack.restore_redo(batch);
                Err(err)
            }
        }
    }

    pub fn begin_undo_macro(&mut self, description: Option<&str>) {
        self.undo_stack.begin_batch();
        if let Some(description) = description {
            self.undo_stack.set_batch_description(description);
        }
    }

    pub fn end_undo_macro(&mut self) {
        self.undo_stack.end_batch();
    }

    /// Replace the preview overlay with a new batch
    ///
    /// The overlay is derived and checked like a commit but never enters
    /// history or the hash.
    pub fn apply_preview_deltas(&mut self, ctx: &Context, deltas: Vec<Delta>) -> DocumentResult<()> {
        self.clear_preview_deltas();

        let applied = self.transact(ctx, &deltas, true)?;
        trace!(deltas = applied.len(), "preview applied");
        self.preview = Some(Preview {
            inverses: inverse_batch(&applied),
        });
        Ok(())
    }

    pub fn clear_preview_deltas(&mut self) {
        // Ids the overlay used stay consumed so the counter never goes back
        if let Some(preview) = self.preview.take() {
            revert_into(&mut self.state, &preview.inverses);
        }
    }

    /// Undo a batch committed on this replica, newest first
    ///
    /// The document hash must still be the batch's resulting hash.
    pub fn rollback(&mut self, batch: &CommittedBatch) -> DocumentResult<()> {
        if self.hash != batch.hash {
            return Err(DocumentError::HashMismatch {
                expected: batch.hash,
                actual: self.hash,
            });
        }
        self.clear_preview_deltas();

        let inverses = inverse_batch(&batch.deltas);
        let mut applied = Vec::new();
        if let Err(err) = self.apply_sequence(&Context::default(), &inverses, &mut applied) {
            error!(error = %err, hash = batch.hash, "rollback failed");
            revert_into(&mut self.state, &inverse_batch(&applied));
            return Err(DocumentError::InvariantViolation(format!("rollback failed: {}", err)));
        }

        self.hash = batch.prev_hash;
        self.ids.restore(batch.id_counter);
        match batch.kind {
            CommitKind::Apply => {
                if !self.undo_stack.discard_recorded(&batch.deltas) {
                    warn!(hash = batch.hash, "rolled back batch was not found in undo history");
                }
            }
            CommitKind::Undo => {
                self.undo_stack.reverse_undo();
            }
            CommitKind::Redo => {
                self.undo_stack.reverse_redo();
            }
            CommitKind::Remote => {}
        }
        debug!(hash = self.hash, kind = ?batch.kind, "rolled back batch");
        Ok(())
    }

    /// Apply, derive and check; on failure the state is as before
    fn transact(&mut self, ctx: &Context, deltas: &[Delta], derive: bool) -> DocumentResult<Vec<Delta>> {
        let id_counter = self.ids.counter();
        let mut applied = Vec::new();

        match self.run(ctx, deltas, derive, &mut applied) {
            Ok(()) => Ok(applied),
            Err(err) => {
                match &err {
                    DocumentError::InvariantViolation(message) => {
                        error!(%message, "batch broke a document invariant")
                    }
                    other => warn!(error = %other, "batch rejected"),
                }
                revert_into(&mut self.state, &inverse_batch(&applied));
                self.ids.restore(id_counter);
                Err(err)
            }
        }
    }

    fn run(&mut self, ctx: &Context, deltas: &[Delta], derive: bool, applied: &mut Vec<Delta>) -> DocumentResult<()> {
        self.apply_sequence(ctx, deltas, applied)?;
        if derive {
            self.derive(ctx, applied)?;
        }
        if self.config.check_invariants {
            invariants::check(&self.state)?;
        }
        Ok(())
    }

    fn apply_sequence(&mut self, ctx: &Context, deltas: &[Delta], applied: &mut Vec<Delta>) -> DocumentResult<()> {
        for delta in deltas {
            if delta.is_empty() {
                continue;
            }
            delta.apply(&mut self.state, ctx)?;
            for id in delta.created_ids() {
                self.ids.observe(id);
            }
            applied.push(delta.clone());
        }
        Ok(())
    }

    fn derive(&mut self, ctx: &Context, applied: &mut Vec<Delta>) -> DocumentResult<()> {
        for pass in 0..self.config.max_derivation_passes {
            let summary = BatchSummary::from_deltas(applied);
            let derived = self.effects.analyze(&self.state, &summary);
            if derived.is_empty() {
                return Ok(());
            }
            trace!(pass, deltas = derived.len(), "derived deltas");
            self.apply_sequence(ctx, &derived, applied)?;
        }
        Err(DocumentError::InvariantViolation(format!(
            "consistency derivation did not settle after {} passes",
            self.config.max_derivation_passes
        )))
    }

    fn commit(&mut self, applied: Vec<Delta>, kind: CommitKind, id_counter: i32) -> DocumentResult<CommittedBatch> {
        let prev_hash = self.hash;
        let hash = if applied.is_empty() {
            prev_hash
        } else {
            match chain_hash(prev_hash, &applied) {
                Ok(hash) => hash,
                Err(err) => {
                    revert_into(&mut self.state, &inverse_batch(&applied));
                    self.ids.restore(id_counter);
                    return Err(err);
                }
            }
        };
        self.hash = hash;

        let committed = CommittedBatch {
            kind,
            deltas: applied,
            prev_hash,
            hash,
            id_counter,
        };
        if let Some(journal) = self.journal.as_mut() {
            if kind != CommitKind::Remote && !committed.deltas.is_empty() {
                journal.push(committed.clone());
            }
        }
        Ok(committed)
    }
}

/// Apply inverses that restore earlier, already validated states
fn revert_into(state: &mut DocumentState, inverses: &[Delta]) {
    let ctx = Context::default();
    for delta in inverses {
        if let Err(err) = delta.apply(state, &ctx) {
            error!(error = %err, delta = delta.name(), "failed to revert delta");
        }
    }
}

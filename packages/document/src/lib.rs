//! # Massing Document
//!
//! Replicated document of a building massing model: the volume graph of
//! every group, surface graphs hosted on faces, and the objects (wrappers,
//! spans, hosted objects, symbol instances) layered on top.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ operations: intent → Delta[]                │
//! │  - geometry, spans, groups, symbols         │
//! │  - copy / paste                             │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ Document: atomic batches                    │
//! │  - validate + apply each delta              │
//! │  - derive consistency (post effects)        │
//! │  - invariants, undo history, rolling hash   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ graph: vertices, edges, faces               │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Deltas are the only write path**: every change is reversible
//! 2. **Batches are atomic**: a failed batch leaves no trace
//! 3. **Derivation is deterministic**: replicas applying the same batch
//!    end up with the same state and hash
//!
//! ## Usage
//!
//! ```rust,ignore
//! use massing_document::{Context, Document, DocumentConfig};
//!
//! let ctx = Context::default();
//! let mut doc = Document::new(user_idx, DocumentConfig::default())?;
//! let face = doc.add_face(&ctx, doc.root_group_id(), &corners, None)?;
//! let group = doc.create_group_from_elements(&ctx, &[face])?;
//! doc.undo(&ctx)?;
//! ```

mod config;
mod context;
mod delta;
mod delta_trait;
mod document;
mod errors;
mod geometry;
mod group;
mod invariants;
mod object;
mod post_effects;
mod record;
mod selection;
mod span;
mod state;
mod symbol;
mod undo_stack;

pub use config::DocumentConfig;
pub use context::{Context, OpaqueRegistry, PayloadSchema, SchemaRegistry, TypeRegistry};
pub use delta::{inverse_batch, Delta, GraphLifecycleDelta, LifecycleOp, ObjectChange, ObjectDelta, SymbolDelta};
pub use delta_trait::DeltaOp;
pub use document::{chain_hash, CommitKind, CommittedBatch, Document};
pub use errors::{DocumentError, DocumentResult};
pub use object::{wrapper_tag, ObjectKind, ObjectState, SymbolTemplate, GROUP_TAG, SURFACE_GRAPH_TAG};
pub use post_effects::{BatchSummary, PostEffect, PostEffectEngine};
pub use record::DocumentRecord;
pub use selection::SelectionRecord;
pub use state::DocumentState;
pub use undo_stack::{DeltaBatch, UndoStack};

// Re-export graph types callers need alongside the document
pub use massing_graph::{DeleteMode, ElementKind, GraphKind};

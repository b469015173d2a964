//! # Massing Sync
//!
//! Server-authoritative replication of a massing document.
//!
//! ## Protocol
//!
//! ```text
//! client                                 server
//!   │ edit locally (speculative)            │
//!   │── DeltasRecord { prev, total } ──────▶│ prev == hash? apply, compare total
//!   │◀──────────── broadcast (ordered) ─────│ accepted records, every client
//!   │ own record: confirm                   │
//!   │ foreign record: roll back, apply      │
//!   │◀──────────── Desync { expected } ─────│ rejected submission
//!   │ roll back to last verified hash       │
//!   │ missed broadcasts: records_since ────▶│ replay the gap, or a snapshot
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (handle, _task) = spawn_server(SyncServer::new(document, Context::default()));
//! let (welcome, mut updates) = handle.connect().await?;
//! let mut session = ClientSession::join(&welcome, DocumentConfig::default(), Context::default())?;
//!
//! let (group, outgoing) = session.apply_local(|doc, ctx| doc.create_group(ctx, doc.root_group_id()))?;
//! for record in outgoing {
//!     if let Err(err) = handle.submit(record).await {
//!         session.handle_rejection(&err)?;
//!     }
//! }
//! if let Err(SyncError::Desync { .. }) = session.receive(&recv_record(&mut updates).await?) {
//!     handle.recover(&mut session).await?;
//! }
//! ```

mod client;
mod errors;
mod record;
mod server;
mod service;

pub use client::{ClientSession, PendingBatch};
pub use errors::{SyncError, SyncResult};
pub use record::{DeltasRecord, Welcome};
pub use server::SyncServer;
pub use service::{recv_record, spawn_server, ServerHandle};

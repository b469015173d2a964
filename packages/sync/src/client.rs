//! # Speculative client session
//!
//! A client edits its own replica right away and submits the resulting
//! batches. Until the server broadcasts them back they sit in the unverified
//! queue; a foreign broadcast or a rejection pops that queue back to the last
//! verified hash before the authoritative batch is applied.

use crate::errors::{SyncError, SyncResult};
use crate::record::{DeltasRecord, Welcome};
use massing_document::{CommittedBatch, Context, Document, DocumentConfig, DocumentResult};
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Verified hashes remembered for skipping records seen twice
const RECENT_HASHES: usize = 1024;

/// A local batch the server has not confirmed yet
#[derive(Debug, Clone)]
pub struct PendingBatch {
    pub batch: CommittedBatch,
    pub record: DeltasRecord,
}

#[derive(Debug)]
pub struct ClientSession {
    user_idx: u8,
    document: Document,
    ctx: Context,
    config: DocumentConfig,
    verified_hash: u32,
    recent: VecDeque<u32>,
    unverified: VecDeque<PendingBatch>,
}

impl ClientSession {
    pub fn join(welcome: &Welcome, config: DocumentConfig, ctx: Context) -> SyncResult<Self> {
        let mut document = Document::from_record(&welcome.record, welcome.user_idx, config.clone(), welcome.hash)?;
        document.enable_journal();
        Ok(Self {
            user_idx: welcome.user_idx,
            document,
            ctx,
            config,
            verified_hash: welcome.hash,
            recent: VecDeque::from([welcome.hash]),
            unverified: VecDeque::new(),
        })
    }

    pub fn user_idx(&self) -> u8 {
        self.user_idx
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn verified_hash(&self) -> u32 {
        self.verified_hash
    }

    pub fn unverified(&self) -> impl Iterator<Item = &PendingBatch> {
        self.unverified.iter()
    }

    /// Run an edit on the local replica
    ///
    /// Returns the edit's result and one record per batch it committed, to
    /// be submitted in order.
    pub fn apply_local<T>(
        &mut self,
        edit: impl FnOnce(&mut Document, &Context) -> DocumentResult<T>,
    ) -> SyncResult<(T, Vec<DeltasRecord>)> {
        let result = edit(&mut self.document, &self.ctx);
        let outgoing = self.collect_commits();
        Ok((result?, outgoing))
    }

    pub fn undo_local(&mut self) -> SyncResult<Vec<DeltasRecord>> {
        let (_, outgoing) = self.apply_local(|doc, ctx| doc.undo(ctx))?;
        Ok(outgoing)
    }

    pub fn redo_local(&mut self) -> SyncResult<Vec<DeltasRecord>> {
        let (_, outgoing) = self.apply_local(|doc, ctx| doc.redo(ctx))?;
        Ok(outgoing)
    }

    fn collect_commits(&mut self) -> Vec<DeltasRecord> {
        let mut outgoing = Vec::new();
        for batch in self.document.take_journal() {
            let record = DeltasRecord::from_commit(self.user_idx, &batch);
            outgoing.push(record.clone());
            self.unverified.push_back(PendingBatch { batch, record });
        }
        outgoing
    }

    /// Take the next broadcast record
    ///
    /// Records this replica already verified are skipped. A record that does
    /// not continue from the verified hash means records were missed: the
    /// error is a `Desync` and the replica is left untouched, ready for
    /// [`ClientSession::catch_up`] with the server's `records_since` or for
    /// [`ClientSession::resync`]. `ServerHandle::recover` does either.
    pub fn receive(&mut self, record: &DeltasRecord) -> SyncResult<()> {
        if self
            .unverified
            .front()
            .is_some_and(|pending| pending.record.same_commit(record))
        {
            self.unverified.pop_front();
            self.mark_verified(record.total_hash);
            debug!(hash = record.total_hash, "own batch confirmed");
            return Ok(());
        }
        if self.recent.contains(&record.total_hash) {
            trace!(hash = record.total_hash, "record already applied");
            return Ok(());
        }
        if record.prev_hash != self.verified_hash {
            return Err(SyncError::Desync {
                expected: record.prev_hash,
                actual: self.verified_hash,
            });
        }

        self.rollback_unverified()?;
        let committed = self.document.apply_remote_deltas(&self.ctx, &record.deltas)?;
        if committed.hash != record.total_hash {
            return Err(SyncError::Desync {
                expected: record.total_hash,
                actual: committed.hash,
            });
        }
        self.mark_verified(committed.hash);
        debug!(origin = record.origin, hash = committed.hash, "applied remote batch");
        Ok(())
    }

    /// Apply the records committed after the verified hash, in order
    pub fn catch_up(&mut self, records: &[DeltasRecord]) -> SyncResult<()> {
        debug!(records = records.len(), from = self.verified_hash, "catching up");
        for record in records {
            self.receive(record)?;
        }
        Ok(())
    }

    /// The server refused a submission
    ///
    /// Every unverified batch rests on the refused one or was sent before
    /// it, so the whole queue goes; batches the server did accept come back
    /// through [`ClientSession::receive`].
    pub fn handle_rejection(&mut self, error: &SyncError) -> SyncResult<()> {
        warn!(%error, pending = self.unverified.len(), "submission rejected, rolling back");
        self.rollback_unverified()
    }

    /// Replace the replica with a fresh snapshot, dropping unverified work
    pub fn resync(&mut self, welcome: &Welcome) -> SyncResult<()> {
        let mut document = Document::from_record(&welcome.record, welcome.user_idx, self.config.clone(), welcome.hash)?;
        document.enable_journal();
        warn!(dropped = self.unverified.len(), hash = welcome.hash, "resynchronized from snapshot");

        self.document = document;
        self.user_idx = welcome.user_idx;
        self.verified_hash = welcome.hash;
        self.recent = VecDeque::from([welcome.hash]);
        self.unverified.clear();
        Ok(())
    }

    fn mark_verified(&mut self, hash: u32) {
        self.verified_hash = hash;
        self.recent.push_back(hash);
        if self.recent.len() > RECENT_HASHES {
            self.recent.pop_front();
        }
    }

    fn rollback_unverified(&mut self) -> SyncResult<()> {
        while let Some(pending) = self.unverified.pop_back() {
            self.document.rollback(&pending.batch)?;
        }
        if self.document.hash() != self.verified_hash {
            return Err(SyncError::Desync {
                expected: self.verified_hash,
                actual: self.document.hash(),
            });
        }
        Ok(())
    }
}

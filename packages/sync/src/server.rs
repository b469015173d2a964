//! # Authoritative server
//!
//! Holds the reference replica and totally orders submissions. A batch is
//! accepted only when it was built on the server's current hash and
//! reproduces the hash the client computed; everything else is a desync the
//! client has to resolve by rolling back.

use crate::errors::{SyncError, SyncResult};
use crate::record::{DeltasRecord, Welcome};
use chrono::Utc;
use massing_common::MAX_USERS;
use massing_document::{Context, Document, DocumentError};
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Debug)]
pub struct SyncServer {
    document: Document,
    ctx: Context,
    clients: BTreeSet<u8>,
    log: Vec<DeltasRecord>,
    /// Hash of the state the log starts from
    base_hash: u32,
}

impl SyncServer {
    pub fn new(document: Document, ctx: Context) -> Self {
        Self {
            base_hash: document.hash(),
            document,
            ctx,
            clients: BTreeSet::new(),
            log: Vec::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn hash(&self) -> u32 {
        self.document.hash()
    }

    pub fn clients(&self) -> impl Iterator<Item = u8> + '_ {
        self.clients.iter().copied()
    }

    /// Hand out the lowest free user index with a snapshot of the document
    ///
    /// Index 0 belongs to the server replica itself.
    pub fn connect(&mut self) -> SyncResult<Welcome> {
        let user_idx = (1..MAX_USERS)
            .find(|idx| !self.clients.contains(idx))
            .ok_or(SyncError::ServerFull)?;
        self.clients.insert(user_idx);

        info!(user_idx, hash = self.hash(), "client connected");
        Ok(Welcome {
            user_idx,
            record: self.document.to_record(),
            hash: self.hash(),
        })
    }

    pub fn disconnect(&mut self, user_idx: u8) -> bool {
        let known = self.clients.remove(&user_idx);
        if known {
            info!(user_idx, "client disconnected");
        }
        known
    }

    /// Commit a client's batch, returning the record to broadcast
    pub fn submit(&mut self, record: DeltasRecord) -> SyncResult<DeltasRecord> {
        if !self.clients.contains(&record.origin) {
            return Err(SyncError::UnknownClient(record.origin));
        }
        if record.deltas.is_empty() {
            return Err(DocumentError::InvalidOperation("empty batch".to_string()).into());
        }

        let hash = self.hash();
        if record.prev_hash != hash {
            warn!(origin = record.origin, server = hash, client = record.prev_hash, "stale submission");
            return Err(SyncError::Desync {
                expected: hash,
                actual: record.prev_hash,
            });
        }

        let committed = self.document.apply_remote_deltas(&self.ctx, &record.deltas)?;
        if committed.hash != record.total_hash {
            self.document.rollback(&committed)?;
            warn!(origin = record.origin, server = committed.hash, client = record.total_hash, "hash diverged");
            return Err(SyncError::Desync {
                expected: committed.hash,
                actual: record.total_hash,
            });
        }

        let accepted = DeltasRecord {
            created_at: Utc::now(),
            ..record
        };
        self.log.push(accepted.clone());
        info!(origin = accepted.origin, hash = accepted.total_hash, deltas = accepted.deltas.len(), "batch committed");
        Ok(accepted)
    }

    /// Records committed after the state with `hash`; `None` when no
    /// logged state has that hash
    pub fn records_since(&self, hash: u32) -> Option<&[DeltasRecord]> {
        match self.log.iter().rposition(|record| record.total_hash == hash) {
            Some(position) => Some(&self.log[position + 1..]),
            None if hash == self.base_hash => Some(&self.log),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use massing_document::DocumentConfig;

    fn server() -> SyncServer {
        SyncServer::new(Document::new(0, DocumentConfig::default()).unwrap(), Context::default())
    }

    #[test]
    fn test_connect_assigns_free_slots() {
        let mut server = server();
        let first = server.connect().unwrap();
        let second = server.connect().unwrap();
        assert_eq!((first.user_idx, second.user_idx), (1, 2));

        assert!(server.disconnect(1));
        assert_eq!(server.connect().unwrap().user_idx, 1);
    }

    #[test]
    fn test_server_full() {
        let mut server = server();
        for _ in 1..MAX_USERS {
            server.connect().unwrap();
        }
        assert_eq!(server.connect().unwrap_err(), SyncError::ServerFull);
    }

    #[test]
    fn test_unknown_origin_rejected() {
        let mut server = server();
        let record = DeltasRecord {
            origin: 9,
            deltas: Vec::new(),
            prev_hash: 0,
            total_hash: 0,
            created_at: Utc::now(),
        };
        assert_eq!(server.submit(record).unwrap_err(), SyncError::UnknownClient(9));
    }

    #[test]
    fn test_records_since_unknown_hash() {
        let server = server();
        assert_eq!(server.records_since(server.hash()).map(<[_]>::len), Some(0));
        assert!(server.records_since(0xdead_beef).is_none());
    }
}

//! Wire format of a committed batch

use chrono::{DateTime, Utc};
use massing_document::{CommittedBatch, Delta, DocumentRecord};
use serde::{Deserialize, Serialize};

/// An expanded batch and the hashes either side of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltasRecord {
    /// User index of the submitting client
    pub origin: u8,
    pub deltas: Vec<Delta>,
    pub prev_hash: u32,
    pub total_hash: u32,
    pub created_at: DateTime<Utc>,
}

impl DeltasRecord {
    pub fn from_commit(origin: u8, batch: &CommittedBatch) -> Self {
        Self {
            origin,
            deltas: batch.deltas.clone(),
            prev_hash: batch.prev_hash,
            total_hash: batch.hash,
            created_at: Utc::now(),
        }
    }

    /// Same batch on the same base, whoever stamped it
    pub fn same_commit(&self, other: &DeltasRecord) -> bool {
        self.origin == other.origin && self.prev_hash == other.prev_hash && self.total_hash == other.total_hash
    }
}

/// What a client receives on connecting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub user_idx: u8,
    pub record: DocumentRecord,
    pub hash: u32,
}

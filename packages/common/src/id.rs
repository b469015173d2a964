//! # Object ids
//!
//! Every vertex, edge, face, graph and object in a document shares one
//! integer id space. Ids are `i32` so that a face reference on an edge can
//! carry its orientation in the sign.
//!
//! ```text
//!  31   30..27      26..0
//! [ 0 | user idx | local counter ]
//! ```
//!
//! Each connected client allocates from its own partition, so speculative
//! edits made concurrently on different replicas never collide.

use crate::error::{CommonError, CommonResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ObjectId = i32;

/// The "no id" sentinel (e.g. the parent of the root group)
pub const ID_NONE: ObjectId = 0;

pub const USER_IDX_BITS: u32 = 4;
pub const LOCAL_ID_BITS: u32 = 27;
pub const MAX_USERS: u8 = 1 << USER_IDX_BITS;

const LOCAL_ID_MASK: i32 = (1 << LOCAL_ID_BITS) - 1;

/// Partition index of an id
pub fn user_index_of(id: ObjectId) -> u8 {
    ((id.unsigned_abs() >> LOCAL_ID_BITS) & ((1 << USER_IDX_BITS) - 1)) as u8
}

/// Local counter part of an id
pub fn local_part_of(id: ObjectId) -> i32 {
    id.abs() & LOCAL_ID_MASK
}

/// Monotonic id allocator over one user's partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    user_idx: u8,
    next_local: i32,
}

impl IdAllocator {
    pub fn new(user_idx: u8) -> CommonResult<Self> {
        if user_idx >= MAX_USERS {
            return Err(CommonError::InvalidUserIndex(user_idx));
        }

        Ok(Self {
            user_idx,
            next_local: 1,
        })
    }

    pub fn user_idx(&self) -> u8 {
        self.user_idx
    }

    /// Peek at the id the next call to [`IdAllocator::next_id`] returns
    pub fn peek(&self) -> ObjectId {
        self.compose(self.next_local)
    }

    /// Allocate the next id
    pub fn next_id(&mut self) -> CommonResult<ObjectId> {
        if self.next_local > LOCAL_ID_MASK {
            return Err(CommonError::IdSpaceExhausted(self.user_idx));
        }

        let id = self.compose(self.next_local);
        self.next_local += 1;
        Ok(id)
    }

    /// Raw counter, used to checkpoint and restore around a batch
    pub fn counter(&self) -> i32 {
        self.next_local
    }

    pub fn restore(&mut self, counter: i32) {
        self.next_local = counter;
    }

    /// Make sure an id that appeared in applied state is never handed out again
    pub fn observe(&mut self, id: ObjectId) {
        if id == ID_NONE || user_index_of(id) != self.user_idx {
            return;
        }

        let local = local_part_of(id);
        if local >= self.next_local {
            self.next_local = local + 1;
        }
    }

    fn compose(&self, local: i32) -> ObjectId {
        ((self.user_idx as i32) << LOCAL_ID_BITS) | local
    }
}

/// Old id → new ids table produced by paste, duplicate and delete→move
///
/// One old element may map onto several new ones when an edge is split
/// against existing geometry in the target graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRemap {
    map: BTreeMap<ObjectId, Vec<ObjectId>>,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: ObjectId, new: ObjectId) {
        let entry = self.map.entry(old).or_default();
        if !entry.contains(&new) {
            entry.push(new);
        }
    }

    /// First mapped id, used where exactly one replacement is needed
    pub fn get(&self, old: ObjectId) -> Option<ObjectId> {
        self.map.get(&old).and_then(|ids| ids.first().copied())
    }

    pub fn get_all(&self, old: ObjectId) -> &[ObjectId] {
        self.map.get(&old).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, old: ObjectId) -> bool {
        self.map.contains_key(&old)
    }

    pub fn extend(&mut self, other: &IdRemap) {
        for (old, news) in &other.map {
            for new in news {
                self.insert(*old, *new);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &[ObjectId])> {
        self.map.iter().map(|(old, news)| (*old, news.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

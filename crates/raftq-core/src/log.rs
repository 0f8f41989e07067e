//! # log
//!
//! why: manage the replicated log of queue operations
//! relations: used by node.rs for replication checks and the apply pipeline
//! what: Operation, LogEntry, RaftLog append/truncate/query store

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NodeId;

/// A client operation carried by a log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// commits without touching the queue
    Nop,
    /// push the payload at the queue tail
    Enqueue(Value),
    /// pop the queue head
    Dequeue,
}

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// the index of this entry in the log (1-indexed)
    pub index: u64,
    /// the term when this entry was created
    pub term: u64,
    /// process that submitted the operation, so the committing leader can reply
    pub requester: NodeId,
    /// the operation to apply to the queue
    pub op: Operation,
}

impl LogEntry {
    /// create a new log entry
    pub fn new(index: u64, term: u64, requester: NodeId, op: Operation) -> Self {
        Self {
            index,
            term,
            requester,
            op,
        }
    }
}

/// the ordered entry sequence with the only mutators the protocol needs
///
/// indices run 1..N with no gaps and entry terms are non-decreasing in index.
/// index 0 is the empty sentinel: accessors report term 0 there and `get`
/// returns none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaftLog {
    entries: Vec<LogEntry>,
}

impl RaftLog {
    /// create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// index of the last entry (0 if empty)
    pub fn last_index(&self) -> u64 {
        self.entries.last().map(|e| e.index).unwrap_or(0)
    }

    /// term of the last entry (0 if empty)
    pub fn last_term(&self) -> u64 {
        self.entries.last().map(|e| e.term).unwrap_or(0)
    }

    /// entry at a specific index, none for the sentinel or past the tail
    pub fn get(&self, index: u64) -> Option<&LogEntry> {
        if index == 0 || index > self.last_index() {
            return None;
        }
        // contiguity from 1 makes position arithmetic exact
        self.entries.get((index - 1) as usize)
    }

    /// term of the entry at an index (0 if not stored)
    pub fn term_at(&self, index: u64) -> u64 {
        self.get(index).map(|e| e.term).unwrap_or(0)
    }

    /// true iff an entry is stored at the index
    pub fn has(&self, index: u64) -> bool {
        index > 0 && index <= self.last_index()
    }

    /// entries with index >= from, empty if from is past the tail
    pub fn suffix_from(&self, from: u64) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.index >= from)
            .cloned()
            .collect()
    }

    /// drop every entry with index >= from (no-op past the tail)
    pub fn truncate_from(&mut self, from: u64) {
        self.entries.retain(|e| e.index < from);
    }

    /// append entries in order; each must continue the sequence at last_index + 1
    pub fn append(&mut self, entries: Vec<LogEntry>) {
        for entry in entries {
            debug_assert_eq!(entry.index, self.last_index() + 1);
            self.entries.push(entry);
        }
    }

    /// number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// true iff no entries are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// full copy of the stored entries, for debug queries
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.clone()
    }
}

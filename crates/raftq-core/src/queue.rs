//! # queue
//!
//! why: the applied-side fifo state machine, mutated only by committed entries
//! relations: owned by node.rs and driven by its commit/apply pipeline
//! what: FifoQueue, ApplyOutcome, snapshot for debug queries

use std::collections::VecDeque;

use serde_json::Value;

use crate::Operation;

/// result of applying one committed operation
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// nop or enqueue applied
    Ok,
    /// dequeue applied against an empty queue
    Empty,
    /// dequeue applied, head value popped
    Value(Value),
}

/// the replicated fifo queue
///
/// derived state: fully reconstructible by replaying the applied log prefix
#[derive(Debug, Clone, Default)]
pub struct FifoQueue {
    items: VecDeque<Value>,
}

impl FifoQueue {
    /// create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// apply one committed operation, exactly once per entry
    pub fn apply(&mut self, op: &Operation) -> ApplyOutcome {
        match op {
            Operation::Nop => ApplyOutcome::Ok,
            Operation::Enqueue(value) => {
                self.items.push_back(value.clone());
                ApplyOutcome::Ok
            }
            Operation::Dequeue => match self.items.pop_front() {
                Some(value) => ApplyOutcome::Value(value),
                None => ApplyOutcome::Empty,
            },
        }
    }

    /// number of queued values
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// true iff nothing is queued
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// current contents, head first
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.iter().cloned().collect()
    }
}

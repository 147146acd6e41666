//! Timer queue
//!
//! A single priority queue of `(time, action)` entries shared by every
//! sequence in a session. Entries are ordered by time, then by insertion
//! order, so actions scheduled for the same instant fire in the order they
//! were added.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::sequencer::SequenceId;

/// What to do when an entry comes due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Sound the descriptor at `index` (non-rests only)
    Trigger { index: usize },
    NoteStart { index: usize },
    NoteEnd { index: usize },
    /// The sequence's last descriptor has ended
    Complete,
}

#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub at: f64,
    pub sequence: SequenceId,
    pub action: Action,
    order: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the max-heap pops the earliest entry first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.order.cmp(&self.order))
    }
}

#[derive(Debug, Default)]
pub struct Timeline {
    heap: BinaryHeap<Entry>,
    next_order: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: f64, sequence: SequenceId, action: Action) {
        let order = self.next_order;
        self.next_order += 1;
        self.heap.push(Entry {
            at,
            sequence,
            action,
            order,
        });
    }

    /// Remove and return the earliest entry if it is due at `now`
    pub fn pop_due(&mut self, now: f64) -> Option<Entry> {
        if self.heap.peek().is_some_and(|e| e.at <= now) {
            self.heap.pop()
        } else {
            None
        }
    }

    /// Time of the earliest pending entry
    pub fn next_deadline(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.at)
    }

    /// Drop every pending entry of `sequence`; returns how many were dropped
    pub fn cancel(&mut self, sequence: SequenceId) -> usize {
        let before = self.heap.len();
        self.heap.retain(|e| e.sequence != sequence);
        before - self.heap.len()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

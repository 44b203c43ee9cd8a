use std::collections::BinaryHeap;

use crate::geo::TileCoord;

/// Scheduling tier for a tile fetch. Order matters: `Immediate` outranks
/// everything, `Low` is speculative prefetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLoadRequest {
    pub tile: TileCoord,
    pub priority: Priority,
    pub seq: u64,
    pub epoch: u64,
}

impl Ord for TileLoadRequest {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, then FIFO within a priority so old
        // low-priority requests are not starved by newer ones.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TileLoadRequest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending fetch requests ordered by (priority, insertion order).
#[derive(Debug, Default)]
pub struct LoadQueue {
    heap: BinaryHeap<TileLoadRequest>,
    next_seq: u64,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tile: TileCoord, priority: Priority, epoch: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TileLoadRequest {
            tile,
            priority,
            seq,
            epoch,
        });
    }

    pub fn pop(&mut self) -> Option<TileLoadRequest> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

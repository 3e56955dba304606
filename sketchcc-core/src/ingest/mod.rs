//! Ingestion backends: group half-edge updates into per-vertex batches
//!
//! Insertions and deletions are the same XOR toggle once they reach a
//! sketch, so a backend only moves `(src, dst)` pairs. The graph pushes two
//! half-edges per logical update and its workers pull whole batches.

mod gutters;

pub use gutters::StandaloneGutters;

use sketchcc_common::NodeId;

/// Updates for one vertex, ready to be turned into a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub node: NodeId,
    /// Other endpoint of every buffered half-edge
    pub dests: Vec<NodeId>,
}

/// A source of per-vertex update batches shared by producers and workers.
pub trait BatchSource: Send + Sync {
    /// Buffer the half-edge `src -> dst`.
    fn insert(&self, src: NodeId, dst: NodeId);

    /// Release every buffered update as a batch, however small.
    fn force_flush(&self);

    /// Next ready batch. Blocks while none is ready unless non-blocking
    /// mode is set, in which case an empty queue yields `None`.
    fn get_batch(&self) -> Option<Batch>;

    /// Switch blocking mode; turning non-blocking on wakes every waiter.
    fn set_non_block(&self, non_block: bool);
}

//! Error types for the sketchcc toolkit
//!
//! Sampling outcomes that are expected during normal operation (a sketch of a
//! zero vector, a failed bucket search) are modelled as values by the sketch
//! layer. The variants here are the conditions that end an operation.

use crate::types::{Edge, NodeId};

/// Main error type for sketchcc operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An update raced or followed a connected components computation
    #[error("the graph cannot be updated: connected components algorithm has already started")]
    UpdateLocked,

    /// A supernode was sampled more times than it has levels
    #[error("supernode has no sketch levels left to sample")]
    OutOfQueries,

    /// A sketch was queried a second time
    #[error("this sketch has already been sampled")]
    AlreadyQueried,

    /// No bucket of the sampled sketch isolated a single coordinate
    #[error("sampling vertex {vertex} found no good bucket")]
    SampleFailed { vertex: NodeId },

    /// A recovered edge cannot be part of the sampled vertex's cut
    #[error("vertex {vertex} recovered edge {edge} which is not in its cut")]
    InvalidSample { vertex: NodeId, edge: Edge },

    /// Worker threads could not apply some update batches
    #[error("{batches} update batches could not be applied to the sketches")]
    IngestFailed { batches: u64 },

    /// Two sketches with different shapes or seeds were combined
    #[error("sketch shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The pairing function would overflow 64 bits
    #[error("pairing ({0}, {1}) overflows the 64-bit edge domain")]
    PairingOverflow(u64, u64),

    #[error("vertex {node} is out of range for a graph of {num_nodes} nodes")]
    NodeOutOfRange { node: NodeId, num_nodes: u64 },

    #[error("self loop on vertex {node} is not a valid edge")]
    SelfLoop { node: NodeId },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Snapshot file is truncated, corrupt or does not match the configuration
    #[error("invalid snapshot: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for sketchcc operations
pub type Result<T> = std::result::Result<T, Error>;

//! Graph vocabulary shared between the engine and its front ends

use std::fmt;

/// Vertex identifier. Vertices of a graph with `n` nodes are `0..n`.
pub type NodeId = u64;

/// Kind of a streamed edge update.
///
/// Sketches are XOR-linear, so both kinds are applied the same way; the kind
/// only matters to callers that keep an exact edge set next to the sketches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Insert,
    Delete,
}

impl UpdateKind {
    /// Decode the numeric code used by edge-stream files (0 = insert, 1 = delete)
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(UpdateKind::Insert),
            1 => Some(UpdateKind::Delete),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            UpdateKind::Insert => 0,
            UpdateKind::Delete => 1,
        }
    }
}

/// Undirected edge, stored with `src <= dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub src: NodeId,
    pub dst: NodeId,
}

impl Edge {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            Self { src: a, dst: b }
        } else {
            Self { src: b, dst: a }
        }
    }

    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.src, self.dst)
    }

    /// The endpoint opposite `node`, if `node` is one of the endpoints
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if node == self.src {
            Some(self.dst)
        } else if node == self.dst {
            Some(self.src)
        } else {
            None
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.src, self.dst)
    }
}

/// One logical edge update as submitted by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphUpdate {
    pub edge: Edge,
    pub kind: UpdateKind,
}

impl GraphUpdate {
    pub fn insert(a: NodeId, b: NodeId) -> Self {
        Self {
            edge: Edge::new(a, b),
            kind: UpdateKind::Insert,
        }
    }

    pub fn delete(a: NodeId, b: NodeId) -> Self {
        Self {
            edge: Edge::new(a, b),
            kind: UpdateKind::Delete,
        }
    }
}

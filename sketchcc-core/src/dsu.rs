//! Disjoint-set forest over vertex ids

use sketchcc_common::NodeId;

/// Union-find with path compression and size tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisjointSet {
    parent: Vec<NodeId>,
    size: Vec<u64>,
}

impl DisjointSet {
    /// `n` singleton sets
    pub fn new(n: u64) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n as usize],
        }
    }

    /// Representative of `x`, compressing the path on the way.
    pub fn find(&mut self, x: NodeId) -> NodeId {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = x;
        while cur != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    pub fn is_root(&self, x: NodeId) -> bool {
        self.parent[x as usize] == x
    }

    pub fn size_of(&self, root: NodeId) -> u64 {
        self.size[root as usize]
    }

    /// Link root `absorbed` under root `survivor`.
    pub fn link(&mut self, absorbed: NodeId, survivor: NodeId) {
        debug_assert!(self.is_root(absorbed) && self.is_root(survivor));
        if absorbed == survivor {
            return;
        }
        self.parent[absorbed as usize] = survivor;
        self.size[survivor as usize] += self.size[absorbed as usize];
    }

    /// Weighted union of two roots; the smaller tree is absorbed.
    ///
    /// Returns `(survivor, absorbed)`. Ties keep the smaller id.
    pub fn union_by_size(&mut self, a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        let (survivor, absorbed) = match self.size[a as usize].cmp(&self.size[b as usize]) {
            std::cmp::Ordering::Greater => (a, b),
            std::cmp::Ordering::Less => (b, a),
            std::cmp::Ordering::Equal => (a.min(b), a.max(b)),
        };
        self.link(absorbed, survivor);
        (survivor, absorbed)
    }

    /// Sets as sorted member lists, ordered by smallest member.
    pub fn groups(&mut self) -> Vec<Vec<NodeId>> {
        let n = self.parent.len() as u64;
        let mut slot = vec![usize::MAX; n as usize];
        let mut groups: Vec<Vec<NodeId>> = Vec::new();
        // Vertices are visited in increasing order, so groups are created in
        // order of their smallest member and filled already sorted.
        for v in 0..n {
            let root = self.find(v) as usize;
            if slot[root] == usize::MAX {
                slot[root] = groups.len();
                groups.push(Vec::new());
            }
            groups[slot[root]].push(v);
        }
        groups
    }
}

//! Per-vertex stack of sketches over the edge domain
//!
//! A supernode holds one [`Sketch`] per Borůvka round. Level `i` is seeded
//! `seed + i`, so the same level of two supernodes built from the same graph
//! seed can be merged. Sampling consumes the lowest unspent level.

use std::io::{Read, Write};

use rayon::prelude::*;
use rayon::ThreadPool;
use sketchcc_common::{Edge, Error, Result};

use crate::pairing;
use crate::sketch::{Sketch, SketchSample, SketchShape};

/// Outcome of [`Supernode::sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSample {
    /// An edge leaving the component
    Edge(Edge),
    /// The cut is empty
    Isolated,
    /// The level's sketch could not isolate an edge
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Supernode {
    seed: u64,
    num_nodes: u64,
    idx: usize,
    levels: Vec<Sketch>,
}

impl Supernode {
    /// Number of sketch levels for a graph of `num_nodes` vertices: `ceil(log2 n) + 1`.
    ///
    /// Every round of Borůvka at least halves the number of live components,
    /// so this bounds the number of samples any one supernode can see.
    pub fn level_count(num_nodes: u64) -> usize {
        if num_nodes <= 1 {
            return 1;
        }
        (u64::BITS - (num_nodes - 1).leading_zeros()) as usize + 1
    }

    /// Empty supernode. `shape` must come from [`SketchShape::for_graph`].
    pub fn new(num_nodes: u64, seed: u64, shape: SketchShape) -> Self {
        let levels = (0..Self::level_count(num_nodes))
            .map(|i| Sketch::new(shape, seed.wrapping_add(i as u64)))
            .collect();
        Self {
            seed,
            num_nodes,
            idx: 0,
            levels,
        }
    }

    /// Read a supernode written by [`Supernode::write_binary`]. The level cursor starts at 0.
    pub fn read_from<R: Read>(
        num_nodes: u64,
        seed: u64,
        shape: SketchShape,
        reader: &mut R,
    ) -> Result<Self> {
        let levels = (0..Self::level_count(num_nodes))
            .map(|i| Sketch::read_from(shape, seed.wrapping_add(i as u64), reader))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            seed,
            num_nodes,
            idx: 0,
            levels,
        })
    }

    /// Bytes written by [`Supernode::write_binary`]
    pub fn serialized_size(num_nodes: u64, shape: &SketchShape) -> usize {
        Self::level_count(num_nodes) * shape.serialized_size()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_nodes(&self) -> u64 {
        self.num_nodes
    }

    pub fn shape(&self) -> &SketchShape {
        self.levels[0].shape()
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Levels already spent by [`Supernode::sample`]
    pub fn levels_used(&self) -> usize {
        self.idx
    }

    /// Zero every level, reseed, and rewind the level cursor.
    pub fn reset(&mut self, seed: u64) {
        self.seed = seed;
        self.idx = 0;
        for (i, level) in self.levels.iter_mut().enumerate() {
            level.reset(seed.wrapping_add(i as u64));
        }
    }

    /// Sample one edge of the cut from the lowest unspent level.
    pub fn sample(&mut self) -> Result<NodeSample> {
        let level = self.levels.get_mut(self.idx).ok_or(Error::OutOfQueries)?;
        self.idx += 1;
        Ok(match level.query()? {
            SketchSample::Good(idx) => NodeSample::Edge(pairing::unpair(idx)),
            SketchSample::Zero => NodeSample::Isolated,
            SketchSample::Fail => NodeSample::Failed,
        })
    }

    /// Absorb `other`: levels from `max(idx, other.idx)` onward are XORed in.
    ///
    /// Levels below the cursor are spent in at least one of the two, so they
    /// are left untouched.
    pub fn merge(&mut self, other: &Supernode) -> Result<()> {
        self.check_compatible(other)?;
        self.idx = self.idx.max(other.idx);
        for (dst, src) in self.levels.iter_mut().zip(&other.levels).skip(self.idx) {
            dst.merge(src)?;
        }
        Ok(())
    }

    /// Toggle edge index `value` in every unspent level.
    pub fn update(&mut self, value: u64) {
        let idx = self.idx;
        for level in &mut self.levels[idx..] {
            level.update(value);
        }
    }

    /// XOR every level of `delta` into `self`, spent or not.
    pub fn apply_delta(&mut self, delta: &Supernode) -> Result<()> {
        self.check_compatible(delta)?;
        for (dst, src) in self.levels.iter_mut().zip(&delta.levels) {
            dst.merge(src)?;
        }
        Ok(())
    }

    /// Rebuild `dest` as the sketch of `updates` under `seed`.
    ///
    /// Levels are independent and are built in parallel, on `pool` when one
    /// is given and on the ambient rayon pool otherwise.
    pub fn delta_build(
        dest: &mut Supernode,
        seed: u64,
        updates: &[u64],
        pool: Option<&ThreadPool>,
    ) {
        dest.reset(seed);
        let build = |levels: &mut [Sketch]| {
            levels
                .par_iter_mut()
                .for_each(|level| level.batch_update(updates));
        };
        match pool {
            Some(pool) => pool.install(|| build(&mut dest.levels)),
            None => build(&mut dest.levels),
        }
    }

    /// Write every level in order.
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for level in &self.levels {
            level.write_binary(writer)?;
        }
        Ok(())
    }

    fn check_compatible(&self, other: &Supernode) -> Result<()> {
        if self.seed != other.seed
            || self.num_nodes != other.num_nodes
            || self.levels.len() != other.levels.len()
        {
            return Err(Error::ShapeMismatch(format!(
                "supernode (seed {}, {} nodes, {} levels) vs (seed {}, {} nodes, {} levels)",
                self.seed,
                self.num_nodes,
                self.levels.len(),
                other.seed,
                other.num_nodes,
                other.levels.len()
            )));
        }
        Ok(())
    }
}

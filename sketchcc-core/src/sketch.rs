//! L0-sampling sketch over a vector of length `n`
//!
//! The sketch is a `num_buckets × num_guesses` grid of buckets. Row `i`
//! routes element `x` into guesses `0..=g` where `g` is the number of
//! trailing zero bits of `col_index_hash(i, x)`, so guess `j` sees each
//! element with probability `2^-j`. A query looks for a bucket that holds
//! exactly one surviving element.
//!
//! # Storage
//!
//! All `a` values followed by all `c` values live in one owned buffer of
//! `2 · num_buckets · num_guesses` words. Bucket `(row, guess)` is at offset
//! `row · num_guesses + guess` in either half.

use std::io::{Read, Write};
use std::ops::AddAssign;

use sketchcc_common::{Error, Result};

use crate::bucket;

/// Shape parameters shared by every sketch of a graph.
///
/// Built once from the vector length and bucket factor and handed to every
/// constructor; two sketches may only be merged when their shapes match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SketchShape {
    n: u64,
    factor: f64,
    num_buckets: usize,
    num_guesses: usize,
}

impl SketchShape {
    /// Shape for vectors of length `n`.
    ///
    /// `num_buckets = ceil(factor · (log2 n + 1))`, `num_guesses = ceil(log2 n + 2)`.
    pub fn new(n: u64, factor: f64) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidConfig("sketch vector length must be positive".into()));
        }
        if !(factor.is_finite() && factor > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "bucket factor must be a positive number, got {factor}"
            )));
        }
        let log_n = (n as f64).log2();
        let num_buckets = ((factor * (log_n + 1.0)).ceil() as usize).max(1);
        let num_guesses = (log_n + 2.0).ceil() as usize;
        Ok(Self {
            n,
            factor,
            num_buckets,
            num_guesses,
        })
    }

    /// Shape of the sketches in a supernode: vectors over the `num_nodes²` edge domain.
    pub fn for_graph(num_nodes: u64, factor: f64) -> Result<Self> {
        let n = num_nodes.checked_mul(num_nodes).ok_or_else(|| {
            Error::InvalidConfig(format!("{num_nodes} nodes overflow the 64-bit edge domain"))
        })?;
        Self::new(n, factor)
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn num_guesses(&self) -> usize {
        self.num_guesses
    }

    /// Buckets per sketch
    pub fn num_elems(&self) -> usize {
        self.num_buckets * self.num_guesses
    }

    /// Bytes written by [`Sketch::write_binary`]
    pub fn serialized_size(&self) -> usize {
        self.num_elems() * 2 * std::mem::size_of::<u64>()
    }
}

/// Tri-state result of [`Sketch::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SketchSample {
    /// A single nonzero coordinate was recovered
    Good(u64),
    /// Every bucket is empty: the sketched vector is zero
    Zero,
    /// Some bucket is nonzero but none isolates one coordinate
    Fail,
}

/// A linear sketch of one vector. May be queried once.
#[derive(Debug, Clone)]
pub struct Sketch {
    seed: u64,
    shape: SketchShape,
    already_queried: bool,
    buckets: Vec<u64>,
}

impl Sketch {
    /// Zero-initialized sketch.
    pub fn new(shape: SketchShape, seed: u64) -> Self {
        Self {
            seed,
            shape,
            already_queried: false,
            buckets: vec![0; shape.num_elems() * 2],
        }
    }

    /// Read a sketch written by [`Sketch::write_binary`].
    pub fn read_from<R: Read>(shape: SketchShape, seed: u64, reader: &mut R) -> Result<Self> {
        let mut bytes = vec![0u8; shape.serialized_size()];
        reader.read_exact(&mut bytes)?;
        let buckets = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_le_bytes(word)
            })
            .collect();
        Ok(Self {
            seed,
            shape,
            already_queried: false,
            buckets,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn shape(&self) -> &SketchShape {
        &self.shape
    }

    pub fn is_queried(&self) -> bool {
        self.already_queried
    }

    /// Zero every bucket and reseed, keeping the allocation.
    pub fn reset(&mut self, seed: u64) {
        self.seed = seed;
        self.already_queried = false;
        self.buckets.fill(0);
    }

    /// Toggle coordinate `idx`. Applying the same update twice cancels it.
    pub fn update(&mut self, idx: u64) {
        let seed = self.seed;
        let hash = bucket::index_hash(idx, seed);
        let guesses = self.shape.num_guesses;
        let (a, c) = self.buckets.split_at_mut(self.shape.num_elems());

        for row in 0..self.shape.num_buckets {
            let col_hash = bucket::col_index_hash(row as u32, idx, seed);
            let base = row * guesses;
            for guess in 0..guesses {
                if !bucket::contains(col_hash, guess as u32) {
                    break;
                }
                bucket::update(&mut a[base + guess], &mut c[base + guess], idx, hash);
            }
        }
    }

    /// Apply `updates` in order; identical to calling [`Sketch::update`] on each.
    pub fn batch_update(&mut self, updates: &[u64]) {
        for &idx in updates {
            self.update(idx);
        }
    }

    /// Recover one nonzero coordinate.
    ///
    /// Scans buckets row-major and returns the first good one. Returns
    /// [`Error::AlreadyQueried`] on the second call.
    pub fn query(&mut self) -> Result<SketchSample> {
        if self.already_queried {
            return Err(Error::AlreadyQueried);
        }
        self.already_queried = true;

        let (n, seed) = (self.shape.n, self.seed);
        let guesses = self.shape.num_guesses;
        let (a, c) = self.buckets.split_at(self.shape.num_elems());
        let mut all_zero = true;

        for row in 0..self.shape.num_buckets {
            for guess in 0..guesses {
                let id = row * guesses + guess;
                if a[id] == 0 && c[id] == 0 {
                    continue;
                }
                all_zero = false;
                if bucket::is_good_at(a[id], c[id], n, row as u32, guess as u32, seed) {
                    return Ok(SketchSample::Good(a[id]));
                }
            }
        }

        Ok(if all_zero {
            SketchSample::Zero
        } else {
            SketchSample::Fail
        })
    }

    /// XOR `other` into `self`. Shapes and seeds must match.
    pub fn merge(&mut self, other: &Sketch) -> Result<()> {
        if self.seed != other.seed || self.shape != other.shape {
            return Err(Error::ShapeMismatch(format!(
                "cannot merge sketch (seed {}, {:?}) into sketch (seed {}, {:?})",
                other.seed, other.shape, self.seed, self.shape
            )));
        }
        for (dst, src) in self.buckets.iter_mut().zip(&other.buckets) {
            *dst ^= *src;
        }
        self.already_queried |= other.already_queried;
        Ok(())
    }

    /// Write the `a` array then the `c` array, little-endian.
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let mut bytes = Vec::with_capacity(self.shape.serialized_size());
        for word in &self.buckets {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        writer.write_all(&bytes)
    }
}

impl PartialEq for Sketch {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed
            && self.shape == other.shape
            && self.already_queried == other.already_queried
            && self.buckets == other.buckets
    }
}

impl AddAssign<&Sketch> for Sketch {
    /// Panics on a shape or seed mismatch; use [`Sketch::merge`] to get an error instead.
    fn add_assign(&mut self, rhs: &Sketch) {
        if let Err(e) = self.merge(rhs) {
            panic!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn shape(n: u64, factor: f64) -> SketchShape {
        SketchShape::new(n, factor).unwrap()
    }

    #[test]
    fn shape_follows_log_formula() {
        let s = shape(1024, 1.0);
        assert_eq!(s.num_buckets(), 11);
        assert_eq!(s.num_guesses(), 12);
        assert_eq!(s.serialized_size(), 11 * 12 * 16);

        let half = shape(1024, 0.5);
        assert_eq!(half.num_buckets(), 6);
    }

    #[test]
    fn shape_rejects_bad_parameters() {
        assert!(SketchShape::new(0, 1.0).is_err());
        assert!(SketchShape::new(10, 0.0).is_err());
        assert!(SketchShape::new(10, f64::NAN).is_err());
        assert!(SketchShape::for_graph(u64::MAX, 1.0).is_err());
    }

    #[test]
    fn empty_sketch_is_zero_then_already_queried() {
        let mut sketch = Sketch::new(shape(10, 1.0), 17);
        assert_eq!(sketch.query().unwrap(), SketchSample::Zero);
        assert!(matches!(sketch.query(), Err(Error::AlreadyQueried)));
    }

    #[test]
    fn second_query_fails_after_good_result() {
        let mut sketch = Sketch::new(shape(1000, 1.0), 3);
        sketch.update(42);
        assert_eq!(sketch.query().unwrap(), SketchSample::Good(42));
        assert!(matches!(sketch.query(), Err(Error::AlreadyQueried)));
    }

    #[test]
    fn only_index_zero_updated() {
        let mut sketch = Sketch::new(shape(1000, 1.0), 99);
        sketch.update(0);
        sketch.update(0);
        sketch.update(0);
        assert_eq!(sketch.query().unwrap(), SketchSample::Good(0));
    }

    #[test]
    fn double_update_restores_empty_sketch() {
        let s = shape(1 << 20, 1.0);
        let mut sketch = Sketch::new(s, 8);
        sketch.update(123_456);
        sketch.update(123_456);
        assert_eq!(sketch, Sketch::new(s, 8));
        assert_eq!(sketch.query().unwrap(), SketchSample::Zero);
    }

    #[test]
    fn batch_update_matches_single_updates() {
        let s = shape(1_000_000_000, 1.0);
        let mut rng = StdRng::seed_from_u64(11);
        let updates: Vec<u64> = (0..2_000).map(|_| rng.random_range(0..s.n())).collect();

        let mut single = Sketch::new(s, 5);
        for &u in &updates {
            single.update(u);
        }
        let mut batched = Sketch::new(s, 5);
        batched.batch_update(&updates);
        assert_eq!(single, batched);
    }

    #[test]
    fn merge_equals_concatenated_stream() {
        let s = shape(10_000, 1.0);
        let mut rng = StdRng::seed_from_u64(21);
        let first: Vec<u64> = (0..300).map(|_| rng.random_range(0..s.n())).collect();
        let second: Vec<u64> = (0..300).map(|_| rng.random_range(0..s.n())).collect();

        let mut left = Sketch::new(s, 77);
        left.batch_update(&first);
        let mut right = Sketch::new(s, 77);
        right.batch_update(&second);
        left += &right;

        let mut whole = Sketch::new(s, 77);
        whole.batch_update(&second);
        whole.batch_update(&first);
        assert_eq!(left, whole);
    }

    #[test]
    fn merge_rejects_mismatched_seed_or_shape() {
        let mut a = Sketch::new(shape(100, 1.0), 1);
        assert!(matches!(
            a.merge(&Sketch::new(shape(100, 1.0), 2)),
            Err(Error::ShapeMismatch(_))
        ));
        assert!(matches!(
            a.merge(&Sketch::new(shape(200, 1.0), 1)),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn merge_carries_queried_flag() {
        let s = shape(100, 1.0);
        let mut queried = Sketch::new(s, 4);
        queried.query().unwrap();
        let mut fresh = Sketch::new(s, 4);
        fresh.merge(&queried).unwrap();
        assert!(fresh.is_queried());
    }

    #[test]
    fn binary_round_trip() {
        let s = shape(1 << 16, 1.0);
        let mut sketch = Sketch::new(s, 1234);
        for idx in (0..5_000).step_by(7) {
            sketch.update(idx);
        }
        let mut bytes = Vec::new();
        sketch.write_binary(&mut bytes).unwrap();
        assert_eq!(bytes.len(), s.serialized_size());

        let restored = Sketch::read_from(s, 1234, &mut bytes.as_slice()).unwrap();
        assert_eq!(restored, sketch);
    }

    #[test]
    fn truncated_input_is_an_io_error() {
        let s = shape(64, 1.0);
        let bytes = vec![0u8; s.serialized_size() - 1];
        assert!(matches!(
            Sketch::read_from(s, 0, &mut bytes.as_slice()),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn vector_without_isolating_bucket_fails() {
        // Peel off every element some bucket would isolate; what is left
        // collides in every bucket.
        let s = shape(100, 1.0);
        let seed = 0;
        let mut present = vec![true; s.n() as usize];
        let mut row = 0;
        let mut guess = 0;
        while row < s.num_buckets() {
            if guess == s.num_guesses() {
                row += 1;
                guess = 0;
                continue;
            }
            let mut lone = None;
            let mut count = 0;
            for (k, _) in present.iter().enumerate().filter(|(_, p)| **p) {
                let h = bucket::col_index_hash(row as u32, k as u64, seed);
                if bucket::contains(h, guess as u32) {
                    count += 1;
                    lone = Some(k);
                }
            }
            match (count, lone) {
                (1, Some(k)) => {
                    present[k] = false;
                    row = 0;
                    guess = 0;
                }
                _ => guess += 1,
            }
        }

        let mut sketch = Sketch::new(s, seed);
        let mut remaining = 0;
        for (k, _) in present.iter().enumerate().filter(|(_, p)| **p) {
            sketch.update(k as u64);
            remaining += 1;
        }
        let expected = if remaining == 0 {
            SketchSample::Zero
        } else {
            SketchSample::Fail
        };
        assert_eq!(sketch.query().unwrap(), expected);
    }

    #[test]
    fn sampling_recovers_live_coordinates() {
        let vec_size = 100u64;
        let s = shape(vec_size, 1.0);
        let mut rng = StdRng::seed_from_u64(2024);
        let mut failures = 0;

        for seed in 0..300u64 {
            let mut live = vec![false; vec_size as usize];
            let mut sketch = Sketch::new(s, seed);
            for _ in 0..100 {
                let idx = rng.random_range(0..vec_size);
                live[idx as usize] = !live[idx as usize];
                sketch.update(idx);
            }
            match sketch.query().unwrap() {
                SketchSample::Good(idx) => {
                    assert!(idx < vec_size);
                    assert!(live[idx as usize], "sampled coordinate {idx} is zero");
                }
                SketchSample::Zero => assert!(live.iter().all(|l| !l)),
                SketchSample::Fail => failures += 1,
            }
        }
        // Failure probability per sketch is far below 1%
        assert!(failures <= 3, "{failures} sampling failures out of 300");
    }

    #[test]
    fn merged_sketch_samples_symmetric_difference() {
        let vec_size = 1_000u64;
        let s = shape(vec_size, 1.0);
        let mut rng = StdRng::seed_from_u64(77);
        let mut failures = 0;

        for seed in 0..200u64 {
            let mut live = vec![false; vec_size as usize];
            let mut left = Sketch::new(s, seed);
            let mut right = Sketch::new(s, seed);
            for _ in 0..200 {
                let x = rng.random_range(0..vec_size);
                live[x as usize] = !live[x as usize];
                left.update(x);
                let y = rng.random_range(0..vec_size);
                live[y as usize] = !live[y as usize];
                right.update(y);
            }
            left.merge(&right).unwrap();
            match left.query().unwrap() {
                SketchSample::Good(idx) => assert!(live[idx as usize]),
                SketchSample::Zero => assert!(live.iter().all(|l| !l)),
                SketchSample::Fail => failures += 1,
            }
        }
        assert!(failures <= 3, "{failures} sampling failures out of 200");
    }
}

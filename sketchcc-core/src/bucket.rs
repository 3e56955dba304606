//! Bucket primitives shared by every sketch bucket
//!
//! A bucket is a pair `(a, c)`: `a` is the XOR of the element ids routed to
//! it and `c` the XOR of their hashes. XOR is its own inverse, so the same
//! update inserts and deletes, and two buckets fed by independent streams
//! combine by XOR.

use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Seeded hash of an element id. XORed into `c` and used by the goodness test.
#[inline]
pub fn index_hash(idx: u64, seed: u64) -> u64 {
    xxh3_64_with_seed(&idx.to_le_bytes(), seed)
}

/// Seeded hash of `(col, idx)`, deciding which guesses of row `col` hold `idx`.
#[inline]
pub fn col_index_hash(col: u32, idx: u64, seed: u64) -> u64 {
    let mut buf = [0u8; 12];
    buf[..4].copy_from_slice(&col.to_le_bytes());
    buf[4..].copy_from_slice(&idx.to_le_bytes());
    xxh3_64_with_seed(&buf, seed)
}

/// True iff `col_index_hash` is divisible by `2^guess`.
///
/// Divisibility by `2^(g+1)` implies divisibility by `2^g`, so the guesses of
/// a row keep each element with probability `2^-g` in a nested sequence.
#[inline]
pub fn contains(col_index_hash: u64, guess: u32) -> bool {
    col_index_hash.trailing_zeros() >= guess
}

/// Goodness test without the row membership check.
#[inline]
pub fn is_good(a: u64, c: u64, n: u64, seed: u64) -> bool {
    a < n && c == index_hash(a, seed)
}

/// Goodness test that also checks the recovered value belongs to `(col, guess)`.
#[inline]
pub fn is_good_at(a: u64, c: u64, n: u64, col: u32, guess: u32, seed: u64) -> bool {
    is_good(a, c, n, seed) && contains(col_index_hash(col, a, seed), guess)
}

#[inline]
pub fn update(a: &mut u64, c: &mut u64, idx: u64, hash: u64) {
    *a ^= idx;
    *c ^= hash;
}

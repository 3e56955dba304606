//! Pairing functions mapping unordered vertex pairs into one integer domain
//!
//! Edges are sketched as coordinates of a vertex's incidence vector. The
//! non-directional pairing `min + max·(max−1)/2` enumerates the strictly
//! upper triangle of the adjacency matrix, so `(u, v)` and `(v, u)` share a
//! coordinate and every coordinate decodes back to exactly one edge.

use sketchcc_common::{Edge, Error, NodeId, Result};

/// Encode an unordered, non-self edge `{i, j}`.
pub fn pair(i: NodeId, j: NodeId) -> Result<u64> {
    if i == j {
        return Err(Error::SelfLoop { node: i });
    }
    let (lo, hi) = if i < j { (i, j) } else { (j, i) };

    // Halve whichever factor is even before multiplying so the product
    // only overflows when the true result does.
    let (mut a, mut b) = (hi, hi - 1);
    if a & 1 == 0 {
        a >>= 1;
    } else {
        b >>= 1;
    }
    a.checked_mul(b)
        .and_then(|tri| tri.checked_add(lo))
        .ok_or(Error::PairingOverflow(lo, hi))
}

/// Invert [`pair`]. The returned edge has `src < dst`.
pub fn unpair(idx: u64) -> Edge {
    // j = floor((sqrt(8·idx + 1) + 1) / 2), computed in 128 bits
    let disc = 8u128 * idx as u128 + 1;
    let j = ((isqrt_u128(disc) + 1) / 2) as u64;
    let tri = if j & 1 == 0 {
        (j >> 1) * (j - 1)
    } else {
        j * ((j - 1) >> 1)
    };
    Edge {
        src: idx - tri,
        dst: j,
    }
}

fn isqrt_u128(x: u128) -> u128 {
    if x < 2 {
        return x;
    }
    // f64 gets within a few units; fix up exactly
    let mut r = (x as f64).sqrt() as u128;
    while r * r > x {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= x {
        r += 1;
    }
    r
}

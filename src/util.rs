//! Utility functions for the cortical framework.
//!
//! Small helpers shared by the engine modules: splittable random sub-streams,
//! dedup sampling for synapse growth, and dense source-bit masks.

use bitvec::vec::BitVec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Split a fresh random sub-stream off a parent stream.
///
/// Every stochastic decision in the layer (winner tie-breaking, synapse
/// source sampling) consumes its own sub-stream so that determinism does not
/// depend on how much randomness any single site consumes. The parent stream
/// advances by exactly one draw per split.
///
/// # Examples
///
/// ```
/// use cortical::util::split_rng;
/// use rand::SeedableRng;
///
/// let mut parent = rand::rngs::StdRng::seed_from_u64(42);
/// let _sub_a = split_rng(&mut parent);
/// let _sub_b = split_rng(&mut parent);
/// ```
#[inline]
pub fn split_rng(rng: &mut StdRng) -> StdRng {
    StdRng::seed_from_u64(rng.gen())
}

/// Build a dense membership mask of `width` bits from a sparse index list.
///
/// Indices must be < `width`; out-of-range indices are a caller bug and are
/// checked in debug builds only.
pub fn bit_mask<I>(width: usize, bits: I) -> BitVec
where
    I: IntoIterator<Item = usize>,
{
    let mut mask = BitVec::repeat(false, width);
    for bit in bits {
        debug_assert!(bit < width, "bit {} out of mask width {}", bit, width);
        mask.set(bit, true);
    }
    mask
}

/// Sample up to `n` distinct values from `candidates` by drawing `n` times
/// with replacement and deduplicating.
///
/// The result is sorted ascending and may contain fewer than `n` values;
/// callers that need a minimum count check the length themselves. An empty
/// candidate list yields an empty sample.
pub fn sample_distinct(candidates: &[usize], n: usize, rng: &mut StdRng) -> Vec<usize> {
    if candidates.is_empty() || n == 0 {
        return Vec::new();
    }
    let mut drawn: Vec<usize> = (0..n)
        .map(|_| candidates[rng.gen_range(0..candidates.len())])
        .collect();
    drawn.sort_unstable();
    drawn.dedup();
    drawn
}

/// Shuffle a slice of indices in place (Fisher-Yates).
pub fn shuffle_indices<R: Rng>(arr: &mut [usize], rng: &mut R) {
    for i in (1..arr.len()).rev() {
        let j = rng.gen_range(0..=i);
        arr.swap(i, j);
    }
}

/// Clamp a permanence into [0, 1].
#[inline]
pub fn clamp01(p: f32) -> f32 {
    p.clamp(0.0, 1.0)
}

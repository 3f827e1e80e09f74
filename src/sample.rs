//! Uniform down-sampling of the visible index set.

use rand::Rng;

/// Draws `min(floor(len * fraction), cap)` indices by partial Fisher-Yates:
/// only the first `target` slots are shuffled, so cost is O(target) swaps
/// rather than a full shuffle. A target covering the whole input returns it
/// unchanged, preserving order. The selection is an unbiased uniform subset;
/// callers re-run this with fresh randomness on every recompute.
pub fn sample<R: Rng>(indices: &[u32], fraction: f64, cap: usize, rng: &mut R) -> Vec<u32> {
    let len = indices.len();
    let by_fraction = (len as f64 * fraction).floor() as usize;
    let target = by_fraction.min(cap);
    if target >= len {
        return indices.to_vec();
    }
    let mut pool = indices.to_vec();
    for i in 0..target {
        let j = rng.gen_range(i..len);
        pool.swap(i, j);
    }
    pool.truncate(target);
    pool
}

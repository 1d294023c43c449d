//! Region statistics reduction.
//!
//! Each iteration derives the baseline noise level `q0sqr` from a sum and
//! sum-of-squares reduction over the region of interest (here the whole
//! image). The reduction is a pure function of the grid; nothing is cached
//! across iterations.

use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::float_trait::SradFloat;

// =============================================================================
// Constants
// =============================================================================

/// Grids below this element count reduce sequentially.
/// Set high to avoid rayon overhead for smaller images.
const PARALLEL_ELEMENT_THRESHOLD: usize = 65_536;

/// Elements per partition in the parallel tree reduction.
const REDUCTION_CHUNK_LEN: usize = 8_192;

/// mean^2 below this is treated as degenerate; see `Q0SQR_SENTINEL`.
const MEAN_SQ_EPSILON: f64 = 1e-10;

/// Stand-in for `q0sqr` on zero-mean regions. Large enough to drive the
/// diffusion coefficient to its flat-region value instead of dividing by
/// zero.
const Q0SQR_SENTINEL: f64 = 1e10;

/// Noise statistics over the region of interest, recomputed every iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionStatistics<F> {
    /// Mean intensity over the region.
    pub mean: F,
    /// Population variance over the region (floored at zero).
    pub variance: F,
    /// Baseline squared coefficient of variation, `variance / mean^2`.
    pub q0sqr: F,
}

/// Reduce the grid to its region statistics.
///
/// Partitions are folded to local `(sum, sum_sq)` pairs and combined
/// associatively, so partitions of uneven length contribute exactly their
/// own elements. Exact up to floating-point associativity.
pub fn compute_region_statistics<F: SradFloat>(grid: ArrayView2<F>) -> RegionStatistics<F> {
    let count = grid.len();
    if count == 0 {
        return RegionStatistics {
            mean: F::zero(),
            variance: F::zero(),
            q0sqr: F::from_f64_c(Q0SQR_SENTINEL),
        };
    }

    let (sum, sum_sq) = match grid.as_slice_memory_order() {
        Some(data) if count >= PARALLEL_ELEMENT_THRESHOLD => data
            .par_chunks(REDUCTION_CHUNK_LEN)
            .map(partial_moments)
            .reduce(
                || (F::zero(), F::zero()),
                |a, b| (a.0 + b.0, a.1 + b.1),
            ),
        Some(data) => partial_moments(data),
        // Non-contiguous views fall back to element iteration.
        None => grid
            .iter()
            .fold((F::zero(), F::zero()), |(s, sq), &v| (s + v, sq + v * v)),
    };

    let n = F::usize_as(count);
    let mean = sum / n;
    // Rounding can push sum_sq/N fractionally below mean^2 on constant grids.
    let variance = (sum_sq / n - mean * mean).max(F::zero());
    let mean_sq = mean * mean;
    let q0sqr = if mean_sq < F::from_f64_c(MEAN_SQ_EPSILON) {
        F::from_f64_c(Q0SQR_SENTINEL)
    } else {
        variance / mean_sq
    };

    RegionStatistics {
        mean,
        variance,
        q0sqr,
    }
}

fn partial_moments<F: SradFloat>(chunk: &[F]) -> (F, F) {
    chunk
        .iter()
        .fold((F::zero(), F::zero()), |(s, sq), &v| (s + v, sq + v * v))
}

//! Per-iteration execution strategies.
//!
//! One diffusion iteration is the sequential composition
//! derivatives -> coefficients -> update, with a hard barrier between
//! sub-steps. Three interchangeable bodies realize that composition with
//! different memory-traffic profiles and identical numerics:
//!
//! - [`SradStrategy::Naive`]: every sub-step is its own parallel pass and
//!   every intermediate field round-trips through memory. The correctness
//!   baseline.
//! - [`SradStrategy::Fused`]: derivatives and the coefficient are held in
//!   per-worker locals; only the coefficient field (needed by neighbors) and
//!   the updated grid are written back.
//! - [`SradStrategy::Tiled`]: the grid is partitioned into 8x8 tiles with a
//!   one-pixel halo; each tile is staged once into a small local buffer and
//!   all interior pixels read neighbors from that buffer only.
//!
//! All three share the pointwise math in [`crate::diffusion`], so they agree
//! within floating-point tolerance on identical inputs.

use ndarray::Array2;
use rayon::prelude::*;

use crate::diffusion::{apply_update, diffusion_coefficient, divergence};
use crate::float_trait::SradFloat;
use crate::grid::BoundaryIndex;

// =============================================================================
// Constants
// =============================================================================

/// Tile edge length for the tiled strategy.
pub const TILE_SIZE: usize = 8;

/// Staged tile extent including a one-pixel halo on each side.
const STAGE_DIM: usize = TILE_SIZE + 2;

/// Capacity of the per-worker staging buffer. Also covers the coefficient
/// staging in the update phase, which needs at most (TILE_SIZE + 1)^2.
const STAGE_AREA: usize = STAGE_DIM * STAGE_DIM;

/// Execution strategy for the per-iteration passes.
///
/// Strategies differ only in memory traffic; selecting one never changes the
/// numerical result beyond floating-point rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SradStrategy {
    /// Independent parallel pass per sub-step, full intermediate fields in
    /// memory.
    Naive,
    /// Derivative and coefficient computation fused into per-worker locals.
    Fused,
    /// 8x8 tiles staged with a one-pixel halo into a local buffer.
    #[default]
    Tiled,
}

/// Scratch buffers for one run, allocated once and reused every iteration.
///
/// Contents are ephemeral: nothing in here survives an iteration, only the
/// allocations do.
#[derive(Debug)]
pub struct DiffusionWorkspace<F> {
    strategy: SradStrategy,
    dn: Array2<F>,
    ds: Array2<F>,
    dw: Array2<F>,
    de: Array2<F>,
    coeff: Array2<F>,
    next: Array2<F>,
}

impl<F: SradFloat> DiffusionWorkspace<F> {
    /// Allocate the buffers `strategy` round-trips through memory.
    ///
    /// Buffers the strategy keeps in per-worker locals instead are left
    /// zero-sized.
    pub fn new(dim: (usize, usize), strategy: SradStrategy) -> Self {
        let full = || Array2::zeros(dim);
        let unused = || Array2::zeros((0, 0));
        match strategy {
            SradStrategy::Naive => Self {
                strategy,
                dn: full(),
                ds: full(),
                dw: full(),
                de: full(),
                coeff: full(),
                next: unused(),
            },
            SradStrategy::Fused => Self {
                strategy,
                dn: unused(),
                ds: unused(),
                dw: unused(),
                de: unused(),
                coeff: full(),
                next: full(),
            },
            SradStrategy::Tiled => Self {
                strategy,
                dn: full(),
                ds: full(),
                dw: full(),
                de: full(),
                coeff: full(),
                next: unused(),
            },
        }
    }

    /// The strategy this workspace was allocated for.
    pub fn strategy(&self) -> SradStrategy {
        self.strategy
    }
}

/// Run one full diffusion iteration on `grid` in place.
///
/// The update observes only derivatives and coefficients computed from the
/// grid state at the start of the call; the two-phase barrier between the
/// coefficient and update passes prevents read-after-write hazards across
/// workers.
pub fn run_diffusion_iteration<F: SradFloat>(
    grid: &mut Array2<F>,
    boundary: &BoundaryIndex,
    q0sqr: F,
    lambda: F,
    workspace: &mut DiffusionWorkspace<F>,
) {
    match workspace.strategy {
        SradStrategy::Naive => run_naive(grid, boundary, q0sqr, lambda, workspace),
        SradStrategy::Fused => run_fused(grid, boundary, q0sqr, lambda, workspace),
        SradStrategy::Tiled => run_tiled(grid, q0sqr, lambda, workspace),
    }
}

// =============================================================================
// Naive strategy
// =============================================================================

fn run_naive<F: SradFloat>(
    grid: &mut Array2<F>,
    boundary: &BoundaryIndex,
    q0sqr: F,
    lambda: F,
    ws: &mut DiffusionWorkspace<F>,
) {
    let (_, cols) = grid.dim();

    // Pass 1: directional derivatives, one row per worker.
    {
        let j = grid.as_slice().expect("grid should be contiguous");
        let dn = ws.dn.as_slice_mut().expect("dn should be contiguous");
        let ds = ws.ds.as_slice_mut().expect("ds should be contiguous");
        let dw = ws.dw.as_slice_mut().expect("dw should be contiguous");
        let de = ws.de.as_slice_mut().expect("de should be contiguous");

        dn.par_chunks_mut(cols)
            .zip(ds.par_chunks_mut(cols))
            .zip(dw.par_chunks_mut(cols))
            .zip(de.par_chunks_mut(cols))
            .enumerate()
            .for_each(|(r, (((dn_row, ds_row), dw_row), de_row))| {
                let row_base = r * cols;
                let north_base = boundary.north[r] * cols;
                let south_base = boundary.south[r] * cols;
                for c in 0..cols {
                    let center = j[row_base + c];
                    dn_row[c] = j[north_base + c] - center;
                    ds_row[c] = j[south_base + c] - center;
                    dw_row[c] = j[row_base + boundary.west[c]] - center;
                    de_row[c] = j[row_base + boundary.east[c]] - center;
                }
            });
    }

    // Pass 2: diffusion coefficients.
    {
        let j = grid.as_slice().expect("grid should be contiguous");
        let dn = ws.dn.as_slice().expect("dn should be contiguous");
        let ds = ws.ds.as_slice().expect("ds should be contiguous");
        let dw = ws.dw.as_slice().expect("dw should be contiguous");
        let de = ws.de.as_slice().expect("de should be contiguous");

        ws.coeff
            .as_slice_mut()
            .expect("coeff should be contiguous")
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(r, c_row)| {
                let row_base = r * cols;
                for c in 0..cols {
                    let idx = row_base + c;
                    c_row[c] =
                        diffusion_coefficient(j[idx], dn[idx], ds[idx], dw[idx], de[idx], q0sqr);
                }
            });
    }

    // Pass 3: update. Reads only this pixel's grid value plus the already
    // computed fields, so the in-place write is race-free.
    {
        let coeff = ws.coeff.as_slice().expect("coeff should be contiguous");
        let dn = ws.dn.as_slice().expect("dn should be contiguous");
        let ds = ws.ds.as_slice().expect("ds should be contiguous");
        let dw = ws.dw.as_slice().expect("dw should be contiguous");
        let de = ws.de.as_slice().expect("de should be contiguous");

        grid.as_slice_mut()
            .expect("grid should be contiguous")
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(r, j_row)| {
                let row_base = r * cols;
                let south_base = boundary.south[r] * cols;
                for c in 0..cols {
                    let idx = row_base + c;
                    let div = divergence(
                        coeff[idx],
                        coeff[south_base + c],
                        coeff[row_base + boundary.east[c]],
                        dn[idx],
                        ds[idx],
                        dw[idx],
                        de[idx],
                    );
                    j_row[c] = apply_update(j_row[c], lambda, div);
                }
            });
    }
}

// =============================================================================
// Fused strategy
// =============================================================================

fn run_fused<F: SradFloat>(
    grid: &mut Array2<F>,
    boundary: &BoundaryIndex,
    q0sqr: F,
    lambda: F,
    ws: &mut DiffusionWorkspace<F>,
) {
    let (_, cols) = grid.dim();

    // Pass 1: derivatives and coefficient per pixel in locals; only the
    // coefficient is written back.
    {
        let j = grid.as_slice().expect("grid should be contiguous");

        ws.coeff
            .as_slice_mut()
            .expect("coeff should be contiguous")
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(r, c_row)| {
                let row_base = r * cols;
                let north_base = boundary.north[r] * cols;
                let south_base = boundary.south[r] * cols;
                for c in 0..cols {
                    let center = j[row_base + c];
                    let dn = j[north_base + c] - center;
                    let ds = j[south_base + c] - center;
                    let dw = j[row_base + boundary.west[c]] - center;
                    let de = j[row_base + boundary.east[c]] - center;
                    c_row[c] = diffusion_coefficient(center, dn, ds, dw, de, q0sqr);
                }
            });
    }

    // Pass 2: update. Derivatives are recomputed in locals from the pre-update
    // grid; the result goes to a separate buffer so no worker ever reads a
    // partially updated neighbor.
    {
        let j = grid.as_slice().expect("grid should be contiguous");
        let coeff = ws.coeff.as_slice().expect("coeff should be contiguous");

        ws.next
            .as_slice_mut()
            .expect("next should be contiguous")
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(r, out_row)| {
                let row_base = r * cols;
                let north_base = boundary.north[r] * cols;
                let south_base = boundary.south[r] * cols;
                for c in 0..cols {
                    let idx = row_base + c;
                    let center = j[idx];
                    let dn = j[north_base + c] - center;
                    let ds = j[south_base + c] - center;
                    let dw = j[row_base + boundary.west[c]] - center;
                    let de = j[row_base + boundary.east[c]] - center;
                    let div = divergence(
                        coeff[idx],
                        coeff[south_base + c],
                        coeff[row_base + boundary.east[c]],
                        dn,
                        ds,
                        dw,
                        de,
                    );
                    out_row[c] = apply_update(center, lambda, div);
                }
            });
    }

    std::mem::swap(grid, &mut ws.next);
}

// =============================================================================
// Tiled strategy
// =============================================================================

fn run_tiled<F: SradFloat>(
    grid: &mut Array2<F>,
    q0sqr: F,
    lambda: F,
    ws: &mut DiffusionWorkspace<F>,
) {
    let (rows, cols) = grid.dim();
    let band_len = TILE_SIZE * cols;

    // Phase 1: stage each tile of the grid plus its halo, then compute
    // derivatives and coefficients for the interior from the staged buffer
    // only. One worker owns a full row of tiles, so all writes are disjoint.
    {
        let j = grid.as_slice().expect("grid should be contiguous");
        let dn_s = ws.dn.as_slice_mut().expect("dn should be contiguous");
        let ds_s = ws.ds.as_slice_mut().expect("ds should be contiguous");
        let dw_s = ws.dw.as_slice_mut().expect("dw should be contiguous");
        let de_s = ws.de.as_slice_mut().expect("de should be contiguous");
        let coeff_s = ws.coeff.as_slice_mut().expect("coeff should be contiguous");

        dn_s.par_chunks_mut(band_len)
            .zip(ds_s.par_chunks_mut(band_len))
            .zip(dw_s.par_chunks_mut(band_len))
            .zip(de_s.par_chunks_mut(band_len))
            .zip(coeff_s.par_chunks_mut(band_len))
            .enumerate()
            .for_each(|(band, ((((dn_b, ds_b), dw_b), de_b), c_b))| {
                let r0 = band * TILE_SIZE;
                let tile_h = TILE_SIZE.min(rows - r0);
                let mut stage = [F::zero(); STAGE_AREA];

                let mut c0 = 0;
                while c0 < cols {
                    let tile_w = TILE_SIZE.min(cols - c0);
                    // Staging must complete for the whole tile before any
                    // interior pixel reads a neighbor from it.
                    stage_grid_tile(j, (rows, cols), (r0, c0), (tile_h, tile_w), &mut stage);

                    let stride = tile_w + 2;
                    for lr in 0..tile_h {
                        let stage_row = (lr + 1) * stride;
                        let out_base = lr * cols + c0;
                        for lc in 0..tile_w {
                            let s = stage_row + lc + 1;
                            let center = stage[s];
                            let dn = stage[s - stride] - center;
                            let ds = stage[s + stride] - center;
                            let dw = stage[s - 1] - center;
                            let de = stage[s + 1] - center;
                            dn_b[out_base + lc] = dn;
                            ds_b[out_base + lc] = ds;
                            dw_b[out_base + lc] = dw;
                            de_b[out_base + lc] = de;
                            c_b[out_base + lc] =
                                diffusion_coefficient(center, dn, ds, dw, de, q0sqr);
                        }
                    }
                    c0 += TILE_SIZE;
                }
            });
    }

    // Phase 2: stage each coefficient tile plus its south/east halo and apply
    // the update in place. The only grid read is the worker's own pixel.
    {
        let coeff = ws.coeff.as_slice().expect("coeff should be contiguous");
        let dn_s = ws.dn.as_slice().expect("dn should be contiguous");
        let ds_s = ws.ds.as_slice().expect("ds should be contiguous");
        let dw_s = ws.dw.as_slice().expect("dw should be contiguous");
        let de_s = ws.de.as_slice().expect("de should be contiguous");

        grid.as_slice_mut()
            .expect("grid should be contiguous")
            .par_chunks_mut(band_len)
            .enumerate()
            .for_each(|(band, j_b)| {
                let r0 = band * TILE_SIZE;
                let tile_h = TILE_SIZE.min(rows - r0);
                let mut stage = [F::zero(); STAGE_AREA];

                let mut c0 = 0;
                while c0 < cols {
                    let tile_w = TILE_SIZE.min(cols - c0);
                    stage_coeff_tile(coeff, (rows, cols), (r0, c0), (tile_h, tile_w), &mut stage);

                    let stride = tile_w + 1;
                    for lr in 0..tile_h {
                        for lc in 0..tile_w {
                            let idx = (r0 + lr) * cols + c0 + lc;
                            let s = lr * stride + lc;
                            let div = divergence(
                                stage[s],
                                stage[s + stride],
                                stage[s + 1],
                                dn_s[idx],
                                ds_s[idx],
                                dw_s[idx],
                                de_s[idx],
                            );
                            let out = lr * cols + c0 + lc;
                            j_b[out] = apply_update(j_b[out], lambda, div);
                        }
                    }
                    c0 += TILE_SIZE;
                }
            });
    }
}

/// Stage a `tile_h x tile_w` grid tile plus a one-pixel halo into `stage`,
/// row stride `tile_w + 2`. Halo loads clamp at the grid edge, reproducing
/// [`BoundaryIndex`] semantics exactly.
#[inline]
fn stage_grid_tile<F: SradFloat>(
    j: &[F],
    (rows, cols): (usize, usize),
    (r0, c0): (usize, usize),
    (tile_h, tile_w): (usize, usize),
    stage: &mut [F; STAGE_AREA],
) {
    let stride = tile_w + 2;
    for lr in 0..tile_h + 2 {
        let gr = (r0 + lr).saturating_sub(1).min(rows - 1);
        let row_base = gr * cols;
        for lc in 0..tile_w + 2 {
            let gc = (c0 + lc).saturating_sub(1).min(cols - 1);
            stage[lr * stride + lc] = j[row_base + gc];
        }
    }
}

/// Stage a `tile_h x tile_w` coefficient tile plus its south/east halo into
/// `stage`, row stride `tile_w + 1`, clamped at the grid edge.
#[inline]
fn stage_coeff_tile<F: SradFloat>(
    coeff: &[F],
    (rows, cols): (usize, usize),
    (r0, c0): (usize, usize),
    (tile_h, tile_w): (usize, usize),
    stage: &mut [F; STAGE_AREA],
) {
    let stride = tile_w + 1;
    for lr in 0..tile_h + 1 {
        let gr = (r0 + lr).min(rows - 1);
        let row_base = gr * cols;
        for lc in 0..tile_w + 1 {
            let gc = (c0 + lc).min(cols - 1);
            stage[lr * stride + lc] = coeff[row_base + gc];
        }
    }
}

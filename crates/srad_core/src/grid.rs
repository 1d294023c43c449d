//! Boundary indexing and the diffusion domain transform.

use ndarray::Array2;

use crate::float_trait::SradFloat;

/// Clamped neighbor indices for every row and column of a grid.
///
/// Edge rows and columns reference themselves, so a derivative taken toward
/// a missing neighbor is exactly zero. Computed once per run and read-only
/// thereafter.
#[derive(Debug, Clone)]
pub struct BoundaryIndex {
    /// Row index of the north neighbor, per row.
    pub north: Vec<usize>,
    /// Row index of the south neighbor, per row.
    pub south: Vec<usize>,
    /// Column index of the west neighbor, per column.
    pub west: Vec<usize>,
    /// Column index of the east neighbor, per column.
    pub east: Vec<usize>,
}

impl BoundaryIndex {
    /// Build the clamped neighbor tables for a `rows x cols` grid.
    pub fn new(rows: usize, cols: usize) -> Self {
        let north = (0..rows).map(|r| r.saturating_sub(1)).collect();
        let south = (0..rows)
            .map(|r| if r + 1 < rows { r + 1 } else { r })
            .collect();
        let west = (0..cols).map(|c| c.saturating_sub(1)).collect();
        let east = (0..cols)
            .map(|c| if c + 1 < cols { c + 1 } else { c })
            .collect();
        Self {
            north,
            south,
            west,
            east,
        }
    }
}

/// Map intensities into the diffusion domain (square root), in place.
///
/// Applied once at load; speckle is multiplicative, and the square-root
/// domain stabilizes its variance before diffusion.
pub fn to_diffusion_domain<F: SradFloat>(image: &mut Array2<F>) {
    image.mapv_inplace(|v| v.sqrt());
}

/// Inverse of [`to_diffusion_domain`] (square), applied once after the final
/// iteration.
pub fn from_diffusion_domain<F: SradFloat>(image: &mut Array2<F>) {
    image.mapv_inplace(|v| v * v);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn interior_neighbors_are_adjacent() {
        let b = BoundaryIndex::new(5, 7);
        assert_eq!(b.north[2], 1);
        assert_eq!(b.south[2], 3);
        assert_eq!(b.west[3], 2);
        assert_eq!(b.east[3], 4);
    }

    #[test]
    fn edges_clamp_to_self() {
        let b = BoundaryIndex::new(5, 7);
        assert_eq!(b.north[0], 0);
        assert_eq!(b.south[4], 4);
        assert_eq!(b.west[0], 0);
        assert_eq!(b.east[6], 6);
    }

    #[test]
    fn single_pixel_grid_references_itself() {
        let b = BoundaryIndex::new(1, 1);
        assert_eq!(b.north[0], 0);
        assert_eq!(b.south[0], 0);
        assert_eq!(b.west[0], 0);
        assert_eq!(b.east[0], 0);
    }

    #[test]
    fn domain_transform_round_trips() {
        let mut img = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64 * 10.0);
        let original = img.clone();
        to_diffusion_domain(&mut img);
        from_diffusion_domain(&mut img);
        for (a, b) in img.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-9, "round trip drifted: {a} vs {b}");
        }
    }

    #[test]
    fn transform_is_square_root() {
        let mut img = Array2::from_elem((2, 2), 49.0f32);
        to_diffusion_domain(&mut img);
        assert!(img.iter().all(|&v| v == 7.0));
    }
}

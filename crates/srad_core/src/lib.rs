//! SRAD Core Algorithm Library
//!
//! Pure Rust implementation of Speckle Reducing Anisotropic Diffusion (SRAD)
//! for grayscale images. This crate contains all algorithm logic without any
//! I/O or command-line surface.

pub mod diffusion;
pub mod float_trait;
pub mod grid;
pub mod orchestration;
pub mod pipeline;
pub mod statistics;

// Re-export commonly used types at the crate root
pub use float_trait::SradFloat;
pub use grid::BoundaryIndex;
pub use orchestration::{srad_denoise, SradConfig};
pub use pipeline::{run_diffusion_iteration, DiffusionWorkspace, SradStrategy, TILE_SIZE};
pub use statistics::{compute_region_statistics, RegionStatistics};

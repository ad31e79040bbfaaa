//! The `regfmg` crate solves the linear systems `(A + L^T L) u = b` arising in
//! diffeomorphic image registration with a full multigrid method.
//!
//! `A` is a per-voxel coefficient field, `L^T L` one of the membrane or
//! bending energy operators, and `u` a vector field on a regular 2D or 3D
//! voxel grid.

pub mod diagnostics;
pub mod error;
pub mod field;
pub mod geometry;
pub mod grid;
pub mod multigrid;
pub mod num;
pub mod regularization;
pub mod relaxation;
pub mod scratch;
pub mod transfer;

#[cfg(feature = "cli")]
pub mod cli;

pub use multigrid::{fmg, fmg_with_allocated_scratch, FmgConfig, FmgProblem, MultigridSolver};
pub use scratch::fmg_scratch_size;

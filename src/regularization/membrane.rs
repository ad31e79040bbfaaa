//! Membrane energy operator `λ0 I + λ1 K`.

use super::{laplacian_at, laplacian_diagonal_at, PhysicalParams, Regularizer};
use crate::{
    grid::{GridShape, VoxelSize},
    num::{fac, BFloat},
};

/// Membrane energy on one grid level.
///
/// Couples each voxel to its face neighbours, independently for every component.
#[derive(Clone, Debug)]
pub struct Membrane {
    shape: GridShape,
    absolute: fac,
    membrane: fac,
    weights: [fac; 3],
}

impl Regularizer for Membrane {
    fn for_level(params: &PhysicalParams, shape: GridShape, voxel_size: &VoxelSize) -> Self {
        Self {
            shape,
            absolute: params.absolute(),
            membrane: params.membrane(),
            weights: voxel_size.inverse_squares(),
        }
    }

    fn shape(&self) -> &GridShape {
        &self.shape
    }

    #[inline]
    fn value_at<F: BFloat>(&self, f: &[F], x: usize, y: usize, z: usize) -> fac {
        let center = f[self.shape.linear_idx(x, y, z)].to_fac();
        self.absolute * center
            + self.membrane * laplacian_at(&self.shape, &self.weights, f, x, y, z)
    }

    #[inline]
    fn diagonal_at(&self, x: usize, y: usize, z: usize) -> fac {
        self.absolute + self.membrane * laplacian_diagonal_at(&self.shape, &self.weights, x, y, z)
    }
}

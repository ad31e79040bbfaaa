//! Regular voxel grids and the coarsening hierarchy built on them.

use crate::{
    error::SolverError,
    geometry::{
        Dim3::{self, X, Y, Z},
        In3D,
    },
};
use std::fmt;

#[cfg(feature = "serialization")]
use serde::Serialize;

/// Maximum number of levels in a grid hierarchy, including the finest.
pub const MAX_LEVELS: usize = 16;

/// Number of voxels along each axis of a regular grid.
///
/// A grid with extent 1 along the z-axis models a 2D image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct GridShape(In3D<usize>);

impl GridShape {
    /// Creates a new grid shape, rejecting axes with zero extent.
    pub fn new(nx: usize, ny: usize, nz: usize) -> Result<Self, SolverError> {
        let shape = In3D::new(nx, ny, nz);
        for dim in Dim3::slice() {
            if shape[dim] == 0 {
                return Err(SolverError::EmptyGridAxis { dim });
            }
        }
        Ok(Self(shape))
    }

    /// Returns the extent along the given axis.
    pub fn extent(&self, dim: Dim3) -> usize {
        self.0[dim]
    }

    /// Returns the extents as an array `[nx, ny, nz]`.
    pub fn extents(&self) -> [usize; 3] {
        self.0.to_array()
    }

    /// Returns the extents as a tuple `(nx, ny, nz)`.
    pub fn to_tuple(&self) -> (usize, usize, usize) {
        self.0.to_tuple()
    }

    /// Returns the total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.0[X] * self.0[Y] * self.0[Z]
    }

    /// Whether every axis has extent 1.
    pub fn is_single_voxel(&self) -> bool {
        self.num_voxels() == 1
    }

    /// Computes the linear index of the voxel at the given indices,
    /// with x varying fastest.
    #[inline]
    pub fn linear_idx(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.0[X] * (y + self.0[Y] * z)
    }

    /// Returns the linear index distance between neighbours along each axis.
    #[inline]
    pub fn strides(&self) -> [usize; 3] {
        [1, self.0[X], self.0[X] * self.0[Y]]
    }

    /// Returns the shape obtained by halving every axis, rounding down.
    ///
    /// Axes never shrink below one voxel, so a degenerate axis is left unchanged.
    pub fn coarsened(&self) -> Self {
        Self(In3D::with_each_component(|dim| (self.0[dim] / 2).max(1)))
    }

    /// Returns a copy with the extent along one axis replaced.
    pub fn with_extent(&self, dim: Dim3, extent: usize) -> Self {
        let mut extents = self.0;
        extents[dim] = extent.max(1);
        Self(extents)
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (nx, ny, nz) = self.to_tuple();
        write!(f, "{}x{}x{}", nx, ny, nz)
    }
}

/// Physical extent of a voxel along each axis.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct VoxelSize(In3D<f64>);

impl VoxelSize {
    /// Creates a new voxel size, rejecting non-positive or non-finite values.
    pub fn new(hx: f64, hy: f64, hz: f64) -> Result<Self, SolverError> {
        let sizes = In3D::new(hx, hy, hz);
        for dim in Dim3::slice() {
            let value = sizes[dim];
            if !(value.is_finite() && value > 0.0) {
                return Err(SolverError::InvalidVoxelSize { dim, value });
            }
        }
        Ok(Self(sizes))
    }

    /// Unit voxels along all axes.
    pub fn unit() -> Self {
        Self(In3D::same(1.0))
    }

    /// Returns the voxel size along the given axis.
    pub fn along(&self, dim: Dim3) -> f64 {
        self.0[dim]
    }

    /// Returns `1/h²` for each axis, the finite difference weights of a
    /// second derivative.
    pub fn inverse_squares(&self) -> [f64; 3] {
        let [hx, hy, hz] = self.0.to_array();
        [1.0 / (hx * hx), 1.0 / (hy * hy), 1.0 / (hz * hz)]
    }

    /// Returns the voxel size on a grid of the given coarse shape covering
    /// the same domain as the given fine shape.
    pub fn coarsened(&self, fine: &GridShape, coarse: &GridShape) -> Self {
        Self(In3D::with_each_component(|dim| {
            self.0[dim] * (fine.extent(dim) as f64) / (coarse.extent(dim) as f64)
        }))
    }
}

impl fmt::Display for VoxelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Shapes of a grid hierarchy, from the finest level (index 0) down to the coarsest.
#[derive(Clone, Debug, PartialEq)]
pub struct GridHierarchy {
    shapes: Vec<GridShape>,
}

impl GridHierarchy {
    /// Builds the hierarchy by repeatedly halving the given base shape until
    /// a single voxel remains or `MAX_LEVELS` levels exist.
    pub fn new(base: GridShape) -> Self {
        let mut shapes = vec![base];
        let mut shape = base;
        while !shape.is_single_voxel() && shapes.len() < MAX_LEVELS {
            shape = shape.coarsened();
            shapes.push(shape);
        }
        Self { shapes }
    }

    /// Returns the number of levels, including the finest.
    pub fn num_levels(&self) -> usize {
        self.shapes.len()
    }

    /// Returns the shapes ordered from finest to coarsest.
    pub fn shapes(&self) -> &[GridShape] {
        &self.shapes
    }

    /// Returns the shape of the finest level.
    pub fn finest(&self) -> &GridShape {
        &self.shapes[0]
    }

    /// Returns the shape of the coarsest level.
    pub fn coarsest(&self) -> &GridShape {
        &self.shapes[self.shapes.len() - 1]
    }

    /// Computes the voxel size at every level, starting from the given
    /// voxel size of the finest level.
    pub fn voxel_sizes(&self, finest: VoxelSize) -> Vec<VoxelSize> {
        let mut sizes = Vec::with_capacity(self.shapes.len());
        sizes.push(finest);
        for pair in self.shapes.windows(2) {
            let coarser = sizes[sizes.len() - 1].coarsened(&pair[0], &pair[1]);
            sizes.push(coarser);
        }
        sizes
    }
}

//! Sizing and partitioning of the workspace used by the multigrid solver.
//!
//! All intermediate fields of a solve live in one caller-provided buffer.
//! The finest level only needs a residual, since its coefficients, right
//! hand side and solution belong to the caller. Every coarser level holds
//! its own coefficients, right hand side, solution and residual. A shared
//! temporary region serves grid transfers and operator applications.

use crate::{
    error::SolverError,
    field::CoefficientLayout,
    grid::{GridHierarchy, GridShape},
    num::BFloat,
};

/// Buffers of a coarse level that change during a solve.
#[derive(Debug)]
pub struct LevelBuffers<'a, F> {
    pub rhs: &'a mut [F],
    pub solution: &'a mut [F],
    pub residual: &'a mut [F],
}

/// Disjoint regions of a scratch buffer.
#[derive(Debug)]
pub struct ScratchPartition<'a, F> {
    pub finest_residual: &'a mut [F],
    pub temp: &'a mut [F],
    /// Coefficients of each coarse level, finest first.
    pub coarse_coefficients: Vec<&'a mut [F]>,
    /// Remaining buffers of each coarse level, finest first.
    pub coarse_levels: Vec<LevelBuffers<'a, F>>,
}

/// Layout of the scratch buffer for a given problem size.
#[derive(Clone, Debug)]
pub struct ScratchPlan {
    hierarchy: GridHierarchy,
    num_components: usize,
    layout: CoefficientLayout,
}

impl ScratchPlan {
    pub fn new(shape: GridShape, num_components: usize, layout: CoefficientLayout) -> Self {
        Self {
            hierarchy: GridHierarchy::new(shape),
            num_components,
            layout,
        }
    }

    pub fn hierarchy(&self) -> &GridHierarchy {
        &self.hierarchy
    }

    /// Size of the shared temporary region.
    pub fn temp_size(&self) -> usize {
        2 * self.hierarchy.finest().num_voxels()
    }

    /// Size of the buffers of one coarse level with `num_voxels` voxels.
    fn coarse_level_size(&self, num_voxels: usize) -> usize {
        num_voxels * (self.layout.values_per_voxel(self.num_components) + 3 * self.num_components)
    }

    /// Total number of scalars the solver needs.
    pub fn total_size(&self) -> usize {
        let finest = self.hierarchy.finest().num_voxels();
        self.num_components * finest
            + self.temp_size()
            + self.hierarchy.shapes()[1..]
                .iter()
                .map(|shape| self.coarse_level_size(shape.num_voxels()))
                .sum::<usize>()
    }

    /// Splits the given buffer into the regions of the plan.
    ///
    /// Any values beyond the planned size are left unused.
    pub fn partition<'a, F: BFloat>(
        &self,
        scratch: &'a mut [F],
    ) -> Result<ScratchPartition<'a, F>, SolverError> {
        let required = self.total_size();
        if scratch.len() < required {
            return Err(SolverError::ScratchTooSmall {
                required,
                provided: scratch.len(),
            });
        }
        let c = self.num_components;
        let values_per_voxel = self.layout.values_per_voxel(c);

        let (finest_residual, rest) =
            scratch.split_at_mut(c * self.hierarchy.finest().num_voxels());
        let (temp, mut rest) = rest.split_at_mut(self.temp_size());

        let num_coarse = self.hierarchy.num_levels() - 1;
        let mut coarse_coefficients = Vec::with_capacity(num_coarse);
        let mut coarse_levels = Vec::with_capacity(num_coarse);
        for shape in &self.hierarchy.shapes()[1..] {
            let n = shape.num_voxels();
            let (coefficients, remaining) = rest.split_at_mut(values_per_voxel * n);
            let (rhs, remaining) = remaining.split_at_mut(c * n);
            let (solution, remaining) = remaining.split_at_mut(c * n);
            let (residual, remaining) = remaining.split_at_mut(c * n);
            coarse_coefficients.push(coefficients);
            coarse_levels.push(LevelBuffers {
                rhs,
                solution,
                residual,
            });
            rest = remaining;
        }

        Ok(ScratchPartition {
            finest_residual,
            temp,
            coarse_coefficients,
            coarse_levels,
        })
    }
}

/// Computes the number of scalars of scratch space that `fmg` needs for
/// fields of the given shape and number of components.
pub fn fmg_scratch_size(
    shape: &GridShape,
    num_components: usize,
    layout: CoefficientLayout,
) -> usize {
    ScratchPlan::new(*shape, num_components, layout).total_size()
}

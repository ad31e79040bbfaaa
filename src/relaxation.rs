//! Gauss-Seidel relaxation of `(A + L^T L) u = b` on a single grid level.

use crate::{
    field::{CoefficientField, CoefficientLayout},
    num::{fac, BFloat},
    regularization::{PhysicalParams, Regularizer},
};
use rayon::prelude::*;

/// The operator `A + L^T L` on one grid level.
pub struct LevelOperator<'a, F, R> {
    regularizer: R,
    coefficients: CoefficientField<'a, F>,
    params: &'a PhysicalParams,
}

impl<'a, F: BFloat, R: Regularizer> LevelOperator<'a, F, R> {
    /// Combines a level's regularizer with its coefficient field.
    pub fn new(
        regularizer: R,
        coefficients: CoefficientField<'a, F>,
        params: &'a PhysicalParams,
    ) -> Self {
        Self {
            regularizer,
            coefficients,
            params,
        }
    }

    /// Returns the regularization part of the operator.
    pub fn regularizer(&self) -> &R {
        &self.regularizer
    }

    /// Returns the number of field components.
    pub fn num_components(&self) -> usize {
        self.coefficients.num_components()
    }

    /// Writes `(A + L^T L) u` into `output`.
    ///
    /// `temp` must hold at least one component's worth of values.
    pub fn apply_system(&self, solution: &[F], output: &mut [F], temp: &mut [F]) {
        let n = self.regularizer.shape().num_voxels();
        for (row, output_row) in output.chunks_mut(n).enumerate() {
            self.regularizer.apply(
                &solution[row * n..(row + 1) * n],
                output_row,
                temp,
                self.params.component_scale(row),
            );
            let coefficients = &self.coefficients;
            output_row
                .par_iter_mut()
                .enumerate()
                .for_each(|(voxel, value)| {
                    *value = F::from_fac(
                        value.to_fac() + coefficients.apply_at(voxel, row, solution),
                    );
                });
        }
    }

    /// Writes the residual `b - (A + L^T L) u` into `residual`.
    ///
    /// `temp` must hold at least one component's worth of values.
    pub fn compute_residual(&self, rhs: &[F], solution: &[F], residual: &mut [F], temp: &mut [F]) {
        self.apply_system(solution, residual, temp);
        residual
            .par_iter_mut()
            .zip(rhs.par_iter())
            .for_each(|(value, &b)| *value = F::from_fac(b.to_fac() - value.to_fac()));
    }

    /// Performs the given number of in-place Gauss-Seidel sweeps.
    ///
    /// Voxels are visited in lexicographic order with x varying fastest. At
    /// each voxel all components are updated together by solving the local
    /// block system. Voxels whose block is not positive definite are left
    /// unchanged.
    pub fn relax(
        &self,
        rhs: &[F],
        solution: &mut [F],
        voxel_system: &mut VoxelSystem,
        num_sweeps: usize,
    ) {
        let shape = *self.regularizer.shape();
        let (nx, ny, nz) = shape.to_tuple();
        let n = shape.num_voxels();
        let num_components = self.num_components();
        debug_assert_eq!(voxel_system.num_components, num_components);

        for _ in 0..num_sweeps {
            for z in 0..nz {
                for y in 0..ny {
                    for x in 0..nx {
                        let voxel = shape.linear_idx(x, y, z);
                        let regularization_diagonal = self.regularizer.diagonal_at(x, y, z);

                        for row in 0..num_components {
                            let scale = self.params.component_scale(row);
                            let component = &solution[row * n..(row + 1) * n];
                            voxel_system.rhs[row] = rhs[row * n + voxel].to_fac()
                                - self.coefficients.apply_at(voxel, row, solution)
                                - scale * self.regularizer.value_at(component, x, y, z);
                            for col in 0..num_components {
                                voxel_system.matrix[row * num_components + col] =
                                    self.coefficients.entry(voxel, row, col);
                            }
                            voxel_system.matrix[row * num_components + row] +=
                                scale * regularization_diagonal;
                        }

                        let solved = match self.coefficients.layout() {
                            CoefficientLayout::Diagonal => voxel_system.solve_diagonal_in_place(),
                            CoefficientLayout::Symmetric => voxel_system.solve_in_place(),
                        };
                        if solved {
                            for row in 0..num_components {
                                let value = &mut solution[row * n + voxel];
                                *value = F::from_fac(value.to_fac() + voxel_system.rhs[row]);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Dense symmetric block system for the components of one voxel.
///
/// Allocated once per solve and reused for every voxel.
#[derive(Clone, Debug)]
pub struct VoxelSystem {
    num_components: usize,
    matrix: Vec<fac>,
    rhs: Vec<fac>,
}

impl VoxelSystem {
    pub fn new(num_components: usize) -> Self {
        Self {
            num_components,
            matrix: vec![0.0; num_components * num_components],
            rhs: vec![0.0; num_components],
        }
    }

    /// Solves the system assuming a diagonal matrix, replacing the right hand
    /// side with the solution. Rows with a non-positive diagonal get a zero
    /// update.
    fn solve_diagonal_in_place(&mut self) -> bool {
        let c = self.num_components;
        for row in 0..c {
            let diagonal = self.matrix[row * c + row];
            self.rhs[row] = if diagonal > 0.0 {
                self.rhs[row] / diagonal
            } else {
                0.0
            };
        }
        true
    }

    /// Solves the system by Cholesky factorization, replacing the right hand
    /// side with the solution. Returns `false` if the matrix is not positive
    /// definite.
    fn solve_in_place(&mut self) -> bool {
        let c = self.num_components;
        let (a, b) = (&mut self.matrix, &mut self.rhs);

        for j in 0..c {
            let mut pivot = a[j * c + j];
            for k in 0..j {
                pivot -= a[j * c + k] * a[j * c + k];
            }
            if !(pivot > 0.0) {
                return false;
            }
            let pivot = pivot.sqrt();
            a[j * c + j] = pivot;
            for i in (j + 1)..c {
                let mut sum = a[i * c + j];
                for k in 0..j {
                    sum -= a[i * c + k] * a[j * c + k];
                }
                a[i * c + j] = sum / pivot;
            }
        }

        for i in 0..c {
            let mut sum = b[i];
            for k in 0..i {
                sum -= a[i * c + k] * b[k];
            }
            b[i] = sum / a[i * c + i];
        }
        for i in (0..c).rev() {
            let mut sum = b[i];
            for k in (i + 1)..c {
                sum -= a[k * c + i] * b[k];
            }
            b[i] = sum / a[i * c + i];
        }
        true
    }
}

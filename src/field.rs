//! Multi-component vector fields and per-voxel coefficient fields on a regular grid.

use crate::{
    error::SolverError,
    grid::GridShape,
    num::{fac, BFloat},
};
use ndarray::prelude::*;
use rayon::prelude::*;

#[cfg(feature = "serialization")]
use serde::Serialize;

/// How the values of the coefficient field `A` are stored for each voxel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub enum CoefficientLayout {
    /// One value per component, acting elementwise.
    Diagonal,
    /// The upper triangle of a symmetric block coupling the components:
    /// the diagonal first, followed by the off-diagonal entries
    /// `(0,1), (0,2), .., (1,2), ..` row by row.
    Symmetric,
}

impl CoefficientLayout {
    /// Returns the number of stored values per voxel for fields with the
    /// given number of components.
    pub fn values_per_voxel(&self, num_components: usize) -> usize {
        match self {
            Self::Diagonal => num_components,
            Self::Symmetric => num_components * (num_components + 1) / 2,
        }
    }
}

/// Creates an ndarray view of one component, indexed as `[[x, y, z]]`.
pub fn component_view<'a, F>(shape: &GridShape, values: &'a [F]) -> ArrayView3<'a, F> {
    ArrayView3::from_shape(shape.to_tuple().f(), values)
        .expect("Component slice length does not match grid shape")
}

/// Creates a mutable ndarray view of one component, indexed as `[[x, y, z]]`.
pub fn component_view_mut<'a, F>(shape: &GridShape, values: &'a mut [F]) -> ArrayViewMut3<'a, F> {
    ArrayViewMut3::from_shape(shape.to_tuple().f(), values)
        .expect("Component slice length does not match grid shape")
}

fn check_length(name: &'static str, expected: usize, actual: usize) -> Result<(), SolverError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SolverError::FieldLengthMismatch {
            name,
            expected,
            actual,
        })
    }
}

/// Read-only view of a field with `num_components` values per voxel,
/// stored component-major.
#[derive(Clone, Copy, Debug)]
pub struct VectorField<'a, F> {
    shape: GridShape,
    num_components: usize,
    values: &'a [F],
}

impl<'a, F: BFloat> VectorField<'a, F> {
    /// Wraps the given values, checking that their number matches the shape
    /// and component count.
    pub fn new(
        shape: GridShape,
        num_components: usize,
        values: &'a [F],
    ) -> Result<Self, SolverError> {
        if num_components == 0 {
            return Err(SolverError::NoComponents);
        }
        check_length(
            "vector field",
            shape.num_voxels() * num_components,
            values.len(),
        )?;
        Ok(Self {
            shape,
            num_components,
            values,
        })
    }

    /// Returns the grid shape of the field.
    pub fn shape(&self) -> &GridShape {
        &self.shape
    }

    /// Returns the number of values per voxel.
    pub fn num_components(&self) -> usize {
        self.num_components
    }

    /// Returns all values, component-major.
    pub fn values(&self) -> &'a [F] {
        self.values
    }

    /// Returns the values of the given component.
    pub fn component(&self, component: usize) -> &'a [F] {
        let n = self.shape.num_voxels();
        &self.values[component * n..(component + 1) * n]
    }

    /// Returns an ndarray view of the given component.
    pub fn component_view(&self, component: usize) -> ArrayView3<'a, F> {
        component_view(&self.shape, self.component(component))
    }
}

/// Read-only view of the per-voxel coefficient field `A`.
#[derive(Clone, Copy, Debug)]
pub struct CoefficientField<'a, F> {
    layout: CoefficientLayout,
    num_components: usize,
    num_voxels: usize,
    values: &'a [F],
}

impl<'a, F: BFloat> CoefficientField<'a, F> {
    /// Wraps the given coefficient values, checking their number.
    pub fn new(
        shape: &GridShape,
        layout: CoefficientLayout,
        num_components: usize,
        values: &'a [F],
    ) -> Result<Self, SolverError> {
        if num_components == 0 {
            return Err(SolverError::NoComponents);
        }
        let num_voxels = shape.num_voxels();
        check_length(
            "coefficient field",
            num_voxels * layout.values_per_voxel(num_components),
            values.len(),
        )?;
        Ok(Self {
            layout,
            num_components,
            num_voxels,
            values,
        })
    }

    /// Returns the storage layout.
    pub fn layout(&self) -> CoefficientLayout {
        self.layout
    }

    /// Returns the number of components of the fields the coefficients act on.
    pub fn num_components(&self) -> usize {
        self.num_components
    }

    /// Returns the number of voxels the coefficients are defined on.
    pub fn num_voxels(&self) -> usize {
        self.num_voxels
    }

    /// Returns all stored values, channel-major.
    pub fn values(&self) -> &'a [F] {
        self.values
    }

    /// Returns the coefficient coupling components `row` and `col` at the given voxel.
    #[inline]
    pub fn entry(&self, voxel: usize, row: usize, col: usize) -> fac {
        match self.layout {
            CoefficientLayout::Diagonal => {
                if row == col {
                    self.values[row * self.num_voxels + voxel].to_fac()
                } else {
                    0.0
                }
            }
            CoefficientLayout::Symmetric => {
                let channel = symmetric_channel(self.num_components, row, col);
                self.values[channel * self.num_voxels + voxel].to_fac()
            }
        }
    }

    /// Computes component `row` of `A u` at the given voxel, where `u` holds
    /// `num_components` component-major values per voxel.
    #[inline]
    pub fn apply_at(&self, voxel: usize, row: usize, u: &[F]) -> fac {
        match self.layout {
            CoefficientLayout::Diagonal => {
                self.entry(voxel, row, row) * u[row * self.num_voxels + voxel].to_fac()
            }
            CoefficientLayout::Symmetric => (0..self.num_components)
                .map(|col| self.entry(voxel, row, col) * u[col * self.num_voxels + voxel].to_fac())
                .sum(),
        }
    }

    /// Checks that every diagonal value is finite and non-negative, and for
    /// the symmetric layout that every voxel block is positive semi-definite.
    pub fn validate(&self) -> Result<(), SolverError> {
        for component in 0..self.num_components {
            let diagonal =
                &self.values[component * self.num_voxels..(component + 1) * self.num_voxels];
            if let Some((voxel, value)) = diagonal
                .iter()
                .enumerate()
                .find(|(_, value)| !(value.is_finite() && **value >= F::zero()))
            {
                return Err(SolverError::InvalidCoefficient {
                    voxel,
                    component,
                    value: value.to_fac(),
                });
            }
        }
        if self.layout == CoefficientLayout::Symmetric {
            let c = self.num_components;
            let mut block = vec![0.0; c * c];
            for voxel in 0..self.num_voxels {
                for row in 0..c {
                    for col in 0..c {
                        block[row * c + col] = self.entry(voxel, row, col);
                    }
                }
                if let Err((component, value)) = check_positive_semi_definite(&mut block, c) {
                    return Err(SolverError::InvalidCoefficient {
                        voxel,
                        component,
                        value,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Runs a Cholesky factorization of the symmetric `c×c` block in place,
/// allowing zero pivots when the rest of their column vanishes.
///
/// On failure, returns the component whose pivot or off-diagonal entry
/// breaks semi-definiteness together with the offending value.
fn check_positive_semi_definite(block: &mut [fac], c: usize) -> Result<(), (usize, fac)> {
    if let Some(&value) = block.iter().find(|value| !value.is_finite()) {
        return Err((0, value));
    }
    let scale = (0..c).map(|j| block[j * c + j]).fold(0.0, fac::max);
    let tolerance = 1e-10 * scale;
    // Schur complement entries of a semi-definite block satisfy s_ij² <= s_ii s_jj.
    let off_diagonal_tolerance = (tolerance * scale).sqrt();

    for j in 0..c {
        let mut pivot = block[j * c + j];
        for k in 0..j {
            pivot -= block[j * c + k] * block[j * c + k];
        }
        if pivot < -tolerance {
            return Err((j, pivot));
        }
        let degenerate = pivot <= tolerance;
        let pivot = pivot.max(0.0).sqrt();
        block[j * c + j] = pivot;
        for i in (j + 1)..c {
            let mut sum = block[i * c + j];
            for k in 0..j {
                sum -= block[i * c + k] * block[j * c + k];
            }
            block[i * c + j] = if degenerate {
                if sum.abs() > off_diagonal_tolerance {
                    return Err((j, sum));
                }
                0.0
            } else {
                sum / pivot
            };
        }
    }
    Ok(())
}

/// Returns the storage channel of the symmetric block entry `(row, col)`.
pub fn symmetric_channel(num_components: usize, row: usize, col: usize) -> usize {
    if row == col {
        return row;
    }
    let (i, j) = if row < col { (row, col) } else { (col, row) };
    // Off-diagonals of rows before `i`, then the position within row `i`.
    let preceding: usize = (0..i).map(|r| num_components - 1 - r).sum();
    num_components + preceding + (j - i - 1)
}

/// Computes the sum of squares of the given values.
pub fn sum_of_squares<F: BFloat>(values: &[F]) -> fac {
    values
        .par_iter()
        .map(|value| {
            let value = value.to_fac();
            value * value
        })
        .sum()
}

/// Computes the Euclidean norm of the given values.
///
/// Used for diagnostics and convergence monitoring only.
pub fn norm<F: BFloat>(values: &[F]) -> fac {
    sum_of_squares(values).sqrt()
}

/// Computes the inner product of two equally long value slices.
pub fn inner_product<F: BFloat>(a: &[F], b: &[F]) -> fac {
    assert_eq!(a.len(), b.len(), "Inner product operands differ in length");
    a.par_iter()
        .zip(b.par_iter())
        .map(|(a, b)| a.to_fac() * b.to_fac())
        .sum()
}

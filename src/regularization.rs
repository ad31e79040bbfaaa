//! Differential regularization operators `L^T L` acting on vector fields.
//!
//! Both operators are built from `K`, the anisotropic graph Laplacian of the
//! voxel grid with zero-Neumann boundaries: each pair of face-adjacent voxels
//! along axis `a` contributes the edge weight `1/h_a²`, and edges leaving the
//! grid are omitted. `K` is symmetric positive semi-definite with zero row
//! sums, and so is `K²`, which makes every operator here annihilate
//! constant fields.

pub mod bending;
pub mod membrane;

use crate::{
    error::SolverError,
    field::{component_view_mut, VectorField},
    grid::{GridShape, VoxelSize},
    num::{fac, BFloat},
};
use ndarray::Zip;
use std::{fmt, str::FromStr};

pub use bending::Bending;
pub use membrane::Membrane;

#[cfg(feature = "serialization")]
use serde::Serialize;

/// Selects which regularizer is used for a whole solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub enum RegularizationKind {
    /// First-derivative energy, `λ0 I + λ1 K`.
    Membrane,
    /// Second-derivative energy, `λ0 I + λ1 K + λ2 K²`.
    Bending,
}

impl RegularizationKind {
    /// Returns the name used when parsing and printing the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Membrane => "membrane",
            Self::Bending => "bending",
        }
    }
}

impl FromStr for RegularizationKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "membrane" => Ok(Self::Membrane),
            "bending" => Ok(Self::Bending),
            _ => Err(SolverError::UnknownRegularization(s.to_string())),
        }
    }
}

impl fmt::Display for RegularizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stiffness coefficients of the regularizers.
///
/// The membrane operator ignores the `bending` coefficient.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct PhysicalParams {
    absolute: fac,
    membrane: fac,
    bending: fac,
    component_scales: Vec<fac>,
}

impl PhysicalParams {
    /// Creates new coefficients for the zeroth-order (`absolute`),
    /// first-order (`membrane`) and second-order (`bending`) penalties.
    pub fn new(absolute: fac, membrane: fac, bending: fac) -> Result<Self, SolverError> {
        for (name, value) in [
            ("absolute", absolute),
            ("membrane", membrane),
            ("bending", bending),
        ] {
            check_coefficient(name, value)?;
        }
        Ok(Self {
            absolute,
            membrane,
            bending,
            component_scales: Vec::new(),
        })
    }

    /// Sets a separate multiplier for the regularization of each component.
    pub fn with_component_scales(mut self, scales: Vec<fac>) -> Result<Self, SolverError> {
        for &scale in &scales {
            check_coefficient("component scale", scale)?;
        }
        self.component_scales = scales;
        Ok(self)
    }

    /// Returns the coefficient of the zeroth-order penalty.
    pub fn absolute(&self) -> fac {
        self.absolute
    }

    /// Returns the coefficient of the first-order penalty.
    pub fn membrane(&self) -> fac {
        self.membrane
    }

    /// Returns the coefficient of the second-order penalty.
    pub fn bending(&self) -> fac {
        self.bending
    }

    /// Returns the multiplier for the given component (1 unless set).
    pub fn component_scale(&self, component: usize) -> fac {
        self.component_scales
            .get(component)
            .copied()
            .unwrap_or(1.0)
    }

    /// Checks that any component scales match the number of components.
    pub fn validate_for(&self, num_components: usize) -> Result<(), SolverError> {
        if self.component_scales.is_empty() || self.component_scales.len() == num_components {
            Ok(())
        } else {
            Err(SolverError::FieldLengthMismatch {
                name: "component scales",
                expected: num_components,
                actual: self.component_scales.len(),
            })
        }
    }
}

fn check_coefficient(name: &'static str, value: fac) -> Result<(), SolverError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SolverError::InvalidPhysicalParameter { name, value })
    }
}

/// A regularizer kind together with its coefficients.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct Regularization {
    pub kind: RegularizationKind,
    pub params: PhysicalParams,
}

impl Regularization {
    pub fn new(kind: RegularizationKind, params: PhysicalParams) -> Self {
        Self { kind, params }
    }
}

/// Defines a regularization operator instantiated for one grid level.
///
/// Values are computed for a single component with unit component scale;
/// callers multiply by `PhysicalParams::component_scale`.
pub trait Regularizer: Sync + Sized {
    /// Creates the operator for a grid with the given shape and voxel size.
    fn for_level(params: &PhysicalParams, shape: GridShape, voxel_size: &VoxelSize) -> Self;

    /// Returns the shape of the grid the operator acts on.
    fn shape(&self) -> &GridShape;

    /// Computes `(L^T L f)` at the given voxel.
    fn value_at<F: BFloat>(&self, f: &[F], x: usize, y: usize, z: usize) -> fac;

    /// Returns the diagonal entry of `L^T L` at the given voxel.
    fn diagonal_at(&self, x: usize, y: usize, z: usize) -> fac;

    /// Writes `scale * L^T L f` into `g` for one component.
    ///
    /// `temp` must hold at least one component's worth of values; operators
    /// that need no intermediate field leave it untouched.
    fn apply<F: BFloat>(&self, f: &[F], g: &mut [F], _temp: &mut [F], scale: fac) {
        let shape = *self.shape();
        Zip::indexed(component_view_mut(&shape, g)).par_for_each(|(x, y, z), g| {
            *g = F::from_fac(scale * self.value_at(f, x, y, z));
        });
    }
}

/// Computes `(K f)` at the given voxel, with edge weights `weights[a] = 1/h_a²`.
#[inline]
pub(crate) fn laplacian_at<F: BFloat>(
    shape: &GridShape,
    weights: &[fac; 3],
    f: &[F],
    x: usize,
    y: usize,
    z: usize,
) -> fac {
    let extents = shape.extents();
    let strides = shape.strides();
    let coords = [x, y, z];
    let idx = shape.linear_idx(x, y, z);
    let center = f[idx].to_fac();

    let mut sum = 0.0;
    for axis in 0..3 {
        let (coord, stride, weight) = (coords[axis], strides[axis], weights[axis]);
        if coord > 0 {
            sum += weight * (center - f[idx - stride].to_fac());
        }
        if coord + 1 < extents[axis] {
            sum += weight * (center - f[idx + stride].to_fac());
        }
    }
    sum
}

/// Returns the diagonal entry `K_ii` at the given voxel.
#[inline]
pub(crate) fn laplacian_diagonal_at(
    shape: &GridShape,
    weights: &[fac; 3],
    x: usize,
    y: usize,
    z: usize,
) -> fac {
    let extents = shape.extents();
    let coords = [x, y, z];
    (0..3)
        .map(|axis| weights[axis] * num_neighbours(coords[axis], extents[axis]) as fac)
        .sum()
}

/// Number of neighbours a voxel at `coord` has along an axis of the given extent.
#[inline]
pub(crate) fn num_neighbours(coord: usize, extent: usize) -> usize {
    usize::from(coord > 0) + usize::from(coord + 1 < extent)
}

fn apply_components<R, F>(
    params: &PhysicalParams,
    field: &VectorField<F>,
    voxel_size: &VoxelSize,
    output: &mut [F],
) -> Result<(), SolverError>
where
    R: Regularizer,
    F: BFloat,
{
    let shape = *field.shape();
    let num_components = field.num_components();
    params.validate_for(num_components)?;
    if output.len() != field.values().len() {
        return Err(SolverError::FieldLengthMismatch {
            name: "operator output",
            expected: field.values().len(),
            actual: output.len(),
        });
    }
    let operator = R::for_level(params, shape, voxel_size);
    let n = shape.num_voxels();
    let mut temp = vec![F::zero(); n];
    for (component, g) in output.chunks_mut(n).enumerate() {
        operator.apply(
            field.component(component),
            g,
            &mut temp,
            params.component_scale(component),
        );
    }
    Ok(())
}

/// Computes `L^T L f` for every component of the given field with the
/// selected regularizer, writing the result into `output`.
pub fn apply<F: BFloat>(
    regularization: &Regularization,
    field: &VectorField<F>,
    voxel_size: &VoxelSize,
    output: &mut [F],
) -> Result<(), SolverError> {
    match regularization.kind {
        RegularizationKind::Membrane => {
            apply_membrane(field, &regularization.params, voxel_size, output)
        }
        RegularizationKind::Bending => {
            apply_bending(field, &regularization.params, voxel_size, output)
        }
    }
}

/// Computes the membrane energy operator `L^T L f` for every component.
pub fn apply_membrane<F: BFloat>(
    field: &VectorField<F>,
    params: &PhysicalParams,
    voxel_size: &VoxelSize,
    output: &mut [F],
) -> Result<(), SolverError> {
    apply_components::<Membrane, F>(params, field, voxel_size, output)
}

/// Computes the bending energy operator `L^T L f` for every component.
pub fn apply_bending<F: BFloat>(
    field: &VectorField<F>,
    params: &PhysicalParams,
    voxel_size: &VoxelSize,
    output: &mut [F],
) -> Result<(), SolverError> {
    apply_components::<Bending, F>(params, field, voxel_size, output)
}

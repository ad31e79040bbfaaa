#![allow(dead_code)]

use regfmg::{
    field::{norm, symmetric_channel, CoefficientField, CoefficientLayout, VectorField},
    grid::{GridShape, VoxelSize},
    multigrid::FmgProblem,
    num::{fac, BFloat},
    regularization::{PhysicalParams, Regularization, RegularizationKind},
};
use std::f64::consts::PI;

#[cfg(feature = "cli")]
use std::ffi::OsString;

#[cfg(feature = "cli")]
pub fn run<I, T>(args: I)
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    regfmg::cli::run::run_with_args(
        regfmg::cli::build::build()
            .no_binary_name(true)
            .get_matches_from(args),
    );
}

/// Deterministic values in `[-1, 1)` from a linear congruential generator.
pub fn pseudo_random_values<F: BFloat>(len: usize, seed: u64) -> Vec<F> {
    let mut state = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            F::from_fac(((state >> 11) as fac / (1u64 << 53) as fac) * 2.0 - 1.0)
        })
        .collect()
}

/// Evaluates a function of the cell-centered unit coordinates for every
/// voxel and component, component-major.
pub fn sample<F, S>(shape: &GridShape, num_components: usize, sampler: S) -> Vec<F>
where
    F: BFloat,
    S: Fn(usize, [fac; 3]) -> fac,
{
    let (nx, ny, nz) = shape.to_tuple();
    let mut values = Vec::with_capacity(num_components * shape.num_voxels());
    for component in 0..num_components {
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let coords = [
                        (x as fac + 0.5) / nx as fac,
                        (y as fac + 0.5) / ny as fac,
                        (z as fac + 0.5) / nz as fac,
                    ];
                    values.push(F::from_fac(sampler(component, coords)));
                }
            }
        }
    }
    values
}

/// A smooth field whose normal derivatives vanish at the domain boundary.
pub fn smooth_field<F: BFloat>(shape: &GridShape, num_components: usize) -> Vec<F> {
    sample(shape, num_components, |component, [u, v, w]| {
        (1.0 + 0.5 * component as fac) * (PI * u).cos() * (PI * v).cos()
            + 0.3 * (PI * w).cos()
            + 0.1 * component as fac
    })
}

/// Diagonal coefficients varying smoothly between `low` and `high`.
pub fn varying_diagonal_coefficients<F: BFloat>(
    shape: &GridShape,
    num_components: usize,
    low: fac,
    high: fac,
) -> Vec<F> {
    sample(shape, num_components, |component, [u, v, w]| {
        let t = 0.5
            + 0.5 * (2.0 * PI * u + component as fac).sin() * (PI * v).cos() * (PI * w).cos();
        low + (high - low) * t
    })
}

/// Symmetric coefficient blocks with unit diagonal and the given coupling
/// on every off-diagonal entry.
pub fn coupled_coefficients<F: BFloat>(
    shape: &GridShape,
    num_components: usize,
    coupling: fac,
) -> Vec<F> {
    let n = shape.num_voxels();
    let mut values =
        vec![F::zero(); n * CoefficientLayout::Symmetric.values_per_voxel(num_components)];
    for row in 0..num_components {
        for col in row..num_components {
            let channel = symmetric_channel(num_components, row, col);
            let value = if row == col { 1.0 } else { coupling };
            values[channel * n..(channel + 1) * n].fill(F::from_fac(value));
        }
    }
    values
}

pub fn regularization(
    kind: RegularizationKind,
    absolute: fac,
    membrane: fac,
    bending: fac,
) -> Regularization {
    Regularization::new(
        kind,
        PhysicalParams::new(absolute, membrane, bending).unwrap(),
    )
}

/// Owned inputs of a solve.
pub struct TestProblem<F> {
    pub shape: GridShape,
    pub num_components: usize,
    pub layout: CoefficientLayout,
    pub coefficients: Vec<F>,
    pub rhs: Vec<F>,
    pub regularization: Regularization,
    pub voxel_size: VoxelSize,
}

impl<F: BFloat> TestProblem<F> {
    pub fn new(
        shape: GridShape,
        num_components: usize,
        layout: CoefficientLayout,
        coefficients: Vec<F>,
        regularization: Regularization,
    ) -> Self {
        Self {
            shape,
            num_components,
            layout,
            coefficients,
            rhs: vec![F::zero(); num_components * shape.num_voxels()],
            regularization,
            voxel_size: VoxelSize::unit(),
        }
    }

    pub fn with_voxel_size(mut self, voxel_size: VoxelSize) -> Self {
        self.voxel_size = voxel_size;
        self
    }

    pub fn problem(&self) -> FmgProblem<'_, F> {
        FmgProblem::new(
            CoefficientField::new(&self.shape, self.layout, self.num_components, &self.coefficients)
                .unwrap(),
            VectorField::new(self.shape, self.num_components, &self.rhs).unwrap(),
            &self.regularization,
            self.voxel_size,
        )
        .unwrap()
    }

    /// Sets the right hand side so that the given field is the exact solution.
    pub fn with_solution(mut self, solution: &[F]) -> Self {
        let mut rhs = vec![F::zero(); solution.len()];
        self.problem().apply_system(solution, &mut rhs).unwrap();
        self.rhs = rhs;
        self
    }

    pub fn residual_norm(&self, solution: &[F]) -> fac {
        self.problem().residual_norm(solution).unwrap()
    }
}

pub fn relative_difference<F: BFloat>(values: &[F], reference: &[F]) -> fac {
    let difference: Vec<F> = values
        .iter()
        .zip(reference)
        .map(|(&value, &reference)| value - reference)
        .collect();
    norm(&difference) / norm(reference)
}

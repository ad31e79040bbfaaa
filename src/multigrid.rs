//! Full multigrid solution of `(A + L^T L) u = b` on a voxel grid.
//!
//! The solve proceeds in two phases. First the residual of the initial
//! guess is pushed down the grid hierarchy and a correction is built up
//! from the coarsest level with the full multigrid schedule: at each level
//! the coarser solution is interpolated as a starting guess and improved by
//! V-cycles. The correction is then added to the initial guess, and the
//! requested number of V-cycles is performed on the finest level.

use crate::{
    diagnostics::Verbosity,
    error::SolverError,
    field::{norm, CoefficientField, CoefficientLayout, VectorField},
    grid::{GridShape, VoxelSize},
    num::{fac, BFloat},
    regularization::{Bending, Membrane, Regularization, RegularizationKind, Regularizer},
    relaxation::{LevelOperator, VoxelSystem},
    scratch::{fmg_scratch_size, LevelBuffers, ScratchPartition, ScratchPlan},
    transfer::resize_channels,
};
use indicatif::ProgressBar;
use rayon::prelude::*;

#[cfg(feature = "serialization")]
use serde::Serialize;

/// Iteration counts controlling a multigrid solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct FmgConfig {
    /// Number of V-cycles per level, both in the full multigrid phase and
    /// on the finest level afterwards.
    pub num_cycles: usize,
    pub pre_smoothing_sweeps: usize,
    pub post_smoothing_sweeps: usize,
    /// Number of relaxation sweeps making up the coarsest-level solve.
    pub coarsest_sweeps: usize,
}

impl FmgConfig {
    pub const DEFAULT_NUM_CYCLES: usize = 2;
    pub const DEFAULT_PRE_SMOOTHING_SWEEPS: usize = 2;
    pub const DEFAULT_POST_SMOOTHING_SWEEPS: usize = 2;
    pub const DEFAULT_COARSEST_SWEEPS: usize = 8;

    /// Creates a configuration with the given number of cycles and default
    /// sweep counts.
    pub fn with_num_cycles(num_cycles: usize) -> Self {
        Self {
            num_cycles,
            ..Self::default()
        }
    }
}

impl Default for FmgConfig {
    fn default() -> Self {
        Self {
            num_cycles: Self::DEFAULT_NUM_CYCLES,
            pre_smoothing_sweeps: Self::DEFAULT_PRE_SMOOTHING_SWEEPS,
            post_smoothing_sweeps: Self::DEFAULT_POST_SMOOTHING_SWEEPS,
            coarsest_sweeps: Self::DEFAULT_COARSEST_SWEEPS,
        }
    }
}

/// The fixed inputs of a solve: coefficients, right hand side and operator.
#[derive(Clone, Copy, Debug)]
pub struct FmgProblem<'a, F> {
    coefficients: CoefficientField<'a, F>,
    rhs: VectorField<'a, F>,
    regularization: &'a Regularization,
    voxel_size: VoxelSize,
}

impl<'a, F: BFloat> FmgProblem<'a, F> {
    /// Bundles the inputs of a solve after checking that they are consistent
    /// and that the coefficients and physical parameters are admissible.
    pub fn new(
        coefficients: CoefficientField<'a, F>,
        rhs: VectorField<'a, F>,
        regularization: &'a Regularization,
        voxel_size: VoxelSize,
    ) -> Result<Self, SolverError> {
        let num_components = rhs.num_components();
        let num_voxels = rhs.shape().num_voxels();
        if coefficients.num_components() != num_components
            || coefficients.num_voxels() != num_voxels
        {
            return Err(SolverError::FieldLengthMismatch {
                name: "coefficient field",
                expected: num_voxels * coefficients.layout().values_per_voxel(num_components),
                actual: coefficients.values().len(),
            });
        }
        regularization.params.validate_for(num_components)?;
        coefficients.validate()?;
        Ok(Self {
            coefficients,
            rhs,
            regularization,
            voxel_size,
        })
    }

    pub fn shape(&self) -> &GridShape {
        self.rhs.shape()
    }

    pub fn num_components(&self) -> usize {
        self.rhs.num_components()
    }

    pub fn layout(&self) -> CoefficientLayout {
        self.coefficients.layout()
    }

    pub fn regularization(&self) -> &Regularization {
        self.regularization
    }

    pub fn voxel_size(&self) -> &VoxelSize {
        &self.voxel_size
    }

    /// Returns the number of scratch values a solve of this problem needs.
    pub fn scratch_size(&self) -> usize {
        fmg_scratch_size(self.shape(), self.num_components(), self.layout())
    }

    /// Writes `(A + L^T L) u` into `output`.
    pub fn apply_system(&self, solution: &[F], output: &mut [F]) -> Result<(), SolverError> {
        self.check_field_length("solution", solution)?;
        self.check_field_length("output", output)?;
        let mut temp = vec![F::zero(); self.shape().num_voxels()];
        match self.regularization.kind {
            RegularizationKind::Membrane => {
                self.finest_operator::<Membrane>()
                    .apply_system(solution, output, &mut temp)
            }
            RegularizationKind::Bending => {
                self.finest_operator::<Bending>()
                    .apply_system(solution, output, &mut temp)
            }
        }
        Ok(())
    }

    /// Writes the residual `b - (A + L^T L) u` into `residual`.
    pub fn compute_residual(&self, solution: &[F], residual: &mut [F]) -> Result<(), SolverError> {
        self.apply_system(solution, residual)?;
        residual
            .par_iter_mut()
            .zip(self.rhs.values().par_iter())
            .for_each(|(value, &b)| *value = b - *value);
        Ok(())
    }

    /// Computes the norm of the residual of the given solution.
    pub fn residual_norm(&self, solution: &[F]) -> Result<fac, SolverError> {
        let mut residual = vec![F::zero(); solution.len()];
        self.compute_residual(solution, &mut residual)?;
        Ok(norm(&residual))
    }

    fn finest_operator<R: Regularizer>(&self) -> LevelOperator<'_, F, R> {
        let params = &self.regularization.params;
        LevelOperator::new(
            R::for_level(params, *self.shape(), &self.voxel_size),
            self.coefficients,
            params,
        )
    }

    fn check_field_length(&self, name: &'static str, values: &[F]) -> Result<(), SolverError> {
        let expected = self.rhs.values().len();
        if values.len() == expected {
            Ok(())
        } else {
            Err(SolverError::FieldLengthMismatch {
                name,
                expected,
                actual: values.len(),
            })
        }
    }
}

/// Buffers shared by all levels during a solve.
struct Workspace<'w, F> {
    temp: &'w mut [F],
    voxel_system: VoxelSystem,
}

/// Full multigrid solver with a fixed configuration.
#[derive(Clone, Debug, Default)]
pub struct MultigridSolver {
    config: FmgConfig,
    verbosity: Verbosity,
}

impl MultigridSolver {
    pub fn new(config: FmgConfig, verbosity: Verbosity) -> Self {
        Self { config, verbosity }
    }

    pub fn config(&self) -> &FmgConfig {
        &self.config
    }

    pub fn verbosity(&self) -> &Verbosity {
        &self.verbosity
    }

    /// Improves the given solution of the problem in place.
    ///
    /// `solution` serves as the initial guess. `scratch` must hold at least
    /// `problem.scratch_size()` values; its content on entry is irrelevant.
    pub fn solve<F: BFloat>(
        &self,
        problem: &FmgProblem<F>,
        solution: &mut [F],
        scratch: &mut [F],
    ) -> Result<(), SolverError> {
        problem.check_field_length("solution", solution)?;
        let plan = ScratchPlan::new(*problem.shape(), problem.num_components(), problem.layout());
        let partition = plan.partition(scratch)?;

        if self.verbosity.print_messages() {
            let shapes: Vec<_> = plan
                .hierarchy()
                .shapes()
                .iter()
                .map(|shape| shape.to_string())
                .collect();
            println!(
                "Solving with {} regularization for {} component(s) on {} level(s): {}",
                problem.regularization.kind,
                problem.num_components(),
                shapes.len(),
                shapes.join(" -> ")
            );
        }

        match problem.regularization.kind {
            RegularizationKind::Membrane => {
                self.run::<Membrane, F>(problem, &plan, solution, partition)
            }
            RegularizationKind::Bending => {
                self.run::<Bending, F>(problem, &plan, solution, partition)
            }
        }
    }

    fn run<R: Regularizer, F: BFloat>(
        &self,
        problem: &FmgProblem<F>,
        plan: &ScratchPlan,
        solution: &mut [F],
        partition: ScratchPartition<F>,
    ) -> Result<(), SolverError> {
        let shapes = plan.hierarchy().shapes();
        let voxel_sizes = plan.hierarchy().voxel_sizes(problem.voxel_size);
        let params = &problem.regularization.params;
        let (num_components, layout) = (problem.num_components(), problem.layout());
        let rhs = problem.rhs.values();

        let ScratchPartition {
            finest_residual,
            temp,
            coarse_coefficients,
            mut coarse_levels,
        } = partition;

        let mut operators = Vec::with_capacity(shapes.len());
        operators.push(LevelOperator::new(
            R::for_level(params, shapes[0], &voxel_sizes[0]),
            problem.coefficients,
            params,
        ));
        let mut finer_coefficients = problem.coefficients.values();
        for (idx, coefficients) in coarse_coefficients.into_iter().enumerate() {
            let level = idx + 1;
            resize_channels(
                &shapes[level - 1],
                finer_coefficients,
                &shapes[level],
                coefficients,
                temp,
            );
            let coefficients: &[F] = coefficients;
            operators.push(LevelOperator::new(
                R::for_level(params, shapes[level], &voxel_sizes[level]),
                CoefficientField::new(&shapes[level], layout, num_components, coefficients)?,
                params,
            ));
            finer_coefficients = coefficients;
        }

        let mut workspace = Workspace {
            temp,
            voxel_system: VoxelSystem::new(num_components),
        };

        if !coarse_levels.is_empty() {
            operators[0].compute_residual(rhs, solution, finest_residual, workspace.temp);
            self.restrict_residual(&operators, finest_residual, &mut coarse_levels, &mut workspace);
            self.solve_coarse_correction(&operators, &mut coarse_levels, &mut workspace);
            resize_channels(
                &shapes[1],
                coarse_levels[0].solution,
                &shapes[0],
                finest_residual,
                workspace.temp,
            );
            add_correction(solution, finest_residual);
        }

        let progress_bar = self.verbosity.create_progress_bar(self.config.num_cycles);
        self.report_residual(
            &operators[0],
            rhs,
            solution,
            finest_residual,
            &mut workspace,
            &progress_bar,
            "full multigrid",
        );
        for cycle in 0..self.config.num_cycles {
            self.v_cycle(
                &operators,
                rhs,
                solution,
                finest_residual,
                &mut coarse_levels,
                &mut workspace,
            );
            progress_bar.inc(1);
            self.report_residual(
                &operators[0],
                rhs,
                solution,
                finest_residual,
                &mut workspace,
                &progress_bar,
                &format!("cycle {}/{}", cycle + 1, self.config.num_cycles),
            );
        }
        progress_bar.finish_and_clear();
        Ok(())
    }

    /// Transfers the finest residual down the hierarchy as the right hand
    /// side of every coarse level.
    fn restrict_residual<R: Regularizer, F: BFloat>(
        &self,
        operators: &[LevelOperator<F, R>],
        finest_residual: &[F],
        coarse_levels: &mut [LevelBuffers<F>],
        workspace: &mut Workspace<F>,
    ) {
        resize_channels(
            operators[0].regularizer().shape(),
            finest_residual,
            operators[1].regularizer().shape(),
            coarse_levels[0].rhs,
            workspace.temp,
        );
        for idx in 1..coarse_levels.len() {
            let (finer, coarser) = coarse_levels.split_at_mut(idx);
            resize_channels(
                operators[idx].regularizer().shape(),
                finer[idx - 1].rhs,
                operators[idx + 1].regularizer().shape(),
                coarser[0].rhs,
                workspace.temp,
            );
        }
    }

    /// Runs the full multigrid schedule over the coarse levels, leaving the
    /// correction for the finest level in the solution of the first coarse level.
    fn solve_coarse_correction<R: Regularizer, F: BFloat>(
        &self,
        operators: &[LevelOperator<F, R>],
        coarse_levels: &mut [LevelBuffers<F>],
        workspace: &mut Workspace<F>,
    ) {
        let num_coarse = coarse_levels.len();
        let coarsest = &mut coarse_levels[num_coarse - 1];
        coarsest.solution.fill(F::zero());
        operators[num_coarse].relax(
            coarsest.rhs,
            coarsest.solution,
            &mut workspace.voxel_system,
            self.config.coarsest_sweeps,
        );

        for idx in (0..num_coarse - 1).rev() {
            let level = idx + 1;
            let (current, coarser) = coarse_levels[idx..].split_at_mut(1);
            let current = &mut current[0];
            resize_channels(
                operators[level + 1].regularizer().shape(),
                coarser[0].solution,
                operators[level].regularizer().shape(),
                current.solution,
                workspace.temp,
            );
            for _ in 0..self.config.num_cycles {
                self.v_cycle(
                    &operators[level..],
                    current.rhs,
                    current.solution,
                    current.residual,
                    coarser,
                    workspace,
                );
            }
        }
    }

    /// Performs one V-cycle starting at the level of `operators[0]`.
    ///
    /// `coarser` holds the buffers of every coarser level, so its length is
    /// one less than that of `operators`. `residual` is overwritten.
    fn v_cycle<R: Regularizer, F: BFloat>(
        &self,
        operators: &[LevelOperator<F, R>],
        rhs: &[F],
        solution: &mut [F],
        residual: &mut [F],
        coarser: &mut [LevelBuffers<F>],
        workspace: &mut Workspace<F>,
    ) {
        let operator = &operators[0];
        let (next, rest) = match coarser.split_first_mut() {
            Some(split) => split,
            None => {
                operator.relax(
                    rhs,
                    solution,
                    &mut workspace.voxel_system,
                    self.config.coarsest_sweeps,
                );
                return;
            }
        };
        let shape = operator.regularizer().shape();
        let coarse_shape = operators[1].regularizer().shape();

        operator.relax(
            rhs,
            solution,
            &mut workspace.voxel_system,
            self.config.pre_smoothing_sweeps,
        );
        operator.compute_residual(rhs, solution, residual, workspace.temp);
        resize_channels(shape, residual, coarse_shape, next.rhs, workspace.temp);

        next.solution.fill(F::zero());
        self.v_cycle(
            &operators[1..],
            next.rhs,
            next.solution,
            next.residual,
            rest,
            workspace,
        );

        resize_channels(coarse_shape, next.solution, shape, residual, workspace.temp);
        add_correction(solution, residual);
        operator.relax(
            rhs,
            solution,
            &mut workspace.voxel_system,
            self.config.post_smoothing_sweeps,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn report_residual<R: Regularizer, F: BFloat>(
        &self,
        operator: &LevelOperator<F, R>,
        rhs: &[F],
        solution: &[F],
        residual: &mut [F],
        workspace: &mut Workspace<F>,
        progress_bar: &ProgressBar,
        stage: &str,
    ) {
        if !self.verbosity.print_messages() {
            return;
        }
        operator.compute_residual(rhs, solution, residual, workspace.temp);
        let message = format!("Residual norm after {}: {:.6e}", stage, norm(residual));
        if progress_bar.is_hidden() {
            println!("{}", message);
        } else {
            progress_bar.println(message);
        }
    }
}

fn add_correction<F: BFloat>(solution: &mut [F], correction: &[F]) {
    solution
        .par_iter_mut()
        .zip(correction.par_iter())
        .for_each(|(value, &correction)| *value = *value + correction);
}

/// Improves `solution` of the given problem in place with `num_cycles`
/// V-cycles per level, using default sweep counts and no output.
///
/// `scratch` must hold at least `problem.scratch_size()` values.
pub fn fmg<F: BFloat>(
    problem: &FmgProblem<F>,
    num_cycles: usize,
    solution: &mut [F],
    scratch: &mut [F],
) -> Result<(), SolverError> {
    MultigridSolver::new(FmgConfig::with_num_cycles(num_cycles), Verbosity::Quiet).solve(
        problem,
        solution,
        scratch,
    )
}

/// Like `fmg`, but allocates the scratch buffer itself.
pub fn fmg_with_allocated_scratch<F: BFloat>(
    problem: &FmgProblem<F>,
    num_cycles: usize,
    solution: &mut [F],
) -> Result<(), SolverError> {
    let mut scratch = vec![F::zero(); problem.scratch_size()];
    fmg(problem, num_cycles, solution, &mut scratch)
}

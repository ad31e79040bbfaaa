//! Command line interface for solving a synthetic registration system.
//!
//! The right hand side is generated from a smooth known displacement field,
//! so the accuracy of the solve can be reported alongside the residual.

use super::utils;
use crate::{
    diagnostics::Verbosity,
    exit_on_error,
    field::{norm, symmetric_channel, CoefficientField, CoefficientLayout, VectorField},
    grid::{GridShape, VoxelSize},
    multigrid::{FmgConfig, FmgProblem, MultigridSolver},
    num::{fac, BFloat},
    regularization::{PhysicalParams, Regularization, RegularizationKind},
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::f64::consts::PI;

#[cfg(feature = "serialization")]
use serde::Serialize;

/// Builds a representation of the `solve` command line subcommand.
pub fn create_solve_subcommand() -> Command {
    let command = Command::new("solve")
        .about("Solve a synthetic system with a known smooth solution")
        .long_about(
            "Solve a synthetic system with a known smooth solution.\n\
             The coefficient field varies smoothly over the grid and the right hand side\n\
             is computed from a smooth ground truth displacement field. The system is\n\
             solved from a zero initial guess, and the residual norm and relative error\n\
             are reported.",
        )
        .arg(utils::create_shape_argument())
        .arg(utils::create_components_argument())
        .arg(utils::create_symmetric_argument())
        .arg(
            Arg::new("regularization")
                .short('r')
                .long("regularization")
                .require_equals(true)
                .value_parser(["membrane", "bending"])
                .default_value("membrane")
                .help("Regularization energy to use"),
        )
        .arg(
            Arg::new("absolute")
                .long("absolute")
                .require_equals(true)
                .value_name("VALUE")
                .default_value("0")
                .help("Weight of the penalty on absolute displacements"),
        )
        .arg(
            Arg::new("membrane")
                .long("membrane")
                .require_equals(true)
                .value_name("VALUE")
                .default_value("0.1")
                .help("Weight of the membrane energy"),
        )
        .arg(
            Arg::new("bending")
                .long("bending")
                .require_equals(true)
                .value_name("VALUE")
                .default_value("0.01")
                .help("Weight of the bending energy (bending regularization only)"),
        )
        .arg(
            Arg::new("voxel-size")
                .long("voxel-size")
                .require_equals(true)
                .value_delimiter(',')
                .value_name("HX,HY,HZ")
                .help("Physical size of a voxel along each axis [default: 1,1,1]"),
        )
        .arg(
            Arg::new("cycles")
                .short('n')
                .long("cycles")
                .require_equals(true)
                .value_name("NUMBER")
                .default_value("2")
                .help("Number of V-cycles per level"),
        )
        .arg(
            Arg::new("pre-sweeps")
                .long("pre-sweeps")
                .require_equals(true)
                .value_name("NUMBER")
                .default_value("2")
                .help("Number of relaxation sweeps before each coarse grid correction"),
        )
        .arg(
            Arg::new("post-sweeps")
                .long("post-sweeps")
                .require_equals(true)
                .value_name("NUMBER")
                .default_value("2")
                .help("Number of relaxation sweeps after each coarse grid correction"),
        )
        .arg(
            Arg::new("coarsest-sweeps")
                .long("coarsest-sweeps")
                .require_equals(true)
                .value_name("NUMBER")
                .default_value("8")
                .help("Number of relaxation sweeps solving the coarsest level"),
        )
        .arg(
            Arg::new("single-precision")
                .long("single-precision")
                .action(ArgAction::SetTrue)
                .help("Store fields in single precision"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Print status messages while solving"),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .action(ArgAction::SetTrue)
                .help("Show progress bar for the V-cycles (also implies `verbose`)"),
        );

    #[cfg(feature = "json")]
    let command = command.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print the summary as JSON"),
    );

    command
}

/// Outcome of a synthetic solve.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct SolveSummary {
    pub shape: GridShape,
    pub num_components: usize,
    pub layout: CoefficientLayout,
    pub regularization: Regularization,
    pub config: FmgConfig,
    pub scratch_size: usize,
    pub initial_residual_norm: fac,
    pub final_residual_norm: fac,
    pub relative_error: fac,
}

impl SolveSummary {
    fn print(&self) {
        println!("Grid shape:            {}", self.shape);
        println!("Components:            {}", self.num_components);
        println!("Regularization:        {}", self.regularization.kind);
        println!("Cycles per level:      {}", self.config.num_cycles);
        println!("Scratch values:        {}", self.scratch_size);
        println!("Initial residual norm: {:.6e}", self.initial_residual_norm);
        println!("Final residual norm:   {:.6e}", self.final_residual_norm);
        println!("Relative error:        {:.6e}", self.relative_error);
    }
}

/// Runs the actions for the `solve` subcommand using the given arguments.
pub fn run_solve_subcommand(arguments: &ArgMatches) {
    let shape = utils::parse_shape(arguments);
    let num_components = utils::parse_num_components(arguments);
    let layout = utils::parse_coefficient_layout(arguments);

    let kind: RegularizationKind =
        utils::get_value_from_required_parseable_argument(arguments, "regularization");
    let absolute =
        utils::get_finite_float_value_from_required_parseable_argument(arguments, "absolute");
    let membrane =
        utils::get_finite_float_value_from_required_parseable_argument(arguments, "membrane");
    let bending =
        utils::get_finite_float_value_from_required_parseable_argument(arguments, "bending");
    let params = exit_on_error!(
        PhysicalParams::new(absolute, membrane, bending),
        "Error: Invalid regularization parameters: {}"
    );
    let regularization = Regularization::new(kind, params);

    let voxel_size = if arguments.contains_id("voxel-size") {
        let voxel_size: Vec<f64> =
            utils::get_values_from_required_parseable_argument(arguments, "voxel-size");
        utils::verify_argument_value_count("voxel-size", &voxel_size, 3);
        exit_on_error!(
            VoxelSize::new(voxel_size[0], voxel_size[1], voxel_size[2]),
            "Error: Invalid voxel size: {}"
        )
    } else {
        VoxelSize::unit()
    };

    let config = FmgConfig {
        num_cycles: utils::get_value_from_required_parseable_argument(arguments, "cycles"),
        pre_smoothing_sweeps: utils::get_value_from_required_parseable_argument(
            arguments,
            "pre-sweeps",
        ),
        post_smoothing_sweeps: utils::get_value_from_required_parseable_argument(
            arguments,
            "post-sweeps",
        ),
        coarsest_sweeps: utils::get_value_from_required_parseable_argument(
            arguments,
            "coarsest-sweeps",
        ),
    };
    let verbosity = utils::parse_verbosity(arguments, true);

    let summary = if arguments.get_flag("single-precision") {
        solve_synthetic_problem::<f32>(
            shape,
            num_components,
            layout,
            regularization,
            voxel_size,
            config,
            verbosity,
        )
    } else {
        solve_synthetic_problem::<f64>(
            shape,
            num_components,
            layout,
            regularization,
            voxel_size,
            config,
            verbosity,
        )
    };

    #[cfg(feature = "json")]
    if arguments.get_flag("json") {
        println!(
            "{}",
            exit_on_error!(
                serde_json::to_string_pretty(&summary),
                "Error: Could not serialize summary: {}"
            )
        );
        return;
    }
    summary.print();
}

/// Builds the synthetic problem for the given settings, solves it from a
/// zero initial guess and summarizes the result.
pub fn solve_synthetic_problem<F: BFloat>(
    shape: GridShape,
    num_components: usize,
    layout: CoefficientLayout,
    regularization: Regularization,
    voxel_size: VoxelSize,
    config: FmgConfig,
    verbosity: Verbosity,
) -> SolveSummary {
    let coefficients = synthetic_coefficients::<F>(&shape, num_components, layout);
    let coefficients = exit_on_error!(
        CoefficientField::new(&shape, layout, num_components, &coefficients),
        "Error: Could not create coefficient field: {}"
    );
    let ground_truth = smooth_ground_truth::<F>(&shape, num_components);

    // The operator does not depend on the right hand side, so the ground
    // truth can stand in for it until the real one is computed.
    let operator_problem = exit_on_error!(
        VectorField::new(shape, num_components, &ground_truth).and_then(|placeholder| {
            FmgProblem::new(coefficients, placeholder, &regularization, voxel_size)
        }),
        "Error: Invalid problem: {}"
    );
    let mut rhs = vec![F::zero(); ground_truth.len()];
    exit_on_error!(
        operator_problem.apply_system(&ground_truth, &mut rhs),
        "Error: Could not compute right hand side: {}"
    );

    let problem = exit_on_error!(
        VectorField::new(shape, num_components, &rhs)
            .and_then(|rhs| FmgProblem::new(coefficients, rhs, &regularization, voxel_size)),
        "Error: Invalid problem: {}"
    );

    let mut solution = vec![F::zero(); rhs.len()];
    let initial_residual_norm = norm(&rhs);
    let scratch_size = problem.scratch_size();
    let mut scratch = vec![F::zero(); scratch_size];

    let solver = MultigridSolver::new(config, verbosity);
    exit_on_error!(
        solver.solve(&problem, &mut solution, &mut scratch),
        "Error: Solve failed: {}"
    );

    let final_residual_norm = exit_on_error!(
        problem.residual_norm(&solution),
        "Error: Could not compute residual: {}"
    );
    let error: Vec<F> = solution
        .iter()
        .zip(&ground_truth)
        .map(|(&u, &truth)| u - truth)
        .collect();
    let relative_error = norm(&error) / norm(&ground_truth).max(fac::MIN_POSITIVE);

    SolveSummary {
        shape,
        num_components,
        layout,
        regularization,
        config,
        scratch_size,
        initial_residual_norm,
        final_residual_norm,
        relative_error,
    }
}

/// Cell-centered coordinates scaled to the unit interval.
fn unit_coordinates(shape: &GridShape, x: usize, y: usize, z: usize) -> [fac; 3] {
    let (nx, ny, nz) = shape.to_tuple();
    [
        (x as fac + 0.5) / nx as fac,
        (y as fac + 0.5) / ny as fac,
        (z as fac + 0.5) / nz as fac,
    ]
}

fn smooth_ground_truth<F: BFloat>(shape: &GridShape, num_components: usize) -> Vec<F> {
    let (nx, ny, nz) = shape.to_tuple();
    let mut values = Vec::with_capacity(num_components * shape.num_voxels());
    for component in 0..num_components {
        let phase = 0.5 * component as fac;
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let [u, v, w] = unit_coordinates(shape, x, y, z);
                    values.push(F::from_fac(
                        (PI * u + phase).cos() * (PI * v).cos() + 0.5 * (PI * w).sin(),
                    ));
                }
            }
        }
    }
    values
}

fn synthetic_coefficients<F: BFloat>(
    shape: &GridShape,
    num_components: usize,
    layout: CoefficientLayout,
) -> Vec<F> {
    let (nx, ny, nz) = shape.to_tuple();
    let n = shape.num_voxels();
    let mut values = vec![F::zero(); n * layout.values_per_voxel(num_components)];
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let voxel = shape.linear_idx(x, y, z);
                let [u, v, w] = unit_coordinates(shape, x, y, z);
                let variation = (2.0 * PI * u).sin() * (2.0 * PI * v).cos() * (PI * w).cos();
                for row in 0..num_components {
                    values[row * n + voxel] = F::from_fac(1.0 + 0.5 * variation);
                    if layout == CoefficientLayout::Symmetric {
                        // Kept small enough for every block to stay diagonally dominant.
                        let coupling = 0.4 / num_components as fac;
                        for col in (row + 1)..num_components {
                            let channel = symmetric_channel(num_components, row, col);
                            values[channel * n + voxel] = F::from_fac(coupling * variation);
                        }
                    }
                }
            }
        }
    }
    values
}

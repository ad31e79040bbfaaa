#![cfg(feature = "cli")]

mod common;

use common::run;
use regfmg::{
    cli::solve::solve_synthetic_problem,
    diagnostics::Verbosity,
    field::CoefficientLayout,
    grid::{GridShape, VoxelSize},
    multigrid::FmgConfig,
    regularization::{PhysicalParams, Regularization, RegularizationKind},
};

#[test]
fn solve_subcommand_runs() {
    run([
        "solve",
        "--shape=16,16,1",
        "--components=2",
        "--regularization=membrane",
        "--membrane=0.05",
        "--cycles=3",
    ]);
    run([
        "--timing",
        "solve",
        "--shape=6,5,4",
        "--components=3",
        "--symmetric",
        "--regularization=bending",
        "--single-precision",
        "--voxel-size=1,1,2",
        "--verbose",
    ]);
}

#[test]
fn scratch_size_subcommand_runs() {
    run(["scratch_size", "--shape=32,32,16", "--components=3"]);
}

#[test]
fn synthetic_problem_is_solved_accurately() {
    let summary = solve_synthetic_problem::<f64>(
        GridShape::new(16, 16, 1).unwrap(),
        2,
        CoefficientLayout::Diagonal,
        Regularization::new(
            RegularizationKind::Membrane,
            PhysicalParams::new(0.0, 0.1, 0.0).unwrap(),
        ),
        VoxelSize::unit(),
        FmgConfig::with_num_cycles(4),
        Verbosity::Quiet,
    );
    assert!(summary.final_residual_norm < 1e-3 * summary.initial_residual_norm);
    assert!(summary.relative_error < 1e-3);
}

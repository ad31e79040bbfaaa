mod common;

use approx::assert_abs_diff_eq;
use common::{
    coupled_coefficients, pseudo_random_values, regularization, relative_difference,
    smooth_field, varying_diagonal_coefficients, TestProblem,
};
use regfmg::{
    field::{CoefficientField, CoefficientLayout},
    fmg, fmg_scratch_size, fmg_with_allocated_scratch,
    grid::{GridShape, VoxelSize},
    multigrid::{FmgConfig, MultigridSolver},
    num::BFloat,
    regularization::{Bending, Membrane, RegularizationKind, Regularizer},
    relaxation::{LevelOperator, VoxelSystem},
};

#[test]
fn scratch_size_grows_with_every_axis() {
    for layout in [CoefficientLayout::Diagonal, CoefficientLayout::Symmetric] {
        for num_components in [1, 3] {
            for nx in 1..10 {
                for ny in 1..10 {
                    for nz in 1..6 {
                        let shape = GridShape::new(nx, ny, nz).unwrap();
                        let size = fmg_scratch_size(&shape, num_components, layout);
                        assert!(size >= num_components * shape.num_voxels());
                        for grown in [
                            GridShape::new(nx + 1, ny, nz).unwrap(),
                            GridShape::new(nx, ny + 1, nz).unwrap(),
                            GridShape::new(nx, ny, nz + 1).unwrap(),
                        ] {
                            assert!(
                                fmg_scratch_size(&grown, num_components, layout) >= size,
                                "Scratch size shrinks from {} to {}",
                                shape,
                                grown
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Computes the energy `e^T M e` of the error `e = u - truth`.
fn error_energy<R: Regularizer>(
    operator: &LevelOperator<'_, f64, R>,
    solution: &[f64],
    truth: &[f64],
    temp: &mut [f64],
) -> f64 {
    let error: Vec<f64> = solution.iter().zip(truth).map(|(u, t)| u - t).collect();
    let mut applied = vec![0.0; error.len()];
    operator.apply_system(&error, &mut applied, temp);
    regfmg::field::inner_product(&error, &applied)
}

fn assert_sweeps_never_increase_error_energy<R: Regularizer>(
    shape: GridShape,
    layout: CoefficientLayout,
    coefficients: Vec<f64>,
    num_components: usize,
    kind: RegularizationKind,
    weights: (f64, f64, f64),
) {
    let test = TestProblem::new(
        shape,
        num_components,
        layout,
        coefficients,
        regularization(kind, weights.0, weights.1, weights.2),
    );
    let params = &test.regularization.params;
    let operator = LevelOperator::new(
        R::for_level(params, shape, &VoxelSize::unit()),
        CoefficientField::new(&shape, layout, num_components, &test.coefficients).unwrap(),
        params,
    );
    let n = shape.num_voxels();
    let truth = pseudo_random_values::<f64>(num_components * n, 3);
    let mut rhs = vec![0.0; num_components * n];
    let mut temp = vec![0.0; n];
    operator.apply_system(&truth, &mut rhs, &mut temp);

    let mut solution = pseudo_random_values::<f64>(num_components * n, 11);
    let mut voxel_system = VoxelSystem::new(num_components);
    let initial = error_energy(&operator, &solution, &truth, &mut temp);
    let mut previous = initial;
    for _ in 0..5 {
        operator.relax(&rhs, &mut solution, &mut voxel_system, 1);
        let current = error_energy(&operator, &solution, &truth, &mut temp);
        assert!(
            current <= previous * (1.0 + 1e-12),
            "Error energy increased from {} to {}",
            previous,
            current
        );
        previous = current;
    }
    assert!(previous < initial);
}

#[test]
fn relaxation_sweeps_never_increase_error_energy() {
    let shape = GridShape::new(6, 5, 4).unwrap();
    let n = shape.num_voxels();
    assert_sweeps_never_increase_error_energy::<Membrane>(
        shape,
        CoefficientLayout::Diagonal,
        vec![1.0; n],
        1,
        RegularizationKind::Membrane,
        (0.0, 1.0, 0.0),
    );
    assert_sweeps_never_increase_error_energy::<Bending>(
        shape,
        CoefficientLayout::Diagonal,
        varying_diagonal_coefficients(&shape, 2, 0.5, 1.5),
        2,
        RegularizationKind::Bending,
        (0.01, 0.1, 1.0),
    );
    assert_sweeps_never_increase_error_energy::<Membrane>(
        shape,
        CoefficientLayout::Symmetric,
        coupled_coefficients(&shape, 2, 0.4),
        2,
        RegularizationKind::Membrane,
        (0.0, 1.0, 0.0),
    );
}

#[test]
fn single_voxel_grid_is_solved_exactly_in_one_cycle() {
    let shape = GridShape::new(1, 1, 1).unwrap();
    for kind in [RegularizationKind::Membrane, RegularizationKind::Bending] {
        // Only the absolute penalty acts on a single voxel.
        let mut test = TestProblem::new(
            shape,
            3,
            CoefficientLayout::Symmetric,
            vec![2.0, 3.0, 4.0, 0.5, -0.25, 1.0],
            regularization(kind, 0.5, 1.0, 1.0),
        );
        test.rhs = vec![1.0, -2.0, 3.0];
        let mut solution = vec![10.0; 3];
        fmg_with_allocated_scratch(&test.problem(), 1, &mut solution).unwrap();
        assert_abs_diff_eq!(test.residual_norm(&solution), 0.0, epsilon = 1e-12);

        let mut scalar = TestProblem::new(
            shape,
            1,
            CoefficientLayout::Diagonal,
            vec![1.5],
            regularization(kind, 0.5, 2.0, 2.0),
        );
        scalar.rhs = vec![4.0];
        let mut solution = vec![0.0];
        fmg_with_allocated_scratch(&scalar.problem(), 1, &mut solution).unwrap();
        assert_abs_diff_eq!(solution[0], 2.0, epsilon = 1e-12);
    }
}

fn decaying_residual_problem(kind: RegularizationKind) -> TestProblem<f64> {
    let shape = GridShape::new(8, 8, 8).unwrap();
    let (membrane, bending) = match kind {
        RegularizationKind::Membrane => (1.0, 0.0),
        RegularizationKind::Bending => (0.0, 1.0),
    };
    TestProblem::new(
        shape,
        2,
        CoefficientLayout::Diagonal,
        varying_diagonal_coefficients(&shape, 2, 0.5, 1.5),
        regularization(kind, 0.0, membrane, bending),
    )
}

fn residual_after_cycles(test: &TestProblem<f64>, initial: &[f64], num_cycles: usize) -> f64 {
    let mut solution = initial.to_vec();
    fmg_with_allocated_scratch(&test.problem(), num_cycles, &mut solution).unwrap();
    test.residual_norm(&solution)
}

#[test]
fn membrane_residual_vanishes_with_more_cycles() {
    let test = decaying_residual_problem(RegularizationKind::Membrane);
    let initial = pseudo_random_values::<f64>(test.rhs.len(), 7);
    let initial_residual = test.residual_norm(&initial);

    let after_one = residual_after_cycles(&test, &initial, 1);
    let after_two = residual_after_cycles(&test, &initial, 2);
    let after_four = residual_after_cycles(&test, &initial, 4);
    assert!(after_one < 0.5 * initial_residual);
    assert!(after_two < after_one);
    assert!(after_four < after_two);
    assert!(after_four < 1e-2 * initial_residual);
}

#[test]
fn bending_residual_decreases_with_more_cycles() {
    let test = decaying_residual_problem(RegularizationKind::Bending);
    let initial = pseudo_random_values::<f64>(test.rhs.len(), 5);
    let initial_residual = test.residual_norm(&initial);

    let after_one = residual_after_cycles(&test, &initial, 1);
    let after_four = residual_after_cycles(&test, &initial, 4);
    assert!(after_one < 0.5 * initial_residual);
    assert!(after_four < 0.1 * after_one);
    assert!(after_four < 1e-3 * initial_residual);
}

#[test]
fn repeated_solves_keep_reducing_residual() {
    let test = decaying_residual_problem(RegularizationKind::Membrane);
    let problem = test.problem();
    let mut solution = pseudo_random_values::<f64>(test.rhs.len(), 13);
    let mut scratch = vec![0.0; problem.scratch_size()];

    let mut previous = test.residual_norm(&solution);
    for _ in 0..3 {
        fmg(&problem, 1, &mut solution, &mut scratch).unwrap();
        let current = test.residual_norm(&solution);
        assert!(current < previous);
        previous = current;
    }
}

fn recover_smooth_field<F: BFloat>(num_cycles: usize) -> f64 {
    // 2D grid, two displacement components, membrane weight 0.05.
    let shape = GridShape::new(16, 16, 1).unwrap();
    let truth = smooth_field::<F>(&shape, 2);
    let test = TestProblem::new(
        shape,
        2,
        CoefficientLayout::Diagonal,
        vec![F::one(); 2 * shape.num_voxels()],
        regularization(RegularizationKind::Membrane, 0.0, 0.05, 0.0),
    )
    .with_solution(&truth);

    let mut solution = vec![F::zero(); truth.len()];
    fmg_with_allocated_scratch(&test.problem(), num_cycles, &mut solution).unwrap();
    relative_difference(&solution, &truth)
}

#[test]
fn smooth_displacement_is_recovered_on_2d_grid() {
    assert!(recover_smooth_field::<f64>(4) < 1e-4);
    assert!(recover_smooth_field::<f32>(4) < 1e-3);
}

#[test]
fn coupled_components_are_recovered() {
    let shape = GridShape::new(8, 8, 4).unwrap();
    let truth = smooth_field::<f64>(&shape, 3);
    let test = TestProblem::new(
        shape,
        3,
        CoefficientLayout::Symmetric,
        coupled_coefficients(&shape, 3, 0.3),
        regularization(RegularizationKind::Membrane, 0.01, 0.5, 0.0),
    )
    .with_voxel_size(VoxelSize::new(1.0, 1.0, 2.0).unwrap())
    .with_solution(&truth);

    let mut solution = vec![0.0; truth.len()];
    fmg_with_allocated_scratch(&test.problem(), 3, &mut solution).unwrap();
    assert!(relative_difference(&solution, &truth) < 1e-3);
}

#[test]
fn odd_anisotropic_grid_with_bending_converges() {
    let shape = GridShape::new(7, 5, 3).unwrap();
    let truth = smooth_field::<f64>(&shape, 2);
    let test = TestProblem::new(
        shape,
        2,
        CoefficientLayout::Diagonal,
        varying_diagonal_coefficients(&shape, 2, 0.5, 1.0),
        regularization(RegularizationKind::Bending, 0.001, 0.01, 0.02),
    )
    .with_voxel_size(VoxelSize::new(1.0, 1.5, 3.0).unwrap())
    .with_solution(&truth);

    let mut solution = vec![0.0; truth.len()];
    let initial_residual = test.residual_norm(&solution);
    fmg_with_allocated_scratch(&test.problem(), 3, &mut solution).unwrap();
    assert!(test.residual_norm(&solution) < 0.1 * initial_residual);
}

#[test]
fn custom_sweep_counts_are_honoured() {
    let test = decaying_residual_problem(RegularizationKind::Membrane);
    let initial = pseudo_random_values::<f64>(test.rhs.len(), 17);
    let problem = test.problem();

    let mut without_cycles = initial.clone();
    let solver = MultigridSolver::new(
        FmgConfig {
            num_cycles: 0,
            ..FmgConfig::default()
        },
        Default::default(),
    );
    let mut scratch = vec![0.0; problem.scratch_size()];
    solver
        .solve(&problem, &mut without_cycles, &mut scratch)
        .unwrap();

    let mut with_cycles = initial.clone();
    let solver = MultigridSolver::new(
        FmgConfig {
            num_cycles: 2,
            pre_smoothing_sweeps: 1,
            post_smoothing_sweeps: 3,
            coarsest_sweeps: 20,
        },
        Default::default(),
    );
    solver.solve(&problem, &mut with_cycles, &mut scratch).unwrap();

    assert!(test.residual_norm(&with_cycles) < test.residual_norm(&without_cycles));
}

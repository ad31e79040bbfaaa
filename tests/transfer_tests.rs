mod common;

use approx::assert_abs_diff_eq;
use common::{relative_difference, sample, smooth_field};
use regfmg::{
    grid::GridShape,
    num::fac,
    transfer::{prolongate, resize, resize_temp_size, restrict},
};
use std::f64::consts::PI;

fn restrict_then_prolongate(shape: &GridShape, field: &[f64], num_components: usize) -> Vec<f64> {
    let coarse_shape = shape.coarsened();
    let mut coarse = vec![0.0; num_components * coarse_shape.num_voxels()];
    let mut temp = vec![0.0; 2 * shape.num_voxels()];
    restrict(shape, field, &mut coarse, num_components, &mut temp).unwrap();
    let mut back = vec![0.0; field.len()];
    prolongate(shape, &coarse, &mut back, num_components, &mut temp).unwrap();
    back
}

#[test]
fn smooth_fields_survive_round_trip_for_several_shapes() {
    for (nx, ny, nz) in [(32, 32, 1), (24, 40, 1), (32, 32, 32)] {
        let shape = GridShape::new(nx, ny, nz).unwrap();
        let field: Vec<f64> = sample(&shape, 1, |_, [u, v, w]| {
            (PI * u).cos() * (PI * v).cos() * (PI * w).cos()
        });
        let back = restrict_then_prolongate(&shape, &field, 1);
        let error = relative_difference(&back, &field);
        assert!(error < 0.05, "Relative error {} too large for {}", error, shape);
    }
}

#[test]
fn checkerboard_is_not_reproduced() {
    let shape = GridShape::new(32, 32, 1).unwrap();
    let field: Vec<f64> = sample(&shape, 1, |_, [u, v, _]| {
        let (x, y) = ((u * 32.0) as usize, (v * 32.0) as usize);
        if (x + y) % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    });
    let back = restrict_then_prolongate(&shape, &field, 1);
    assert!(relative_difference(&back, &field) > 0.5);

    let smooth: Vec<f64> = smooth_field(&shape, 1);
    let smooth_back = restrict_then_prolongate(&shape, &smooth, 1);
    assert!(relative_difference(&smooth_back, &smooth) < 0.1 * relative_difference(&back, &field));
}

#[test]
fn multi_component_constants_are_preserved_by_mixed_resize() {
    let shape_in = GridShape::new(9, 6, 5).unwrap();
    let shape_out = GridShape::new(4, 10, 5).unwrap();
    let levels = [1.0, -2.5, 0.125];
    let field_in: Vec<f32> = sample(&shape_in, 3, |component, _| levels[component]);
    let mut field_out = vec![0.0f32; 3 * shape_out.num_voxels()];
    let mut temp = vec![0.0f32; resize_temp_size(&shape_in, &shape_out)];

    resize(&shape_in, &field_in, &shape_out, &mut field_out, 3, &mut temp).unwrap();
    for (component, values) in field_out.chunks(shape_out.num_voxels()).enumerate() {
        for &value in values {
            assert_abs_diff_eq!(value as fac, levels[component], epsilon = 1e-6);
        }
    }
}

#[test]
fn linear_ramp_is_interpolated_exactly_away_from_edges() {
    let shape = GridShape::new(16, 1, 1).unwrap();
    let coarse_shape = shape.coarsened();
    let coarse: Vec<f64> = (0..8).map(|j| j as f64).collect();
    let mut fine = vec![0.0; 16];
    let mut temp = vec![0.0; resize_temp_size(&coarse_shape, &shape)];
    prolongate(&shape, &coarse, &mut fine, 1, &mut temp).unwrap();

    // Fine voxel i sits at coarse position (i + 0.5) / 2 - 0.5.
    for i in 1..15 {
        assert_abs_diff_eq!(fine[i], (i as f64 + 0.5) / 2.0 - 0.5, epsilon = 1e-12);
    }
    assert_abs_diff_eq!(fine[0], 0.0);
    assert_abs_diff_eq!(fine[15], 7.0);
}

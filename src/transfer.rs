//! Transfer of fields between grids of different resolution.
//!
//! Both grids cover the same domain with cell-centered voxels. Interpolation
//! is linear along each axis; averaging is its adjoint normalized to unit
//! weight sums, so constant fields are reproduced in both directions.

use crate::{
    error::SolverError,
    field::{component_view, component_view_mut},
    geometry::Dim3::{self, X, Y},
    grid::GridShape,
    num::{fac, BFloat},
};
use ndarray::{prelude::*, Zip};

/// Finds the two coarse voxels that fine voxel `i` is interpolated from,
/// together with the weight of the second one.
#[inline]
fn interpolation_weights(i: usize, n_fine: usize, n_coarse: usize) -> (usize, usize, fac) {
    let last = (n_coarse - 1) as fac;
    let position = ((i as fac + 0.5) * (n_coarse as fac) / (n_fine as fac) - 0.5)
        .max(0.0)
        .min(last);
    let lower = (position.floor() as usize).min(n_coarse - 1);
    let upper = (lower + 1).min(n_coarse - 1);
    (lower, upper, position - lower as fac)
}

fn interpolate_lane<F: BFloat>(coarse: ArrayView1<F>, mut fine: ArrayViewMut1<F>) {
    let (n_coarse, n_fine) = (coarse.len(), fine.len());
    for (i, value) in fine.iter_mut().enumerate() {
        let (lower, upper, t) = interpolation_weights(i, n_fine, n_coarse);
        *value = F::from_fac((1.0 - t) * coarse[lower].to_fac() + t * coarse[upper].to_fac());
    }
}

fn average_lane<F: BFloat>(fine: ArrayView1<F>, mut coarse: ArrayViewMut1<F>) {
    let (n_fine, n_coarse) = (fine.len(), coarse.len());
    let ratio = n_fine as fac / n_coarse as fac;
    for (j, value) in coarse.iter_mut().enumerate() {
        // Only fine voxels interpolated from coarse voxel `j` contribute.
        let first = ((j as fac - 1.0) * ratio).floor().max(0.0) as usize;
        let last = ((((j + 2) as fac) * ratio).ceil() as usize).min(n_fine - 1);

        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        for i in first..=last {
            let (lower, upper, t) = interpolation_weights(i, n_fine, n_coarse);
            let mut weight = 0.0;
            if lower == j {
                weight += 1.0 - t;
            }
            if upper == j {
                weight += t;
            }
            weighted_sum += weight * fine[i].to_fac();
            weight_sum += weight;
        }
        *value = if weight_sum > 0.0 {
            F::from_fac(weighted_sum / weight_sum)
        } else {
            F::zero()
        };
    }
}

fn resize_axis<F: BFloat>(source: ArrayView3<F>, mut target: ArrayViewMut3<F>, axis: Dim3) {
    let axis = Axis(axis.num());
    let (n_source, n_target) = (source.len_of(axis), target.len_of(axis));
    Zip::from(target.lanes_mut(axis))
        .and(source.lanes(axis))
        .par_for_each(|mut target_lane, source_lane| {
            if n_target == n_source {
                target_lane.assign(&source_lane);
            } else if n_target > n_source {
                interpolate_lane(source_lane, target_lane);
            } else {
                average_lane(source_lane, target_lane);
            }
        });
}

/// Shapes after resizing along x, and along x and y.
fn intermediate_shapes(shape_in: &GridShape, shape_out: &GridShape) -> (GridShape, GridShape) {
    let after_x = shape_in.with_extent(X, shape_out.extent(X));
    let after_y = after_x.with_extent(Y, shape_out.extent(Y));
    (after_x, after_y)
}

/// Returns the number of scratch values `resize` needs between the given shapes.
pub fn resize_temp_size(shape_in: &GridShape, shape_out: &GridShape) -> usize {
    let (after_x, after_y) = intermediate_shapes(shape_in, shape_out);
    after_x.num_voxels() + after_y.num_voxels()
}

/// Resizes one component, axis by axis. Lengths are assumed to be correct.
pub(crate) fn resize_component<F: BFloat>(
    shape_in: &GridShape,
    field_in: &[F],
    shape_out: &GridShape,
    field_out: &mut [F],
    temp: &mut [F],
) {
    let (after_x, after_y) = intermediate_shapes(shape_in, shape_out);
    let (resized_x, rest) = temp.split_at_mut(after_x.num_voxels());
    let resized_xy = &mut rest[..after_y.num_voxels()];

    resize_axis(
        component_view(shape_in, field_in),
        component_view_mut(&after_x, resized_x),
        Dim3::X,
    );
    resize_axis(
        component_view(&after_x, resized_x),
        component_view_mut(&after_y, resized_xy),
        Dim3::Y,
    );
    resize_axis(
        component_view(&after_y, resized_xy),
        component_view_mut(shape_out, field_out),
        Dim3::Z,
    );
}

/// Resizes every channel of a channel-major field. Lengths are assumed to be correct.
pub(crate) fn resize_channels<F: BFloat>(
    shape_in: &GridShape,
    field_in: &[F],
    shape_out: &GridShape,
    field_out: &mut [F],
    temp: &mut [F],
) {
    let (n_in, n_out) = (shape_in.num_voxels(), shape_out.num_voxels());
    for (channel_in, channel_out) in field_in.chunks(n_in).zip(field_out.chunks_mut(n_out)) {
        resize_component(shape_in, channel_in, shape_out, channel_out, temp);
    }
}

/// Resamples a field with `num_components` components from one grid shape to another.
///
/// Each axis is interpolated when it grows, averaged when it shrinks and
/// copied when unchanged, so this performs restriction, prolongation or a
/// mix of the two. `temp` must hold at least `resize_temp_size(shape_in, shape_out)`
/// values.
pub fn resize<F: BFloat>(
    shape_in: &GridShape,
    field_in: &[F],
    shape_out: &GridShape,
    field_out: &mut [F],
    num_components: usize,
    temp: &mut [F],
) -> Result<(), SolverError> {
    if num_components == 0 {
        return Err(SolverError::NoComponents);
    }
    for (name, expected, actual) in [
        ("input field", shape_in.num_voxels() * num_components, field_in.len()),
        ("output field", shape_out.num_voxels() * num_components, field_out.len()),
    ] {
        if expected != actual {
            return Err(SolverError::FieldLengthMismatch {
                name,
                expected,
                actual,
            });
        }
    }
    let required = resize_temp_size(shape_in, shape_out);
    if temp.len() < required {
        return Err(SolverError::ScratchTooSmall {
            required,
            provided: temp.len(),
        });
    }
    resize_channels(shape_in, field_in, shape_out, field_out, temp);
    Ok(())
}

/// Averages a fine field onto the next coarser grid, `fine_shape.coarsened()`.
pub fn restrict<F: BFloat>(
    fine_shape: &GridShape,
    fine: &[F],
    coarse: &mut [F],
    num_components: usize,
    temp: &mut [F],
) -> Result<(), SolverError> {
    resize(
        fine_shape,
        fine,
        &fine_shape.coarsened(),
        coarse,
        num_components,
        temp,
    )
}

/// Interpolates a field on `fine_shape.coarsened()` back onto the fine grid.
pub fn prolongate<F: BFloat>(
    fine_shape: &GridShape,
    coarse: &[F],
    fine: &mut [F],
    num_components: usize,
    temp: &mut [F],
) -> Result<(), SolverError> {
    resize(
        &fine_shape.coarsened(),
        coarse,
        fine_shape,
        fine,
        num_components,
        temp,
    )
}

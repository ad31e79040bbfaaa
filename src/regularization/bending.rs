//! Bending energy operator `λ0 I + λ1 K + λ2 K²`.
//!
//! The squared Laplacian reaches two voxels along each axis and one voxel
//! diagonally. Pointwise values are evaluated as `K (K f)` from the
//! neighbouring Laplacians, so the boundary handling of `K` carries over
//! unchanged.

use super::{laplacian_at, laplacian_diagonal_at, num_neighbours, PhysicalParams, Regularizer};
use crate::{
    field::{component_view, component_view_mut},
    grid::{GridShape, VoxelSize},
    num::{fac, BFloat},
};
use ndarray::Zip;

/// Bending energy on one grid level.
#[derive(Clone, Debug)]
pub struct Bending {
    shape: GridShape,
    absolute: fac,
    membrane: fac,
    bending: fac,
    weights: [fac; 3],
}

impl Bending {
    /// Computes `(K² f)` at the given voxel.
    fn squared_laplacian_at<F: BFloat>(&self, f: &[F], x: usize, y: usize, z: usize) -> fac {
        let extents = self.shape.extents();
        let coords = [x, y, z];
        let mut value = laplacian_diagonal_at(&self.shape, &self.weights, x, y, z)
            * laplacian_at(&self.shape, &self.weights, f, x, y, z);

        for axis in 0..3 {
            let weight = self.weights[axis];
            if coords[axis] > 0 {
                let mut neighbour = coords;
                neighbour[axis] -= 1;
                value -= weight * self.laplacian_at_coords(f, neighbour);
            }
            if coords[axis] + 1 < extents[axis] {
                let mut neighbour = coords;
                neighbour[axis] += 1;
                value -= weight * self.laplacian_at_coords(f, neighbour);
            }
        }
        value
    }

    #[inline]
    fn laplacian_at_coords<F: BFloat>(&self, f: &[F], coords: [usize; 3]) -> fac {
        laplacian_at(&self.shape, &self.weights, f, coords[0], coords[1], coords[2])
    }

    /// Returns the diagonal entry of `K²`, the sum of squares of row `i` of `K`.
    fn squared_laplacian_diagonal_at(&self, x: usize, y: usize, z: usize) -> fac {
        let extents = self.shape.extents();
        let coords = [x, y, z];
        let center = laplacian_diagonal_at(&self.shape, &self.weights, x, y, z);
        let off_diagonal: fac = (0..3)
            .map(|axis| {
                let weight = self.weights[axis];
                weight * weight * num_neighbours(coords[axis], extents[axis]) as fac
            })
            .sum();
        center * center + off_diagonal
    }
}

impl Regularizer for Bending {
    fn for_level(params: &PhysicalParams, shape: GridShape, voxel_size: &VoxelSize) -> Self {
        Self {
            shape,
            absolute: params.absolute(),
            membrane: params.membrane(),
            bending: params.bending(),
            weights: voxel_size.inverse_squares(),
        }
    }

    fn shape(&self) -> &GridShape {
        &self.shape
    }

    fn value_at<F: BFloat>(&self, f: &[F], x: usize, y: usize, z: usize) -> fac {
        let center = f[self.shape.linear_idx(x, y, z)].to_fac();
        self.absolute * center
            + self.membrane * laplacian_at(&self.shape, &self.weights, f, x, y, z)
            + self.bending * self.squared_laplacian_at(f, x, y, z)
    }

    fn diagonal_at(&self, x: usize, y: usize, z: usize) -> fac {
        self.absolute
            + self.membrane * laplacian_diagonal_at(&self.shape, &self.weights, x, y, z)
            + self.bending * self.squared_laplacian_diagonal_at(x, y, z)
    }

    /// Applies the operator in two passes, storing `K f` in `temp`.
    fn apply<F: BFloat>(&self, f: &[F], g: &mut [F], temp: &mut [F], scale: fac) {
        let shape = self.shape;
        let n = shape.num_voxels();
        let laplacian = &mut temp[..n];

        Zip::indexed(component_view_mut(&shape, laplacian)).par_for_each(|(x, y, z), k| {
            *k = F::from_fac(laplacian_at(&shape, &self.weights, f, x, y, z));
        });

        let laplacian: &[F] = &temp[..n];
        Zip::indexed(component_view_mut(&shape, g))
            .and(component_view(&shape, f))
            .and(component_view(&shape, laplacian))
            .par_for_each(|(x, y, z), g, &f_value, &k_value| {
                let value = self.absolute * f_value.to_fac()
                    + self.membrane * k_value.to_fac()
                    + self.bending * laplacian_at(&shape, &self.weights, laplacian, x, y, z);
                *g = F::from_fac(scale * value);
            });
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_abs_diff_eq;

    fn pure_bending(shape: GridShape) -> Bending {
        let params = PhysicalParams::new(0.0, 0.0, 1.0).unwrap();
        Bending::for_level(&params, shape, &VoxelSize::unit())
    }

    #[test]
    fn interior_stencil_is_discrete_biharmonic() {
        let shape = GridShape::new(9, 1, 1).unwrap();
        let bending = pure_bending(shape);
        let mut delta = vec![0.0f64; 9];
        delta[4] = 1.0;

        let response: Vec<_> = (0..9).map(|x| bending.value_at(&delta, x, 0, 0)).collect();
        let expected = [0.0, 0.0, 1.0, -4.0, 6.0, -4.0, 1.0, 0.0, 0.0];
        for (value, expected) in response.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*value, *expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn two_pass_application_matches_pointwise_values() {
        let shape = GridShape::new(5, 4, 3).unwrap();
        let params = PhysicalParams::new(0.2, 0.5, 0.8).unwrap();
        let voxel_size = VoxelSize::new(1.0, 0.8, 1.7).unwrap();
        let bending = Bending::for_level(&params, shape, &voxel_size);

        let f: Vec<f64> = (0..shape.num_voxels())
            .map(|i| ((i * 37 % 11) as f64 - 5.0) * 0.1)
            .collect();
        let mut g = vec![0.0; f.len()];
        let mut temp = vec![0.0; f.len()];
        bending.apply(&f, &mut g, &mut temp, 2.0);

        for z in 0..3 {
            for y in 0..4 {
                for x in 0..5 {
                    assert_abs_diff_eq!(
                        g[shape.linear_idx(x, y, z)],
                        2.0 * bending.value_at(&f, x, y, z),
                        epsilon = 1e-10
                    );
                }
            }
        }
    }

    #[test]
    fn quadratic_is_not_annihilated() {
        let shape = GridShape::new(8, 1, 1).unwrap();
        let bending = pure_bending(shape);
        let f: Vec<f64> = (0..8).map(|x| (x * x) as f64).collect();
        let total: f64 = (0..8).map(|x| bending.value_at(&f, x, 0, 0) * f[x]).sum();
        assert!(total > 0.0);
    }
}

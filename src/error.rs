//! Errors reported at the solver boundary, and exit helpers for the command line program.

use crate::geometry::Dim3;
use thiserror::Error;

/// Precondition violations detected by the public entry points.
///
/// Slow convergence is never reported here: the solver always runs the
/// requested number of cycles and returns its best estimate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// A grid axis has zero extent.
    #[error("grid shape has zero extent along the {dim}-axis")]
    EmptyGridAxis { dim: Dim3 },

    /// A voxel size is zero, negative or not finite.
    #[error("voxel size along the {dim}-axis must be positive and finite (got {value})")]
    InvalidVoxelSize { dim: Dim3, value: f64 },

    /// Fields must have at least one component.
    #[error("number of field components must be at least one")]
    NoComponents,

    /// A field slice does not match the grid shape and component count.
    #[error("{name} has {actual} values, but {expected} were expected")]
    FieldLengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The regularization name is not one of the supported kinds.
    #[error("unknown regularization kind `{0}` (expected `membrane` or `bending`)")]
    UnknownRegularization(String),

    /// A physical coefficient is negative or not finite.
    #[error("physical parameter `{name}` must be non-negative and finite (got {value})")]
    InvalidPhysicalParameter { name: &'static str, value: f64 },

    /// A diagonal entry of the coefficient field is negative or not finite, or
    /// a symmetric voxel block is indefinite.
    #[error(
        "coefficient field is not positive semi-definite at voxel {voxel} \
         (component {component}, value {value})"
    )]
    InvalidCoefficient {
        voxel: usize,
        component: usize,
        value: f64,
    },

    /// The caller supplied a scratch buffer smaller than the planned size.
    #[error("scratch buffer holds {provided} values, but the solve requires {required}")]
    ScratchTooSmall { required: usize, provided: usize },
}

#[cfg(not(feature = "for-testing"))]
#[macro_export]
macro_rules! exit_with_error {
    ($($print_arg:tt)*) => {{
        eprintln!($($print_arg)*);
        quit::with_code(1);
    }};
}

#[cfg(feature = "for-testing")]
#[macro_export]
macro_rules! exit_with_error {
    ($($print_arg:tt)*) => {{
        panic!($($print_arg)*);
    }};
}

#[macro_export]
macro_rules! exit_on_error {
    ($result:expr, $($print_arg:tt)*) => {
        match $result {
            Ok(value) => value,
            Err(err) => {
                $crate::exit_with_error!($($print_arg)*, err)
            }
        }
    };
}

#[macro_export]
macro_rules! exit_on_false {
    ($logic:expr, $($print_arg:tt)*) => {
        if $logic {
            true
        } else {
            $crate::exit_with_error!($($print_arg)*)
        }
    };
}

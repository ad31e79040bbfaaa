//! Utilities related to numbers.

use num;
use std::fmt;

/// Floating-point precision to use for stencil accumulation and reductions.
#[allow(non_camel_case_types)]
pub type fac = f64;

/// Floating point marker trait for easier control over trait bounds.
pub trait BFloat:
    Sync + Send + num::Float + num::cast::FromPrimitive + fmt::Debug + fmt::Display + 'static
{
    /// Widens the value to the accumulation precision.
    fn to_fac(self) -> fac;

    /// Rounds a value in accumulation precision to this type.
    fn from_fac(value: fac) -> Self;
}

impl BFloat for f32 {
    #[inline]
    fn to_fac(self) -> fac {
        fac::from(self)
    }

    #[inline]
    fn from_fac(value: fac) -> Self {
        value as f32
    }
}

impl BFloat for f64 {
    #[inline]
    fn to_fac(self) -> fac {
        self
    }

    #[inline]
    fn from_fac(value: fac) -> Self {
        value
    }
}

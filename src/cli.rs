//! Command line interface.

pub mod build;
pub mod run;
pub mod scratch_size;
pub mod solve;
pub mod utils;

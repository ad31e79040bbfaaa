//! Utilities for creating the command line interface.

use crate::{
    diagnostics::Verbosity, exit_on_error, exit_on_false, field::CoefficientLayout,
    grid::GridShape, num::BFloat,
};
use clap::{Arg, ArgAction, ArgMatches};
use std::str::FromStr;

pub fn parse_value_string<T>(argument_name: &str, value_string: &str) -> T
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    exit_on_error!(
        value_string.parse(),
        "Error: Could not parse value for {0}: {1}",
        argument_name
    )
}

fn parse_value_strings<'a, T, I>(argument_name: &str, value_strings: I) -> Vec<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
    I: Iterator<Item = &'a String>,
{
    value_strings
        .filter_map(|value_string| {
            if value_string.is_empty() {
                None
            } else {
                Some(parse_value_string(argument_name, value_string))
            }
        })
        .collect()
}

pub fn verify_finite_float_value<F: BFloat>(argument_name: &str, value: F) {
    exit_on_false!(value.is_finite(), "Error: {} must be finite", argument_name);
}

pub fn verify_argument_value_count<T>(argument_name: &str, values: &[T], required_count: usize) {
    let count = values.len();
    exit_on_false!(
        count == required_count,
        "Error: {} must have {} values, got {}",
        argument_name,
        required_count,
        count
    );
}

/// Parses the value of an argument that is required or has a default.
pub fn get_value_from_required_parseable_argument<T>(
    arguments: &ArgMatches,
    argument_name: &str,
) -> T
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    parse_value_string(
        argument_name,
        arguments
            .get_one::<String>(argument_name)
            .expect("No value for required argument"),
    )
}

pub fn get_finite_float_value_from_required_parseable_argument<F>(
    arguments: &ArgMatches,
    argument_name: &str,
) -> F
where
    F: BFloat + FromStr,
    <F as FromStr>::Err: std::fmt::Display,
{
    let value: F = get_value_from_required_parseable_argument(arguments, argument_name);
    verify_finite_float_value(argument_name, value);
    value
}

pub fn get_values_from_required_parseable_argument<T>(
    arguments: &ArgMatches,
    argument_name: &str,
) -> Vec<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    parse_value_strings(
        argument_name,
        arguments
            .get_many::<String>(argument_name)
            .expect("No values for required argument"),
    )
}

/// Creates the argument for the grid shape, shared by several subcommands.
pub fn create_shape_argument() -> Arg {
    Arg::new("shape")
        .short('s')
        .long("shape")
        .require_equals(true)
        .value_delimiter(',')
        .value_name("NX,NY,NZ")
        .required(true)
        .help("Number of voxels along each axis of the grid")
}

pub fn create_components_argument() -> Arg {
    Arg::new("components")
        .short('c')
        .long("components")
        .require_equals(true)
        .value_name("NUMBER")
        .default_value("3")
        .help("Number of components of the vector field")
}

pub fn create_symmetric_argument() -> Arg {
    Arg::new("symmetric")
        .long("symmetric")
        .action(ArgAction::SetTrue)
        .help("Couple the components through symmetric coefficient blocks")
}

pub fn parse_shape(arguments: &ArgMatches) -> GridShape {
    let shape: Vec<usize> = get_values_from_required_parseable_argument(arguments, "shape");
    verify_argument_value_count("shape", &shape, 3);
    exit_on_error!(
        GridShape::new(shape[0], shape[1], shape[2]),
        "Error: Invalid shape: {}"
    )
}

pub fn parse_num_components(arguments: &ArgMatches) -> usize {
    let num_components = get_value_from_required_parseable_argument(arguments, "components");
    exit_on_false!(
        num_components > 0,
        "Error: Number of components must be at least one"
    );
    num_components
}

pub fn parse_coefficient_layout(arguments: &ArgMatches) -> CoefficientLayout {
    if arguments.get_flag("symmetric") {
        CoefficientLayout::Symmetric
    } else {
        CoefficientLayout::Diagonal
    }
}

pub fn parse_verbosity(arguments: &ArgMatches, support_progress: bool) -> Verbosity {
    if support_progress && arguments.get_flag("progress") {
        Verbosity::progress()
    } else if arguments.get_flag("verbose") {
        Verbosity::Messages
    } else {
        Verbosity::Quiet
    }
}
